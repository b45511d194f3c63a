//! Hibernate and restore transitions.

use tabflow_protocol::{HibernationRecord, ResourceDetails, ResourceId, RestoreOutcome};
use tracing::{debug, info, warn};

use super::{InFlight, LifecycleController};
use crate::error::{Error, Result};
use crate::host::bounded;
use crate::placeholder::placeholder_url;

impl LifecycleController {
	/// Hibernates a resource right away, skipping the usage and idle checks.
	///
	/// Active and pinned resources are refused with `Ok(false)`.
	pub async fn hibernate_now(&self, id: &ResourceId) -> Result<bool> {
		let details = bounded(self.timeout, "get_resource", self.host.inventory.get_resource(id))
			.await?
			.ok_or_else(|| Error::ResourceGone(id.clone()))?;
		if details.active || self.is_pinned(details.pinned, &details.url) {
			debug!(target = "tabflow.sweep", %id, "refusing to hibernate active or pinned resource");
			return Ok(false);
		}
		{
			let now = self.clock.now_ms();
			let mut state = self.state.lock();
			state.registry.observe(&details, now);
			state.access.seed(id, now);
		}
		self.hibernate(&details).await?;
		Ok(true)
	}

	/// Record first, then redirect, then snapshot.
	///
	/// A failed record write changes nothing. A failed redirect removes the
	/// record again (queued for retry if that also fails).
	pub(super) async fn hibernate(&self, details: &ResourceDetails) -> Result<()> {
		let id = &details.id;
		let Some(_guard) = InFlight::acquire(&self.state, id) else {
			return Err(Error::TransitionConflict(id.clone()));
		};
		if self.is_hibernated(id) {
			return Ok(());
		}

		let record = HibernationRecord {
			resource_id: id.clone(),
			original_url: details.url.clone(),
			title: details.title.clone(),
			hibernated_at: self.clock.now_ms(),
		};
		self.store.save_record(&record).await?;

		let target = placeholder_url(self.placeholder_base(), &record);
		if let Err(source) = bounded(self.timeout, "redirect", self.host.navigator.redirect(id, &target)).await {
			if let Err(err) = self.store.remove_record(id).await {
				warn!(target = "tabflow.sweep", %id, error = %err, "orphaned record queued for cleanup");
				self.state.lock().pending_cleanup.insert(id.clone());
			}
			return Err(Error::Redirect { id: id.clone(), source });
		}

		{
			let mut state = self.state.lock();
			state.hibernated.insert(id.clone());
			state.pending_cleanup.remove(id);
			state.registry.drop_sample(id);
		}
		self.persist_snapshot().await;
		self.sampler.detach(id).await;

		info!(target = "tabflow.sweep", %id, url = %record.original_url, "hibernated");
		Ok(())
	}

	/// Brings a hibernated resource back to its original URL.
	///
	/// Restoring a resource without a record is a logged no-op that also
	/// clears any stale snapshot entry. A record left behind by a failed
	/// cleanup never triggers a second navigation; its removal is retried
	/// instead.
	pub async fn restore(&self, id: &ResourceId) -> Result<RestoreOutcome> {
		let Some(_guard) = InFlight::acquire(&self.state, id) else {
			debug!(target = "tabflow.sweep", %id, "restore ignored, transition in flight");
			return Ok(RestoreOutcome::InFlight);
		};

		let pending = {
			let state = self.state.lock();
			!state.hibernated.contains(id) && state.pending_cleanup.contains(id)
		};
		if pending {
			info!(target = "tabflow.sweep", %id, "restore requested for resource that is not hibernated");
			match self.store.remove_record(id).await {
				Ok(()) => {
					self.state.lock().pending_cleanup.remove(id);
				}
				Err(err) => debug!(target = "tabflow.store", %id, error = %err, "pending cleanup still failing"),
			}
			return Ok(RestoreOutcome::NotHibernated);
		}

		let Some(record) = self.store.load_record(id).await? else {
			info!(target = "tabflow.sweep", %id, "restore requested for resource that is not hibernated");
			let stale = self.state.lock().hibernated.remove(id);
			if stale {
				self.persist_snapshot().await;
			}
			return Ok(RestoreOutcome::NotHibernated);
		};

		bounded(self.timeout, "redirect", self.host.navigator.redirect(id, &record.original_url))
			.await
			.map_err(|source| Error::Redirect { id: id.clone(), source })?;

		self.cleanup_record(id).await;
		self.record_access(id).await;

		info!(target = "tabflow.sweep", %id, url = %record.original_url, "restored");
		Ok(RestoreOutcome::Restored {
			url: record.original_url,
			title: record.title,
		})
	}

	/// Removes the record and every in-memory trace of hibernation for `id`.
	///
	/// A failed removal queues the id for the next sweep; the resource is
	/// treated as not hibernated either way.
	pub(super) async fn cleanup_record(&self, id: &ResourceId) -> bool {
		{
			let mut state = self.state.lock();
			state.hibernated.remove(id);
			state.registry.drop_sample(id);
		}

		let removed = match self.store.remove_record(id).await {
			Ok(()) => {
				self.state.lock().pending_cleanup.remove(id);
				true
			}
			Err(err) => {
				warn!(target = "tabflow.store", %id, error = %err, "record removal failed, will retry");
				self.state.lock().pending_cleanup.insert(id.clone());
				false
			}
		};
		self.persist_snapshot().await && removed
	}
}
