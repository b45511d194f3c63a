//! One sweep pass: reconcile, retry pending cleanups, then sample and
//! evaluate every live resource.

use std::collections::HashSet;

use tabflow_protocol::{MemorySample, ResourceId, SweepReport};
use tracing::{debug, info, warn};

use super::LifecycleController;
use crate::error::{Error, Result};
use crate::host::bounded;
use crate::placeholder::is_placeholder;
use crate::policy::{ResourceFlags, fresh_sample, should_hibernate};
use crate::registry::Observation;

impl LifecycleController {
	/// Runs one sweep.
	///
	/// Returns `None` without doing anything when another sweep is still
	/// running. The auto-hibernate flag is read once at the start; with it off
	/// only reconciliation and bookkeeping run.
	pub async fn sweep(&self) -> Option<SweepReport> {
		let Ok(_gate) = self.sweep_gate.try_lock() else {
			return None;
		};

		let enabled = self.auto_hibernate();
		let mut report = SweepReport {
			bookkeeping_only: !enabled,
			..Default::default()
		};

		let live = match bounded(self.timeout, "list_resources", self.host.inventory.list_resources()).await {
			Ok(ids) => ids,
			Err(err) => {
				warn!(target = "tabflow.sweep", error = %err, "resource listing failed, sweep skipped");
				return Some(report);
			}
		};
		let live_set: HashSet<ResourceId> = live.iter().cloned().collect();

		report.purged = self.reconcile(&live_set).await;
		self.retry_pending().await;

		for id in &live {
			report.examined += 1;
			match self.sweep_one(id, enabled, &mut report).await {
				Ok(()) => {}
				Err(err) if err.is_conflict() => {
					debug!(target = "tabflow.sweep", %id, "transition in flight, skipped");
				}
				Err(err) if err.is_gone() => {
					self.purge(id).await;
					report.purged.push(id.clone());
				}
				Err(err) => {
					warn!(target = "tabflow.sweep", %id, error = %err, "resource skipped");
					report.failures += 1;
				}
			}
		}

		info!(
			target = "tabflow.sweep",
			examined = report.examined,
			hibernated = report.hibernated.len(),
			purged = report.purged.len(),
			unmeasurable = report.unmeasurable,
			failures = report.failures,
			bookkeeping_only = report.bookkeeping_only,
			"sweep finished"
		);
		Some(report)
	}

	/// Drops every trace of ids that are no longer live. Returns the purged ids.
	async fn reconcile(&self, live: &HashSet<ResourceId>) -> Vec<ResourceId> {
		let (mut purged, gone_hibernated, gone_access) = {
			let mut state = self.state.lock();
			let mut purged = state.registry.retain_live(live);
			let gone_access = state.access.retain_live(live);
			purged.extend(gone_access.iter().cloned());
			let gone: Vec<ResourceId> = state.hibernated.iter().filter(|id| !live.contains(*id)).cloned().collect();
			for id in &gone {
				state.hibernated.remove(id);
			}
			purged.extend(gone.iter().cloned());
			(purged, gone, gone_access)
		};
		self.sampler.retain_live(live);

		for id in &gone_access {
			self.forget_access(id).await;
		}
		for id in &gone_hibernated {
			if let Err(err) = self.store.remove_record(id).await {
				warn!(target = "tabflow.store", %id, error = %err, "stale record removal failed, will retry");
				self.state.lock().pending_cleanup.insert(id.clone());
			}
		}
		if !gone_hibernated.is_empty() {
			self.persist_snapshot().await;
		}

		purged.sort();
		purged.dedup();
		if !purged.is_empty() {
			debug!(target = "tabflow.sweep", count = purged.len(), "purged vanished resources");
		}
		purged
	}

	/// Retries record removals and snapshot writes that failed earlier.
	async fn retry_pending(&self) {
		let (pending, dirty) = {
			let state = self.state.lock();
			let pending: Vec<ResourceId> = state
				.pending_cleanup
				.iter()
				.filter(|id| !state.hibernated.contains(*id) && !state.in_flight.contains(*id))
				.cloned()
				.collect();
			(pending, state.snapshot_dirty)
		};

		for id in pending {
			match self.store.remove_record(&id).await {
				Ok(()) => {
					debug!(target = "tabflow.store", %id, "pending cleanup completed");
					self.state.lock().pending_cleanup.remove(&id);
				}
				Err(err) => debug!(target = "tabflow.store", %id, error = %err, "pending cleanup still failing"),
			}
		}
		if dirty {
			self.persist_snapshot().await;
		}
	}

	async fn sweep_one(&self, id: &ResourceId, enabled: bool, report: &mut SweepReport) -> Result<()> {
		let details = bounded(self.timeout, "get_resource", self.host.inventory.get_resource(id))
			.await?
			.ok_or_else(|| Error::ResourceGone(id.clone()))?;
		let now = self.clock.now_ms();
		let on_placeholder = is_placeholder(&details.url, self.placeholder_base());

		let first_seen = self.state.lock().access.get(id).is_none();
		let stored = if first_seen { self.stored_access(id).await } else { None };

		let (hibernated, access_changed) = {
			let mut state = self.state.lock();
			let observation = state.registry.observe(&details, now);
			let mut changed = first_seen && stored.is_none();
			match stored {
				Some(access) => state.access.remember(id, access),
				None => state.access.seed(id, now),
			}
			if details.active || (observation == Observation::Navigated && !on_placeholder) {
				state.access.touch(id, now);
				changed = true;
			}
			(state.hibernated.contains(id), changed)
		};
		if access_changed {
			self.persist_access(id).await;
		}

		if hibernated {
			if !on_placeholder {
				info!(target = "tabflow.sweep", %id, url = %details.url, "resource left its placeholder, dropping record");
				self.cleanup_record(id).await;
			}
			return Ok(());
		}
		if on_placeholder {
			return self.adopt(id).await;
		}
		if !enabled {
			return Ok(());
		}

		let sample = match self.sampler.measure(&details).await {
			Ok(sample) => sample,
			Err(Error::MeasurementUnavailable { reason, .. }) => {
				debug!(target = "tabflow.sweep", %id, %reason, "tracking at zero usage");
				report.unmeasurable += 1;
				MemorySample::zero(now)
			}
			Err(err) => return Err(err),
		};

		let qualifies = {
			let mut state = self.state.lock();
			state.registry.record_sample(id, sample);
			let flags = ResourceFlags {
				active: details.active,
				pinned: self.is_pinned(details.pinned, &details.url),
				hibernated: state.hibernated.contains(id),
			};
			let sample = fresh_sample(state.registry.sample(id), self.clock.now_ms(), self.max_sample_age);
			should_hibernate(flags, sample, state.access.idle(id, now), state.threshold_bytes, state.idle_threshold)
		};

		if qualifies {
			self.hibernate(&details).await?;
			report.hibernated.push(id.clone());
		}
		Ok(())
	}

	/// Re-adopts a resource sitting on a placeholder that the set lost track
	/// of, as happens after a crash between redirect and snapshot write.
	async fn adopt(&self, id: &ResourceId) -> Result<()> {
		if self.store.load_record(id).await?.is_none() {
			debug!(target = "tabflow.sweep", %id, "placeholder without record");
			return Ok(());
		}
		info!(target = "tabflow.sweep", %id, "adopting hibernated resource");
		self.state.lock().hibernated.insert(id.clone());
		self.persist_snapshot().await;
		Ok(())
	}

	/// Forgets a resource that disappeared mid-sweep.
	async fn purge(&self, id: &ResourceId) {
		let was_hibernated = {
			let mut state = self.state.lock();
			state.registry.remove(id);
			state.access.remove(id);
			state.hibernated.remove(id)
		};
		self.sampler.forget(id);
		self.forget_access(id).await;
		if was_hibernated {
			if let Err(err) = self.store.remove_record(id).await {
				warn!(target = "tabflow.store", %id, error = %err, "stale record removal failed, will retry");
				self.state.lock().pending_cleanup.insert(id.clone());
			}
			self.persist_snapshot().await;
		}
	}
}
