//! Memory sampling through the inspection channel.
//!
//! The channel protocol is attach-then-query. Connection state per resource is
//! tracked explicitly ([`ChannelState`]); attaching is idempotent and adopts
//! channels that were attached before this process started.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use tabflow_protocol::{MemorySample, Metric, ResourceDetails, ResourceId};
use tracing::{debug, warn};

use crate::clock::Clock;
use crate::error::{Error, Result};
use crate::gate::PermissionGate;
use crate::host::{HostError, HostResult, InspectionChannel, ResourceInventory, bounded};

/// Inspection channel connection state for one resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelState {
	Detached,
	Attached,
}

pub struct MemorySampler {
	inventory: Arc<dyn ResourceInventory>,
	channel: Arc<dyn InspectionChannel>,
	gate: PermissionGate,
	clock: Arc<dyn Clock>,
	timeout: Duration,
	connections: DashMap<ResourceId, ChannelState>,
}

impl MemorySampler {
	pub fn new(
		inventory: Arc<dyn ResourceInventory>,
		channel: Arc<dyn InspectionChannel>,
		gate: PermissionGate,
		clock: Arc<dyn Clock>,
		timeout: Duration,
	) -> Self {
		Self {
			inventory,
			channel,
			gate,
			clock,
			timeout,
			connections: DashMap::new(),
		}
	}

	pub fn state(&self, id: &ResourceId) -> ChannelState {
		self.connections.get(id).map(|s| *s).unwrap_or(ChannelState::Detached)
	}

	pub fn attached(&self) -> Vec<ResourceId> {
		self.connections
			.iter()
			.filter(|entry| *entry.value() == ChannelState::Attached)
			.map(|entry| entry.key().clone())
			.collect()
	}

	/// Takes a fresh sample of a resource by id.
	///
	/// `None` means the resource no longer exists and should be purged.
	/// Resources that exist but cannot be measured get a zero sample.
	pub async fn sample(&self, id: &ResourceId) -> Option<MemorySample> {
		let details = match bounded(self.timeout, "get_resource", self.inventory.get_resource(id)).await {
			Ok(Some(details)) => details,
			Ok(None) | Err(HostError::NotFound(_)) => {
				self.forget(id);
				return None;
			}
			Err(err) => {
				debug!(target = "tabflow.sampler", %id, error = %err, "resource lookup failed");
				return Some(MemorySample::zero(self.clock.now_ms()));
			}
		};

		match self.measure(&details).await {
			Ok(sample) => Some(sample),
			Err(err) if err.is_gone() => {
				self.forget(id);
				None
			}
			Err(err) => {
				debug!(target = "tabflow.sampler", %id, error = %err, "recording zero usage");
				Some(MemorySample::zero(self.clock.now_ms()))
			}
		}
	}

	/// Measures a resource the caller already looked up.
	///
	/// Errors are [`Error::MeasurementUnavailable`] (permission, restricted
	/// scheme, channel failure) or [`Error::ResourceGone`].
	pub async fn measure(&self, details: &ResourceDetails) -> Result<MemorySample> {
		let id = &details.id;
		if !self.gate.can_inspect(&details.url).await {
			return Err(Error::MeasurementUnavailable {
				id: id.clone(),
				reason: "inspection not permitted".into(),
			});
		}

		self.ensure_attached(id).await.map_err(|err| self.channel_error(id, err))?;

		let used = self.query(id, Metric::UsedHeapBytes).await?;
		let total = self.query(id, Metric::TotalHeapBytes).await?;

		Ok(MemorySample {
			used_bytes: used,
			total_bytes: total.max(used),
			captured_at: self.clock.now_ms(),
		})
	}

	/// Attaches a channel unless one is already attached.
	///
	/// Checks local state first, then the channel's own attachment list, and
	/// only then attaches.
	pub async fn ensure_attached(&self, id: &ResourceId) -> HostResult<()> {
		if self.state(id) == ChannelState::Attached {
			return Ok(());
		}

		let existing = bounded(self.timeout, "list_attachments", self.channel.list_attachments()).await?;
		if existing.contains(id) {
			debug!(target = "tabflow.sampler", %id, "adopting existing channel");
			self.connections.insert(id.clone(), ChannelState::Attached);
			return Ok(());
		}

		bounded(self.timeout, "attach", self.channel.attach(id)).await?;
		debug!(target = "tabflow.sampler", %id, "channel attached");
		self.connections.insert(id.clone(), ChannelState::Attached);
		Ok(())
	}

	/// Detaches the channel for a resource. No-op when nothing is attached.
	///
	/// Returns true when a channel was actually detached.
	pub async fn detach(&self, id: &ResourceId) -> bool {
		let Some((_, ChannelState::Attached)) = self.connections.remove(id) else {
			return false;
		};
		match bounded(self.timeout, "detach", self.channel.detach(id)).await {
			Ok(()) => {
				debug!(target = "tabflow.sampler", %id, "channel detached");
				true
			}
			Err(err) => {
				warn!(target = "tabflow.sampler", %id, error = %err, "detach failed");
				false
			}
		}
	}

	pub async fn detach_all(&self) -> usize {
		let mut detached = 0;
		for id in self.attached() {
			if self.detach(&id).await {
				detached += 1;
			}
		}
		detached
	}

	/// Drops local state for a resource that no longer exists.
	pub fn forget(&self, id: &ResourceId) {
		self.connections.remove(id);
	}

	/// Drops local state for every resource not in `live`.
	pub fn retain_live(&self, live: &HashSet<ResourceId>) {
		self.connections.retain(|id, _| live.contains(id));
	}

	async fn query(&self, id: &ResourceId, metric: Metric) -> Result<u64> {
		bounded(self.timeout, "query", self.channel.query(id, metric))
			.await
			.map_err(|err| self.channel_error(id, err))
	}

	/// Maps a channel failure and resets the connection so the next sample re-attaches.
	fn channel_error(&self, id: &ResourceId, err: HostError) -> Error {
		if err.is_not_found() {
			return Error::ResourceGone(id.clone());
		}
		self.connections.insert(id.clone(), ChannelState::Detached);
		Error::MeasurementUnavailable {
			id: id.clone(),
			reason: err.to_string(),
		}
	}
}

impl std::fmt::Debug for MemorySampler {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("MemorySampler")
			.field("timeout", &self.timeout)
			.field("connections", &self.connections.len())
			.finish_non_exhaustive()
	}
}

#[cfg(test)]
mod tests;
