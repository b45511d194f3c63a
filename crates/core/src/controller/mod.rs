//! The lifecycle controller: owns all manager state and drives sweeps and
//! hibernate/restore transitions.
//!
//! State is mutated only through controller methods. In-memory state sits
//! behind a short synchronous lock that is never held across an `.await`;
//! sweeps are serialized by an async gate and snapshot writes by a persist
//! lock, so the durable snapshot is always a full set computed from the
//! current in-memory state.

mod sweep;
mod transitions;

use std::collections::{BTreeSet, HashSet};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tabflow_protocol::{AccessRecord, ControllerStatus, ResourceId, ResourceState, ResourceStats, ResourceStatus};
use tracing::{debug, info, warn};

use crate::clock::Clock;
use crate::config::HibernateConfig;
use crate::error::Result;
use crate::gate::PermissionGate;
use crate::host::{Host, bounded};
use crate::pattern::PatternSet;
use crate::registry::{AccessLog, Registry};
use crate::sampler::MemorySampler;
use crate::store::StateStore;

pub(crate) struct ControllerState {
	registry: Registry,
	access: AccessLog,
	hibernated: BTreeSet<ResourceId>,
	in_flight: HashSet<ResourceId>,
	/// Ids whose record removal failed; retried at the next sweep.
	pending_cleanup: BTreeSet<ResourceId>,
	/// Set when a snapshot write failed and the durable set may be stale.
	snapshot_dirty: bool,
	auto_hibernate: bool,
	threshold_bytes: u64,
	idle_threshold: Duration,
}

pub struct LifecycleController {
	host: Host,
	clock: Arc<dyn Clock>,
	store: StateStore,
	sampler: MemorySampler,
	pinned: PatternSet,
	placeholder_base: Option<String>,
	max_sample_age: Option<Duration>,
	timeout: Duration,
	state: Mutex<ControllerState>,
	sweep_gate: tokio::sync::Mutex<()>,
	persist_lock: tokio::sync::Mutex<()>,
}

/// Marks a resource as having a transition in flight until dropped.
struct InFlight<'a> {
	state: &'a Mutex<ControllerState>,
	id: ResourceId,
}

impl<'a> InFlight<'a> {
	fn acquire(state: &'a Mutex<ControllerState>, id: &ResourceId) -> Option<Self> {
		if !state.lock().in_flight.insert(id.clone()) {
			return None;
		}
		Some(Self { state, id: id.clone() })
	}
}

impl Drop for InFlight<'_> {
	fn drop(&mut self) {
		self.state.lock().in_flight.remove(&self.id);
	}
}

impl LifecycleController {
	pub fn new(host: Host, config: HibernateConfig, clock: Arc<dyn Clock>) -> Self {
		let timeout = config.call_timeout();
		let gate = PermissionGate::new(host.grants.clone(), timeout);
		let sampler = MemorySampler::new(host.inventory.clone(), host.channel.clone(), gate, clock.clone(), timeout);
		let store = StateStore::new(host.store.clone(), timeout);

		Self {
			clock,
			store,
			sampler,
			pinned: PatternSet::new(&config.pinned_patterns),
			placeholder_base: config.placeholder_url.clone(),
			max_sample_age: config.max_sample_age(),
			timeout,
			state: Mutex::new(ControllerState {
				registry: Registry::new(),
				access: AccessLog::new(),
				hibernated: BTreeSet::new(),
				in_flight: HashSet::new(),
				pending_cleanup: BTreeSet::new(),
				snapshot_dirty: false,
				auto_hibernate: config.auto_hibernate,
				threshold_bytes: config.memory_threshold_bytes,
				idle_threshold: config.idle_threshold(),
			}),
			sweep_gate: tokio::sync::Mutex::new(()),
			persist_lock: tokio::sync::Mutex::new(()),
			host,
		}
	}

	/// Loads the durable snapshot, keeping only ids that still have a record.
	///
	/// Rewrites the snapshot when it disagreed with the records. Call once at
	/// startup before the first sweep.
	pub async fn load(&self) -> Result<usize> {
		let stored = self.store.load_set().await?;
		let mut kept = BTreeSet::new();
		for id in &stored {
			if self.store.load_record(id).await?.is_some() {
				kept.insert(id.clone());
			} else {
				warn!(target = "tabflow.store", %id, "dropping snapshot entry without record");
			}
		}

		let repaired = kept.len() != stored.len();
		let count = kept.len();
		{
			let mut state = self.state.lock();
			state.hibernated.extend(kept);
			state.snapshot_dirty |= repaired;
		}
		if repaired {
			self.persist_snapshot().await;
		}
		info!(target = "tabflow.store", hibernated = count, "loaded hibernated set");
		Ok(count)
	}

	/// Attaches inspection channels to every live resource.
	///
	/// Returns how many resources have a channel afterwards. Failures are
	/// logged per resource.
	pub async fn attach_all(&self) -> Result<usize> {
		let ids = bounded(self.timeout, "list_resources", self.host.inventory.list_resources()).await?;
		let mut attached = 0;
		for id in &ids {
			match self.sampler.ensure_attached(id).await {
				Ok(()) => attached += 1,
				Err(err) => debug!(target = "tabflow.sampler", %id, error = %err, "attach skipped"),
			}
		}
		info!(target = "tabflow.sampler", attached, total = ids.len(), "channels attached");
		Ok(attached)
	}

	/// Detaches every channel this controller knows about.
	pub async fn shutdown(&self) -> usize {
		let detached = self.sampler.detach_all().await;
		info!(target = "tabflow.sampler", detached, "channels detached");
		detached
	}

	/// Records an activation or load for a resource and persists it.
	pub async fn record_access(&self, id: &ResourceId) {
		let now = self.clock.now_ms();
		self.state.lock().access.touch(id, now);
		self.persist_access(id).await;
	}

	/// Enables or disables periodic hibernation. Takes effect at the next sweep.
	pub fn set_auto_hibernate(&self, enabled: bool) {
		self.state.lock().auto_hibernate = enabled;
		info!(target = "tabflow.sweep", enabled, "auto-hibernate updated");
	}

	pub fn auto_hibernate(&self) -> bool {
		self.state.lock().auto_hibernate
	}

	pub fn set_memory_threshold(&self, bytes: u64) {
		self.state.lock().threshold_bytes = bytes;
		info!(target = "tabflow.sweep", bytes, "memory threshold updated");
	}

	pub fn set_idle_threshold(&self, idle: Duration) {
		self.state.lock().idle_threshold = idle;
		info!(target = "tabflow.sweep", idle_secs = idle.as_secs(), "idle threshold updated");
	}

	/// Latest usage for a resource; zeroes when it was never measured.
	pub fn get_stats(&self, id: &ResourceId) -> ResourceStats {
		match self.state.lock().registry.sample(id) {
			Some(sample) => ResourceStats {
				used_bytes: sample.used_bytes,
				captured_at: Some(sample.captured_at),
			},
			None => ResourceStats::default(),
		}
	}

	pub fn is_hibernated(&self, id: &ResourceId) -> bool {
		self.state.lock().hibernated.contains(id)
	}

	/// Sum of reserved heap across all measured resources.
	pub fn get_system_usage(&self) -> u64 {
		self.state.lock().registry.system_usage()
	}

	pub fn hibernated_ids(&self) -> Vec<ResourceId> {
		self.state.lock().hibernated.iter().cloned().collect()
	}

	pub fn status(&self) -> ControllerStatus {
		let state = self.state.lock();
		let mut resources: Vec<ResourceStatus> = state
			.registry
			.iter()
			.map(|(id, entry)| ResourceStatus {
				id: id.clone(),
				state: if state.hibernated.contains(id) {
					ResourceState::Hibernated
				} else if entry.active {
					ResourceState::Active
				} else {
					ResourceState::Tracked
				},
				url: Some(entry.url.clone()),
				sample: entry.sample,
				last_accessed_at: state.access.get(id).map(|r| r.last_accessed_at),
			})
			.collect();
		resources.sort_by(|a, b| a.id.cmp(&b.id));

		ControllerStatus {
			auto_hibernate: state.auto_hibernate,
			memory_threshold_bytes: state.threshold_bytes,
			idle_threshold_secs: state.idle_threshold.as_secs(),
			system_usage_bytes: state.registry.system_usage(),
			hibernated: state.hibernated.iter().cloned().collect(),
			resources,
		}
	}

	/// Writes the full hibernated set. On failure the snapshot is marked dirty
	/// and rewritten at the next sweep.
	async fn persist_snapshot(&self) -> bool {
		let _guard = self.persist_lock.lock().await;
		let ids = {
			let mut state = self.state.lock();
			state.snapshot_dirty = false;
			state.hibernated.clone()
		};
		match self.store.save_set(&ids).await {
			Ok(()) => true,
			Err(err) => {
				self.state.lock().snapshot_dirty = true;
				warn!(target = "tabflow.store", error = %err, "snapshot write failed, will retry");
				false
			}
		}
	}

	/// Writes the in-memory access time for `id`. Failures are logged and dropped.
	async fn persist_access(&self, id: &ResourceId) {
		let Some(access) = self.state.lock().access.get(id) else {
			return;
		};
		if let Err(err) = self.store.save_access(id, access).await {
			warn!(target = "tabflow.store", %id, error = %err, "access time write failed");
		}
	}

	/// Reads the access time a previous run persisted for `id`.
	async fn stored_access(&self, id: &ResourceId) -> Option<AccessRecord> {
		match self.store.load_access(id).await {
			Ok(access) => access,
			Err(err) => {
				warn!(target = "tabflow.store", %id, error = %err, "access time read failed");
				None
			}
		}
	}

	async fn forget_access(&self, id: &ResourceId) {
		if let Err(err) = self.store.remove_access(id).await {
			debug!(target = "tabflow.store", %id, error = %err, "access time removal failed");
		}
	}

	fn is_pinned(&self, pinned: bool, url: &str) -> bool {
		pinned || self.pinned.is_match(url)
	}

	fn placeholder_base(&self) -> Option<&str> {
		self.placeholder_base.as_deref()
	}
}

impl std::fmt::Debug for LifecycleController {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("LifecycleController")
			.field("sampler", &self.sampler)
			.field("timeout", &self.timeout)
			.finish_non_exhaustive()
	}
}
