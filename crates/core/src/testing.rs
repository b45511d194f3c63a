//! Scripted host and store fakes for controller and sampler tests.

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;
use tabflow_protocol::{MIB, Metric, ResourceDetails, ResourceId};

use crate::clock::ManualClock;
use crate::config::HibernateConfig;
use crate::controller::LifecycleController;
use crate::gate::OriginGrants;
use crate::host::{
	GrantService, Host, HostError, HostResult, InspectionChannel, KeyValueStore, Navigator, ResourceInventory,
};
use crate::store::{HIBERNATED_SET_KEY, MemoryStore};

/// Start of the simulated clock, an arbitrary fixed epoch.
pub const T0: u64 = 1_700_000_000_000;

struct FakeResource {
	details: ResourceDetails,
	used: u64,
	total: u64,
}

#[derive(Default)]
struct FakeState {
	resources: BTreeMap<ResourceId, FakeResource>,
	attached: HashSet<ResourceId>,
	redirects: Vec<(ResourceId, String)>,
	failing_redirects: HashSet<ResourceId>,
	failing_queries: bool,
	failing_listing: bool,
}

/// Browser stand-in: inventory, navigator and inspection channel in one.
#[derive(Default)]
pub struct FakeHost {
	state: Mutex<FakeState>,
	attach_calls: AtomicUsize,
	detach_calls: AtomicUsize,
}

impl FakeHost {
	pub fn new() -> Arc<Self> {
		Arc::new(Self::default())
	}

	pub fn add(&self, id: &str, url: &str, used_mib: u64) {
		let id = ResourceId::new(id);
		self.state.lock().resources.insert(
			id.clone(),
			FakeResource {
				details: ResourceDetails {
					id: id.clone(),
					url: url.to_string(),
					title: format!("Title of {id}"),
					active: false,
					pinned: false,
				},
				used: used_mib * MIB,
				total: used_mib * MIB + MIB,
			},
		);
	}

	pub fn remove(&self, id: &str) {
		let id = ResourceId::new(id);
		let mut state = self.state.lock();
		state.resources.remove(&id);
		state.attached.remove(&id);
	}

	pub fn set_usage_mib(&self, id: &str, used_mib: u64) {
		if let Some(r) = self.state.lock().resources.get_mut(&ResourceId::new(id)) {
			r.used = used_mib * MIB;
			r.total = used_mib * MIB + MIB;
		}
	}

	pub fn set_active(&self, id: &str, active: bool) {
		self.with_details(id, |d| d.active = active);
	}

	pub fn set_pinned(&self, id: &str, pinned: bool) {
		self.with_details(id, |d| d.pinned = pinned);
	}

	pub fn set_url(&self, id: &str, url: &str) {
		self.with_details(id, |d| d.url = url.to_string());
	}

	pub fn url_of(&self, id: &str) -> Option<String> {
		self.state.lock().resources.get(&ResourceId::new(id)).map(|r| r.details.url.clone())
	}

	pub fn redirects(&self) -> Vec<(ResourceId, String)> {
		self.state.lock().redirects.clone()
	}

	pub fn fail_redirects(&self, id: &str, fail: bool) {
		let id = ResourceId::new(id);
		let mut state = self.state.lock();
		if fail {
			state.failing_redirects.insert(id);
		} else {
			state.failing_redirects.remove(&id);
		}
	}

	pub fn fail_queries(&self, fail: bool) {
		self.state.lock().failing_queries = fail;
	}

	pub fn fail_listing(&self, fail: bool) {
		self.state.lock().failing_listing = fail;
	}

	/// Marks a channel as attached by someone else (a previous run).
	pub fn pre_attach(&self, id: &str) {
		self.state.lock().attached.insert(ResourceId::new(id));
	}

	pub fn is_attached(&self, id: &str) -> bool {
		self.state.lock().attached.contains(&ResourceId::new(id))
	}

	pub fn attach_calls(&self) -> usize {
		self.attach_calls.load(Ordering::SeqCst)
	}

	pub fn detach_calls(&self) -> usize {
		self.detach_calls.load(Ordering::SeqCst)
	}

	fn with_details(&self, id: &str, f: impl FnOnce(&mut ResourceDetails)) {
		if let Some(r) = self.state.lock().resources.get_mut(&ResourceId::new(id)) {
			f(&mut r.details);
		}
	}
}

#[async_trait]
impl ResourceInventory for FakeHost {
	async fn list_resources(&self) -> HostResult<Vec<ResourceId>> {
		let state = self.state.lock();
		if state.failing_listing {
			return Err(HostError::failed("inventory unavailable"));
		}
		Ok(state.resources.keys().cloned().collect())
	}

	async fn get_resource(&self, id: &ResourceId) -> HostResult<Option<ResourceDetails>> {
		Ok(self.state.lock().resources.get(id).map(|r| r.details.clone()))
	}
}

#[async_trait]
impl Navigator for FakeHost {
	async fn redirect(&self, id: &ResourceId, url: &str) -> HostResult<()> {
		let mut state = self.state.lock();
		if state.failing_redirects.contains(id) {
			return Err(HostError::failed("navigation refused"));
		}
		let resource = state.resources.get_mut(id).ok_or_else(|| HostError::NotFound(id.clone()))?;
		resource.details.url = url.to_string();
		state.redirects.push((id.clone(), url.to_string()));
		Ok(())
	}
}

#[async_trait]
impl InspectionChannel for FakeHost {
	async fn attach(&self, id: &ResourceId) -> HostResult<()> {
		self.attach_calls.fetch_add(1, Ordering::SeqCst);
		let mut state = self.state.lock();
		if !state.resources.contains_key(id) {
			return Err(HostError::NotFound(id.clone()));
		}
		state.attached.insert(id.clone());
		Ok(())
	}

	async fn detach(&self, id: &ResourceId) -> HostResult<()> {
		self.detach_calls.fetch_add(1, Ordering::SeqCst);
		self.state.lock().attached.remove(id);
		Ok(())
	}

	async fn list_attachments(&self) -> HostResult<Vec<ResourceId>> {
		Ok(self.state.lock().attached.iter().cloned().collect())
	}

	async fn query(&self, id: &ResourceId, metric: Metric) -> HostResult<u64> {
		let state = self.state.lock();
		let resource = state.resources.get(id).ok_or_else(|| HostError::NotFound(id.clone()))?;
		if state.failing_queries {
			return Err(HostError::failed("channel closed"));
		}
		if !state.attached.contains(id) {
			return Err(HostError::failed("not attached"));
		}
		Ok(match metric {
			Metric::UsedHeapBytes => resource.used,
			Metric::TotalHeapBytes => resource.total,
		})
	}
}

/// [`MemoryStore`] with switchable write failures.
#[derive(Default)]
pub struct FakeStore {
	inner: MemoryStore,
	fail_record_writes: AtomicBool,
	fail_set_writes: AtomicBool,
	fail_removes: AtomicBool,
}

impl FakeStore {
	pub fn new() -> Arc<Self> {
		Arc::new(Self::default())
	}

	pub fn fail_record_writes(&self, fail: bool) {
		self.fail_record_writes.store(fail, Ordering::SeqCst);
	}

	pub fn fail_set_writes(&self, fail: bool) {
		self.fail_set_writes.store(fail, Ordering::SeqCst);
	}

	pub fn fail_removes(&self, fail: bool) {
		self.fail_removes.store(fail, Ordering::SeqCst);
	}

	pub fn has_record(&self, id: &str) -> bool {
		self.inner.contains(&format!("hibernated_{id}"))
	}

	pub fn has_access(&self, id: &str) -> bool {
		self.inner.contains(&format!("lastAccess_{id}"))
	}

	/// Ids in the persisted snapshot, sorted.
	pub async fn snapshot(&self) -> Vec<String> {
		match self.inner.get(HIBERNATED_SET_KEY).await {
			Ok(Some(value)) => serde_json::from_value(value).unwrap_or_default(),
			_ => Vec::new(),
		}
	}

	/// Ids that have a record, sorted.
	pub fn record_ids(&self) -> Vec<String> {
		self.inner
			.keys()
			.into_iter()
			.filter_map(|k| k.strip_prefix("hibernated_").map(str::to_string))
			.collect()
	}
}

#[async_trait]
impl KeyValueStore for FakeStore {
	async fn get(&self, key: &str) -> HostResult<Option<Value>> {
		self.inner.get(key).await
	}

	async fn set(&self, key: &str, value: Value) -> HostResult<()> {
		let failing = if key == HIBERNATED_SET_KEY {
			&self.fail_set_writes
		} else {
			&self.fail_record_writes
		};
		if failing.load(Ordering::SeqCst) {
			return Err(HostError::failed("quota exceeded"));
		}
		self.inner.set(key, value).await
	}

	async fn remove(&self, key: &str) -> HostResult<()> {
		if self.fail_removes.load(Ordering::SeqCst) {
			return Err(HostError::failed("store locked"));
		}
		self.inner.remove(key).await
	}
}

/// Grant service that never answers in time.
pub struct HangingGrants;

#[async_trait]
impl GrantService for HangingGrants {
	async fn has_grant(&self, _origin: &str) -> HostResult<bool> {
		tokio::time::sleep(Duration::from_secs(3600)).await;
		Ok(true)
	}

	async fn request_grant(&self, _origin: &str) -> HostResult<bool> {
		Ok(true)
	}
}

/// Controller wired to fakes and a manual clock at [`T0`].
pub struct Fixture {
	pub host: Arc<FakeHost>,
	pub store: Arc<FakeStore>,
	pub clock: Arc<ManualClock>,
	pub controller: LifecycleController,
}

impl Fixture {
	pub fn new(config: HibernateConfig) -> Self {
		Self::with_grants(config, Arc::new(OriginGrants::allow_all()))
	}

	pub fn with_grants(config: HibernateConfig, grants: Arc<dyn GrantService>) -> Self {
		let host = FakeHost::new();
		let store = FakeStore::new();
		let clock = Arc::new(ManualClock::new(T0));
		let controller = LifecycleController::new(Host::new(host.clone(), store.clone(), grants), config, clock.clone());
		Self {
			host,
			store,
			clock,
			controller,
		}
	}

	/// A second controller over the same host, store and clock, as after a
	/// process restart.
	pub fn restart(&self, config: HibernateConfig) -> LifecycleController {
		let host = Host::new(self.host.clone(), self.store.clone(), Arc::new(OriginGrants::allow_all()));
		LifecycleController::new(host, config, self.clock.clone())
	}

	pub fn advance_mins(&self, mins: u64) {
		self.clock.advance(Duration::from_secs(mins * 60));
	}
}
