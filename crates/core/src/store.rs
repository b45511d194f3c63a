//! Durable state: hibernation records, access times and the hibernated-set
//! snapshot.
//!
//! Records live under `hibernated_<id>` and access times under
//! `lastAccess_<id>`. The set of hibernated ids lives under `hibernatedTabs`
//! as a JSON array and is always written as a full replacement.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;
use tabflow_protocol::{AccessRecord, HibernationRecord, ResourceId};
use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::host::{HostError, HostResult, KeyValueStore, bounded};

/// Key holding the JSON array of hibernated ids.
pub const HIBERNATED_SET_KEY: &str = "hibernatedTabs";

const RECORD_KEY_PREFIX: &str = "hibernated_";

const ACCESS_KEY_PREFIX: &str = "lastAccess_";

pub fn record_key(id: &ResourceId) -> String {
	format!("{RECORD_KEY_PREFIX}{id}")
}

pub fn access_key(id: &ResourceId) -> String {
	format!("{ACCESS_KEY_PREFIX}{id}")
}

/// In-process store. Contents are lost when the process exits.
#[derive(Debug, Default)]
pub struct MemoryStore {
	entries: Mutex<HashMap<String, Value>>,
}

impl MemoryStore {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn contains(&self, key: &str) -> bool {
		self.entries.lock().contains_key(key)
	}

	pub fn keys(&self) -> Vec<String> {
		let mut keys: Vec<String> = self.entries.lock().keys().cloned().collect();
		keys.sort();
		keys
	}
}

#[async_trait]
impl KeyValueStore for MemoryStore {
	async fn get(&self, key: &str) -> HostResult<Option<Value>> {
		Ok(self.entries.lock().get(key).cloned())
	}

	async fn set(&self, key: &str, value: Value) -> HostResult<()> {
		self.entries.lock().insert(key.to_string(), value);
		Ok(())
	}

	async fn remove(&self, key: &str) -> HostResult<()> {
		self.entries.lock().remove(key);
		Ok(())
	}
}

/// Store backed by a single JSON object on disk.
///
/// Every mutation rewrites the whole file through a temporary sibling and a
/// rename, so a crash leaves either the old or the new contents.
#[derive(Debug)]
pub struct JsonFileStore {
	path: PathBuf,
	entries: tokio::sync::Mutex<BTreeMap<String, Value>>,
}

impl JsonFileStore {
	/// Opens the store, starting empty when the file does not exist yet.
	pub async fn open(path: impl Into<PathBuf>) -> Result<Self> {
		let path = path.into();
		let entries = match tokio::fs::read_to_string(&path).await {
			Ok(content) if content.trim().is_empty() => BTreeMap::new(),
			Ok(content) => serde_json::from_str(&content)?,
			Err(err) if err.kind() == std::io::ErrorKind::NotFound => BTreeMap::new(),
			Err(err) => return Err(Error::Io(err)),
		};
		debug!(target = "tabflow.store", path = %path.display(), keys = entries.len(), "opened store");
		Ok(Self {
			path,
			entries: tokio::sync::Mutex::new(entries),
		})
	}

	pub fn path(&self) -> &Path {
		&self.path
	}

	async fn flush(&self, entries: &BTreeMap<String, Value>) -> std::io::Result<()> {
		if let Some(parent) = self.path.parent() {
			tokio::fs::create_dir_all(parent).await?;
		}
		let content = serde_json::to_vec_pretty(entries)?;
		let tmp = self.path.with_extension("json.tmp");
		tokio::fs::write(&tmp, content).await?;
		tokio::fs::rename(&tmp, &self.path).await
	}
}

#[async_trait]
impl KeyValueStore for JsonFileStore {
	async fn get(&self, key: &str) -> HostResult<Option<Value>> {
		Ok(self.entries.lock().await.get(key).cloned())
	}

	async fn set(&self, key: &str, value: Value) -> HostResult<()> {
		let mut entries = self.entries.lock().await;
		let previous = entries.insert(key.to_string(), value);
		if let Err(err) = self.flush(&entries).await {
			match previous {
				Some(previous) => entries.insert(key.to_string(), previous),
				None => entries.remove(key),
			};
			return Err(HostError::failed(format!("writing {}: {err}", self.path.display())));
		}
		Ok(())
	}

	async fn remove(&self, key: &str) -> HostResult<()> {
		let mut entries = self.entries.lock().await;
		let Some(previous) = entries.remove(key) else {
			return Ok(());
		};
		if let Err(err) = self.flush(&entries).await {
			entries.insert(key.to_string(), previous);
			return Err(HostError::failed(format!("writing {}: {err}", self.path.display())));
		}
		Ok(())
	}
}

/// Typed access to records and the snapshot on top of a [`KeyValueStore`].
///
/// Every call is bounded by the configured timeout; failures come back as
/// [`Error::PersistenceFailure`].
#[derive(Clone)]
pub struct StateStore {
	store: Arc<dyn KeyValueStore>,
	timeout: Duration,
}

impl StateStore {
	pub fn new(store: Arc<dyn KeyValueStore>, timeout: Duration) -> Self {
		Self { store, timeout }
	}

	/// Reads the record for `id`. A malformed record is logged and treated as absent.
	pub async fn load_record(&self, id: &ResourceId) -> Result<Option<HibernationRecord>> {
		let key = record_key(id);
		let value = bounded(self.timeout, "store.get", self.store.get(&key))
			.await
			.map_err(|source| Error::PersistenceFailure { key: key.clone(), source })?;
		let Some(value) = value else {
			return Ok(None);
		};
		match serde_json::from_value(value) {
			Ok(record) => Ok(Some(record)),
			Err(err) => {
				warn!(target = "tabflow.store", %key, error = %err, "ignoring malformed record");
				Ok(None)
			}
		}
	}

	pub async fn save_record(&self, record: &HibernationRecord) -> Result<()> {
		let key = record_key(&record.resource_id);
		let value = serde_json::to_value(record)?;
		bounded(self.timeout, "store.set", self.store.set(&key, value))
			.await
			.map_err(|source| Error::PersistenceFailure { key, source })
	}

	pub async fn remove_record(&self, id: &ResourceId) -> Result<()> {
		let key = record_key(id);
		bounded(self.timeout, "store.remove", self.store.remove(&key))
			.await
			.map_err(|source| Error::PersistenceFailure { key, source })
	}

	/// Reads the persisted access time for `id`. Malformed values read as absent.
	pub async fn load_access(&self, id: &ResourceId) -> Result<Option<AccessRecord>> {
		let key = access_key(id);
		let value = bounded(self.timeout, "store.get", self.store.get(&key))
			.await
			.map_err(|source| Error::PersistenceFailure { key: key.clone(), source })?;
		let Some(value) = value else {
			return Ok(None);
		};
		match serde_json::from_value(value) {
			Ok(access) => Ok(Some(access)),
			Err(err) => {
				warn!(target = "tabflow.store", %key, error = %err, "ignoring malformed access record");
				Ok(None)
			}
		}
	}

	pub async fn save_access(&self, id: &ResourceId, access: AccessRecord) -> Result<()> {
		let key = access_key(id);
		let value = serde_json::to_value(access)?;
		bounded(self.timeout, "store.set", self.store.set(&key, value))
			.await
			.map_err(|source| Error::PersistenceFailure { key, source })
	}

	pub async fn remove_access(&self, id: &ResourceId) -> Result<()> {
		let key = access_key(id);
		bounded(self.timeout, "store.remove", self.store.remove(&key))
			.await
			.map_err(|source| Error::PersistenceFailure { key, source })
	}

	/// Reads the snapshot. Missing or malformed snapshots read as empty.
	pub async fn load_set(&self) -> Result<BTreeSet<ResourceId>> {
		let value = bounded(self.timeout, "store.get", self.store.get(HIBERNATED_SET_KEY))
			.await
			.map_err(|source| Error::PersistenceFailure {
				key: HIBERNATED_SET_KEY.into(),
				source,
			})?;
		let Some(value) = value else {
			return Ok(BTreeSet::new());
		};
		match serde_json::from_value::<Vec<ResourceId>>(value) {
			Ok(ids) => Ok(ids.into_iter().collect()),
			Err(err) => {
				warn!(target = "tabflow.store", error = %err, "ignoring malformed hibernated set");
				Ok(BTreeSet::new())
			}
		}
	}

	pub async fn save_set(&self, ids: &BTreeSet<ResourceId>) -> Result<()> {
		let value = serde_json::to_value(ids)?;
		bounded(self.timeout, "store.set", self.store.set(HIBERNATED_SET_KEY, value))
			.await
			.map_err(|source| Error::PersistenceFailure {
				key: HIBERNATED_SET_KEY.into(),
				source,
			})
	}
}

impl std::fmt::Debug for StateStore {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("StateStore").field("timeout", &self.timeout).finish_non_exhaustive()
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use serde_json::json;
	use tempfile::TempDir;

	fn record(id: &str) -> HibernationRecord {
		HibernationRecord {
			resource_id: ResourceId::new(id),
			original_url: format!("https://{id}.test/page"),
			title: format!("Page {id}"),
			hibernated_at: 7,
		}
	}

	#[test]
	fn record_keys_are_prefixed() {
		assert_eq!(record_key(&ResourceId::new("42")), "hibernated_42");
		assert_eq!(access_key(&ResourceId::new("42")), "lastAccess_42");
	}

	#[tokio::test]
	async fn state_store_keeps_access_times() {
		let backing = Arc::new(MemoryStore::new());
		let store = StateStore::new(backing.clone(), Duration::from_secs(1));
		let id = ResourceId::new("a");

		assert_eq!(store.load_access(&id).await.unwrap(), None);
		store.save_access(&id, AccessRecord::new(42)).await.unwrap();
		assert_eq!(backing.get("lastAccess_a").await.unwrap(), Some(json!({"lastAccessedAt": 42})));
		assert_eq!(store.load_access(&id).await.unwrap(), Some(AccessRecord::new(42)));

		backing.set("lastAccess_b", json!("yesterday")).await.unwrap();
		assert_eq!(store.load_access(&ResourceId::new("b")).await.unwrap(), None);

		store.remove_access(&id).await.unwrap();
		assert!(!backing.contains("lastAccess_a"));
	}

	#[tokio::test]
	async fn state_store_reads_back_records_and_set() {
		let backing = Arc::new(MemoryStore::new());
		let store = StateStore::new(backing.clone(), Duration::from_secs(1));

		store.save_record(&record("a")).await.unwrap();
		assert_eq!(store.load_record(&ResourceId::new("a")).await.unwrap(), Some(record("a")));
		assert_eq!(store.load_record(&ResourceId::new("b")).await.unwrap(), None);

		let ids: BTreeSet<ResourceId> = [ResourceId::new("b"), ResourceId::new("a")].into_iter().collect();
		store.save_set(&ids).await.unwrap();
		assert_eq!(backing.get(HIBERNATED_SET_KEY).await.unwrap(), Some(json!(["a", "b"])));
		assert_eq!(store.load_set().await.unwrap(), ids);

		store.remove_record(&ResourceId::new("a")).await.unwrap();
		assert!(!backing.contains("hibernated_a"));
	}

	#[tokio::test]
	async fn malformed_values_read_as_absent() {
		let backing = Arc::new(MemoryStore::new());
		backing.set("hibernated_x", json!({"bogus": true})).await.unwrap();
		backing.set(HIBERNATED_SET_KEY, json!("not an array")).await.unwrap();

		let store = StateStore::new(backing, Duration::from_secs(1));
		assert_eq!(store.load_record(&ResourceId::new("x")).await.unwrap(), None);
		assert!(store.load_set().await.unwrap().is_empty());
	}

	#[tokio::test]
	async fn json_file_store_persists_across_opens() {
		let tmp = TempDir::new().unwrap();
		let path = tmp.path().join("nested/store.json");

		let store = JsonFileStore::open(&path).await.unwrap();
		store.set("hibernated_a", json!({"k": 1})).await.unwrap();
		store.set(HIBERNATED_SET_KEY, json!(["a"])).await.unwrap();
		store.remove("missing").await.unwrap();
		drop(store);

		let reopened = JsonFileStore::open(&path).await.unwrap();
		assert_eq!(reopened.get(HIBERNATED_SET_KEY).await.unwrap(), Some(json!(["a"])));
		reopened.remove("hibernated_a").await.unwrap();
		assert_eq!(reopened.get("hibernated_a").await.unwrap(), None);
		assert!(!path.with_extension("json.tmp").exists());
	}

	#[tokio::test]
	async fn json_file_store_rejects_corrupt_file() {
		let tmp = TempDir::new().unwrap();
		let path = tmp.path().join("store.json");
		std::fs::write(&path, "{ not json").unwrap();
		assert!(matches!(JsonFileStore::open(&path).await, Err(Error::Json(_))));
	}
}
