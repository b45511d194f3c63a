//! In-memory bookkeeping: last-known metadata and access times per resource.
//!
//! Both maps are owned by the controller and mutated only through its
//! methods. Entries for ids that left the host are removed by
//! [`Registry::retain_live`] / [`AccessLog::retain_live`] during
//! reconciliation.

use std::collections::{HashMap, HashSet};
use std::time::Duration;

use tabflow_protocol::{AccessRecord, MemorySample, ResourceDetails, ResourceId};

/// Last-known metadata for one resource.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistryEntry {
	pub url: String,
	pub title: String,
	/// Whether the host reported the resource in the foreground at the last observation.
	pub active: bool,
	/// When the resource was first observed, epoch ms.
	pub first_seen: u64,
	/// Latest memory sample; replaced on every refresh.
	pub sample: Option<MemorySample>,
}

/// What changed when a resource was observed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Observation {
	/// First time this id was seen.
	New,
	/// Same URL as the previous observation.
	Unchanged,
	/// URL changed since the previous observation (a load happened).
	Navigated,
}

#[derive(Debug, Default)]
pub struct Registry {
	entries: HashMap<ResourceId, RegistryEntry>,
}

impl Registry {
	pub fn new() -> Self {
		Self::default()
	}

	/// Creates or refreshes the entry for a resource.
	pub fn observe(&mut self, details: &ResourceDetails, now: u64) -> Observation {
		match self.entries.get_mut(&details.id) {
			Some(entry) => {
				entry.title.clone_from(&details.title);
				entry.active = details.active;
				if entry.url == details.url {
					Observation::Unchanged
				} else {
					entry.url.clone_from(&details.url);
					Observation::Navigated
				}
			}
			None => {
				self.entries.insert(
					details.id.clone(),
					RegistryEntry {
						url: details.url.clone(),
						title: details.title.clone(),
						active: details.active,
						first_seen: now,
						sample: None,
					},
				);
				Observation::New
			}
		}
	}

	/// Replaces the sample for a known resource. Returns false for unknown ids.
	pub fn record_sample(&mut self, id: &ResourceId, sample: MemorySample) -> bool {
		match self.entries.get_mut(id) {
			Some(entry) => {
				entry.sample = Some(sample);
				true
			}
			None => false,
		}
	}

	pub fn sample(&self, id: &ResourceId) -> Option<&MemorySample> {
		self.entries.get(id).and_then(|e| e.sample.as_ref())
	}

	pub fn drop_sample(&mut self, id: &ResourceId) -> Option<MemorySample> {
		self.entries.get_mut(id).and_then(|e| e.sample.take())
	}

	pub fn get(&self, id: &ResourceId) -> Option<&RegistryEntry> {
		self.entries.get(id)
	}

	pub fn contains(&self, id: &ResourceId) -> bool {
		self.entries.contains_key(id)
	}

	pub fn remove(&mut self, id: &ResourceId) -> Option<RegistryEntry> {
		self.entries.remove(id)
	}

	/// Drops every entry whose id is not live. Returns the removed ids.
	pub fn retain_live(&mut self, live: &HashSet<ResourceId>) -> Vec<ResourceId> {
		let stale: Vec<ResourceId> = self.entries.keys().filter(|id| !live.contains(*id)).cloned().collect();
		for id in &stale {
			self.entries.remove(id);
		}
		stale
	}

	pub fn iter(&self) -> impl Iterator<Item = (&ResourceId, &RegistryEntry)> {
		self.entries.iter()
	}

	pub fn len(&self) -> usize {
		self.entries.len()
	}

	pub fn is_empty(&self) -> bool {
		self.entries.is_empty()
	}

	/// Sum of reserved heap across all measured resources.
	pub fn system_usage(&self) -> u64 {
		self.entries.values().filter_map(|e| e.sample.as_ref()).map(|s| s.total_bytes).sum()
	}
}

/// Access times per resource. Timestamps only move forward.
#[derive(Debug, Default)]
pub struct AccessLog {
	records: HashMap<ResourceId, AccessRecord>,
}

impl AccessLog {
	pub fn new() -> Self {
		Self::default()
	}

	/// Starts the idle clock at `at` if the resource has no record yet.
	pub fn seed(&mut self, id: &ResourceId, at: u64) {
		self.records.entry(id.clone()).or_insert_with(|| AccessRecord::new(at));
	}

	/// Takes over a persisted record, keeping whichever access is newer.
	pub fn remember(&mut self, id: &ResourceId, record: AccessRecord) {
		self.records
			.entry(id.clone())
			.and_modify(|r| r.touch(record.last_accessed_at))
			.or_insert(record);
	}

	/// Records an access (activation or load).
	pub fn touch(&mut self, id: &ResourceId, at: u64) {
		self.records
			.entry(id.clone())
			.and_modify(|r| r.touch(at))
			.or_insert_with(|| AccessRecord::new(at));
	}

	pub fn get(&self, id: &ResourceId) -> Option<AccessRecord> {
		self.records.get(id).copied()
	}

	/// Time since the last access; zero for resources never seen.
	pub fn idle(&self, id: &ResourceId, now: u64) -> Duration {
		self.records
			.get(id)
			.map(|r| Duration::from_millis(r.idle_ms(now)))
			.unwrap_or_default()
	}

	pub fn remove(&mut self, id: &ResourceId) -> Option<AccessRecord> {
		self.records.remove(id)
	}

	pub fn retain_live(&mut self, live: &HashSet<ResourceId>) -> Vec<ResourceId> {
		let stale: Vec<ResourceId> = self.records.keys().filter(|id| !live.contains(*id)).cloned().collect();
		for id in &stale {
			self.records.remove(id);
		}
		stale
	}

	pub fn len(&self) -> usize {
		self.records.len()
	}

	pub fn is_empty(&self) -> bool {
		self.records.is_empty()
	}
}
