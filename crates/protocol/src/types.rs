//! Core data types shared across crates.
//!
//! Timestamps are Unix epoch milliseconds throughout.

use std::fmt;

use serde::{Deserialize, Serialize};

/// One mebibyte, the unit memory thresholds are usually expressed in.
pub const MIB: u64 = 1024 * 1024;

/// Opaque identifier for a live resource (an open tab or page target).
///
/// Stable while the resource exists. Hosts may hand the same value out again
/// after the resource is destroyed, so an id alone never proves identity across
/// sweeps.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResourceId(String);

impl ResourceId {
	pub fn new(id: impl Into<String>) -> Self {
		Self(id.into())
	}

	pub fn as_str(&self) -> &str {
		&self.0
	}
}

impl fmt::Display for ResourceId {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(&self.0)
	}
}

impl From<&str> for ResourceId {
	fn from(id: &str) -> Self {
		Self(id.to_string())
	}
}

impl From<String> for ResourceId {
	fn from(id: String) -> Self {
		Self(id)
	}
}

/// Latest memory measurement for a resource.
///
/// Replaced wholesale on every refresh; samples are never merged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MemorySample {
	pub used_bytes: u64,
	pub total_bytes: u64,
	pub captured_at: u64,
}

impl MemorySample {
	/// Sample recorded for resources that exist but cannot be measured.
	pub fn zero(captured_at: u64) -> Self {
		Self {
			used_bytes: 0,
			total_bytes: 0,
			captured_at,
		}
	}

	pub fn is_zero(&self) -> bool {
		self.used_bytes == 0 && self.total_bytes == 0
	}

	/// Milliseconds elapsed since capture, saturating at zero for clock skew.
	pub fn age_ms(&self, now: u64) -> u64 {
		now.saturating_sub(self.captured_at)
	}
}

/// Last time a resource was activated or finished loading.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccessRecord {
	pub last_accessed_at: u64,
}

impl AccessRecord {
	pub fn new(at: u64) -> Self {
		Self { last_accessed_at: at }
	}

	/// Advances the access time. Older timestamps are ignored.
	pub fn touch(&mut self, at: u64) {
		self.last_accessed_at = self.last_accessed_at.max(at);
	}

	pub fn idle_ms(&self, now: u64) -> u64 {
		now.saturating_sub(self.last_accessed_at)
	}
}

/// Everything needed to bring a hibernated resource back.
///
/// Stored in the key-value store under `hibernated_<id>`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HibernationRecord {
	pub resource_id: ResourceId,
	pub original_url: String,
	#[serde(default)]
	pub title: String,
	pub hibernated_at: u64,
}

/// Host-reported view of a live resource.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceDetails {
	pub id: ResourceId,
	pub url: String,
	#[serde(default)]
	pub title: String,
	#[serde(default)]
	pub active: bool,
	#[serde(default)]
	pub pinned: bool,
}

/// Memory metric readable through an inspection channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Metric {
	/// Bytes of JS heap currently in use.
	UsedHeapBytes,
	/// Bytes of JS heap currently reserved.
	TotalHeapBytes,
}

impl fmt::Display for Metric {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			Metric::UsedHeapBytes => f.write_str("used_heap_bytes"),
			Metric::TotalHeapBytes => f.write_str("total_heap_bytes"),
		}
	}
}

/// Lifecycle state of a resource as seen by the manager.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceState {
	/// Currently in the foreground.
	Active,
	/// Observed and measured, eligible for hibernation.
	Tracked,
	/// Replaced by the placeholder; a hibernation record exists.
	Hibernated,
}

impl fmt::Display for ResourceState {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			ResourceState::Active => f.write_str("active"),
			ResourceState::Tracked => f.write_str("tracked"),
			ResourceState::Hibernated => f.write_str("hibernated"),
		}
	}
}

/// Read-only usage figures for a single resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceStats {
	pub used_bytes: u64,
	/// `None` when the resource has never been measured.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub captured_at: Option<u64>,
}

/// Registry snapshot row for one resource.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceStatus {
	pub id: ResourceId,
	pub state: ResourceState,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub url: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub sample: Option<MemorySample>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub last_accessed_at: Option<u64>,
}

/// Result of a restore request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum RestoreOutcome {
	/// Resource was redirected back to its original URL.
	Restored { url: String, title: String },
	/// No hibernation record exists; treated as already restored.
	NotHibernated,
	/// Another transition for the same resource is in flight.
	InFlight,
}

/// Summary of one sweep pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SweepReport {
	/// Live resources examined.
	pub examined: usize,
	/// Resources hibernated during this sweep.
	pub hibernated: Vec<ResourceId>,
	/// Stale ids removed by reconciliation.
	pub purged: Vec<ResourceId>,
	/// Resources recorded at zero usage because they could not be measured.
	pub unmeasurable: usize,
	/// Resources whose hibernation was abandoned because a step failed.
	pub failures: usize,
	/// True when auto-hibernate was off and only bookkeeping ran.
	pub bookkeeping_only: bool,
}
