//! Hibernation decision rule.
//!
//! A resource is hibernated only when it is both heavy and idle. Memory
//! pressure alone, or idleness alone, never qualifies.

use std::time::Duration;

use tabflow_protocol::MemorySample;

/// Default memory threshold: 100 MiB.
pub const DEFAULT_THRESHOLD_BYTES: u64 = 100 * tabflow_protocol::MIB;

/// Default idle window: 30 minutes.
pub const DEFAULT_IDLE_THRESHOLD: Duration = Duration::from_secs(30 * 60);

/// State flags that veto hibernation regardless of usage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ResourceFlags {
	pub active: bool,
	pub pinned: bool,
	pub hibernated: bool,
}

/// Returns true iff the resource should be hibernated.
///
/// Both comparisons are strict: usage exactly at the threshold, or idle time
/// exactly at the idle window, keeps the resource alive. A resource without a
/// sample is never hibernated.
pub fn should_hibernate(
	resource: ResourceFlags,
	sample: Option<&MemorySample>,
	idle: Duration,
	threshold_bytes: u64,
	idle_threshold: Duration,
) -> bool {
	if resource.active || resource.pinned || resource.hibernated {
		return false;
	}
	let Some(sample) = sample else {
		return false;
	};
	sample.used_bytes > threshold_bytes && idle > idle_threshold
}

/// Returns the sample only if it is young enough to act on.
///
/// `max_age` of `None` accepts any sample; the sweep refreshes samples right
/// before evaluating them, so the age check only matters for samples that
/// could not be refreshed.
pub fn fresh_sample(sample: Option<&MemorySample>, now_ms: u64, max_age: Option<Duration>) -> Option<&MemorySample> {
	let sample = sample?;
	match max_age {
		Some(max_age) if sample.age_ms(now_ms) > max_age.as_millis() as u64 => None,
		_ => Some(sample),
	}
}
