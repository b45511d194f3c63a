//! Wall-clock source, injectable so idle windows can be simulated.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Millisecond wall clock.
pub trait Clock: Send + Sync {
	/// Unix epoch milliseconds.
	fn now_ms(&self) -> u64;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
	fn now_ms(&self) -> u64 {
		SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_millis() as u64
	}
}

/// Manually advanced clock for tests and simulations.
#[derive(Debug, Default)]
pub struct ManualClock {
	now: AtomicU64,
}

impl ManualClock {
	pub fn new(start_ms: u64) -> Self {
		Self {
			now: AtomicU64::new(start_ms),
		}
	}

	pub fn advance(&self, by: Duration) {
		self.now.fetch_add(by.as_millis() as u64, Ordering::SeqCst);
	}

	pub fn set(&self, ms: u64) {
		self.now.store(ms, Ordering::SeqCst);
	}
}

impl Clock for ManualClock {
	fn now_ms(&self) -> u64 {
		self.now.load(Ordering::SeqCst)
	}
}
