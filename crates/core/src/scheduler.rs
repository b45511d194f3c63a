//! Periodic sweep task.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info};

use crate::controller::LifecycleController;

/// Spawns the sweep loop. It stops when `shutdown` flips to `true` or its
/// sender is dropped; a sweep in progress runs to completion first.
///
/// Ticks that find a sweep still running are skipped, never queued.
pub fn spawn_sweeper(
	controller: Arc<LifecycleController>,
	period: Duration,
	mut shutdown: watch::Receiver<bool>,
) -> JoinHandle<()> {
	tokio::spawn(async move {
		let mut ticker = tokio::time::interval(period);
		ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
		info!(target = "tabflow.sweep", period_secs = period.as_secs(), "sweeper started");

		loop {
			tokio::select! {
				changed = shutdown.changed() => {
					if changed.is_err() || *shutdown.borrow() {
						break;
					}
				}
				_ = ticker.tick() => {
					if controller.sweep().await.is_none() {
						debug!(target = "tabflow.sweep", "previous sweep still running, tick skipped");
					}
				}
			}
		}

		info!(target = "tabflow.sweep", "sweeper stopped");
	})
}
