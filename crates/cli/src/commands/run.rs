use std::path::PathBuf;

use anyhow::{Context, Result};
use tabflow::{HibernateConfig, spawn_sweeper};
use tracing::{info, warn};

use super::direct::open_controller;
use crate::cli::RunArgs;
use crate::daemon::Daemon;

/// Serves the controller until stopped, then detaches every channel.
pub(super) async fn execute(args: RunArgs, mut config: HibernateConfig, socket: PathBuf) -> Result<()> {
	args.policy.apply(&mut config);
	if let Some(interval) = args.interval {
		config.sweep_interval_secs = interval;
	}

	let controller = open_controller(&config, &args.browser).await?;
	if let Err(err) = controller.attach_all().await {
		warn!(target = "tabflow.daemon", error = %err, "initial attach failed, channels attach on first sweep");
	}

	let daemon = Daemon::bind(controller.clone(), socket).await?;
	let sweeper = spawn_sweeper(controller.clone(), config.sweep_interval(), daemon.subscribe());
	info!(
		target = "tabflow.daemon",
		interval_secs = config.sweep_interval_secs,
		threshold_bytes = config.memory_threshold_bytes,
		idle_secs = config.idle_threshold_secs,
		auto = config.auto_hibernate,
		"daemon started"
	);

	let served = daemon.run().await;
	sweeper.await.context("Sweeper task panicked")?;
	controller.shutdown().await;
	served
}
