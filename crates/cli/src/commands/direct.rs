use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use tabflow::{HibernateConfig, Host, JsonFileStore, LifecycleController, OriginGrants, ResourceId, SystemClock};
use tabflow_protocol::{ControlRequest, ControlResponse};
use tabflow_runtime::CdpHost;
use tracing::info;

use super::store_path;
use crate::cli::BrowserArgs;
use crate::daemon;

/// Connects to the browser, opens the store and loads the snapshot.
pub(super) async fn open_controller(config: &HibernateConfig, browser: &BrowserArgs) -> Result<Arc<LifecycleController>> {
	config.validate().context("Invalid configuration")?;

	let cdp = CdpHost::connect(&browser.endpoint, config.call_timeout())
		.await
		.with_context(|| format!("Failed to connect to browser at {}", browser.endpoint))?;
	let path = store_path(browser.store.as_ref());
	let store = JsonFileStore::open(&path)
		.await
		.with_context(|| format!("Failed to open store {}", path.display()))?;
	let grants = OriginGrants::new(&config.grants);

	let host = Host::new(Arc::new(cdp), Arc::new(store), Arc::new(grants));
	let controller = Arc::new(LifecycleController::new(host, config.clone(), Arc::new(SystemClock)));
	let hibernated = controller.load().await.context("Failed to load hibernation snapshot")?;
	info!(target = "tabflow.daemon", hibernated, store = %path.display(), "controller ready");
	Ok(controller)
}

/// Two controllers must never share one store file.
async fn ensure_no_daemon(socket: &Path) -> Result<()> {
	if daemon::try_request(socket, &ControlRequest::Ping).await?.is_some() {
		bail!(
			"a tabflow daemon is running at {}; send the command to it instead of working directly",
			socket.display()
		);
	}
	Ok(())
}

pub(super) async fn sweep_once(config: &HibernateConfig, browser: &BrowserArgs, socket: &Path) -> Result<ControlResponse> {
	ensure_no_daemon(socket).await?;
	let controller = open_controller(config, browser).await?;
	let response = daemon::handle_request(&controller, ControlRequest::Sweep).await;
	controller.shutdown().await;
	Ok(response)
}

pub(super) async fn restore(config: &HibernateConfig, browser: &BrowserArgs, socket: &Path, id: ResourceId) -> Result<ControlResponse> {
	ensure_no_daemon(socket).await?;
	let controller = open_controller(config, browser).await?;
	let response = daemon::handle_request(&controller, ControlRequest::Restore { id }).await;
	controller.shutdown().await;
	Ok(response)
}
