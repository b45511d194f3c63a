//! [`CdpHost`]: inventory, navigation and memory inspection over DevTools.
//!
//! Resources are page targets. Inspection channels are flattened target
//! sessions with the `Performance` domain enabled; heap figures come from
//! `Performance.getMetrics`.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use serde::Deserialize;
use serde_json::json;
use tabflow::host::{HostError, HostResult, InspectionChannel, Navigator, ResourceInventory};
use tabflow_protocol::{Metric, ResourceDetails, ResourceId};
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::connection::CdpConnection;
use crate::discovery::resolve_ws_url;
use crate::error::{Error, Result};

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TargetInfo {
	target_id: String,
	#[serde(rename = "type")]
	kind: String,
	#[serde(default)]
	title: String,
	#[serde(default)]
	url: String,
}

impl TargetInfo {
	fn is_page(&self) -> bool {
		self.kind == "page"
	}
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TargetInfos {
	target_infos: Vec<TargetInfo>,
}

#[derive(Debug, Deserialize)]
struct MetricValue {
	name: String,
	value: f64,
}

pub struct CdpHost {
	connection: Arc<CdpConnection>,
	/// Target id to flattened session id.
	sessions: Arc<DashMap<ResourceId, String>>,
	watcher: JoinHandle<()>,
}

impl CdpHost {
	/// Discovers the browser endpoint and connects.
	pub async fn connect(endpoint: &str, timeout: Duration) -> Result<Self> {
		let ws_url = resolve_ws_url(endpoint, timeout).await?;
		let connection = CdpConnection::connect(&ws_url, timeout).await?;
		Ok(Self::new(connection))
	}

	pub fn new(connection: Arc<CdpConnection>) -> Self {
		let sessions: Arc<DashMap<ResourceId, String>> = Arc::new(DashMap::new());
		let watcher = spawn_session_watcher(&connection, sessions.clone());
		Self {
			connection,
			sessions,
			watcher,
		}
	}

	pub fn connection(&self) -> &Arc<CdpConnection> {
		&self.connection
	}

	fn session(&self, id: &ResourceId) -> Option<String> {
		self.sessions.get(id).map(|s| s.value().clone())
	}

	async fn target_info(&self, id: &ResourceId) -> Result<Option<TargetInfo>> {
		match self
			.connection
			.send("Target.getTargetInfo", json!({ "targetId": id.as_str() }), None)
			.await
		{
			Ok(value) => {
				let info: TargetInfo = serde_json::from_value(value["targetInfo"].clone())?;
				Ok(info.is_page().then_some(info))
			}
			Err(err) if err.is_target_missing() => Ok(None),
			Err(err) => Err(err),
		}
	}

	async fn open_session(&self, id: &ResourceId) -> Result<String> {
		let value = self
			.connection
			.send("Target.attachToTarget", json!({ "targetId": id.as_str(), "flatten": true }), None)
			.await?;
		value["sessionId"]
			.as_str()
			.map(str::to_string)
			.ok_or_else(|| Error::UnexpectedResponse {
				method: "Target.attachToTarget".into(),
				detail: "missing sessionId".into(),
			})
	}

	async fn close_session(&self, session_id: &str) -> Result<()> {
		match self
			.connection
			.send("Target.detachFromTarget", json!({ "sessionId": session_id }), None)
			.await
		{
			Ok(_) => Ok(()),
			Err(err) if err.is_target_missing() => Ok(()),
			Err(err) => Err(err),
		}
	}

	/// Foreground state from the page itself; `false` when it cannot be read.
	async fn is_visible(&self, session_id: &str) -> bool {
		let params = json!({ "expression": "document.visibilityState", "returnByValue": true });
		match self.connection.send("Runtime.evaluate", params, Some(session_id)).await {
			Ok(value) => value["result"]["value"].as_str() == Some("visible"),
			Err(err) => {
				debug!(target = "tabflow.cdp", error = %err, "visibility check failed");
				false
			}
		}
	}

	/// Reads visibility through a transient session, leaving no channel behind.
	async fn is_visible_unattached(&self, id: &ResourceId) -> bool {
		let session_id = match self.open_session(id).await {
			Ok(session_id) => session_id,
			Err(err) => {
				debug!(target = "tabflow.cdp", %id, error = %err, "visibility session failed");
				return false;
			}
		};
		let visible = self.is_visible(&session_id).await;
		if let Err(err) = self.close_session(&session_id).await {
			debug!(target = "tabflow.cdp", %id, error = %err, "transient session close failed");
		}
		visible
	}
}

impl Drop for CdpHost {
	fn drop(&mut self) {
		self.watcher.abort();
	}
}

impl std::fmt::Debug for CdpHost {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("CdpHost")
			.field("connection", &self.connection)
			.field("sessions", &self.sessions.len())
			.finish()
	}
}

/// Forgets sessions the browser tears down on its own (tab closed, crash,
/// another client detaching us).
fn spawn_session_watcher(connection: &CdpConnection, sessions: Arc<DashMap<ResourceId, String>>) -> JoinHandle<()> {
	let mut events = connection.subscribe();
	tokio::spawn(async move {
		loop {
			let event = match events.recv().await {
				Ok(event) => event,
				Err(RecvError::Lagged(skipped)) => {
					warn!(target = "tabflow.cdp", skipped, "session watcher lagged");
					continue;
				}
				Err(RecvError::Closed) => break,
			};
			match event.method.as_str() {
				"Target.detachedFromTarget" => {
					if let Some(session_id) = event.params["sessionId"].as_str() {
						sessions.retain(|_, s| s.as_str() != session_id);
					}
				}
				"Target.targetDestroyed" => {
					if let Some(target_id) = event.params["targetId"].as_str() {
						sessions.remove(&ResourceId::new(target_id));
					}
				}
				_ => {}
			}
		}
	})
}

#[async_trait]
impl ResourceInventory for CdpHost {
	async fn list_resources(&self) -> HostResult<Vec<ResourceId>> {
		let value = self.connection.send("Target.getTargets", json!({}), None).await?;
		let infos: TargetInfos = serde_json::from_value(value).map_err(|e| HostError::failed(e.to_string()))?;
		Ok(infos
			.target_infos
			.into_iter()
			.filter(TargetInfo::is_page)
			.map(|info| ResourceId::new(info.target_id))
			.collect())
	}

	async fn get_resource(&self, id: &ResourceId) -> HostResult<Option<ResourceDetails>> {
		let Some(info) = self.target_info(id).await.map_err(|e| e.into_host(id))? else {
			return Ok(None);
		};
		let active = match self.session(id) {
			Some(session_id) => self.is_visible(&session_id).await,
			None => self.is_visible_unattached(id).await,
		};
		Ok(Some(ResourceDetails {
			id: id.clone(),
			url: info.url,
			title: info.title,
			active,
			pinned: false,
		}))
	}
}

#[async_trait]
impl Navigator for CdpHost {
	async fn redirect(&self, id: &ResourceId, url: &str) -> HostResult<()> {
		let (session_id, transient) = match self.session(id) {
			Some(session_id) => (session_id, false),
			None => (self.open_session(id).await.map_err(|e| e.into_host(id))?, true),
		};

		let result = self
			.connection
			.send("Page.navigate", json!({ "url": url }), Some(&session_id))
			.await
			.map_err(|e| e.into_host(id))
			.and_then(|value| match value["errorText"].as_str() {
				Some(error_text) if !error_text.is_empty() => Err(HostError::failed(format!("navigation failed: {error_text}"))),
				_ => Ok(()),
			});

		if transient {
			if let Err(err) = self.close_session(&session_id).await {
				debug!(target = "tabflow.cdp", %id, error = %err, "transient session close failed");
			}
		}
		result
	}
}

#[async_trait]
impl InspectionChannel for CdpHost {
	async fn attach(&self, id: &ResourceId) -> HostResult<()> {
		if self.sessions.contains_key(id) {
			return Ok(());
		}
		let session_id = self.open_session(id).await.map_err(|e| e.into_host(id))?;
		if let Err(err) = self.connection.send("Performance.enable", json!({}), Some(&session_id)).await {
			let _ = self.close_session(&session_id).await;
			return Err(err.into_host(id));
		}
		debug!(target = "tabflow.cdp", %id, session = %session_id, "attached");
		self.sessions.insert(id.clone(), session_id);
		Ok(())
	}

	async fn detach(&self, id: &ResourceId) -> HostResult<()> {
		let Some((_, session_id)) = self.sessions.remove(id) else {
			return Ok(());
		};
		self.close_session(&session_id).await.map_err(|e| e.into_host(id))
	}

	/// Sessions held by this connection. Sessions from earlier connections do
	/// not survive a reconnect, so nothing else can be adopted.
	async fn list_attachments(&self) -> HostResult<Vec<ResourceId>> {
		Ok(self.sessions.iter().map(|entry| entry.key().clone()).collect())
	}

	async fn query(&self, id: &ResourceId, metric: Metric) -> HostResult<u64> {
		let session_id = self.session(id).ok_or_else(|| HostError::failed(format!("{id} is not attached")))?;
		let value = self
			.connection
			.send("Performance.getMetrics", json!({}), Some(&session_id))
			.await
			.map_err(|e| e.into_host(id))?;
		let metrics: Vec<MetricValue> =
			serde_json::from_value(value["metrics"].clone()).map_err(|e| HostError::failed(e.to_string()))?;

		let name = metric_name(metric);
		metrics
			.iter()
			.find(|m| m.name == name)
			.map(|m| m.value.max(0.0) as u64)
			.ok_or_else(|| HostError::failed(format!("metric {name} not reported")))
	}
}

fn metric_name(metric: Metric) -> &'static str {
	match metric {
		Metric::UsedHeapBytes => "JSHeapUsedSize",
		Metric::TotalHeapBytes => "JSHeapTotalSize",
	}
}
