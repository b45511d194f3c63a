//! Resolves the browser WebSocket endpoint.
//!
//! Accepts a `ws://`/`wss://` URL as-is, or an HTTP debugging endpoint
//! (`http://127.0.0.1:9222`, `127.0.0.1:9222`, or a bare port) whose
//! `/json/version` document names the WebSocket URL.

use std::time::Duration;

use serde::Deserialize;
use tracing::debug;

use crate::error::{Error, Result};

/// `/json/version` response subset.
#[derive(Debug, Deserialize)]
pub struct VersionInfo {
	#[serde(rename = "webSocketDebuggerUrl")]
	pub web_socket_debugger_url: String,
	#[serde(rename = "Browser", default)]
	pub browser: Option<String>,
}

/// Where to look for the WebSocket URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Endpoint {
	WebSocket(String),
	/// URL of the `/json/version` document.
	Version(String),
}

pub fn classify(endpoint: &str) -> Endpoint {
	let endpoint = endpoint.trim();
	if endpoint.starts_with("ws://") || endpoint.starts_with("wss://") {
		return Endpoint::WebSocket(endpoint.to_string());
	}
	let base = if let Ok(port) = endpoint.parse::<u16>() {
		format!("http://127.0.0.1:{port}")
	} else if endpoint.contains("://") {
		endpoint.trim_end_matches('/').to_string()
	} else {
		format!("http://{}", endpoint.trim_end_matches('/'))
	};
	let base = base.strip_suffix("/json/version").unwrap_or(&base);
	Endpoint::Version(format!("{base}/json/version"))
}

/// Returns the WebSocket debugger URL for `endpoint`.
pub async fn resolve_ws_url(endpoint: &str, timeout: Duration) -> Result<String> {
	let url = match classify(endpoint) {
		Endpoint::WebSocket(url) => return Ok(url),
		Endpoint::Version(url) => url,
	};

	let client = reqwest::Client::builder()
		.timeout(timeout)
		.build()
		.map_err(|e| Error::ConnectionFailed(format!("Failed to create HTTP client: {e}")))?;
	let response = client
		.get(&url)
		.send()
		.await
		.map_err(|e| Error::ConnectionFailed(format!("{url}: {e}")))?;
	if !response.status().is_success() {
		return Err(Error::ConnectionFailed(format!("{url}: unexpected status {}", response.status())));
	}

	let info: VersionInfo = response.json().await?;
	debug!(target = "tabflow.cdp", browser = info.browser.as_deref().unwrap_or("unknown"), "discovered endpoint");
	Ok(info.web_socket_debugger_url)
}
