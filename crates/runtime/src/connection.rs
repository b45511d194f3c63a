//! Browser-level DevTools connection.
//!
//! One WebSocket carries every command. Requests get sequential ids and are
//! correlated with responses through oneshot channels; messages without an id
//! are events and are broadcast to subscribers. Session-scoped commands
//! (flattened target sessions) carry a `sessionId` on the same socket.
//!
//! # Message Flow
//!
//! 1. [`CdpConnection::send`] assigns an id and parks a oneshot sender
//! 2. The request is queued for the writer task
//! 3. The reader task parses each frame and either completes the pending
//!    sender or broadcasts the event
//! 4. The caller wakes with the result, or a timeout

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, trace, warn};

use crate::error::{Error, Result};

/// Pending request callbacks keyed by request id.
type PendingMap = Mutex<HashMap<u64, oneshot::Sender<Result<Value>>>>;

#[derive(Debug, Serialize)]
struct Request<'a> {
	id: u64,
	method: &'a str,
	params: Value,
	#[serde(rename = "sessionId", skip_serializing_if = "Option::is_none")]
	session_id: Option<&'a str>,
}

#[derive(Debug, Deserialize)]
struct Response {
	id: u64,
	#[serde(default)]
	result: Option<Value>,
	#[serde(default)]
	error: Option<ErrorPayload>,
}

#[derive(Debug, Deserialize)]
struct ErrorPayload {
	code: i64,
	message: String,
}

/// Event pushed by the browser.
#[derive(Debug, Clone, Deserialize)]
pub struct CdpEvent {
	pub method: String,
	#[serde(default)]
	pub params: Value,
	#[serde(rename = "sessionId", default)]
	pub session_id: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Incoming {
	/// Has an `id` field.
	Response(Response),
	Event(CdpEvent),
}

/// Removes the pending entry when the request future is dropped or times out.
struct PendingGuard<'a> {
	id: u64,
	pending: &'a PendingMap,
}

impl Drop for PendingGuard<'_> {
	fn drop(&mut self) {
		self.pending.lock().remove(&self.id);
	}
}

pub struct CdpConnection {
	next_id: AtomicU64,
	pending: PendingMap,
	outbound: mpsc::UnboundedSender<String>,
	events: broadcast::Sender<CdpEvent>,
	timeout: Duration,
}

impl CdpConnection {
	/// Opens the WebSocket and starts the reader and writer tasks.
	pub async fn connect(ws_url: &str, timeout: Duration) -> Result<Arc<Self>> {
		let (stream, _) = tokio::time::timeout(timeout, tokio_tungstenite::connect_async(ws_url))
			.await
			.map_err(|_| Error::ConnectionFailed(format!("handshake with {ws_url} timed out")))?
			.map_err(|e| Error::ConnectionFailed(e.to_string()))?;
		debug!(target = "tabflow.cdp", url = %ws_url, "connected");

		let (mut sink, mut source) = stream.split();
		let (connection, mut outbound_rx) = Self::unconnected(timeout);

		tokio::spawn(async move {
			while let Some(text) = outbound_rx.recv().await {
				if let Err(err) = sink.send(Message::Text(text)).await {
					warn!(target = "tabflow.cdp", error = %err, "write failed");
					break;
				}
			}
			let _ = sink.close().await;
		});

		let weak: Weak<Self> = Arc::downgrade(&connection);
		tokio::spawn(async move {
			while let Some(frame) = source.next().await {
				let Some(connection) = weak.upgrade() else {
					break;
				};
				match frame {
					Ok(Message::Text(text)) => connection.handle_text(&text),
					Ok(Message::Close(_)) => break,
					Ok(_) => {}
					Err(err) => {
						warn!(target = "tabflow.cdp", error = %err, "read failed");
						break;
					}
				}
			}
			if let Some(connection) = weak.upgrade() {
				connection.fail_pending();
			}
			debug!(target = "tabflow.cdp", "reader stopped");
		});

		Ok(connection)
	}

	/// Connection whose outbound messages go to the returned receiver instead
	/// of a socket.
	pub(crate) fn unconnected(timeout: Duration) -> (Arc<Self>, mpsc::UnboundedReceiver<String>) {
		let (outbound, outbound_rx) = mpsc::unbounded_channel();
		let (events, _) = broadcast::channel(256);
		let connection = Arc::new(Self {
			next_id: AtomicU64::new(1),
			pending: Mutex::new(HashMap::new()),
			outbound,
			events,
			timeout,
		});
		(connection, outbound_rx)
	}

	/// Sends a command and waits for its result.
	pub async fn send(&self, method: &str, params: Value, session_id: Option<&str>) -> Result<Value> {
		let id = self.next_id.fetch_add(1, Ordering::SeqCst);
		let (tx, rx) = oneshot::channel();
		self.pending.lock().insert(id, tx);
		let _guard = PendingGuard {
			id,
			pending: &self.pending,
		};

		let text = serde_json::to_string(&Request {
			id,
			method,
			params,
			session_id,
		})?;
		trace!(target = "tabflow.cdp", id, method, "send");
		self.outbound.send(text).map_err(|_| Error::ChannelClosed)?;

		match tokio::time::timeout(self.timeout, rx).await {
			Ok(Ok(result)) => result,
			Ok(Err(_)) => Err(Error::ChannelClosed),
			Err(_) => Err(Error::Timeout {
				method: method.to_string(),
				after_ms: self.timeout.as_millis() as u64,
			}),
		}
	}

	pub fn subscribe(&self) -> broadcast::Receiver<CdpEvent> {
		self.events.subscribe()
	}

	pub fn is_closed(&self) -> bool {
		self.outbound.is_closed()
	}

	/// Routes one inbound frame.
	pub(crate) fn handle_text(&self, text: &str) {
		let incoming = match serde_json::from_str::<Incoming>(text) {
			Ok(incoming) => incoming,
			Err(err) => {
				warn!(target = "tabflow.cdp", error = %err, "unparseable frame");
				return;
			}
		};

		match incoming {
			Incoming::Response(response) => {
				let Some(callback) = self.pending.lock().remove(&response.id) else {
					debug!(target = "tabflow.cdp", id = response.id, "response for unknown request");
					return;
				};
				let result = match response.error {
					Some(err) => Err(Error::Protocol {
						code: err.code,
						message: err.message,
					}),
					None => Ok(response.result.unwrap_or(Value::Null)),
				};
				let _ = callback.send(result);
			}
			Incoming::Event(event) => {
				trace!(target = "tabflow.cdp", method = %event.method, "event");
				// No subscribers is fine.
				let _ = self.events.send(event);
			}
		}
	}

	/// Wakes every waiting request with `ChannelClosed`.
	fn fail_pending(&self) {
		let drained: Vec<_> = self.pending.lock().drain().collect();
		for (_, callback) in drained {
			let _ = callback.send(Err(Error::ChannelClosed));
		}
	}
}

impl std::fmt::Debug for CdpConnection {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("CdpConnection")
			.field("pending", &self.pending.lock().len())
			.field("timeout", &self.timeout)
			.finish_non_exhaustive()
	}
}

#[cfg(test)]
mod tests;
