//! Error types for the DevTools adapter.

use tabflow::HostError;
use tabflow_protocol::ResourceId;
use thiserror::Error;

/// Result type alias for adapter operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while talking to the browser.
#[derive(Debug, Error)]
pub enum Error {
	/// WebSocket handshake or endpoint discovery failed.
	#[error("Failed to connect to browser: {0}")]
	ConnectionFailed(String),

	/// The browser answered a command with an error.
	#[error("Protocol error {code}: {message}")]
	Protocol { code: i64, message: String },

	/// A response did not have the expected shape.
	#[error("Unexpected response to {method}: {detail}")]
	UnexpectedResponse { method: String, detail: String },

	/// The connection closed before a response arrived.
	#[error("Connection closed")]
	ChannelClosed,

	#[error("{method} timed out after {after_ms}ms")]
	Timeout { method: String, after_ms: u64 },

	#[error("JSON error: {0}")]
	Json(#[from] serde_json::Error),

	#[error("HTTP error: {0}")]
	Http(#[from] reqwest::Error),
}

impl Error {
	/// True when the browser reports that the target or session is gone.
	pub fn is_target_missing(&self) -> bool {
		match self {
			Error::Protocol { message, .. } => {
				message.contains("No target with given id")
					|| message.contains("No session with given id")
					|| message.contains("Target closed")
			}
			_ => false,
		}
	}

	/// Maps to a host error for `id`; a missing target becomes `NotFound`.
	pub fn into_host(self, id: &ResourceId) -> HostError {
		if self.is_target_missing() {
			HostError::NotFound(id.clone())
		} else {
			HostError::failed(self.to_string())
		}
	}
}

impl From<Error> for HostError {
	fn from(err: Error) -> Self {
		HostError::failed(err.to_string())
	}
}
