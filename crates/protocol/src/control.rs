//! Control protocol between the `tabflow` CLI and a running daemon.
//!
//! Each request is a single JSON object on its own line; the daemon answers
//! every request line with exactly one [`ControlResponse`] line.
//!
//! ```text
//! -> {"type":"restore","id":"4F2A..."}
//! <- {"type":"restored","id":"4F2A...","result":{"outcome":"restored","url":"https://...","title":"..."}}
//! ```

use serde::{Deserialize, Serialize};

use crate::types::{ResourceId, ResourceStats, ResourceStatus, RestoreOutcome, SweepReport};

/// Request sent by the CLI to the daemon.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ControlRequest {
	Ping,
	/// Bring a hibernated resource back to its original URL.
	Restore { id: ResourceId },
	/// Record an access (activation or load) for a resource.
	Touch { id: ResourceId },
	SetAutoHibernate { enabled: bool },
	SetMemoryThreshold { bytes: u64 },
	SetIdleThreshold { secs: u64 },
	/// Hibernate a resource now, skipping the usage and idle checks.
	Hibernate { id: ResourceId },
	Stats { id: ResourceId },
	IsHibernated { id: ResourceId },
	ListHibernated,
	SystemUsage,
	Status,
	/// Run a sweep now instead of waiting for the next tick.
	Sweep,
	Shutdown,
}

/// Response sent by the daemon.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ControlResponse {
	Pong { version: String },
	Ok,
	Restored { id: ResourceId, result: RestoreOutcome },
	Stats { id: ResourceId, stats: ResourceStats },
	Hibernated { id: ResourceId, hibernated: bool },
	HibernatedList { ids: Vec<ResourceId> },
	SystemUsage { total_bytes: u64 },
	Status { status: ControllerStatus },
	Swept { report: SweepReport },
	Error { message: String },
}

/// Point-in-time view of the controller for status displays.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ControllerStatus {
	pub auto_hibernate: bool,
	pub memory_threshold_bytes: u64,
	pub idle_threshold_secs: u64,
	pub system_usage_bytes: u64,
	pub hibernated: Vec<ResourceId>,
	pub resources: Vec<ResourceStatus>,
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn request_wire_format() {
		let json = serde_json::to_string(&ControlRequest::Restore { id: ResourceId::new("t1") }).unwrap();
		assert_eq!(json, r#"{"type":"restore","id":"t1"}"#);

		let parsed: ControlRequest = serde_json::from_str(r#"{"type":"set_memory_threshold","bytes":1024}"#).unwrap();
		assert_eq!(parsed, ControlRequest::SetMemoryThreshold { bytes: 1024 });

		let parsed: ControlRequest = serde_json::from_str(r#"{"type":"set_idle_threshold","secs":600}"#).unwrap();
		assert_eq!(parsed, ControlRequest::SetIdleThreshold { secs: 600 });
		assert_eq!(
			serde_json::to_string(&ControlRequest::ListHibernated).unwrap(),
			r#"{"type":"list_hibernated"}"#
		);
	}

	#[test]
	fn restored_response_nests_outcome() {
		let response = ControlResponse::Restored {
			id: ResourceId::new("t1"),
			result: RestoreOutcome::Restored {
				url: "https://example.com/".into(),
				title: "Example".into(),
			},
		};
		let value = serde_json::to_value(&response).unwrap();
		assert_eq!(value["type"], "restored");
		assert_eq!(value["result"]["outcome"], "restored");
		assert_eq!(value["result"]["url"], "https://example.com/");
	}
}
