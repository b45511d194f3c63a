use std::time::Duration;

use tabflow::LifecycleController;
use tabflow_protocol::{ControlRequest, ControlResponse};
use tracing::warn;

/// Applies one control request to the controller.
///
/// `Shutdown` only acknowledges here; stopping the process is up to the
/// caller.
pub async fn handle_request(controller: &LifecycleController, request: ControlRequest) -> ControlResponse {
	match request {
		ControlRequest::Ping => ControlResponse::Pong {
			version: env!("CARGO_PKG_VERSION").to_string(),
		},
		ControlRequest::Restore { id } => match controller.restore(&id).await {
			Ok(result) => ControlResponse::Restored { id, result },
			Err(err) => {
				warn!(target = "tabflow.daemon", %id, error = %err, "restore failed");
				ControlResponse::Error {
					message: format!("restore {id}: {err}"),
				}
			}
		},
		ControlRequest::Touch { id } => {
			controller.record_access(&id).await;
			ControlResponse::Ok
		}
		ControlRequest::SetAutoHibernate { enabled } => {
			controller.set_auto_hibernate(enabled);
			ControlResponse::Ok
		}
		ControlRequest::SetMemoryThreshold { bytes } => {
			controller.set_memory_threshold(bytes);
			ControlResponse::Ok
		}
		ControlRequest::SetIdleThreshold { secs } => {
			controller.set_idle_threshold(Duration::from_secs(secs));
			ControlResponse::Ok
		}
		ControlRequest::Hibernate { id } => match controller.hibernate_now(&id).await {
			Ok(hibernated) => ControlResponse::Hibernated { id, hibernated },
			Err(err) => {
				warn!(target = "tabflow.daemon", %id, error = %err, "hibernate failed");
				ControlResponse::Error {
					message: format!("hibernate {id}: {err}"),
				}
			}
		},
		ControlRequest::Stats { id } => {
			let stats = controller.get_stats(&id);
			ControlResponse::Stats { id, stats }
		}
		ControlRequest::IsHibernated { id } => {
			let hibernated = controller.is_hibernated(&id);
			ControlResponse::Hibernated { id, hibernated }
		}
		ControlRequest::ListHibernated => ControlResponse::HibernatedList {
			ids: controller.hibernated_ids(),
		},
		ControlRequest::SystemUsage => ControlResponse::SystemUsage {
			total_bytes: controller.get_system_usage(),
		},
		ControlRequest::Status => ControlResponse::Status {
			status: controller.status(),
		},
		ControlRequest::Sweep => match controller.sweep().await {
			Some(report) => ControlResponse::Swept { report },
			None => ControlResponse::Error {
				message: "a sweep is already running".into(),
			},
		},
		ControlRequest::Shutdown => ControlResponse::Ok,
	}
}
