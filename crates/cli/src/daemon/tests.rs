use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tabflow::host::HostResult;
use tabflow::{
	HibernateConfig, Host, InspectionChannel, LifecycleController, MemoryStore, Metric, Navigator, OriginGrants, ResourceDetails,
	ResourceId, ResourceInventory, RestoreOutcome, SystemClock,
};
use tabflow_protocol::{ControlRequest, ControlResponse};

use super::*;

/// Pages that never move on their own and always measure zero.
#[derive(Default)]
struct StaticBrowser {
	pages: Mutex<BTreeMap<ResourceId, String>>,
}

impl StaticBrowser {
	fn with_page(id: &str, url: &str) -> Arc<Self> {
		let browser = Self::default();
		browser.pages.lock().unwrap().insert(ResourceId::new(id), url.to_string());
		Arc::new(browser)
	}

	fn url_of(&self, id: &str) -> String {
		self.pages.lock().unwrap()[&ResourceId::new(id)].clone()
	}
}

#[async_trait]
impl ResourceInventory for StaticBrowser {
	async fn list_resources(&self) -> HostResult<Vec<ResourceId>> {
		Ok(self.pages.lock().unwrap().keys().cloned().collect())
	}

	async fn get_resource(&self, id: &ResourceId) -> HostResult<Option<ResourceDetails>> {
		Ok(self.pages.lock().unwrap().get(id).map(|url| ResourceDetails {
			id: id.clone(),
			url: url.clone(),
			title: format!("Title of {id}"),
			active: false,
			pinned: false,
		}))
	}
}

#[async_trait]
impl Navigator for StaticBrowser {
	async fn redirect(&self, id: &ResourceId, url: &str) -> HostResult<()> {
		if let Some(current) = self.pages.lock().unwrap().get_mut(id) {
			*current = url.to_string();
		}
		Ok(())
	}
}

#[async_trait]
impl InspectionChannel for StaticBrowser {
	async fn attach(&self, _id: &ResourceId) -> HostResult<()> {
		Ok(())
	}

	async fn detach(&self, _id: &ResourceId) -> HostResult<()> {
		Ok(())
	}

	async fn list_attachments(&self) -> HostResult<Vec<ResourceId>> {
		Ok(Vec::new())
	}

	async fn query(&self, _id: &ResourceId, _metric: Metric) -> HostResult<u64> {
		Ok(0)
	}
}

fn controller(browser: Arc<StaticBrowser>) -> Arc<LifecycleController> {
	let host = Host::new(browser, Arc::new(MemoryStore::new()), Arc::new(OriginGrants::allow_all()));
	Arc::new(LifecycleController::new(host, HibernateConfig::default(), Arc::new(SystemClock)))
}

#[tokio::test]
async fn test_handle_request_updates_settings() {
	let controller = controller(Arc::new(StaticBrowser::default()));

	let response = handle_request(&controller, ControlRequest::SetMemoryThreshold { bytes: 4096 }).await;
	assert_eq!(response, ControlResponse::Ok);
	handle_request(&controller, ControlRequest::SetAutoHibernate { enabled: false }).await;
	let response = handle_request(&controller, ControlRequest::SetIdleThreshold { secs: 600 }).await;
	assert_eq!(response, ControlResponse::Ok);

	match handle_request(&controller, ControlRequest::Status).await {
		ControlResponse::Status { status } => {
			assert_eq!(status.memory_threshold_bytes, 4096);
			assert!(!status.auto_hibernate);
			assert!(status.resources.is_empty());
		}
		other => panic!("unexpected response: {other:?}"),
	}
}

#[tokio::test]
async fn test_handle_request_sweep_and_restore() {
	let browser = StaticBrowser::with_page("t1", "https://example.com/");
	let controller = controller(browser.clone());

	match handle_request(&controller, ControlRequest::Sweep).await {
		ControlResponse::Swept { report } => assert_eq!(report.examined, 1),
		other => panic!("unexpected response: {other:?}"),
	}

	let id = ResourceId::new("t1");
	assert_eq!(
		handle_request(&controller, ControlRequest::Hibernate { id: id.clone() }).await,
		ControlResponse::Hibernated {
			id: id.clone(),
			hibernated: true
		}
	);
	assert_ne!(browser.url_of("t1"), "https://example.com/");
	assert_eq!(
		handle_request(&controller, ControlRequest::ListHibernated).await,
		ControlResponse::HibernatedList { ids: vec![id.clone()] }
	);
	assert_eq!(
		handle_request(&controller, ControlRequest::IsHibernated { id: id.clone() }).await,
		ControlResponse::Hibernated {
			id: id.clone(),
			hibernated: true
		}
	);

	let response = handle_request(&controller, ControlRequest::Restore { id: id.clone() }).await;
	assert_eq!(
		response,
		ControlResponse::Restored {
			id: id.clone(),
			result: RestoreOutcome::Restored {
				url: "https://example.com/".into(),
				title: "Title of t1".into(),
			},
		}
	);
	assert_eq!(browser.url_of("t1"), "https://example.com/");
	assert!(!controller.is_hibernated(&id));
}

#[tokio::test]
async fn test_hibernate_request_for_closed_tab_is_an_error() {
	let controller = controller(Arc::new(StaticBrowser::default()));

	match handle_request(&controller, ControlRequest::Hibernate { id: ResourceId::new("gone") }).await {
		ControlResponse::Error { message } => assert!(message.starts_with("hibernate gone")),
		other => panic!("unexpected response: {other:?}"),
	}
	assert_eq!(
		handle_request(&controller, ControlRequest::ListHibernated).await,
		ControlResponse::HibernatedList { ids: Vec::new() }
	);
}

#[tokio::test]
async fn test_missing_daemon_is_not_an_error() {
	let dir = tempfile::tempdir().unwrap();
	let path = dir.path().join("absent.sock");

	assert!(try_request(&path, &ControlRequest::Ping).await.unwrap().is_none());
	let err = request(&path, &ControlRequest::Ping).await.unwrap_err();
	assert!(err.to_string().contains("not running"));
}

#[tokio::test]
async fn test_socket_round_trip_and_shutdown() {
	let dir = tempfile::tempdir().unwrap();
	let path = dir.path().join("run/tabflow.sock");

	let daemon = Daemon::bind(controller(Arc::new(StaticBrowser::default())), path.clone()).await.unwrap();
	assert_eq!(daemon.socket_path(), path.as_path());
	let mut stopped = daemon.subscribe();
	let server = tokio::spawn(daemon.run());

	match request(&path, &ControlRequest::Ping).await.unwrap() {
		ControlResponse::Pong { version } => assert_eq!(version, env!("CARGO_PKG_VERSION")),
		other => panic!("unexpected response: {other:?}"),
	}

	let touched = request(&path, &ControlRequest::Touch { id: ResourceId::new("t9") }).await.unwrap();
	assert_eq!(touched, ControlResponse::Ok);

	assert_eq!(request(&path, &ControlRequest::Shutdown).await.unwrap(), ControlResponse::Ok);
	server.await.unwrap().unwrap();

	assert!(*stopped.borrow_and_update());
	assert!(!path.exists());
}

#[tokio::test]
async fn test_invalid_request_gets_error_response() {
	let dir = tempfile::tempdir().unwrap();
	let path = dir.path().join("tabflow.sock");
	let daemon = Daemon::bind(controller(Arc::new(StaticBrowser::default())), path.clone()).await.unwrap();
	let server = tokio::spawn(daemon.run());

	let mut stream = UnixStream::connect(&path).await.unwrap();
	stream.write_all(b"{\"type\":\"reboot\"}\n").await.unwrap();
	let mut line = String::new();
	BufReader::new(&mut stream).read_line(&mut line).await.unwrap();
	let response: ControlResponse = serde_json::from_str(&line).unwrap();
	assert!(matches!(response, ControlResponse::Error { ref message } if message.starts_with("invalid request")));

	request(&path, &ControlRequest::Shutdown).await.unwrap();
	server.await.unwrap().unwrap();
}

#[tokio::test]
async fn test_bind_refuses_live_socket_and_replaces_stale_one() {
	let dir = tempfile::tempdir().unwrap();
	let path = dir.path().join("tabflow.sock");

	std::fs::write(&path, b"").unwrap();
	let daemon = Daemon::bind(controller(Arc::new(StaticBrowser::default())), path.clone()).await.unwrap();

	let second = Daemon::bind(controller(Arc::new(StaticBrowser::default())), path.clone()).await;
	assert!(second.unwrap_err().to_string().contains("already listening"));
	drop(daemon);
}
