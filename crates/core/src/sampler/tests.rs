use std::sync::Arc;
use std::time::Duration;

use tabflow_protocol::{MIB, ResourceId};

use super::*;
use crate::clock::ManualClock;
use crate::gate::OriginGrants;
use crate::testing::{FakeHost, HangingGrants, T0};

fn sampler_with(host: &Arc<FakeHost>, grants: Arc<dyn crate::host::GrantService>) -> MemorySampler {
	let timeout = Duration::from_millis(200);
	MemorySampler::new(
		host.clone(),
		host.clone(),
		PermissionGate::new(grants, timeout),
		Arc::new(ManualClock::new(T0)),
		timeout,
	)
}

fn sampler(host: &Arc<FakeHost>) -> MemorySampler {
	sampler_with(host, Arc::new(OriginGrants::allow_all()))
}

#[tokio::test]
async fn test_sample_attaches_once_and_reads_heap() {
	let host = FakeHost::new();
	host.add("a", "https://a.test/", 150);
	let sampler = sampler(&host);
	let id = ResourceId::new("a");

	let first = sampler.sample(&id).await.unwrap();
	assert_eq!(first.used_bytes, 150 * MIB);
	assert_eq!(first.total_bytes, 151 * MIB);
	assert_eq!(first.captured_at, T0);
	assert_eq!(sampler.state(&id), ChannelState::Attached);

	sampler.sample(&id).await.unwrap();
	assert_eq!(host.attach_calls(), 1);
}

#[tokio::test]
async fn test_existing_attachment_is_adopted() {
	let host = FakeHost::new();
	host.add("a", "https://a.test/", 10);
	host.pre_attach("a");
	let sampler = sampler(&host);

	let sample = sampler.sample(&ResourceId::new("a")).await.unwrap();
	assert_eq!(sample.used_bytes, 10 * MIB);
	assert_eq!(host.attach_calls(), 0);
}

#[tokio::test]
async fn test_missing_resource_yields_none() {
	let host = FakeHost::new();
	let sampler = sampler(&host);
	assert_eq!(sampler.sample(&ResourceId::new("ghost")).await, None);
}

#[tokio::test]
async fn test_restricted_page_yields_zero_sample_without_attaching() {
	let host = FakeHost::new();
	host.add("settings", "chrome://settings", 500);
	let sampler = sampler(&host);

	let sample = sampler.sample(&ResourceId::new("settings")).await.unwrap();
	assert!(sample.is_zero());
	assert_eq!(host.attach_calls(), 0);
}

#[tokio::test]
async fn test_denied_grant_yields_zero_sample() {
	let host = FakeHost::new();
	host.add("a", "https://a.test/", 500);
	let sampler = sampler_with(&host, Arc::new(OriginGrants::deny_all()));

	assert!(sampler.sample(&ResourceId::new("a")).await.unwrap().is_zero());
}

#[tokio::test(start_paused = true)]
async fn test_hung_grant_service_fails_closed() {
	let host = FakeHost::new();
	host.add("a", "https://a.test/", 500);
	let sampler = sampler_with(&host, Arc::new(HangingGrants));

	assert!(sampler.sample(&ResourceId::new("a")).await.unwrap().is_zero());
}

#[tokio::test]
async fn test_channel_failure_resets_state_and_reattaches() {
	let host = FakeHost::new();
	host.add("a", "https://a.test/", 50);
	let sampler = sampler(&host);
	let id = ResourceId::new("a");

	sampler.sample(&id).await.unwrap();
	host.fail_queries(true);
	assert!(sampler.sample(&id).await.unwrap().is_zero());
	assert_eq!(sampler.state(&id), ChannelState::Detached);

	host.fail_queries(false);
	let details = ResourceDetails {
		id: id.clone(),
		url: "https://a.test/".into(),
		title: String::new(),
		active: false,
		pinned: false,
	};
	assert_eq!(sampler.measure(&details).await.unwrap().used_bytes, 50 * MIB);
	assert_eq!(sampler.state(&id), ChannelState::Attached);
}

#[tokio::test]
async fn test_measure_reports_gone_resource() {
	let host = FakeHost::new();
	host.add("a", "https://a.test/", 50);
	let sampler = sampler(&host);
	let id = ResourceId::new("a");
	sampler.sample(&id).await.unwrap();

	let details = ResourceDetails {
		id: id.clone(),
		url: "https://a.test/".into(),
		title: String::new(),
		active: false,
		pinned: false,
	};
	host.remove("a");
	assert!(sampler.measure(&details).await.unwrap_err().is_gone());
}

#[tokio::test]
async fn test_detach_is_idempotent() {
	let host = FakeHost::new();
	host.add("a", "https://a.test/", 50);
	let sampler = sampler(&host);
	let id = ResourceId::new("a");

	assert!(!sampler.detach(&id).await);
	sampler.sample(&id).await.unwrap();
	assert!(sampler.detach(&id).await);
	assert!(!sampler.detach(&id).await);
	assert_eq!(host.detach_calls(), 1);
	assert!(!host.is_attached("a"));
}

#[tokio::test]
async fn test_detach_all_and_retain_live() {
	let host = FakeHost::new();
	host.add("a", "https://a.test/", 1);
	host.add("b", "https://b.test/", 1);
	let sampler = sampler(&host);
	sampler.sample(&ResourceId::new("a")).await.unwrap();
	sampler.sample(&ResourceId::new("b")).await.unwrap();

	let live = [ResourceId::new("a")].into_iter().collect();
	sampler.retain_live(&live);
	assert_eq!(sampler.attached(), vec![ResourceId::new("a")]);

	assert_eq!(sampler.detach_all().await, 1);
	assert!(sampler.attached().is_empty());
}
