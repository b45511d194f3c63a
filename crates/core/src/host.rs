//! Seams to the host environment.
//!
//! The controller never talks to a browser, a debugger, or a disk directly;
//! it goes through these traits. Every call is wrapped in [`bounded`] so that a
//! hung collaborator turns into a [`HostError::Timeout`] instead of stalling a
//! sweep.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tabflow_protocol::{Metric, ResourceDetails, ResourceId};
use thiserror::Error;

/// Failure reported by a host collaborator.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum HostError {
	/// The resource does not exist (anymore).
	#[error("resource not found: {0}")]
	NotFound(ResourceId),

	/// The call did not complete within the configured limit.
	#[error("{operation} timed out after {after_ms}ms")]
	Timeout { operation: &'static str, after_ms: u64 },

	/// Any other failure, with the collaborator's message.
	#[error("{0}")]
	Failed(String),
}

impl HostError {
	pub fn failed(message: impl Into<String>) -> Self {
		HostError::Failed(message.into())
	}

	pub fn is_not_found(&self) -> bool {
		matches!(self, HostError::NotFound(_))
	}
}

pub type HostResult<T> = std::result::Result<T, HostError>;

/// Source of truth for which resources exist.
#[async_trait]
pub trait ResourceInventory: Send + Sync {
	async fn list_resources(&self) -> HostResult<Vec<ResourceId>>;

	/// Returns `Ok(None)` when the resource does not exist.
	async fn get_resource(&self, id: &ResourceId) -> HostResult<Option<ResourceDetails>>;
}

/// Points a live resource at a different URL.
#[async_trait]
pub trait Navigator: Send + Sync {
	async fn redirect(&self, id: &ResourceId, url: &str) -> HostResult<()>;
}

/// Instrumentation connection used to read memory metrics.
///
/// The protocol is attach-then-query: `query` only works on attached resources.
#[async_trait]
pub trait InspectionChannel: Send + Sync {
	async fn attach(&self, id: &ResourceId) -> HostResult<()>;
	async fn detach(&self, id: &ResourceId) -> HostResult<()>;
	/// Resources that currently have a channel attached, including ones
	/// attached before this process started.
	async fn list_attachments(&self) -> HostResult<Vec<ResourceId>>;
	async fn query(&self, id: &ResourceId, metric: Metric) -> HostResult<u64>;
}

/// Durable JSON key-value storage.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
	async fn get(&self, key: &str) -> HostResult<Option<Value>>;
	async fn set(&self, key: &str, value: Value) -> HostResult<()>;
	async fn remove(&self, key: &str) -> HostResult<()>;
}

/// Per-origin capability grants that permit memory inspection.
#[async_trait]
pub trait GrantService: Send + Sync {
	async fn has_grant(&self, origin: &str) -> HostResult<bool>;
	/// Requests a grant; returns whether it was granted.
	async fn request_grant(&self, origin: &str) -> HostResult<bool>;
}

/// Bundle of host collaborators handed to the controller.
#[derive(Clone)]
pub struct Host {
	pub inventory: Arc<dyn ResourceInventory>,
	pub navigator: Arc<dyn Navigator>,
	pub channel: Arc<dyn InspectionChannel>,
	pub store: Arc<dyn KeyValueStore>,
	pub grants: Arc<dyn GrantService>,
}

impl Host {
	/// Builds a host from one object that drives the browser side and separate
	/// store and grant implementations.
	pub fn new<B>(browser: Arc<B>, store: Arc<dyn KeyValueStore>, grants: Arc<dyn GrantService>) -> Self
	where
		B: ResourceInventory + Navigator + InspectionChannel + 'static,
	{
		Self {
			inventory: browser.clone(),
			navigator: browser.clone(),
			channel: browser,
			store,
			grants,
		}
	}
}

impl std::fmt::Debug for Host {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("Host").finish_non_exhaustive()
	}
}

/// Runs a host call with a time limit.
pub async fn bounded<T, F>(limit: Duration, operation: &'static str, fut: F) -> HostResult<T>
where
	F: Future<Output = HostResult<T>>,
{
	match tokio::time::timeout(limit, fut).await {
		Ok(result) => result,
		Err(_) => Err(HostError::Timeout {
			operation,
			after_ms: limit.as_millis() as u64,
		}),
	}
}
