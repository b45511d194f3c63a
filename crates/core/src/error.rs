//! Error types for the lifecycle manager.

use tabflow_protocol::ResourceId;
use thiserror::Error;

use crate::host::HostError;

/// Result type alias for lifecycle operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors surfaced by the sampler, transitions and configuration loading.
///
/// None of these abort a sweep; the controller logs them per resource and
/// moves on.
#[derive(Debug, Error)]
pub enum Error {
	/// Memory of a live resource cannot be read (restricted scheme, missing
	/// grant, or inspection channel failure). The resource stays tracked at
	/// zero usage.
	#[error("memory of {id} is not measurable: {reason}")]
	MeasurementUnavailable { id: ResourceId, reason: String },

	/// The resource disappeared from the host. Triggers a purge.
	#[error("resource {0} no longer exists")]
	ResourceGone(ResourceId),

	/// A key-value store operation failed; the transition was abandoned and
	/// is retried on the next trigger.
	#[error("persisting {key} failed")]
	PersistenceFailure {
		key: String,
		#[source]
		source: HostError,
	},

	/// Redirecting the resource to the placeholder or back to its original URL failed.
	#[error("redirect of {id} failed")]
	Redirect {
		id: ResourceId,
		#[source]
		source: HostError,
	},

	/// Another hibernate/restore for the same resource is in flight.
	#[error("resource {0} already has a transition in flight")]
	TransitionConflict(ResourceId),

	/// A host call other than persistence or redirect failed.
	#[error(transparent)]
	Host(#[from] HostError),

	#[error("invalid configuration: {0}")]
	Config(String),

	#[error(transparent)]
	Io(#[from] std::io::Error),

	#[error(transparent)]
	Json(#[from] serde_json::Error),
}

impl Error {
	/// Returns true for errors that mean "the resource is gone", which callers
	/// treat as a normal outcome rather than a fault.
	pub fn is_gone(&self) -> bool {
		matches!(self, Error::ResourceGone(_) | Error::Host(HostError::NotFound(_)))
	}

	pub fn is_conflict(&self) -> bool {
		matches!(self, Error::TransitionConflict(_))
	}
}
