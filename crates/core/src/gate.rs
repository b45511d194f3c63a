//! Decides whether a resource's memory may be inspected.
//!
//! Browser-internal pages, extension pages and local files are never
//! inspected. Everything else needs a capability grant for its origin, which is
//! requested on demand. The gate fails closed: if anything goes wrong while
//! deciding, the answer is "no".

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::RwLock;
use tracing::debug;
use url::Url;

use crate::host::{GrantService, HostResult, bounded};
use crate::pattern::PatternSet;

/// URL schemes whose pages are never inspected.
pub const RESTRICTED_SCHEMES: &[&str] = &[
	"about",
	"chrome",
	"chrome-extension",
	"chrome-untrusted",
	"data",
	"devtools",
	"edge",
	"file",
	"javascript",
	"moz-extension",
	"view-source",
];

/// Returns the serialized origin of an inspectable URL.
///
/// `None` for restricted schemes, unparseable URLs and opaque origins.
pub fn inspectable_origin(url: &str) -> Option<String> {
	let parsed = Url::parse(url).ok()?;
	if RESTRICTED_SCHEMES.contains(&parsed.scheme()) {
		return None;
	}
	let origin = parsed.origin();
	if !origin.is_tuple() {
		return None;
	}
	Some(origin.ascii_serialization())
}

pub fn is_restricted(url: &str) -> bool {
	inspectable_origin(url).is_none()
}

#[derive(Clone)]
pub struct PermissionGate {
	grants: Arc<dyn GrantService>,
	timeout: Duration,
}

impl PermissionGate {
	pub fn new(grants: Arc<dyn GrantService>, timeout: Duration) -> Self {
		Self { grants, timeout }
	}

	/// Returns whether memory of the page at `url` may be inspected.
	pub async fn can_inspect(&self, url: &str) -> bool {
		let Some(origin) = inspectable_origin(url) else {
			debug!(target = "tabflow.gate", %url, "restricted or opaque url");
			return false;
		};

		match bounded(self.timeout, "has_grant", self.grants.has_grant(&origin)).await {
			Ok(true) => return true,
			Ok(false) => {}
			Err(err) => {
				debug!(target = "tabflow.gate", %origin, error = %err, "grant lookup failed");
				return false;
			}
		}

		match bounded(self.timeout, "request_grant", self.grants.request_grant(&origin)).await {
			Ok(granted) => {
				debug!(target = "tabflow.gate", %origin, granted, "grant requested");
				granted
			}
			Err(err) => {
				debug!(target = "tabflow.gate", %origin, error = %err, "grant request failed");
				false
			}
		}
	}
}

impl std::fmt::Debug for PermissionGate {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("PermissionGate").field("timeout", &self.timeout).finish_non_exhaustive()
	}
}

/// Grant service backed by a configured list of origin globs.
///
/// A request succeeds when the origin matches one of the patterns; granted
/// origins are remembered for the life of the process.
#[derive(Debug, Default)]
pub struct OriginGrants {
	grantable: PatternSet,
	granted: RwLock<HashSet<String>>,
}

impl OriginGrants {
	pub fn new<S: AsRef<str>>(patterns: &[S]) -> Self {
		Self {
			grantable: PatternSet::new(patterns),
			granted: RwLock::new(HashSet::new()),
		}
	}

	pub fn allow_all() -> Self {
		Self::new(&["*"])
	}

	pub fn deny_all() -> Self {
		Self::default()
	}
}

#[async_trait]
impl GrantService for OriginGrants {
	async fn has_grant(&self, origin: &str) -> HostResult<bool> {
		Ok(self.granted.read().contains(origin))
	}

	async fn request_grant(&self, origin: &str) -> HostResult<bool> {
		if !self.grantable.is_match(origin) {
			return Ok(false);
		}
		self.granted.write().insert(origin.to_string());
		Ok(true)
	}
}
