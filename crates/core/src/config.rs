//! Runtime configuration: [`HibernateConfig`].
//!
//! Stored as camelCase JSON at `$XDG_CONFIG_HOME/tabflow/config.json`
//! (falling back to `~/.config`). Every field has a default, so a partial file
//! or no file at all is valid.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::policy::{DEFAULT_IDLE_THRESHOLD, DEFAULT_THRESHOLD_BYTES};

/// Schema version for config files.
pub const SCHEMA_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct HibernateConfig {
	pub schema: u32,
	/// Master switch for periodic hibernation. Checked at sweep boundaries.
	pub auto_hibernate: bool,
	pub memory_threshold_bytes: u64,
	pub idle_threshold_secs: u64,
	pub sweep_interval_secs: u64,
	/// Upper bound for every host call.
	pub call_timeout_ms: u64,
	/// Samples older than this are ignored by the policy. Unset accepts any sample.
	#[serde(skip_serializing_if = "Option::is_none")]
	pub max_sample_age_secs: Option<u64>,
	/// Base URL for the placeholder page; unset uses a generated `data:` page.
	#[serde(skip_serializing_if = "Option::is_none")]
	pub placeholder_url: Option<String>,
	/// URL globs treated as pinned.
	#[serde(skip_serializing_if = "Vec::is_empty")]
	pub pinned_patterns: Vec<String>,
	/// Origin globs for which inspection grants are handed out on request.
	pub grants: Vec<String>,
}

impl Default for HibernateConfig {
	fn default() -> Self {
		Self {
			schema: SCHEMA_VERSION,
			auto_hibernate: true,
			memory_threshold_bytes: DEFAULT_THRESHOLD_BYTES,
			idle_threshold_secs: DEFAULT_IDLE_THRESHOLD.as_secs(),
			sweep_interval_secs: 60,
			call_timeout_ms: 10_000,
			max_sample_age_secs: None,
			placeholder_url: None,
			pinned_patterns: Vec::new(),
			grants: vec!["*".to_string()],
		}
	}
}

impl HibernateConfig {
	pub fn idle_threshold(&self) -> Duration {
		Duration::from_secs(self.idle_threshold_secs)
	}

	pub fn sweep_interval(&self) -> Duration {
		Duration::from_secs(self.sweep_interval_secs)
	}

	pub fn call_timeout(&self) -> Duration {
		Duration::from_millis(self.call_timeout_ms)
	}

	pub fn max_sample_age(&self) -> Option<Duration> {
		self.max_sample_age_secs.map(Duration::from_secs)
	}

	pub fn validate(&self) -> Result<()> {
		if self.sweep_interval_secs == 0 {
			return Err(Error::Config("sweepIntervalSecs must be positive".into()));
		}
		if self.call_timeout_ms == 0 {
			return Err(Error::Config("callTimeoutMs must be positive".into()));
		}
		if let Some(base) = &self.placeholder_url {
			url::Url::parse(base).map_err(|err| Error::Config(format!("placeholderUrl {base:?}: {err}")))?;
		}
		Ok(())
	}

	/// Loads and validates the config at `path`. A missing file yields defaults.
	pub fn load(path: &Path) -> Result<Self> {
		let content = match std::fs::read_to_string(path) {
			Ok(content) => content,
			Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(Self::default()),
			Err(err) => return Err(err.into()),
		};
		let config: Self = serde_json::from_str(&content)?;
		config.validate()?;
		Ok(config)
	}

	pub fn save(&self, path: &Path) -> Result<()> {
		if let Some(parent) = path.parent() {
			std::fs::create_dir_all(parent)?;
		}
		std::fs::write(path, serde_json::to_string_pretty(self)?)?;
		Ok(())
	}
}

/// `$XDG_CONFIG_HOME/tabflow/config.json`.
pub fn default_config_path() -> PathBuf {
	xdg_dir("XDG_CONFIG_HOME", ".config").join("tabflow/config.json")
}

/// `$XDG_DATA_HOME/tabflow/store.json`, the default durable store.
pub fn default_store_path() -> PathBuf {
	xdg_dir("XDG_DATA_HOME", ".local/share").join("tabflow/store.json")
}

fn xdg_dir(var: &str, home_relative: &str) -> PathBuf {
	std::env::var_os(var)
		.map(PathBuf::from)
		.or_else(|| std::env::var_os("HOME").map(|h| PathBuf::from(h).join(home_relative)))
		.unwrap_or_else(|| PathBuf::from("."))
}
