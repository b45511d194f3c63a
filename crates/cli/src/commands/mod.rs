//! Command implementations.
//!
//! `run` owns a controller and serves it; `sweep --once` and
//! `restore --direct` build a short-lived controller in-process. Everything
//! else is a single control request to the daemon.

mod direct;
mod run;

use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use tabflow::{HibernateConfig, MIB, ResourceId};
use tabflow_protocol::{ControlRequest, ControlResponse};

use crate::cli::{Cli, Commands};
use crate::daemon;
use crate::output::{self, OutputFormat};

pub async fn dispatch(cli: Cli) -> Result<()> {
	let format = cli.format;
	let socket = cli.socket.clone().unwrap_or_else(daemon::socket_path);
	let config_path = cli.config.clone().unwrap_or_else(tabflow::config::default_config_path);

	let request = match cli.command {
		Commands::Run(args) => {
			let config = load_config(&config_path)?;
			return run::execute(args, config, socket).await;
		}
		Commands::Sweep(args) if args.once => {
			let mut config = load_config(&config_path)?;
			args.policy.apply(&mut config);
			let response = direct::sweep_once(&config, &args.browser, &socket).await?;
			return finish(response, format);
		}
		Commands::Sweep(_) => ControlRequest::Sweep,
		Commands::Restore(args) if args.direct => {
			let config = load_config(&config_path)?;
			let response = direct::restore(&config, &args.browser, &socket, ResourceId::new(args.id)).await?;
			return finish(response, format);
		}
		Commands::Restore(args) => ControlRequest::Restore {
			id: ResourceId::new(args.id),
		},
		Commands::Status => ControlRequest::Status,
		Commands::Stats { id } => ControlRequest::Stats { id: ResourceId::new(id) },
		Commands::Hibernated { id: Some(id) } => ControlRequest::IsHibernated { id: ResourceId::new(id) },
		Commands::Hibernated { id: None } => ControlRequest::ListHibernated,
		Commands::Hibernate { id } => ControlRequest::Hibernate { id: ResourceId::new(id) },
		Commands::Usage => ControlRequest::SystemUsage,
		Commands::Touch { id } => ControlRequest::Touch { id: ResourceId::new(id) },
		Commands::Auto { state } => ControlRequest::SetAutoHibernate { enabled: state.enabled() },
		Commands::Threshold { mib } => ControlRequest::SetMemoryThreshold {
			bytes: mib.saturating_mul(MIB),
		},
		Commands::Idle { mins } => ControlRequest::SetIdleThreshold {
			secs: mins.saturating_mul(60),
		},
		Commands::Ping => ControlRequest::Ping,
		Commands::Stop => ControlRequest::Shutdown,
	};

	let response = daemon::request(&socket, &request).await?;
	finish(response, format)
}

/// Prints the response; an `error` response fails the command.
fn finish(response: ControlResponse, format: OutputFormat) -> Result<()> {
	if let ControlResponse::Error { message } = response {
		bail!("{message}");
	}
	output::print_response(&response, format).context("Failed writing output")
}

pub(crate) fn load_config(path: &Path) -> Result<HibernateConfig> {
	HibernateConfig::load(path).with_context(|| format!("Failed to load config from {}", path.display()))
}

pub(crate) fn store_path(store: Option<&PathBuf>) -> PathBuf {
	store.cloned().unwrap_or_else(tabflow::config::default_store_path)
}
