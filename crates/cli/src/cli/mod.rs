
use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};
use tabflow::{HibernateConfig, MIB};

use crate::output::OutputFormat;

pub const DEFAULT_ENDPOINT: &str = "http://127.0.0.1:9222";

/// Hibernates heavy, idle browser tabs and restores them on demand.
#[derive(Parser, Debug)]
#[command(name = "tabflow")]
#[command(version)]
pub struct Cli {
	/// Increase verbosity (-v info, -vv debug, -vvv trace)
	#[arg(short, long, global = true, action = clap::ArgAction::Count)]
	pub verbose: u8,

	/// Output format
	#[arg(short = 'f', long, global = true, value_enum, default_value = "text")]
	pub format: OutputFormat,

	/// Config file [default: $XDG_CONFIG_HOME/tabflow/config.json]
	#[arg(long, global = true, value_name = "FILE")]
	pub config: Option<PathBuf>,

	/// Daemon control socket [default: $XDG_RUNTIME_DIR/tabflow.sock]
	#[arg(long, global = true, value_name = "PATH")]
	pub socket: Option<PathBuf>,

	#[command(subcommand)]
	pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
	/// Run the daemon: periodic sweeps plus the control socket.
	Run(RunArgs),
	/// Run a sweep now.
	Sweep(SweepArgs),
	/// Restore a hibernated tab to its original URL.
	Restore(RestoreArgs),
	/// Show every tracked tab with its state and last sample.
	Status,
	/// Show the last memory sample for a tab.
	Stats {
		#[arg(value_name = "ID")]
		id: String,
	},
	/// Report whether a tab is hibernated, or list every hibernated tab.
	Hibernated {
		#[arg(value_name = "ID")]
		id: Option<String>,
	},
	/// Hibernate a tab now, regardless of its memory use and idle time.
	Hibernate {
		#[arg(value_name = "ID")]
		id: String,
	},
	/// Total memory across tracked tabs.
	Usage,
	/// Record an access for a tab, resetting its idle time.
	Touch {
		#[arg(value_name = "ID")]
		id: String,
	},
	/// Turn periodic hibernation on or off.
	Auto {
		#[arg(value_enum)]
		state: Toggle,
	},
	/// Change the memory threshold.
	Threshold {
		#[arg(value_name = "MIB")]
		mib: u64,
	},
	/// Change the idle window.
	Idle {
		#[arg(value_name = "MINUTES")]
		mins: u64,
	},
	/// Check that the daemon is up.
	Ping,
	/// Stop the daemon.
	Stop,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum Toggle {
	On,
	Off,
}

impl Toggle {
	pub fn enabled(self) -> bool {
		self == Toggle::On
	}
}

/// Where the browser and the durable store live.
#[derive(Args, Debug, Clone)]
pub struct BrowserArgs {
	/// DevTools endpoint: ws:// URL, http://host:port, host:port or a port
	#[arg(long, value_name = "ENDPOINT", default_value = DEFAULT_ENDPOINT)]
	pub endpoint: String,

	/// Hibernation store [default: $XDG_DATA_HOME/tabflow/store.json]
	#[arg(long, value_name = "FILE")]
	pub store: Option<PathBuf>,
}

/// Overrides for values normally read from the config file.
#[derive(Args, Debug, Clone, Default)]
pub struct PolicyArgs {
	/// Memory threshold in MiB
	#[arg(long, value_name = "MIB")]
	pub threshold_mib: Option<u64>,

	/// Idle window in minutes
	#[arg(long, value_name = "MINUTES")]
	pub idle_mins: Option<u64>,

	/// Start with periodic hibernation switched off
	#[arg(long)]
	pub no_auto: bool,
}

impl PolicyArgs {
	pub fn apply(&self, config: &mut HibernateConfig) {
		if let Some(mib) = self.threshold_mib {
			config.memory_threshold_bytes = mib.saturating_mul(MIB);
		}
		if let Some(mins) = self.idle_mins {
			config.idle_threshold_secs = mins.saturating_mul(60);
		}
		if self.no_auto {
			config.auto_hibernate = false;
		}
	}
}

#[derive(Args, Debug, Clone)]
pub struct RunArgs {
	#[command(flatten)]
	pub browser: BrowserArgs,

	#[command(flatten)]
	pub policy: PolicyArgs,

	/// Seconds between sweeps
	#[arg(long, value_name = "SECS")]
	pub interval: Option<u64>,
}

#[derive(Args, Debug, Clone)]
pub struct SweepArgs {
	/// Sweep once in this process, connecting to the browser directly
	/// instead of asking the daemon.
	#[arg(long)]
	pub once: bool,

	#[command(flatten)]
	pub browser: BrowserArgs,

	#[command(flatten)]
	pub policy: PolicyArgs,
}

#[derive(Args, Debug, Clone)]
pub struct RestoreArgs {
	#[arg(value_name = "ID")]
	pub id: String,

	/// Restore in this process, connecting to the browser directly.
	#[arg(long)]
	pub direct: bool,

	#[command(flatten)]
	pub browser: BrowserArgs,
}
