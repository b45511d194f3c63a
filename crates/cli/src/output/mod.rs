//! Command output.
//!
//! Every command ends in a [`ControlResponse`], whether it came back from the
//! daemon or was produced in-process, so one renderer covers both paths.
//! JSON output is the response exactly as it travels on the control socket:
//!
//! ```json
//! { "type": "stats", "id": "4F2A...", "stats": { "usedBytes": 157286400, "capturedAt": 1700000000000 } }
//! ```


use std::fmt::Write as _;
use std::io::{self, Write};

use tabflow::{MIB, ResourceState, RestoreOutcome, SweepReport};
use tabflow_protocol::{ControlResponse, ControllerStatus};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
	/// Human-readable text
	#[default]
	Text,
	/// Control-protocol JSON
	Json,
}

pub fn print_response(response: &ControlResponse, format: OutputFormat) -> io::Result<()> {
	let rendered = match format {
		OutputFormat::Text => render_text(response),
		OutputFormat::Json => serde_json::to_string_pretty(response).map_err(io::Error::other)?,
	};
	let mut stdout = io::stdout().lock();
	writeln!(stdout, "{rendered}")?;
	stdout.flush()
}

/// Reports a failed command. Humans read stderr; JSON consumers also get an
/// `error` response on stdout.
pub fn print_error(err: &anyhow::Error, format: OutputFormat) {
	eprintln!("error: {err:#}");
	if format == OutputFormat::Json {
		let response = ControlResponse::Error {
			message: format!("{err:#}"),
		};
		let _ = print_response(&response, format);
	}
}

pub fn render_text(response: &ControlResponse) -> String {
	match response {
		ControlResponse::Pong { version } => format!("daemon is running (tabflow {version})"),
		ControlResponse::Ok => "ok".to_string(),
		ControlResponse::Restored { id, result } => match result {
			RestoreOutcome::Restored { url, .. } => format!("restored {id} -> {url}"),
			RestoreOutcome::NotHibernated => format!("{id} is not hibernated"),
			RestoreOutcome::InFlight => format!("{id} is already changing state, try again"),
		},
		ControlResponse::Stats { id, stats } => match stats.captured_at {
			Some(at) => format!("{id}: {} (sampled at {at})", format_mib(stats.used_bytes)),
			None => format!("{id}: not measured yet"),
		},
		ControlResponse::Hibernated { id, hibernated } => {
			format!("{id}: {}", if *hibernated { "hibernated" } else { "not hibernated" })
		}
		ControlResponse::HibernatedList { ids } if ids.is_empty() => "no hibernated tabs".to_string(),
		ControlResponse::HibernatedList { ids } => ids.iter().map(|id| id.as_str()).collect::<Vec<_>>().join("\n"),
		ControlResponse::SystemUsage { total_bytes } => format!("{} across tracked tabs", format_mib(*total_bytes)),
		ControlResponse::Status { status } => render_status(status),
		ControlResponse::Swept { report } => render_report(report),
		ControlResponse::Error { message } => format!("error: {message}"),
	}
}

fn render_status(status: &ControllerStatus) -> String {
	let mut out = String::new();
	let _ = writeln!(
		out,
		"auto-hibernate {}, threshold {}, idle window {} min",
		if status.auto_hibernate { "on" } else { "off" },
		format_mib(status.memory_threshold_bytes),
		status.idle_threshold_secs / 60,
	);
	let _ = write!(
		out,
		"{} tracked, {} hibernated, {} in use",
		status.resources.len(),
		status.hibernated.len(),
		format_mib(status.system_usage_bytes),
	);

	let id_width = status.resources.iter().map(|r| r.id.as_str().len()).max().unwrap_or(0).max(2);
	for resource in &status.resources {
		let memory = match (&resource.sample, resource.state) {
			(_, ResourceState::Hibernated) => "-".to_string(),
			(Some(sample), _) => format_mib(sample.used_bytes),
			(None, _) => "?".to_string(),
		};
		let _ = write!(
			out,
			"\n{:<id_width$}  {:<10}  {:>10}  {}",
			resource.id.as_str(),
			resource.state.to_string(),
			memory,
			resource.url.as_deref().unwrap_or(""),
		);
	}
	out
}

fn render_report(report: &SweepReport) -> String {
	let mut out = format!("examined {}", report.examined);
	if report.bookkeeping_only {
		out.push_str(" (auto-hibernate off)");
	}
	if !report.hibernated.is_empty() {
		let _ = write!(out, ", hibernated {}", join_ids(&report.hibernated));
	}
	if !report.purged.is_empty() {
		let _ = write!(out, ", purged {}", join_ids(&report.purged));
	}
	if report.unmeasurable > 0 {
		let _ = write!(out, ", {} unmeasurable", report.unmeasurable);
	}
	if report.failures > 0 {
		let _ = write!(out, ", {} failed", report.failures);
	}
	out
}

fn join_ids(ids: &[tabflow::ResourceId]) -> String {
	ids.iter().map(|id| id.as_str()).collect::<Vec<_>>().join(" ")
}

pub fn format_mib(bytes: u64) -> String {
	format!("{:.1} MiB", bytes as f64 / MIB as f64)
}
