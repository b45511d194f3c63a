use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::writer::MakeWriterExt;

pub fn init_logging(verbosity: u8) {
	let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter(verbosity)));

	let stderr = std::io::stderr.with_max_level(tracing::Level::TRACE);

	tracing_subscriber::fmt()
		.with_env_filter(env_filter)
		.with_writer(stderr)
		.with_target(true)
		.with_level(true)
		.compact()
		.init();
}

/// 0 = warnings only, 1 (-v) = info, 2 (-vv) = debug, 3+ = CDP frame tracing.
fn default_filter(verbosity: u8) -> &'static str {
	match verbosity {
		0 => "warn",
		1 => "info",
		2 => "debug",
		_ => "trace",
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn verbosity_levels() {
		assert_eq!(default_filter(0), "warn");
		assert_eq!(default_filter(1), "info");
		assert_eq!(default_filter(7), "trace");
		for level in 0..4 {
			assert!(EnvFilter::try_new(default_filter(level)).is_ok());
		}
	}
}
