//! Logging setup for the service and the CLI

use anyhow::{anyhow, Result};
use std::{fs::OpenOptions, path::Path, sync::Arc};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Install the global subscriber.
///
/// `RUST_LOG` takes precedence over `level`. Console output goes to stderr so
/// that command output on stdout stays clean. With `log_file`, everything is
/// also appended to that file without color codes.
pub fn init_logging(level: &str, log_file: Option<&Path>) -> Result<()> {
	let file_layer = match log_file {
		Some(path) => {
			if let Some(parent) = path.parent() {
				std::fs::create_dir_all(parent)?;
			}

			let file = OpenOptions::new().create(true).append(true).open(path)?;

			Some(
				fmt::layer()
					.with_writer(Arc::new(file))
					.with_ansi(false)
					.with_target(true)
					.with_line_number(true),
			)
		}
		None => None,
	};

	let console_layer = fmt::layer().with_writer(std::io::stderr).with_target(false);

	let filter = EnvFilter::try_from_default_env()
		.unwrap_or_else(|_| EnvFilter::new(format!("warn,entities_service={level}")));

	tracing_subscriber::registry()
		.with(filter)
		.with(file_layer)
		.with(console_layer)
		.try_init()
		.map_err(|e| anyhow!("Failed to initialize logging: {e}"))
}
