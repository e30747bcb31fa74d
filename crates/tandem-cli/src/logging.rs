//! Diagnostics via `tracing-subscriber`.
//!
//! Level comes from `--log-level`, then the `TANDEM_LOG` environment
//! variable, then `warn`. Everything goes to stderr; stdout carries process
//! output only.

use anyhow::Result;
use tracing::Level;
use tracing_subscriber::fmt;

use crate::cli::LogLevel;

pub const LOG_ENV: &str = "TANDEM_LOG";

pub fn init_logging(cli_level: Option<LogLevel>) -> Result<()> {
	let level = match cli_level {
		Some(lvl) => level_from_log_level(lvl),
		None => std::env::var(LOG_ENV)
			.ok()
			.and_then(|s| parse_level_str(&s))
			.unwrap_or(Level::WARN),
	};

	fmt()
		.with_max_level(level)
		.with_target(false)
		.with_writer(std::io::stderr)
		.try_init()
		.map_err(|e| anyhow::anyhow!("failed to initialise logging: {e}"))?;

	Ok(())
}

fn level_from_log_level(lvl: LogLevel) -> Level {
	match lvl {
		LogLevel::Error => Level::ERROR,
		LogLevel::Warn => Level::WARN,
		LogLevel::Info => Level::INFO,
		LogLevel::Debug => Level::DEBUG,
		LogLevel::Trace => Level::TRACE,
	}
}

fn parse_level_str(s: &str) -> Option<Level> {
	match s.trim().to_lowercase().as_str() {
		"error" => Some(Level::ERROR),
		"warn" | "warning" => Some(Level::WARN),
		"info" => Some(Level::INFO),
		"debug" => Some(Level::DEBUG),
		"trace" => Some(Level::TRACE),
		_ => None,
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn level_strings() {
		assert_eq!(parse_level_str(" Debug "), Some(Level::DEBUG));
		assert_eq!(parse_level_str("warning"), Some(Level::WARN));
		assert_eq!(parse_level_str("loud"), None);
	}
}
