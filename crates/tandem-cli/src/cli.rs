use clap::{Parser, ValueEnum};
use std::path::PathBuf;
use tandem::RestartMode;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogLevel {
	Error,
	Warn,
	Info,
	Debug,
	Trace,
}

/// Run commands side by side with merged output.
#[derive(Debug, Parser)]
#[command(name = "tandem", version, about = "Run commands side by side; restart them when they fall over")]
pub struct Cli {
	/// Shell commands to run, one per argument.
	#[arg(value_name = "COMMAND")]
	pub commands: Vec<String>,

	/// Display names for the commands, comma-separated, in order.
	#[arg(long, short = 'n', value_delimiter = ',')]
	pub names: Vec<String>,

	/// Restart mode for every process without its own: never, on-error, on-exit.
	#[arg(long, short = 'r')]
	pub restart: Option<RestartMode>,

	/// Delay before an automatic restart, in milliseconds.
	#[arg(long, value_name = "MS")]
	pub restart_delay: Option<u64>,

	/// Lines kept per process.
	#[arg(long)]
	pub max_lines: Option<usize>,

	/// Config file. Defaults to ./tandem.toml when present.
	#[arg(long, short = 'c')]
	pub config: Option<PathBuf>,

	/// Print one JSON object per event instead of prefixed lines.
	#[arg(long)]
	pub json: bool,

	#[arg(long)]
	pub no_color: bool,

	/// Keep running after every process has stopped; exit on Ctrl-C.
	#[arg(long)]
	pub keep_alive: bool,

	/// Diagnostic log level (stderr). Overrides TANDEM_LOG.
	#[arg(long, value_enum)]
	pub log_level: Option<LogLevel>,
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn parses_commands_and_flags() {
		let cli = Cli::parse_from([
			"tandem",
			"--names",
			"web,api",
			"--restart",
			"on-error",
			"--restart-delay",
			"250",
			"npm run dev",
			"cargo run",
		]);
		assert_eq!(cli.commands, vec!["npm run dev", "cargo run"]);
		assert_eq!(cli.names, vec!["web", "api"]);
		assert_eq!(cli.restart, Some(RestartMode::OnError));
		assert_eq!(cli.restart_delay, Some(250));
		assert!(!cli.json);
	}

	#[test]
	fn rejects_unknown_restart_mode() {
		assert!(Cli::try_parse_from(["tandem", "--restart", "sometimes", "ls"]).is_err());
	}
}
