use serde::Deserialize;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::{Path, PathBuf};
use thiserror::Error;

use tandem::logs::DEFAULT_CAPACITY;
use tandem::{CommandDescriptor, PolicyOverride, ProcessId, RestartMode, RestartPolicy};

use crate::cli::Cli;

pub const DEFAULT_CONFIG_FILE: &str = "tandem.toml";

#[derive(Error, Debug)]
pub enum ConfigError {
	#[error("failed to read {}: {source}", path.display())]
	Read {
		path: PathBuf,
		#[source]
		source: std::io::Error,
	},

	#[error("failed to parse {}: {source}", path.display())]
	Parse {
		path: PathBuf,
		#[source]
		source: toml::de::Error,
	},

	#[error("duplicate process name: {0}")]
	DuplicateName(String),

	#[error("process '{0}' has an empty command")]
	EmptyCommand(String),

	#[error("nothing to run: pass commands or add [processes] to tandem.toml")]
	NoProcesses,
}

// ── tandem.toml ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Deserialize, Default)]
pub struct FileConfig {
	#[serde(default)]
	pub defaults: DefaultsConfig,
	#[serde(default)]
	pub processes: BTreeMap<String, ProcessDef>,
	/// Directory relative `cwd` entries are resolved against.
	#[serde(skip)]
	pub base_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct DefaultsConfig {
	pub restart: Option<RestartMode>,
	/// Milliseconds.
	pub restart_delay: Option<u64>,
	pub max_lines: Option<usize>,
}

/// A single process: either a bare command string or a full table.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum ProcessDef {
	Simple(String),
	Full {
		run: String,
		restart: Option<RestartMode>,
		restart_delay: Option<u64>,
		cwd: Option<PathBuf>,
		#[serde(default)]
		env: HashMap<String, String>,
	},
}

impl FileConfig {
	pub fn parse(content: &str) -> Result<Self, toml::de::Error> {
		toml::from_str(content)
	}
}

/// Read `explicit`, or `./tandem.toml` if it exists. A missing default file is
/// an empty config; a missing explicit one is an error.
pub fn load(explicit: Option<&Path>) -> Result<FileConfig, ConfigError> {
	let path = match explicit {
		Some(path) => path.to_path_buf(),
		None => {
			let path = PathBuf::from(DEFAULT_CONFIG_FILE);
			if !path.exists() {
				return Ok(FileConfig::default());
			}
			path
		}
	};

	let content = std::fs::read_to_string(&path).map_err(|source| ConfigError::Read {
		path: path.clone(),
		source,
	})?;
	let mut config =
		FileConfig::parse(&content).map_err(|source| ConfigError::Parse { path: path.clone(), source })?;
	config.base_dir = path.parent().map(Path::to_path_buf);
	tracing::debug!(path = %path.display(), processes = config.processes.len(), "loaded config");
	Ok(config)
}

// ── resolution ───────────────────────────────────────────────────────────────

/// Everything needed to start the supervisor.
#[derive(Debug)]
pub struct Plan {
	pub descriptors: Vec<CommandDescriptor>,
	pub max_lines: usize,
}

/// Merge the config file with the command line. Config processes come first
/// (in name order), then positional commands; ids count up from 0.
pub fn build_plan(file: FileConfig, cli: &Cli) -> Result<Plan, ConfigError> {
	let global = PolicyOverride {
		mode: cli.restart.or(file.defaults.restart),
		delay_ms: cli.restart_delay.or(file.defaults.restart_delay),
	};
	let max_lines = cli
		.max_lines
		.or(file.defaults.max_lines)
		.unwrap_or(DEFAULT_CAPACITY);

	let mut descriptors = Vec::new();
	let mut taken = HashSet::new();

	for (name, def) in file.processes {
		let id = descriptors.len() as ProcessId;
		if !taken.insert(name.clone()) {
			return Err(ConfigError::DuplicateName(name));
		}
		let descriptor = match def {
			ProcessDef::Simple(run) => CommandDescriptor::new(id, name, run)
				.with_restart(RestartPolicy::resolve(PolicyOverride::default(), global)),
			ProcessDef::Full { run, restart, restart_delay, cwd, env } => {
				let own = PolicyOverride { mode: restart, delay_ms: restart_delay };
				let mut d = CommandDescriptor::new(id, name, run)
					.with_restart(RestartPolicy::resolve(own, global));
				d.cwd = cwd.map(|cwd| match &file.base_dir {
					Some(base) if cwd.is_relative() => base.join(cwd),
					_ => cwd,
				});
				d.env = env;
				d
			}
		};
		if descriptor.command.trim().is_empty() {
			return Err(ConfigError::EmptyCommand(descriptor.name));
		}
		descriptors.push(descriptor);
	}

	for (i, run) in cli.commands.iter().enumerate() {
		let id = descriptors.len() as ProcessId;
		let name = match cli.names.get(i).filter(|n| !n.trim().is_empty()) {
			Some(name) => {
				let name = name.trim().to_string();
				if !taken.insert(name.clone()) {
					return Err(ConfigError::DuplicateName(name));
				}
				name
			}
			None => {
				let base = default_name(run, id);
				let name = if taken.contains(&base) { format!("{base}-{id}") } else { base };
				taken.insert(name.clone());
				name
			}
		};
		if run.trim().is_empty() {
			return Err(ConfigError::EmptyCommand(name));
		}
		descriptors.push(
			CommandDescriptor::new(id, name, run.clone())
				.with_restart(RestartPolicy::resolve(PolicyOverride::default(), global)),
		);
	}

	if descriptors.is_empty() {
		return Err(ConfigError::NoProcesses);
	}
	Ok(Plan { descriptors, max_lines })
}

/// First word of the command, or its index when there is none.
fn default_name(command: &str, id: ProcessId) -> String {
	command
		.split_whitespace()
		.next()
		.map(str::to_string)
		.unwrap_or_else(|| id.to_string())
}
