use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

/// Stable identifier of a command for the whole run.
pub type ProcessId = u32;

/// When a process should be brought back after it exits on its own.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RestartMode {
	#[default]
	Never,
	OnError,
	OnExit,
}

impl FromStr for RestartMode {
	type Err = String;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		match s.trim().to_lowercase().replace('_', "-").as_str() {
			"never" | "no" | "false" => Ok(RestartMode::Never),
			"on-error" | "onerror" | "error" => Ok(RestartMode::OnError),
			"on-exit" | "onexit" | "exit" | "always" => Ok(RestartMode::OnExit),
			other => Err(format!(
				"invalid restart mode: {other} (expected \"never\", \"on-error\" or \"on-exit\")"
			)),
		}
	}
}

impl fmt::Display for RestartMode {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		let s = match self {
			RestartMode::Never => "never",
			RestartMode::OnError => "on-error",
			RestartMode::OnExit => "on-exit",
		};
		f.write_str(s)
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RestartPolicy {
	pub mode: RestartMode,
	pub delay: Duration,
}

impl Default for RestartPolicy {
	fn default() -> Self {
		Self {
			mode: RestartMode::Never,
			delay: Self::DEFAULT_DELAY,
		}
	}
}

impl RestartPolicy {
	pub const DEFAULT_DELAY: Duration = Duration::from_millis(1000);

	pub fn new(mode: RestartMode, delay: Duration) -> Self {
		Self { mode, delay }
	}

	/// Whether an unprompted exit with `exit_code` should schedule a restart.
	/// A missing code (killed by a signal, or never started) counts as a failure.
	pub fn should_restart(&self, exit_code: Option<i32>) -> bool {
		match self.mode {
			RestartMode::Never => false,
			RestartMode::OnError => exit_code != Some(0),
			RestartMode::OnExit => true,
		}
	}

	/// Field-by-field merge: per-process override, then global defaults, then the built-in default.
	pub fn resolve(process: PolicyOverride, global: PolicyOverride) -> Self {
		let merged = process.or(global);
		let fallback = Self::default();
		Self {
			mode: merged.mode.unwrap_or(fallback.mode),
			delay: merged
				.delay_ms
				.map(Duration::from_millis)
				.unwrap_or(fallback.delay),
		}
	}
}

/// Partially specified restart policy, as found in config files and CLI flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
pub struct PolicyOverride {
	#[serde(default)]
	pub mode: Option<RestartMode>,
	#[serde(default)]
	pub delay_ms: Option<u64>,
}

impl PolicyOverride {
	pub fn or(self, fallback: PolicyOverride) -> PolicyOverride {
		PolicyOverride {
			mode: self.mode.or(fallback.mode),
			delay_ms: self.delay_ms.or(fallback.delay_ms),
		}
	}
}

/// Static definition of one supervised command. Never mutated after startup.
#[derive(Debug, Clone, PartialEq)]
pub struct CommandDescriptor {
	pub id: ProcessId,
	pub name: String,
	pub command: String,
	pub restart: RestartPolicy,
	pub cwd: Option<PathBuf>,
	pub env: HashMap<String, String>,
}

impl CommandDescriptor {
	pub fn new(id: ProcessId, name: impl Into<String>, command: impl Into<String>) -> Self {
		Self {
			id,
			name: name.into(),
			command: command.into(),
			restart: RestartPolicy::default(),
			cwd: None,
			env: HashMap::new(),
		}
	}

	pub fn with_restart(mut self, restart: RestartPolicy) -> Self {
		self.restart = restart;
		self
	}

	pub fn with_cwd(mut self, cwd: impl Into<PathBuf>) -> Self {
		self.cwd = Some(cwd.into());
		self
	}

	pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
		self.env.insert(key.into(), value.into());
		self
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
	Running,
	Stopped,
	Error,
	Unknown,
}

impl Status {
	pub fn as_str(&self) -> &'static str {
		match self {
			Status::Running => "running",
			Status::Stopped => "stopped",
			Status::Error => "error",
			Status::Unknown => "unknown",
		}
	}
}

impl fmt::Display for Status {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogSource {
	Stdout,
	Stderr,
}

/// One captured line. ANSI sequences are kept verbatim.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LogEntry {
	/// Arrival order across every process; strictly increasing.
	pub seq: u64,
	pub process_id: ProcessId,
	pub line: String,
	pub source: LogSource,
	pub timestamp: DateTime<Local>,
	/// Written by the supervisor (start, exit, restart notices) rather than the child.
	pub is_system: bool,
}

/// Everything observers can hear from a [`Supervisor`](crate::Supervisor).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum SupervisorEvent {
	Status {
		id: ProcessId,
		status: Status,
	},
	Log {
		id: ProcessId,
		line: String,
		source: LogSource,
		is_system: bool,
	},
	Restart {
		id: ProcessId,
		is_restarting: bool,
		restart_count: u32,
		crash_count: u32,
	},
}

impl SupervisorEvent {
	pub fn id(&self) -> ProcessId {
		match self {
			SupervisorEvent::Status { id, .. }
			| SupervisorEvent::Log { id, .. }
			| SupervisorEvent::Restart { id, .. } => *id,
		}
	}
}

/// What [`Supervisor::start`](crate::Supervisor::start) hands back.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProcessHandle {
	pub id: ProcessId,
	/// `None` when the command could not be spawned.
	pub pid: Option<u32>,
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn restart_mode_from_str() {
		assert_eq!("never".parse::<RestartMode>(), Ok(RestartMode::Never));
		assert_eq!("on-error".parse::<RestartMode>(), Ok(RestartMode::OnError));
		assert_eq!("ON_ERROR".parse::<RestartMode>(), Ok(RestartMode::OnError));
		assert_eq!("on-exit".parse::<RestartMode>(), Ok(RestartMode::OnExit));
		assert_eq!("always".parse::<RestartMode>(), Ok(RestartMode::OnExit));
		assert!("sometimes".parse::<RestartMode>().is_err());
	}

	#[test]
	fn never_policy_never_restarts() {
		let policy = RestartPolicy::new(RestartMode::Never, Duration::ZERO);
		for code in [Some(0), Some(1), Some(137), None] {
			assert!(!policy.should_restart(code));
		}
	}

	#[test]
	fn on_error_restarts_on_nonzero_or_missing_code() {
		let policy = RestartPolicy::new(RestartMode::OnError, Duration::ZERO);
		assert!(!policy.should_restart(Some(0)));
		assert!(policy.should_restart(Some(1)));
		assert!(policy.should_restart(Some(-1)));
		assert!(policy.should_restart(None));
	}

	#[test]
	fn on_exit_always_restarts() {
		let policy = RestartPolicy::new(RestartMode::OnExit, Duration::ZERO);
		for code in [Some(0), Some(2), None] {
			assert!(policy.should_restart(code));
		}
	}

	#[test]
	fn resolve_prefers_process_then_global_then_default() {
		let global = PolicyOverride {
			mode: Some(RestartMode::OnError),
			delay_ms: Some(2000),
		};
		let process = PolicyOverride {
			mode: Some(RestartMode::OnExit),
			delay_ms: None,
		};

		let resolved = RestartPolicy::resolve(process, global);
		assert_eq!(resolved.mode, RestartMode::OnExit);
		assert_eq!(resolved.delay, Duration::from_millis(2000));

		let resolved = RestartPolicy::resolve(PolicyOverride::default(), PolicyOverride::default());
		assert_eq!(resolved, RestartPolicy::default());
		assert_eq!(resolved.delay, Duration::from_millis(1000));
	}

	#[test]
	fn event_serializes_with_tag() {
		let event = SupervisorEvent::Status {
			id: 3,
			status: Status::Error,
		};
		let json = serde_json::to_string(&event).unwrap();
		assert_eq!(json, r#"{"event":"status","id":3,"status":"error"}"#);
	}
}
