use thiserror::Error;

/// Why a command could not be turned into a running child.
///
/// Never returned from the public supervisor API: the supervisor records it as
/// an `error` status plus a system log line.
#[derive(Error, Debug)]
pub enum SpawnError {
	#[error("empty command")]
	EmptyCommand,

	#[error("working directory {0} does not exist")]
	MissingCwd(std::path::PathBuf),

	#[error(transparent)]
	Io(#[from] std::io::Error),
}
