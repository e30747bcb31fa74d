//! Signalling a child together with everything it spawned.
//!
//! Children are started as leaders of their own process group, so on Unix the
//! whole tree is reached through `killpg`. Windows has no signal groups and
//! uses `taskkill /t` instead. When the tree cannot be signalled the caller
//! falls back to the direct child handle via [`signal_child`].

use std::io;
use tokio::process::Child;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KillSignal {
	/// SIGTERM, or a plain `taskkill /t`.
	Graceful,
	/// SIGKILL, or `taskkill /t /f`.
	Force,
}

/// Delivers a signal to a process and all of its descendants.
pub trait TreeKiller: Send + Sync {
	fn signal_tree(&self, pid: u32, signal: KillSignal) -> io::Result<()>;

	/// Whether anything in the tree rooted at `pid` is still around, even
	/// after `pid` itself has exited. Platforms that cannot tell say no.
	fn is_tree_alive(&self, _pid: u32) -> bool {
		false
	}
}

/// The implementation for the platform we were compiled for.
#[derive(Debug, Clone, Copy, Default)]
pub struct PlatformKiller;

#[cfg(unix)]
impl TreeKiller for PlatformKiller {
	fn signal_tree(&self, pid: u32, signal: KillSignal) -> io::Result<()> {
		use nix::sys::signal::killpg;
		use nix::unistd::Pid;

		let pgid = Pid::from_raw(pid as i32);
		killpg(pgid, unix_signal(signal)).map_err(io::Error::from)
	}

	fn is_tree_alive(&self, pid: u32) -> bool {
		use nix::sys::signal::killpg;
		use nix::unistd::Pid;

		killpg(Pid::from_raw(pid as i32), None::<nix::sys::signal::Signal>).is_ok()
	}
}

#[cfg(windows)]
impl TreeKiller for PlatformKiller {
	fn signal_tree(&self, pid: u32, signal: KillSignal) -> io::Result<()> {
		let pid = pid.to_string();
		let mut cmd = std::process::Command::new("taskkill");
		cmd.args(["/pid", pid.as_str(), "/t"]);
		if signal == KillSignal::Force {
			cmd.arg("/f");
		}
		let status = cmd
			.stdout(std::process::Stdio::null())
			.stderr(std::process::Stdio::null())
			.status()?;
		if status.success() {
			Ok(())
		} else {
			Err(io::Error::new(io::ErrorKind::Other, format!("taskkill exited with {status}")))
		}
	}
}

#[cfg(unix)]
fn unix_signal(signal: KillSignal) -> nix::sys::signal::Signal {
	use nix::sys::signal::Signal;
	match signal {
		KillSignal::Graceful => Signal::SIGTERM,
		KillSignal::Force => Signal::SIGKILL,
	}
}

/// Signal only the direct child. Used when the group could not be reached.
pub fn signal_child(child: &mut Child, signal: KillSignal) -> io::Result<()> {
	#[cfg(unix)]
	if signal == KillSignal::Graceful {
		use nix::sys::signal::kill;
		use nix::unistd::Pid;

		return match child.id() {
			Some(pid) => kill(Pid::from_raw(pid as i32), unix_signal(signal)).map_err(io::Error::from),
			None => Ok(()),
		};
	}

	let _ = signal;
	child.start_kill()
}
