//! Turning SIGINT / SIGTERM into an orderly [`Supervisor::kill_all`].

use std::sync::Arc;

use tokio::sync::watch;
use tracing::{info, warn};

use crate::supervisor::Supervisor;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownSignal {
	Interrupt,
	Terminate,
}

impl ShutdownSignal {
	/// Conventional shell exit status: 128 plus the signal number.
	pub fn exit_code(self) -> i32 {
		match self {
			ShutdownSignal::Interrupt => 130,
			ShutdownSignal::Terminate => 143,
		}
	}
}

/// Listen for SIGINT (and SIGTERM on Unix). Each signal stops every process at
/// most once; the receiver turns `Some` after the stop has completed.
pub fn install(supervisor: Arc<Supervisor>) -> watch::Receiver<Option<ShutdownSignal>> {
	let (tx, rx) = watch::channel(None);
	let tx = Arc::new(tx);

	{
		let supervisor = Arc::clone(&supervisor);
		let tx = Arc::clone(&tx);
		tokio::spawn(async move {
			if let Err(e) = tokio::signal::ctrl_c().await {
				warn!(error = %e, "failed to listen for interrupt");
				return;
			}
			info!("interrupt received; stopping all processes");
			supervisor.kill_all().await;
			tx.send_replace(Some(ShutdownSignal::Interrupt));
		});
	}

	#[cfg(unix)]
	tokio::spawn(async move {
		use tokio::signal::unix::{signal, SignalKind};

		let mut term = match signal(SignalKind::terminate()) {
			Ok(term) => term,
			Err(e) => {
				warn!(error = %e, "failed to listen for SIGTERM");
				return;
			}
		};
		if term.recv().await.is_some() {
			info!("SIGTERM received; stopping all processes");
			supervisor.kill_all().await;
			tx.send_replace(Some(ShutdownSignal::Terminate));
		}
	});

	rx
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn exit_codes() {
		assert_eq!(ShutdownSignal::Interrupt.exit_code(), 130);
		assert_eq!(ShutdownSignal::Terminate.exit_code(), 143);
	}
}
