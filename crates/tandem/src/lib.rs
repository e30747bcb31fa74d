//! # tandem
//!
//! Run several shell commands side by side, keep their output, and bring
//! them back when they die.
//!
//! A [`Supervisor`] spawns each command in its own process group, splits its
//! stdout and stderr into lines, and stores them in a bounded [`LogStore`].
//! Lines that look like failures flip the process into the `error` status
//! until enough clean output follows. Restarts follow each command's
//! [`RestartPolicy`], and [`Supervisor::kill_all`] takes whole process trees
//! down, escalating from SIGTERM to SIGKILL.
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use std::time::Duration;
//! use tandem::{CommandDescriptor, RestartMode, RestartPolicy, Supervisor, SupervisorConfig};
//!
//! # #[tokio::main]
//! # async fn main() {
//! let sup = Supervisor::new(SupervisorConfig::default());
//! let mut events = sup.subscribe();
//!
//! sup.start_all(vec![
//! 	CommandDescriptor::new(0, "web", "npm run dev")
//! 		.with_restart(RestartPolicy::new(RestartMode::OnError, Duration::from_secs(2))),
//! 	CommandDescriptor::new(1, "worker", "cargo run --bin worker"),
//! ]);
//!
//! while let Some(event) = events.recv().await {
//! 	println!("{}", serde_json::to_string(&event).unwrap());
//! 	if sup.is_settled() {
//! 		break;
//! 	}
//! }
//! sup.kill_all().await;
//! # }
//! ```

pub mod error;
pub mod heuristic;
pub mod logs;
pub mod output;
pub mod shutdown;
pub mod supervisor;
pub mod terminate;
pub mod types;

pub use error::SpawnError;
pub use logs::{LogStore, LogView};
pub use shutdown::ShutdownSignal;
pub use supervisor::{Subscription, Supervisor, SupervisorConfig};
pub use types::*;
