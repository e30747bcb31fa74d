use std::collections::{HashMap, VecDeque};
use std::process::Stdio;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::{Child, Command};
use tokio::sync::{mpsc, watch};
use tokio::task::{AbortHandle, JoinHandle, JoinSet};
use tracing::{debug, info, warn};

use crate::error::SpawnError;
use crate::heuristic;
use crate::logs::{LogStore, LogView, DEFAULT_CAPACITY};
use crate::output::LineBuffer;
use crate::terminate::{self, KillSignal, PlatformKiller, TreeKiller};
use crate::types::*;

pub const START_GLYPH: &str = "▶";
pub const RESTART_GLYPH: &str = "↻";
pub const SUCCESS_GLYPH: &str = "✓";
pub const FAILURE_GLYPH: &str = "✗";
pub const COUNTDOWN_GLYPH: &str = "›";

const GROUP_POLL: Duration = Duration::from_millis(20);

#[derive(Debug, Clone)]
pub struct SupervisorConfig {
	/// Per-process log capacity; the unified view holds ten times this.
	pub log_capacity: usize,
	/// How long a SIGTERM'd tree gets before SIGKILL.
	pub graceful_timeout: Duration,
	/// How long to wait for the exit event after SIGKILL.
	pub force_timeout: Duration,
	/// After the child exits, how long its pipes may keep delivering output.
	pub drain_timeout: Duration,
	/// Number of recent lines checked before clearing an `error` status.
	pub recovery_window: usize,
}

impl Default for SupervisorConfig {
	fn default() -> Self {
		Self {
			log_capacity: DEFAULT_CAPACITY,
			graceful_timeout: Duration::from_millis(1000),
			force_timeout: Duration::from_millis(500),
			drain_timeout: Duration::from_millis(250),
			recovery_window: 10,
		}
	}
}

/// Owns every child process and decides when to restart them.
///
/// All state lives behind one mutex that is never held across an `.await`,
/// and every event is emitted while that mutex is held, so observers see the
/// transitions of a given process in exactly the order they happened.
pub struct Supervisor {
	config: SupervisorConfig,
	state: Mutex<State>,
	logs: Arc<RwLock<LogStore>>,
	listeners: Mutex<Vec<Listener>>,
	next_listener: AtomicU64,
	next_timer: AtomicU64,
	killer: Arc<dyn TreeKiller>,
	stopping: AtomicBool,
}

#[derive(Default)]
struct State {
	entries: HashMap<ProcessId, Entry>,
}

/// Everything known about one command across all of its attempts.
struct Entry {
	descriptor: CommandDescriptor,
	record: ProcessRecord,
	generation: u64,
	restart_count: u32,
	crash_count: u32,
	is_restarting: bool,
	pending_restart: Option<PendingRestart>,
	restart_lock: Arc<tokio::sync::Mutex<()>>,
}

struct PendingRestart {
	token: u64,
	handle: AbortHandle,
}

/// The most recent attempt at running a command.
struct ProcessRecord {
	generation: u64,
	status: Status,
	pid: Option<u32>,
	/// Process group of the attempt. Outlives `pid` until the group is empty.
	pgid: Option<u32>,
	exited: bool,
	exit_code: Option<i32>,
	intentional_exit: bool,
	stdout: LineBuffer,
	stderr: LineBuffer,
	recent: VecDeque<bool>,
	kill_tx: Option<mpsc::UnboundedSender<KillSignal>>,
	exit_rx: Option<watch::Receiver<bool>>,
}

struct Listener {
	id: u64,
	tx: mpsc::UnboundedSender<SupervisorEvent>,
}

/// A live feed of supervisor events. Dropping it unsubscribes.
pub struct Subscription {
	id: u64,
	rx: mpsc::UnboundedReceiver<SupervisorEvent>,
}

impl Subscription {
	pub fn id(&self) -> u64 {
		self.id
	}

	/// Next event, or `None` once unsubscribed and drained.
	pub async fn recv(&mut self) -> Option<SupervisorEvent> {
		self.rx.recv().await
	}

	pub fn try_recv(&mut self) -> Option<SupervisorEvent> {
		self.rx.try_recv().ok()
	}
}

impl Entry {
	fn new(descriptor: CommandDescriptor) -> Self {
		Self {
			descriptor,
			record: ProcessRecord::new(0),
			generation: 0,
			restart_count: 0,
			crash_count: 0,
			is_restarting: false,
			pending_restart: None,
			restart_lock: Arc::new(tokio::sync::Mutex::new(())),
		}
	}

	fn id(&self) -> ProcessId {
		self.descriptor.id
	}

	fn cancel_pending_restart(&mut self) -> bool {
		match self.pending_restart.take() {
			Some(pending) => {
				pending.handle.abort();
				true
			}
			None => false,
		}
	}
}

impl ProcessRecord {
	fn new(generation: u64) -> Self {
		Self {
			generation,
			status: Status::Stopped,
			pid: None,
			pgid: None,
			exited: true,
			exit_code: None,
			intentional_exit: false,
			stdout: LineBuffer::new(),
			stderr: LineBuffer::new(),
			recent: VecDeque::new(),
			kill_tx: None,
			exit_rx: None,
		}
	}

	fn buffer_mut(&mut self, source: LogSource) -> &mut LineBuffer {
		match source {
			LogSource::Stdout => &mut self.stdout,
			LogSource::Stderr => &mut self.stderr,
		}
	}

	fn remember(&mut self, is_error: bool, window: usize) {
		self.recent.push_back(is_error);
		while self.recent.len() > window {
			self.recent.pop_front();
		}
	}

	fn is_alive(&self) -> bool {
		!self.exited && !self.intentional_exit
	}
}

impl Supervisor {
	pub fn new(config: SupervisorConfig) -> Arc<Self> {
		Self::with_killer(config, Arc::new(PlatformKiller))
	}

	/// Like [`Supervisor::new`] but with a custom way of signalling process trees.
	pub fn with_killer(config: SupervisorConfig, killer: Arc<dyn TreeKiller>) -> Arc<Self> {
		let logs = Arc::new(RwLock::new(LogStore::new(config.log_capacity)));
		Arc::new(Self {
			config,
			state: Mutex::new(State::default()),
			logs,
			listeners: Mutex::new(Vec::new()),
			next_listener: AtomicU64::new(1),
			next_timer: AtomicU64::new(1),
			killer,
			stopping: AtomicBool::new(false),
		})
	}

	pub fn config(&self) -> &SupervisorConfig {
		&self.config
	}

	fn lock(&self) -> MutexGuard<'_, State> {
		self.state.lock().unwrap_or_else(PoisonError::into_inner)
	}

	// --- observers ---

	pub fn subscribe(&self) -> Subscription {
		let id = self.next_listener.fetch_add(1, Ordering::Relaxed);
		let (tx, rx) = mpsc::unbounded_channel();
		self.listeners
			.lock()
			.unwrap_or_else(PoisonError::into_inner)
			.push(Listener { id, tx });
		Subscription { id, rx }
	}

	pub fn unsubscribe(&self, subscription_id: u64) -> bool {
		let mut listeners = self.listeners.lock().unwrap_or_else(PoisonError::into_inner);
		let before = listeners.len();
		listeners.retain(|l| l.id != subscription_id);
		listeners.len() != before
	}

	fn emit(&self, event: SupervisorEvent) {
		let mut listeners = self.listeners.lock().unwrap_or_else(PoisonError::into_inner);
		listeners.retain(|l| l.tx.send(event.clone()).is_ok());
	}

	fn emit_restart_state(&self, entry: &Entry) {
		self.emit(SupervisorEvent::Restart {
			id: entry.id(),
			is_restarting: entry.is_restarting,
			restart_count: entry.restart_count,
			crash_count: entry.crash_count,
		});
	}

	fn set_status(&self, entry: &mut Entry, status: Status) {
		entry.record.status = status;
		self.emit(SupervisorEvent::Status {
			id: entry.id(),
			status,
		});
	}

	fn log(&self, id: ProcessId, line: String, source: LogSource, is_system: bool) {
		self.logs
			.write()
			.unwrap_or_else(PoisonError::into_inner)
			.append(id, line.clone(), source, is_system);
		self.emit(SupervisorEvent::Log {
			id,
			line,
			source,
			is_system,
		});
	}

	// --- logs ---

	pub fn logs(&self) -> LogView {
		LogView::new(Arc::clone(&self.logs))
	}

	pub fn clear_logs(&self, id: Option<ProcessId>) {
		self.logs.write().unwrap_or_else(PoisonError::into_inner).clear(id);
	}

	// --- queries ---

	pub fn get_status(&self, id: ProcessId) -> Status {
		self.lock()
			.entries
			.get(&id)
			.map_or(Status::Unknown, |e| e.record.status)
	}

	pub fn is_restarting(&self, id: ProcessId) -> bool {
		self.lock().entries.get(&id).is_some_and(|e| e.is_restarting)
	}

	pub fn get_restart_count(&self, id: ProcessId) -> u32 {
		self.lock().entries.get(&id).map_or(0, |e| e.restart_count)
	}

	pub fn get_crash_count(&self, id: ProcessId) -> u32 {
		self.lock().entries.get(&id).map_or(0, |e| e.crash_count)
	}

	pub fn pid(&self, id: ProcessId) -> Option<u32> {
		self.lock().entries.get(&id).and_then(|e| e.record.pid)
	}

	/// Exit code of the most recent attempt; `None` while running or after a signal.
	pub fn exit_code(&self, id: ProcessId) -> Option<i32> {
		self.lock()
			.entries
			.get(&id)
			.filter(|e| e.record.exited)
			.and_then(|e| e.record.exit_code)
	}

	pub fn descriptor(&self, id: ProcessId) -> Option<CommandDescriptor> {
		self.lock().entries.get(&id).map(|e| e.descriptor.clone())
	}

	pub fn ids(&self) -> Vec<ProcessId> {
		let mut ids: Vec<_> = self.lock().entries.keys().copied().collect();
		ids.sort_unstable();
		ids
	}

	/// Whether [`Supervisor::kill_all`] has been called.
	pub fn is_stopping(&self) -> bool {
		self.stopping.load(Ordering::SeqCst)
	}

	/// Nothing is running and nothing is waiting to be restarted.
	pub fn is_settled(&self) -> bool {
		self.lock()
			.entries
			.values()
			.all(|e| e.record.exited && !e.is_restarting && e.pending_restart.is_none())
	}

	// --- commands ---

	/// Spawn one command. Returns immediately; failures show up as an `error` status.
	pub fn start(self: &Arc<Self>, descriptor: CommandDescriptor) -> ProcessHandle {
		let id = descriptor.id;
		{
			let mut state = self.lock();
			match state.entries.get_mut(&id) {
				Some(entry) if !entry.record.exited => {
					debug!(id, "start requested for a running process; ignoring");
					return ProcessHandle {
						id,
						pid: entry.record.pid,
					};
				}
				Some(entry) => {
					if entry.cancel_pending_restart() || entry.is_restarting {
						entry.is_restarting = false;
						self.emit_restart_state(entry);
					}
				}
				None => {
					state.entries.insert(id, Entry::new(descriptor));
				}
			}
		}
		self.spawn_record(id)
	}

	/// Spawn every command independently; one failing does not stop the rest.
	pub fn start_all(
		self: &Arc<Self>,
		descriptors: impl IntoIterator<Item = CommandDescriptor>,
	) -> Vec<ProcessHandle> {
		descriptors.into_iter().map(|d| self.start(d)).collect()
	}

	/// Replace the current process with a fresh one.
	///
	/// Resolves once the replacement has been spawned, not once it is healthy.
	/// Unknown ids are ignored.
	pub async fn restart(self: &Arc<Self>, id: ProcessId, manual: bool) {
		let lock = match self.lock().entries.get(&id) {
			Some(entry) => Arc::clone(&entry.restart_lock),
			None => return,
		};
		let _serialized = lock.lock().await;

		{
			let mut state = self.lock();
			let Some(entry) = state.entries.get_mut(&id) else {
				return;
			};
			if entry.cancel_pending_restart() {
				debug!(id, "cancelled pending restart");
			}
			if manual {
				entry.is_restarting = true;
				self.emit_restart_state(entry);
				self.log(id, format!("{RESTART_GLYPH} Restarting…"), LogSource::Stdout, true);
			}
		}

		self.terminate(id).await;

		if self.stopping.load(Ordering::SeqCst) {
			debug!(id, "shutting down; not respawning");
			let mut state = self.lock();
			if let Some(entry) = state.entries.get_mut(&id) {
				if entry.is_restarting {
					entry.is_restarting = false;
					self.emit_restart_state(entry);
				}
			}
			return;
		}

		{
			let mut state = self.lock();
			let Some(entry) = state.entries.get_mut(&id) else {
				return;
			};
			entry.restart_count += 1;
			entry.is_restarting = false;
		}
		info!(id, manual, "restarting process");
		self.spawn_record(id);

		let state = self.lock();
		if let Some(entry) = state.entries.get(&id) {
			self.emit_restart_state(entry);
		}
	}

	/// Stop everything: cancel pending restarts, then terminate every process
	/// tree concurrently. Safe to call repeatedly.
	pub async fn kill_all(self: &Arc<Self>) {
		self.stopping.store(true, Ordering::SeqCst);

		let ids: Vec<ProcessId> = {
			let mut state = self.lock();
			for entry in state.entries.values_mut() {
				let cancelled = entry.cancel_pending_restart();
				if cancelled || entry.is_restarting {
					entry.is_restarting = false;
					self.emit_restart_state(entry);
				}
			}
			state
				.entries
				.values()
				.filter(|e| !e.record.exited || e.record.pgid.is_some())
				.map(Entry::id)
				.collect()
		};

		info!(count = ids.len(), "terminating all processes");
		let mut tasks = JoinSet::new();
		for id in ids {
			let sup = Arc::clone(self);
			tasks.spawn(async move {
				sup.terminate(id).await;
				sup.stop_orphans(id).await;
			});
		}
		while tasks.join_next().await.is_some() {}
	}

	// --- lifecycle internals ---

	fn spawn_record(self: &Arc<Self>, id: ProcessId) -> ProcessHandle {
		let descriptor = match self.lock().entries.get(&id) {
			Some(entry) => entry.descriptor.clone(),
			None => return ProcessHandle { id, pid: None },
		};
		let spawned = spawn_child(&descriptor);

		let mut state = self.lock();
		let Some(entry) = state.entries.get_mut(&id) else {
			return ProcessHandle { id, pid: None };
		};
		entry.generation += 1;
		let generation = entry.generation;
		entry.record = ProcessRecord::new(generation);

		match spawned {
			Ok(mut child) => {
				let pid = child.id();
				let (kill_tx, kill_rx) = mpsc::unbounded_channel();
				let (exit_tx, exit_rx) = watch::channel(false);
				entry.record.pid = pid;
				entry.record.pgid = pid;
				entry.record.exited = false;
				entry.record.kill_tx = Some(kill_tx);
				entry.record.exit_rx = Some(exit_rx);

				self.set_status(entry, Status::Running);
				self.log(
					id,
					format!("{START_GLYPH} {}", descriptor.command),
					LogSource::Stdout,
					true,
				);
				info!(id, pid, name = %descriptor.name, "process started");

				let mut readers = Vec::with_capacity(2);
				if let Some(stdout) = child.stdout.take() {
					readers.push(tokio::spawn(pump_output(
						Arc::clone(self),
						id,
						generation,
						LogSource::Stdout,
						stdout,
					)));
				}
				if let Some(stderr) = child.stderr.take() {
					readers.push(tokio::spawn(pump_output(
						Arc::clone(self),
						id,
						generation,
						LogSource::Stderr,
						stderr,
					)));
				}
				tokio::spawn(watch_exit(
					Arc::clone(self),
					id,
					generation,
					child,
					kill_rx,
					exit_tx,
					readers,
				));

				ProcessHandle { id, pid }
			}
			Err(e) => {
				warn!(id, name = %descriptor.name, error = %e, "failed to spawn process");
				self.set_status(entry, Status::Error);
				self.settle_exit(
					entry,
					None,
					format!("{FAILURE_GLYPH} Failed to start: {e}"),
					LogSource::Stderr,
				);
				ProcessHandle { id, pid: None }
			}
		}
	}

	fn ingest(&self, id: ProcessId, generation: u64, source: LogSource, chunk: &[u8]) {
		let mut state = self.lock();
		let Some(entry) = state.entries.get_mut(&id) else {
			return;
		};
		if entry.record.generation != generation {
			return;
		}
		let lines = entry.record.buffer_mut(source).push(chunk);
		for line in lines {
			self.record_line(entry, line, source);
		}
	}

	fn record_line(&self, entry: &mut Entry, line: String, source: LogSource) {
		let is_error = heuristic::is_error_line(&line);
		self.log(entry.id(), line, source, false);
		entry.record.remember(is_error, self.config.recovery_window);

		match entry.record.status {
			Status::Running if is_error => self.set_status(entry, Status::Error),
			Status::Error
				if entry.record.is_alive() && !entry.record.recent.iter().any(|&e| e) =>
			{
				self.set_status(entry, Status::Running)
			}
			_ => {}
		}
	}

	fn handle_exit(self: &Arc<Self>, id: ProcessId, generation: u64, code: Option<i32>) {
		let mut state = self.lock();
		let Some(entry) = state.entries.get_mut(&id) else {
			return;
		};
		if entry.record.generation != generation {
			debug!(id, generation, "exit from a replaced process; ignoring");
			return;
		}

		entry.record.exited = true;
		entry.record.exit_code = code;
		entry.record.pid = None;
		entry.record.kill_tx = None;
		for source in [LogSource::Stdout, LogSource::Stderr] {
			if let Some(line) = entry.record.buffer_mut(source).flush() {
				self.record_line(entry, line, source);
			}
		}
		self.set_status(entry, Status::Stopped);
		info!(id, ?code, intentional = entry.record.intentional_exit, "process exited");

		let source = if code == Some(0) {
			LogSource::Stdout
		} else {
			LogSource::Stderr
		};
		self.settle_exit(entry, code, exit_message(code), source);
	}

	/// Crash accounting and restart policy for an attempt that just ended,
	/// either by exiting or by never starting.
	fn settle_exit(
		self: &Arc<Self>,
		entry: &mut Entry,
		code: Option<i32>,
		message: String,
		source: LogSource,
	) {
		let intentional = entry.record.intentional_exit;
		if !intentional && code != Some(0) {
			entry.crash_count += 1;
			self.emit_restart_state(entry);
		}

		let policy = entry.descriptor.restart;
		if !intentional && !self.stopping.load(Ordering::SeqCst) && policy.should_restart(code) {
			self.schedule_restart(entry, policy.delay, message, source);
		} else {
			self.log(entry.id(), message, source, true);
		}
	}

	fn schedule_restart(
		self: &Arc<Self>,
		entry: &mut Entry,
		delay: Duration,
		message: String,
		source: LogSource,
	) {
		let id = entry.id();
		entry.cancel_pending_restart();
		entry.is_restarting = true;
		self.emit_restart_state(entry);
		self.log(
			id,
			format!("{message} {COUNTDOWN_GLYPH} {}", format_delay(delay)),
			source,
			true,
		);

		let token = self.next_timer.fetch_add(1, Ordering::Relaxed);
		let sup = Arc::clone(self);
		let task = tokio::spawn(async move {
			tokio::time::sleep(delay).await;
			sup.fire_restart(id, token).await;
		});
		entry.pending_restart = Some(PendingRestart {
			token,
			handle: task.abort_handle(),
		});
		info!(id, delay_ms = delay.as_millis() as u64, "restart scheduled");
	}

	async fn fire_restart(self: &Arc<Self>, id: ProcessId, token: u64) {
		{
			let mut state = self.lock();
			let Some(entry) = state.entries.get_mut(&id) else {
				return;
			};
			match &entry.pending_restart {
				Some(pending) if pending.token == token => entry.pending_restart = None,
				_ => return,
			}
		}
		self.restart(id, false).await;
	}

	/// SIGTERM the tree, wait, SIGKILL the tree, wait. Marks the exit as
	/// intentional first so it is neither counted as a crash nor restarted.
	/// Group members that outlive the leader are swept afterwards.
	async fn terminate(&self, id: ProcessId) {
		let deadline = tokio::time::Instant::now() + self.config.graceful_timeout;
		let (pgid, kill_tx, mut exit_rx) = {
			let mut state = self.lock();
			let Some(entry) = state.entries.get_mut(&id) else {
				return;
			};
			let record = &mut entry.record;
			if record.exited {
				return;
			}
			let (Some(kill_tx), Some(exit_rx)) = (record.kill_tx.clone(), record.exit_rx.clone())
			else {
				return;
			};
			record.intentional_exit = true;
			(record.pgid, kill_tx, exit_rx)
		};

		debug!(id, "sending graceful termination");
		let _ = kill_tx.send(KillSignal::Graceful);
		if !wait_for_exit(&mut exit_rx, self.config.graceful_timeout).await {
			warn!(
				id,
				timeout_ms = self.config.graceful_timeout.as_millis() as u64,
				"process ignored graceful termination; killing"
			);
			let _ = kill_tx.send(KillSignal::Force);
			if !wait_for_exit(&mut exit_rx, self.config.force_timeout).await {
				warn!(id, "process still running after forced kill");
			}
		}

		if let Some(pgid) = pgid {
			self.sweep_group(id, pgid, deadline).await;
		}
	}

	/// For an attempt that already exited on its own: terminate whatever it
	/// left behind in its process group.
	async fn stop_orphans(&self, id: ProcessId) {
		let pgid = {
			let state = self.lock();
			match state.entries.get(&id) {
				Some(entry) if entry.record.exited => entry.record.pgid,
				_ => None,
			}
		};
		let Some(pgid) = pgid else {
			return;
		};

		let deadline = tokio::time::Instant::now() + self.config.graceful_timeout;
		if self.killer.is_tree_alive(pgid) {
			debug!(id, pgid, "leader already exited; terminating the rest of its group");
			let _ = self.killer.signal_tree(pgid, KillSignal::Graceful);
		}
		self.sweep_group(id, pgid, deadline).await;
	}

	/// Wait until `deadline` for the group to empty, then SIGKILL what is left.
	/// Signal errors are ignored: an empty group is the goal.
	async fn sweep_group(&self, id: ProcessId, pgid: u32, deadline: tokio::time::Instant) {
		while self.killer.is_tree_alive(pgid) {
			if tokio::time::Instant::now() >= deadline {
				warn!(id, pgid, "process group outlived its leader; killing");
				let _ = self.killer.signal_tree(pgid, KillSignal::Force);
				break;
			}
			tokio::time::sleep(GROUP_POLL).await;
		}

		let mut state = self.lock();
		if let Some(entry) = state.entries.get_mut(&id) {
			if entry.record.pgid == Some(pgid) {
				entry.record.pgid = None;
			}
		}
	}
}

/// `true` once the exit has been handled (or the watcher is gone).
async fn wait_for_exit(exit_rx: &mut watch::Receiver<bool>, limit: Duration) -> bool {
	tokio::time::timeout(limit, exit_rx.wait_for(|exited| *exited))
		.await
		.is_ok()
}

fn shell_command(command: &str) -> Command {
	if cfg!(windows) {
		let mut c = Command::new("cmd");
		c.arg("/C").arg(command);
		c
	} else {
		let mut c = Command::new("sh");
		c.arg("-c").arg(command);
		c
	}
}

fn spawn_child(descriptor: &CommandDescriptor) -> Result<Child, SpawnError> {
	if descriptor.command.trim().is_empty() {
		return Err(SpawnError::EmptyCommand);
	}

	let mut cmd = shell_command(&descriptor.command);
	cmd.stdin(Stdio::null())
		.stdout(Stdio::piped())
		.stderr(Stdio::piped())
		.env("FORCE_COLOR", "1");

	// Own process group, so the whole tree can be signalled at once.
	#[cfg(unix)]
	cmd.process_group(0);
	#[cfg(windows)]
	cmd.creation_flags(0x0000_0200);

	if let Some(cwd) = &descriptor.cwd {
		if !cwd.is_dir() {
			return Err(SpawnError::MissingCwd(cwd.clone()));
		}
		cmd.current_dir(cwd);
	}
	for (key, val) in &descriptor.env {
		cmd.env(key, val);
	}

	Ok(cmd.spawn()?)
}

async fn pump_output<R: AsyncRead + Unpin>(
	supervisor: Arc<Supervisor>,
	id: ProcessId,
	generation: u64,
	source: LogSource,
	mut reader: R,
) {
	let mut buf = [0u8; 4096];
	loop {
		match reader.read(&mut buf).await {
			Ok(0) => break,
			Ok(n) => supervisor.ingest(id, generation, source, &buf[..n]),
			Err(e) => {
				debug!(id, ?source, error = %e, "output pipe closed with error");
				break;
			}
		}
	}
}

async fn watch_exit(
	supervisor: Arc<Supervisor>,
	id: ProcessId,
	generation: u64,
	mut child: Child,
	mut kill_rx: mpsc::UnboundedReceiver<KillSignal>,
	exit_tx: watch::Sender<bool>,
	readers: Vec<JoinHandle<()>>,
) {
	let pid = child.id();
	let status = loop {
		tokio::select! {
			status = child.wait() => break status,
			Some(signal) = kill_rx.recv() => {
				deliver_signal(supervisor.killer.as_ref(), id, pid, &mut child, signal);
			}
		}
	};

	// Give the readers a moment to pick up whatever the child wrote last.
	let deadline = tokio::time::Instant::now() + supervisor.config.drain_timeout;
	for mut reader in readers {
		if tokio::time::timeout_at(deadline, &mut reader).await.is_err() {
			debug!(id, "output still open after exit; detaching reader");
			reader.abort();
		}
	}

	let code = match status {
		Ok(status) => status.code(),
		Err(e) => {
			warn!(id, error = %e, "failed to wait for process");
			None
		}
	};
	supervisor.handle_exit(id, generation, code);
	let _ = exit_tx.send(true);
}

fn deliver_signal(
	killer: &dyn TreeKiller,
	id: ProcessId,
	pid: Option<u32>,
	child: &mut Child,
	signal: KillSignal,
) {
	let grouped = match pid {
		Some(pid) => killer.signal_tree(pid, signal),
		None => Err(std::io::Error::other("process has no pid")),
	};
	if let Err(e) = grouped {
		debug!(id, ?signal, error = %e, "could not signal process group; signalling child directly");
		if let Err(e) = terminate::signal_child(child, signal) {
			warn!(id, ?signal, error = %e, "failed to signal process");
		}
	}
}

/// `✓ Process exited with code 0`, `✗ Process exited with code null`, ...
pub fn exit_message(code: Option<i32>) -> String {
	let glyph = if code == Some(0) {
		SUCCESS_GLYPH
	} else {
		FAILURE_GLYPH
	};
	match code {
		Some(code) => format!("{glyph} Process exited with code {code}"),
		None => format!("{glyph} Process exited with code null"),
	}
}

/// Seconds without trailing zeros: `2s`, `1.5s`, `0.25s`.
pub fn format_delay(delay: Duration) -> String {
	let millis = delay.as_millis();
	if millis % 1000 == 0 {
		format!("{}s", millis / 1000)
	} else {
		let secs = format!("{}.{:03}", millis / 1000, millis % 1000);
		format!("{}s", secs.trim_end_matches('0'))
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn exit_messages() {
		assert_eq!(exit_message(Some(0)), "✓ Process exited with code 0");
		assert_eq!(exit_message(Some(1)), "✗ Process exited with code 1");
		assert_eq!(exit_message(None), "✗ Process exited with code null");
	}

	#[test]
	fn delay_formatting() {
		assert_eq!(format_delay(Duration::from_millis(2000)), "2s");
		assert_eq!(format_delay(Duration::from_millis(1500)), "1.5s");
		assert_eq!(format_delay(Duration::from_millis(250)), "0.25s");
		assert_eq!(format_delay(Duration::ZERO), "0s");
	}

	#[test]
	fn recovery_window_is_bounded() {
		let mut record = ProcessRecord::new(1);
		record.remember(true, 3);
		for _ in 0..3 {
			record.remember(false, 3);
		}
		assert_eq!(record.recent.len(), 3);
		assert!(!record.recent.iter().any(|&e| e));
	}

	#[test]
	fn unknown_ids_read_as_zero() {
		let sup = Supervisor::new(SupervisorConfig::default());
		assert_eq!(sup.get_status(9), Status::Unknown);
		assert!(!sup.is_restarting(9));
		assert_eq!(sup.get_restart_count(9), 0);
		assert_eq!(sup.get_crash_count(9), 0);
		assert_eq!(sup.pid(9), None);
		assert!(sup.is_settled());
	}

	#[tokio::test]
	async fn unsubscribe_closes_feed() {
		let sup = Supervisor::new(SupervisorConfig::default());
		let mut sub = sup.subscribe();
		assert!(sup.unsubscribe(sub.id()));
		assert!(!sup.unsubscribe(sub.id()));
		assert_eq!(sub.recv().await, None);
	}

	#[tokio::test]
	async fn restart_of_unknown_id_is_a_noop() {
		let sup = Supervisor::new(SupervisorConfig::default());
		sup.restart(5, true).await;
		sup.kill_all().await;
		assert_eq!(sup.get_status(5), Status::Unknown);
	}
}
