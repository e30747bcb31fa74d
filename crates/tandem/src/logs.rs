use chrono::Local;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, RwLock, RwLockReadGuard};

use crate::types::{LogEntry, LogSource, ProcessId};

/// Lines kept per process before the oldest are evicted.
pub const DEFAULT_CAPACITY: usize = 1000;

/// The unified buffer holds this many times the per-process capacity.
pub const UNIFIED_MULTIPLIER: usize = 10;

/// Bounded, append-only line storage.
///
/// Every entry lands twice: in its process's own buffer and in the unified
/// buffer, which keeps true arrival order across processes without re-sorting
/// on read.
#[derive(Debug)]
pub struct LogStore {
	capacity: usize,
	per_process: HashMap<ProcessId, VecDeque<LogEntry>>,
	unified: VecDeque<LogEntry>,
	next_seq: u64,
}

impl Default for LogStore {
	fn default() -> Self {
		Self::new(DEFAULT_CAPACITY)
	}
}

impl LogStore {
	pub fn new(capacity: usize) -> Self {
		Self {
			capacity,
			per_process: HashMap::new(),
			unified: VecDeque::with_capacity(capacity.saturating_mul(UNIFIED_MULTIPLIER).min(64 * 1024)),
			next_seq: 0,
		}
	}

	pub fn capacity(&self) -> usize {
		self.capacity
	}

	pub fn unified_capacity(&self) -> usize {
		self.capacity.saturating_mul(UNIFIED_MULTIPLIER)
	}

	pub fn append(
		&mut self,
		process_id: ProcessId,
		line: impl Into<String>,
		source: LogSource,
		is_system: bool,
	) -> LogEntry {
		let entry = LogEntry {
			seq: self.next_seq,
			process_id,
			line: line.into(),
			source,
			timestamp: Local::now(),
			is_system,
		};
		self.next_seq += 1;

		let capacity = self.capacity;
		let buffer = self.per_process.entry(process_id).or_default();
		buffer.push_back(entry.clone());
		while buffer.len() > capacity {
			buffer.pop_front();
		}

		let unified_capacity = self.unified_capacity();
		self.unified.push_back(entry.clone());
		while self.unified.len() > unified_capacity {
			self.unified.pop_front();
		}

		entry
	}

	/// Oldest first. Empty for ids that never logged.
	pub fn query(&self, process_id: ProcessId) -> Vec<LogEntry> {
		self.per_process
			.get(&process_id)
			.map(|buffer| buffer.iter().cloned().collect())
			.unwrap_or_default()
	}

	/// All processes interleaved in arrival order, oldest first.
	pub fn query_unified(&self) -> Vec<LogEntry> {
		self.unified.iter().cloned().collect()
	}

	/// The last `n` entries of one process, oldest first.
	pub fn tail(&self, process_id: ProcessId, n: usize) -> Vec<LogEntry> {
		match self.per_process.get(&process_id) {
			Some(buffer) => buffer.iter().skip(buffer.len().saturating_sub(n)).cloned().collect(),
			None => Vec::new(),
		}
	}

	pub fn len(&self, process_id: ProcessId) -> usize {
		self.per_process.get(&process_id).map_or(0, VecDeque::len)
	}

	pub fn unified_len(&self) -> usize {
		self.unified.len()
	}

	pub fn is_empty(&self) -> bool {
		self.unified.is_empty()
	}

	/// Drop one process's buffer, or everything when `process_id` is `None`.
	///
	/// Clearing a single process leaves its lines in the unified buffer.
	pub fn clear(&mut self, process_id: Option<ProcessId>) {
		match process_id {
			Some(id) => {
				self.per_process.remove(&id);
			}
			None => {
				self.per_process.clear();
				self.unified.clear();
			}
		}
	}
}

/// Read-only, cloneable handle onto a supervisor's [`LogStore`].
#[derive(Debug, Clone)]
pub struct LogView {
	store: Arc<RwLock<LogStore>>,
}

impl LogView {
	pub(crate) fn new(store: Arc<RwLock<LogStore>>) -> Self {
		Self { store }
	}

	fn read(&self) -> RwLockReadGuard<'_, LogStore> {
		self.store.read().unwrap_or_else(|poisoned| poisoned.into_inner())
	}

	pub fn query(&self, process_id: ProcessId) -> Vec<LogEntry> {
		self.read().query(process_id)
	}

	pub fn query_unified(&self) -> Vec<LogEntry> {
		self.read().query_unified()
	}

	pub fn tail(&self, process_id: ProcessId, n: usize) -> Vec<LogEntry> {
		self.read().tail(process_id, n)
	}

	pub fn len(&self, process_id: ProcessId) -> usize {
		self.read().len(process_id)
	}

	pub fn capacity(&self) -> usize {
		self.read().capacity()
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn lines(entries: &[LogEntry]) -> Vec<&str> {
		entries.iter().map(|e| e.line.as_str()).collect()
	}

	#[test]
	fn append_and_query_in_order() {
		let mut store = LogStore::new(10);
		store.append(1, "first", LogSource::Stdout, false);
		store.append(1, "second", LogSource::Stderr, false);
		store.append(1, "started", LogSource::Stdout, true);

		let entries = store.query(1);
		assert_eq!(lines(&entries), vec!["first", "second", "started"]);
		assert_eq!(entries[1].source, LogSource::Stderr);
		assert!(entries[2].is_system);
		assert!(entries.iter().all(|e| e.process_id == 1));
	}

	#[test]
	fn unknown_id_is_empty() {
		let store = LogStore::new(10);
		assert!(store.query(42).is_empty());
		assert!(store.tail(42, 5).is_empty());
		assert_eq!(store.len(42), 0);
	}

	#[test]
	fn per_process_capacity_evicts_oldest() {
		let mut store = LogStore::new(3);
		for i in 0..5 {
			store.append(7, format!("line {i}"), LogSource::Stdout, false);
		}
		assert_eq!(store.len(7), 3);
		assert_eq!(lines(&store.query(7)), vec!["line 2", "line 3", "line 4"]);
		// unified holds 30, nothing evicted there yet
		assert_eq!(store.unified_len(), 5);
	}

	#[test]
	fn unified_capacity_is_ten_times_per_process() {
		let mut store = LogStore::new(2);
		assert_eq!(store.unified_capacity(), 20);
		for id in 0..5 {
			for i in 0..5 {
				store.append(id, format!("{id}:{i}"), LogSource::Stdout, false);
			}
		}
		assert_eq!(store.unified_len(), 20);
		let unified = store.query_unified();
		assert_eq!(unified.first().map(|e| e.line.as_str()), Some("1:0"));
		assert_eq!(unified.last().map(|e| e.line.as_str()), Some("4:4"));
	}

	#[test]
	fn unified_keeps_arrival_order_across_processes() {
		let mut store = LogStore::new(10);
		store.append(1, "a1", LogSource::Stdout, false);
		store.append(2, "b1", LogSource::Stdout, false);
		store.append(1, "a2", LogSource::Stdout, false);
		store.append(2, "b2", LogSource::Stderr, false);

		assert_eq!(lines(&store.query_unified()), vec!["a1", "b1", "a2", "b2"]);
		assert_eq!(lines(&store.query(1)), vec!["a1", "a2"]);
		assert_eq!(lines(&store.query(2)), vec!["b1", "b2"]);

		let seqs: Vec<u64> = store.query_unified().iter().map(|e| e.seq).collect();
		assert!(seqs.windows(2).all(|w| w[0] < w[1]));
	}

	#[test]
	fn tail_returns_last_n() {
		let mut store = LogStore::new(10);
		for i in 0..6 {
			store.append(1, format!("{i}"), LogSource::Stdout, false);
		}
		assert_eq!(lines(&store.tail(1, 2)), vec!["4", "5"]);
		assert_eq!(store.tail(1, 100).len(), 6);
	}

	#[test]
	fn clear_one_or_all() {
		let mut store = LogStore::new(10);
		store.append(1, "a", LogSource::Stdout, false);
		store.append(2, "b", LogSource::Stdout, false);

		store.clear(Some(1));
		assert!(store.query(1).is_empty());
		assert_eq!(store.query(2).len(), 1);
		assert_eq!(store.unified_len(), 2);

		store.clear(None);
		assert!(store.query(2).is_empty());
		assert!(store.is_empty());
	}
}
