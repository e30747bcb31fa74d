use proptest::prelude::*;
use tandem::{LogSource, LogStore, ProcessId};

proptest! {
	#[test]
	fn buffers_are_bounded_and_keep_the_newest(
		capacity in 1usize..20,
		writes in proptest::collection::vec(0u32..4, 0..300),
	) {
		let mut store = LogStore::new(capacity);
		for (i, id) in writes.iter().enumerate() {
			store.append(*id, format!("{id}:{i}"), LogSource::Stdout, false);
		}

		for id in 0..4 {
			let expected: Vec<String> = writes
				.iter()
				.enumerate()
				.filter(|(_, w)| **w == id)
				.map(|(i, w)| format!("{w}:{i}"))
				.collect();
			let keep = expected.len().saturating_sub(capacity);
			let got: Vec<String> = store.query(id).into_iter().map(|e| e.line).collect();
			prop_assert_eq!(got, expected[keep..].to_vec());
		}

		let unified = store.query_unified();
		prop_assert!(unified.len() <= capacity * 10);
		prop_assert_eq!(unified.len(), writes.len().min(capacity * 10));
	}

	#[test]
	fn unified_is_arrival_order_for_every_process(
		writes in proptest::collection::vec((0u32..3, any::<bool>()), 1..100),
	) {
		let mut store = LogStore::new(1000);
		for (id, err) in &writes {
			let source = if *err { LogSource::Stderr } else { LogSource::Stdout };
			store.append(*id as ProcessId, "x", source, false);
		}

		let unified = store.query_unified();
		prop_assert!(unified.windows(2).all(|w| w[0].seq < w[1].seq));
		let ids: Vec<ProcessId> = unified.iter().map(|e| e.process_id).collect();
		let written: Vec<ProcessId> = writes.iter().map(|(id, _)| *id).collect();
		prop_assert_eq!(ids, written);

		for id in 0..3 {
			let per = store.query(id);
			prop_assert!(per.windows(2).all(|w| w[0].seq < w[1].seq));
			prop_assert!(per.iter().all(|e| e.process_id == id));
		}
	}
}
