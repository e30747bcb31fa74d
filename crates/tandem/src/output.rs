/// A pending line longer than this is emitted as-is without waiting for `\n`.
pub const MAX_PENDING_LINE: usize = 64 * 1024;

/// Turns arbitrary read chunks back into whole lines.
///
/// Works on bytes so a UTF-8 sequence split across two reads is decoded only
/// once it is complete.
#[derive(Debug, Default)]
pub struct LineBuffer {
	pending: Vec<u8>,
}

impl LineBuffer {
	pub fn new() -> Self {
		Self::default()
	}

	/// Feed one chunk and collect every line it completes.
	pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
		let mut lines = Vec::new();
		let mut rest = chunk;

		while let Some(pos) = rest.iter().position(|&b| b == b'\n') {
			self.pending.extend_from_slice(&rest[..pos]);
			lines.push(self.take_line());
			rest = &rest[pos + 1..];
		}
		self.pending.extend_from_slice(rest);

		while self.pending.len() > MAX_PENDING_LINE {
			let tail = self.pending.split_off(forced_split(&self.pending));
			lines.push(self.take_line());
			self.pending = tail;
		}

		lines
	}

	/// Whatever is left without a trailing newline, if anything.
	pub fn flush(&mut self) -> Option<String> {
		if self.pending.is_empty() {
			None
		} else {
			Some(self.take_line())
		}
	}

	pub fn is_empty(&self) -> bool {
		self.pending.is_empty()
	}

	fn take_line(&mut self) -> String {
		let mut bytes = std::mem::take(&mut self.pending);
		if bytes.last() == Some(&b'\r') {
			bytes.pop();
		}
		match String::from_utf8(bytes) {
			Ok(line) => line,
			Err(e) => String::from_utf8_lossy(e.as_bytes()).into_owned(),
		}
	}
}

/// Where to cut an oversized line: at `MAX_PENDING_LINE`, moved back to the
/// start of a UTF-8 sequence if it would land inside one.
fn forced_split(bytes: &[u8]) -> usize {
	let is_continuation = |b: u8| b & 0xC0 == 0x80;
	(MAX_PENDING_LINE.saturating_sub(3)..=MAX_PENDING_LINE)
		.rev()
		.find(|&i| i > 0 && !is_continuation(bytes[i]))
		.unwrap_or(MAX_PENDING_LINE)
}
