use owo_colors::{AnsiColors, OwoColorize};
use serde::Serialize;
use std::collections::HashMap;

use tandem::heuristic::strip_ansi;
use tandem::{CommandDescriptor, ProcessId, SupervisorEvent};

const PALETTE: [AnsiColors; 6] = [
	AnsiColors::Cyan,
	AnsiColors::Magenta,
	AnsiColors::Yellow,
	AnsiColors::Green,
	AnsiColors::Blue,
	AnsiColors::BrightCyan,
];

/// Turns supervisor events into terminal lines.
pub struct Presenter {
	names: HashMap<ProcessId, String>,
	width: usize,
	json: bool,
	color: bool,
}

#[derive(Serialize)]
struct JsonRecord<'a> {
	name: &'a str,
	#[serde(flatten)]
	event: &'a SupervisorEvent,
}

impl Presenter {
	pub fn new(descriptors: &[CommandDescriptor], json: bool, color: bool) -> Self {
		let names: HashMap<_, _> = descriptors.iter().map(|d| (d.id, d.name.clone())).collect();
		let width = names.values().map(|n| n.chars().count()).max().unwrap_or(0);
		Self { names, width, json, color }
	}

	fn name(&self, id: ProcessId) -> &str {
		self.names.get(&id).map(String::as_str).unwrap_or("?")
	}

	/// `None` for events that have no line of their own in text mode.
	pub fn render(&self, event: &SupervisorEvent) -> Option<String> {
		if self.json {
			let record = JsonRecord { name: self.name(event.id()), event };
			return serde_json::to_string(&record).ok();
		}

		let SupervisorEvent::Log { id, line, is_system, .. } = event else {
			return None;
		};
		let label = format!("{:<width$}", self.name(*id), width = self.width);

		if !self.color {
			return Some(format!("{label} │ {}", strip_ansi(line)));
		}
		let color = PALETTE[*id as usize % PALETTE.len()];
		let body = if *is_system { line.dimmed().to_string() } else { line.clone() };
		Some(format!("{} {} {body}", label.color(color), "│".dimmed()))
	}
}
