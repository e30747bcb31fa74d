//! Guessing whether an output line reports a failure.
//!
//! Purely textual: the answer depends on the line alone, never on which
//! process produced it or what it printed before.

use regex::Regex;
use std::sync::LazyLock;

static SGR: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\x1b\[([0-9;:]*)m").unwrap());

static ANSI: LazyLock<Regex> =
	LazyLock::new(|| Regex::new(r"\x1b\[[0-?]*[ -/]*[@-~]|\x1b\][^\x07\x1b]*(?:\x07|\x1b\\)").unwrap());

/// Keywords match anywhere in the line, including inside longer words.
static KEYWORDS: LazyLock<Regex> = LazyLock::new(|| {
	Regex::new(
		r"(?i)(?:error:|fatal|critical|failed|failure|cannot|uncaught|unhandled|\bpanicked at\b|traceback \(most recent call last\))",
	)
	.unwrap()
});

static EXCEPTION_NAME: LazyLock<Regex> =
	LazyLock::new(|| Regex::new(r"\b[A-Z][A-Za-z0-9]*(?:Error|Exception)\b").unwrap());

static STACK_FRAME: LazyLock<Regex> = LazyLock::new(|| {
	Regex::new(r#"^\s+at\s+\S.*:\d+(?::\d+)?\)?\s*$|^\s*File "[^"]+", line \d+"#).unwrap()
});

pub fn is_error_line(line: &str) -> bool {
	if has_red_foreground(line) {
		return true;
	}
	let plain = strip_ansi(line);
	KEYWORDS.is_match(&plain) || EXCEPTION_NAME.is_match(&plain) || STACK_FRAME.is_match(&plain)
}

/// True when any SGR sequence selects red (31) or bright red (91) as the
/// foreground. Extended 256-color and truecolor arguments are skipped, so
/// `38;5;31` is not red.
pub fn has_red_foreground(line: &str) -> bool {
	SGR.captures_iter(line).any(|caps| {
		let params: Vec<&str> = caps[1].split(';').collect();
		let mut i = 0;
		while i < params.len() {
			match params[i] {
				"31" | "91" => return true,
				"38" | "48" | "58" => {
					i += match params.get(i + 1) {
						Some(&"5") => 3,
						Some(&"2") => 5,
						_ => 1,
					};
				}
				_ => i += 1,
			}
		}
		false
	})
}

pub fn strip_ansi(line: &str) -> std::borrow::Cow<'_, str> {
	ANSI.replace_all(line, "")
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn keyword_matches() {
		assert!(is_error_line("Error: boom"));
		assert!(is_error_line("error: could not compile `foo`"));
		assert!(is_error_line("FATAL: database is down"));
		assert!(is_error_line("critical section exceeded"));
		assert!(is_error_line("Build failed in 3s"));
		assert!(is_error_line("Failed to compile."));
		assert!(is_error_line("cannot find module 'x'"));
		assert!(is_error_line("Uncaught ReferenceError: x is not defined"));
		assert!(is_error_line("UnhandledPromiseRejection: unhandled rejection"));
		assert!(is_error_line("thread 'main' panicked at src/main.rs:2:5"));
	}

	#[test]
	fn keywords_match_inside_words() {
		assert!(is_error_line("UnhandledPromiseRejectionWarning"));
		assert!(is_error_line("the worker exited fatally"));
		assert!(is_error_line("[FAILED]"));
		assert!(is_error_line("npm ERR! code ELIFECYCLE: buildfailed"));
		assert!(is_error_line("uncaughtException"));
	}

	#[test]
	fn exception_names_and_frames() {
		assert!(is_error_line("TypeError: undefined is not a function"));
		assert!(is_error_line("java.lang.NullPointerException"));
		assert!(is_error_line("    at Object.<anonymous> (/app/index.js:10:5)"));
		assert!(is_error_line("\tat com.example.Main.run(Main.java:42)"));
		assert!(is_error_line("  File \"/app/main.py\", line 3, in <module>"));
		assert!(is_error_line("Traceback (most recent call last):"));
	}

	#[test]
	fn ordinary_output_is_clean() {
		assert!(!is_error_line("hello"));
		assert!(!is_error_line("Compiled successfully, 0 errors"));
		assert!(!is_error_line("warning: unused variable"));
		assert!(!is_error_line("listening on http://localhost:3000"));
		assert!(!is_error_line(""));
		assert!(!is_error_line("looking at the data"));
	}

	#[test]
	fn red_foreground_is_error() {
		assert!(is_error_line("\x1b[31msomething\x1b[0m"));
		assert!(is_error_line("\x1b[91mbright\x1b[0m"));
		assert!(is_error_line("\x1b[1;31mbold red\x1b[0m"));
		assert!(is_error_line("\x1b[0;91;40mon black\x1b[0m"));
	}

	#[test]
	fn other_colors_are_not_error() {
		assert!(!is_error_line("\x1b[32mgreen\x1b[0m"));
		assert!(!is_error_line("\x1b[33myellow\x1b[0m"));
		assert!(!is_error_line("\x1b[41mred background\x1b[0m"));
		assert!(!is_error_line("\x1b[38;5;31mpalette 31\x1b[0m"));
		assert!(!is_error_line("\x1b[38;2;31;31;31mtruecolor\x1b[0m"));
	}

	#[test]
	fn keywords_found_through_color_codes() {
		assert!(is_error_line("\x1b[1mERROR:\x1b[0m disk full"));
		assert_eq!(strip_ansi("\x1b[1mbold\x1b[0m"), "bold");
	}
}
