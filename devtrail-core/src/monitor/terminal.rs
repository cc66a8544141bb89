//! Terminal error monitor
//!
//! Classifies terminal output line by line. Lines are stripped of ANSI escape
//! sequences and leading whitespace, then run through a fixed matcher table
//! where error matchers take precedence over warning matchers.

use super::ErrorSource;
use crate::events::{lock, EventChannel, Subscription};
use crate::types::{ErrorType, TerminalError};
use chrono::Utc;
use regex::Regex;
use std::collections::HashMap;
use std::sync::{LazyLock, Mutex};

/// Name used when the host has not reported an active terminal
pub const DEFAULT_TERMINAL_NAME: &str = "terminal";

static ANSI_ESCAPE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\x1b\[[0-9;?]*[ -/]*[@-~]|\x1b\][^\x07\x1b]*(?:\x07|\x1b\\)").unwrap()
});

static LINE_MATCHERS: LazyLock<Vec<(Regex, ErrorType)>> = LazyLock::new(|| {
    [
        (r"(?i)^(error|fatal|panic|exception|traceback|failed)\b", ErrorType::Error),
        (r"^thread '[^']*' panicked at", ErrorType::Error),
        (r"^npm ERR!", ErrorType::Error),
        (r"^[A-Za-z_][\w.]*(Error|Exception):\s+\S", ErrorType::Error),
        (r"(?i)^warn(ing)?(:|\s)", ErrorType::Warning),
        (r"^npm WARN", ErrorType::Warning),
    ]
    .into_iter()
    .map(|(pattern, kind)| (Regex::new(pattern).unwrap(), kind))
    .collect()
});

/// Classify one line of terminal output.
pub fn classify_line(line: &str) -> Option<ErrorType> {
    let line = line.trim_start();
    LINE_MATCHERS
        .iter()
        .find(|(re, _)| re.is_match(line))
        .map(|(_, kind)| *kind)
}

/// Remove ANSI color and cursor sequences.
pub fn strip_ansi(text: &str) -> String {
    ANSI_ESCAPE.replace_all(text, "").into_owned()
}

/// Longest unterminated line kept while waiting for its newline
const MAX_PENDING_LINE: usize = 8 * 1024;

#[derive(Default)]
struct TerminalState {
    active_terminal: Option<String>,
    last_error: Option<TerminalError>,
    /// Text after the last newline, per terminal
    pending: HashMap<String, String>,
}

/// Watches terminal output for errors and warnings
///
/// Output arrives in arbitrary chunks. Only complete lines are classified;
/// the unterminated tail of each terminal is buffered until its newline
/// arrives, the terminal loses focus, or [`TerminalErrorMonitor::flush`] is
/// called.
pub struct TerminalErrorMonitor {
    state: Mutex<TerminalState>,
    errors: EventChannel<TerminalError>,
}

impl TerminalErrorMonitor {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(TerminalState::default()),
            errors: EventChannel::new(),
        }
    }

    /// Host callback: the active terminal changed.
    ///
    /// Buffered output of the previously active terminal is classified.
    pub fn set_active_terminal(&self, name: Option<&str>) {
        let flushed = {
            let mut state = lock(&self.state);
            let previous = std::mem::replace(&mut state.active_terminal, name.map(str::to_string));
            match previous {
                Some(prev) if name != Some(prev.as_str()) => {
                    let tail = state.pending.remove(&prev).unwrap_or_default();
                    Self::record(&mut state, &prev, &tail)
                }
                _ => Vec::new(),
            }
        };
        self.publish(&flushed);
    }

    /// Host callback: a chunk of output was written to a terminal.
    ///
    /// `terminal_name` falls back to the active terminal. Returns the
    /// classified lines completed by this chunk, in output order.
    pub fn handle_output(&self, terminal_name: Option<&str>, data: &str) -> Vec<TerminalError> {
        let found = {
            let mut state = lock(&self.state);
            let name = terminal_name
                .map(str::to_string)
                .or_else(|| state.active_terminal.clone())
                .unwrap_or_else(|| DEFAULT_TERMINAL_NAME.to_string());

            let buffer = state.pending.entry(name.clone()).or_default();
            buffer.push_str(data);

            let complete = match buffer.rfind('\n') {
                Some(end) => {
                    let tail = buffer.split_off(end + 1);
                    std::mem::replace(buffer, tail)
                }
                None if buffer.len() > MAX_PENDING_LINE => std::mem::take(buffer),
                None => String::new(),
            };
            if buffer.is_empty() {
                state.pending.remove(&name);
            }

            Self::record(&mut state, &name, &complete)
        };

        self.publish(&found);
        found
    }

    /// Classify whatever is buffered for a terminal as a final line.
    ///
    /// `terminal_name` falls back to the active terminal.
    pub fn flush(&self, terminal_name: Option<&str>) -> Vec<TerminalError> {
        let found = {
            let mut state = lock(&self.state);
            let name = terminal_name
                .map(str::to_string)
                .or_else(|| state.active_terminal.clone())
                .unwrap_or_else(|| DEFAULT_TERMINAL_NAME.to_string());
            let tail = state.pending.remove(&name).unwrap_or_default();
            Self::record(&mut state, &name, &tail)
        };
        self.publish(&found);
        found
    }

    fn record(state: &mut TerminalState, name: &str, text: &str) -> Vec<TerminalError> {
        let found: Vec<TerminalError> = strip_ansi(text)
            .lines()
            .filter_map(|line| {
                let kind = classify_line(line)?;
                Some(TerminalError {
                    message: line.trim().to_string(),
                    timestamp: Utc::now(),
                    terminal_name: name.to_string(),
                    error_type: kind,
                })
            })
            .collect();

        if let Some(last) = found.last() {
            state.last_error = Some(last.clone());
        }
        found
    }

    fn publish(&self, found: &[TerminalError]) {
        for error in found {
            tracing::debug!(
                terminal = %error.terminal_name,
                kind = ?error.error_type,
                "Terminal error observed"
            );
            self.errors.publish(error);
        }
    }
}

impl Default for TerminalErrorMonitor {
    fn default() -> Self {
        Self::new()
    }
}

impl ErrorSource for TerminalErrorMonitor {
    fn on_terminal_error(
        &self,
        callback: Box<dyn Fn(&TerminalError) + Send + Sync>,
    ) -> Subscription {
        self.errors.subscribe(callback)
    }

    fn last_error(&self) -> Option<TerminalError> {
        lock(&self.state).last_error.clone()
    }

    fn reset(&self) {
        let mut state = lock(&self.state);
        state.last_error = None;
        state.pending.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_classify_errors() {
        assert_eq!(
            classify_line("error[E0308]: mismatched types"),
            Some(ErrorType::Error)
        );
        assert_eq!(
            classify_line("  Error: cannot find module"),
            Some(ErrorType::Error)
        );
        assert_eq!(
            classify_line("TypeError: x is not a function"),
            Some(ErrorType::Error)
        );
        assert_eq!(
            classify_line("Traceback (most recent call last):"),
            Some(ErrorType::Error)
        );
        assert_eq!(
            classify_line("npm ERR! code ENOENT"),
            Some(ErrorType::Error)
        );
        assert_eq!(
            classify_line("thread 'main' panicked at src/main.rs:3:5"),
            Some(ErrorType::Error)
        );
        assert_eq!(
            classify_line("FAILED tests/test_app.py::test_x"),
            Some(ErrorType::Error)
        );
    }

    #[test]
    fn test_classify_warnings_and_noise() {
        assert_eq!(
            classify_line("warning: unused variable `x`"),
            Some(ErrorType::Warning)
        );
        assert_eq!(
            classify_line("npm WARN deprecated"),
            Some(ErrorType::Warning)
        );
        assert_eq!(classify_line("   Compiling devtrail v0.1.0"), None);
        assert_eq!(classify_line("errors are fine to mention mid-word"), None);
        assert_eq!(classify_line("no problems found"), None);
    }

    #[test]
    fn test_strip_ansi() {
        assert_eq!(strip_ansi("\x1b[31merror\x1b[0m: boom"), "error: boom");
    }

    #[test]
    fn test_handle_output_forwards_all_keeps_last() {
        let monitor = TerminalErrorMonitor::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let _sub = monitor.on_terminal_error(Box::new(move |e| {
            sink.lock().unwrap().push(e.message.clone())
        }));

        monitor.set_active_terminal(Some("zsh"));
        let found = monitor.handle_output(
            None,
            "building...\n\x1b[1;31merror\x1b[0m: first\nwarning: second\nok\n",
        );

        assert_eq!(found.len(), 2);
        assert_eq!(
            *seen.lock().unwrap(),
            vec!["error: first", "warning: second"]
        );

        let last = monitor.last_error().unwrap();
        assert_eq!(last.message, "warning: second");
        assert_eq!(last.terminal_name, "zsh");
        assert_eq!(last.error_type, ErrorType::Warning);
    }

    #[test]
    fn test_terminal_name_fallbacks() {
        let monitor = TerminalErrorMonitor::new();
        let found = monitor.handle_output(None, "fatal: not a git repository\n");
        assert_eq!(found[0].terminal_name, DEFAULT_TERMINAL_NAME);

        let found = monitor.handle_output(Some("cargo"), "error: could not compile\n");
        assert_eq!(found[0].terminal_name, "cargo");
    }

    #[test]
    fn test_escape_sequence_split_across_chunks() {
        let monitor = TerminalErrorMonitor::new();
        assert!(monitor.handle_output(Some("zsh"), "\x1b[31").is_empty());

        let found = monitor.handle_output(Some("zsh"), "merror\x1b[0m: cannot borrow\n");
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].message, "error: cannot borrow");
        assert_eq!(found[0].error_type, ErrorType::Error);
    }

    #[test]
    fn test_line_split_across_chunks() {
        let monitor = TerminalErrorMonitor::new();
        let found = monitor.handle_output(Some("zsh"), "error: could not ");
        assert!(found.is_empty());
        assert!(monitor.last_error().is_none());

        let found = monitor.handle_output(Some("zsh"), "compile `x`\nwarning: par");
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].message, "error: could not compile `x`");

        let found = monitor.handle_output(Some("zsh"), "tial\n");
        assert_eq!(found[0].message, "warning: partial");
    }

    #[test]
    fn test_pending_output_kept_per_terminal() {
        let monitor = TerminalErrorMonitor::new();
        monitor.handle_output(Some("a"), "error: from ");
        monitor.handle_output(Some("b"), "warning: other\n");

        let found = monitor.handle_output(Some("a"), "a\n");
        assert_eq!(found[0].message, "error: from a");
        assert_eq!(found[0].terminal_name, "a");
    }

    #[test]
    fn test_unterminated_tail_flushed() {
        let monitor = TerminalErrorMonitor::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let _sub =
            monitor.on_terminal_error(Box::new(move |e| sink.lock().unwrap().push(e.clone())));

        monitor.set_active_terminal(Some("zsh"));
        monitor.handle_output(None, "Error: no newline");
        assert!(seen.lock().unwrap().is_empty());

        // Losing focus classifies what the previous terminal left behind
        monitor.set_active_terminal(Some("bash"));
        {
            let seen = seen.lock().unwrap();
            assert_eq!(seen.len(), 1);
            assert_eq!(seen[0].message, "Error: no newline");
            assert_eq!(seen[0].terminal_name, "zsh");
        }

        monitor.handle_output(None, "panic: explicit");
        let found = monitor.flush(None);
        assert_eq!(found[0].terminal_name, "bash");
        assert!(monitor.flush(None).is_empty());
    }

    #[test]
    fn test_reset_drops_pending_output() {
        let monitor = TerminalErrorMonitor::new();
        monitor.handle_output(Some("zsh"), "error: half");
        monitor.reset();
        assert!(monitor.handle_output(Some("zsh"), " a line\n").is_empty());
        assert!(monitor.flush(Some("zsh")).is_empty());
    }

    #[test]
    fn test_reset_clears_last_error() {
        let monitor = TerminalErrorMonitor::new();
        monitor.handle_output(None, "Error: boom\n");
        assert!(monitor.last_error().is_some());
        monitor.reset();
        assert!(monitor.last_error().is_none());
    }
}
