//! Structured JSON logger
//!
//! - One log line = one event
//! - `event` first, `severity` second, remaining fields sorted by key
//! - Synchronous, no buffering
//!
//! The logger is a value rather than a global so it can be handed down into
//! nested subgraph runs, and so tests can capture what a run logged.

use std::fmt;
use std::io::{self, Write};
use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::events::Event;

/// Log severity levels
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Severity {
    /// Debug-level detail
    Trace = 0,
    /// Normal operations
    Info = 1,
    /// Recoverable issues
    Warn = 2,
    /// Operation failures
    Error = 3,
    /// Contract violations; the enclosing graph run cannot continue
    Fatal = 4,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Trace => "TRACE",
            Severity::Info => "INFO",
            Severity::Warn => "WARN",
            Severity::Error => "ERROR",
            Severity::Fatal => "FATAL",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Where log lines go
#[derive(Debug, Clone)]
pub enum LogSink {
    /// stdout, with ERROR and FATAL on stderr
    Stdout,
    /// In-memory capture
    Memory(Arc<Mutex<Vec<String>>>),
}

/// A structured logger that outputs JSON lines
#[derive(Debug, Clone)]
pub struct Logger {
    min_severity: Severity,
    sink: LogSink,
}

impl Default for Logger {
    fn default() -> Self {
        Self::stdout(Severity::Info)
    }
}

impl Logger {
    pub fn stdout(min_severity: Severity) -> Self {
        Self {
            min_severity,
            sink: LogSink::Stdout,
        }
    }

    /// Logger that keeps every line in memory; read them back with `lines`
    pub fn memory(min_severity: Severity) -> Self {
        Self {
            min_severity,
            sink: LogSink::Memory(Arc::new(Mutex::new(Vec::new()))),
        }
    }

    pub fn min_severity(&self) -> Severity {
        self.min_severity
    }

    /// Captured lines (always empty for stdout sinks)
    pub fn lines(&self) -> Vec<String> {
        match &self.sink {
            LogSink::Memory(lines) => lines.lock().clone(),
            LogSink::Stdout => Vec::new(),
        }
    }

    /// Log an event with the given severity and fields
    pub fn log(&self, severity: Severity, event: &str, fields: &[(&str, &str)]) {
        if severity < self.min_severity {
            return;
        }
        let line = render(severity, event, fields);
        match &self.sink {
            LogSink::Memory(lines) => lines.lock().push(line),
            LogSink::Stdout if severity >= Severity::Error => {
                write_line(&mut io::stderr().lock(), &line)
            }
            LogSink::Stdout => write_line(&mut io::stdout().lock(), &line),
        }
    }

    /// Log a typed event at its own severity
    pub fn event(&self, event: Event, fields: &[(&str, &str)]) {
        self.log(event.severity(), event.as_str(), fields);
    }

    pub fn trace(&self, event: &str, fields: &[(&str, &str)]) {
        self.log(Severity::Trace, event, fields);
    }

    pub fn info(&self, event: &str, fields: &[(&str, &str)]) {
        self.log(Severity::Info, event, fields);
    }

    pub fn warn(&self, event: &str, fields: &[(&str, &str)]) {
        self.log(Severity::Warn, event, fields);
    }

    pub fn error(&self, event: &str, fields: &[(&str, &str)]) {
        self.log(Severity::Error, event, fields);
    }

    pub fn fatal(&self, event: &str, fields: &[(&str, &str)]) {
        self.log(Severity::Fatal, event, fields);
    }
}

fn render(severity: Severity, event: &str, fields: &[(&str, &str)]) -> String {
    let mut output = String::with_capacity(256);

    output.push_str("{\"event\":");
    output.push_str(&json_string(event));
    output.push_str(",\"severity\":");
    output.push_str(&json_string(severity.as_str()));

    let mut sorted_fields: Vec<_> = fields.iter().collect();
    sorted_fields.sort_by_key(|(k, _)| *k);

    for (key, value) in sorted_fields {
        output.push(',');
        output.push_str(&json_string(key));
        output.push(':');
        output.push_str(&json_string(value));
    }

    output.push('}');
    output
}

fn json_string(s: &str) -> String {
    Value::String(s.to_owned()).to_string()
}

fn write_line<W: Write>(writer: &mut W, line: &str) {
    // one write per line; a failing log sink must not fail execution
    let _ = writer.write_all(format!("{}\n", line).as_bytes());
    let _ = writer.flush();
}
