//! Per-job user log buffer.
//!
//! Execution collects user-visible log lines into a buffer that is flushed
//! to the job's `logs` storage location (when one is given) after the run,
//! whatever the outcome. Separate from the service's own tracing output.

use chrono::Utc;

const DEFAULT_LEVEL: LogLevel = LogLevel::Warning;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LogLevel {
    Debug,
    Info,
    Warning,
    Error,
    Critical,
}

impl LogLevel {
    /// Parse a user-supplied level name; unknown names fall back to the
    /// default rather than failing the job.
    fn parse(s: &str) -> LogLevel {
        match s.to_ascii_lowercase().as_str() {
            "debug" => LogLevel::Debug,
            "info" => LogLevel::Info,
            "warning" => LogLevel::Warning,
            "error" => LogLevel::Error,
            "critical" => LogLevel::Critical,
            _ => DEFAULT_LEVEL,
        }
    }

    fn label(&self) -> &'static str {
        match self {
            LogLevel::Debug => "DEBUG",
            LogLevel::Info => "INFO",
            LogLevel::Warning => "WARNING",
            LogLevel::Error => "ERROR",
            LogLevel::Critical => "CRITICAL",
        }
    }
}

#[derive(Debug)]
pub struct JobLog {
    level: LogLevel,
    lines: Vec<String>,
}

impl JobLog {
    pub fn new(level: Option<&str>) -> Self {
        JobLog {
            level: level.map(LogLevel::parse).unwrap_or(DEFAULT_LEVEL),
            lines: Vec::new(),
        }
    }

    pub fn info(&mut self, message: impl AsRef<str>) {
        self.record(LogLevel::Info, message.as_ref());
    }

    pub fn warning(&mut self, message: impl AsRef<str>) {
        self.record(LogLevel::Warning, message.as_ref());
    }

    pub fn error(&mut self, message: impl AsRef<str>) {
        self.record(LogLevel::Error, message.as_ref());
    }

    fn record(&mut self, level: LogLevel, message: &str) {
        if level < self.level {
            return;
        }
        let ts = Utc::now().format("%Y-%m-%d %H:%M:%S%.3f");
        self.lines.push(format!("{ts} {:<9} {message}", level.label()));
    }

    /// Entire contents of the buffer, newline-terminated per line.
    pub fn contents(&self) -> String {
        let mut out = String::new();
        for line in &self.lines {
            out.push_str(line);
            out.push('\n');
        }
        out
    }
}
