use std::cell::RefCell;
use std::io::{self, Write};
use std::time::Instant;

use serde::Serialize;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LogLevel {
    Debug,
    Info,
    Success,
    Warning,
    Error,
}

impl LogLevel {
    fn tag(self) -> &'static str {
        match self {
            LogLevel::Debug => "DEBUG",
            LogLevel::Info => "INFO ",
            LogLevel::Success => "OK   ",
            LogLevel::Warning => "WARN ",
            LogLevel::Error => "ERROR",
        }
    }
}

#[derive(Clone, Debug, Serialize)]
pub struct LogEntry {
    pub elapsed_secs: f64,
    pub level: LogLevel,
    pub message: String,
}

/// Step log for a merge session.
///
/// Every entry is kept in memory; entries are also echoed to stderr when `enabled`.
/// Debug entries are dropped entirely unless `debug` is set.
pub struct ConsoleProgress {
    enabled: bool,
    debug: bool,
    t0: Instant,
    entries: RefCell<Vec<LogEntry>>,
}

impl ConsoleProgress {
    pub fn new(enabled: bool) -> Self {
        Self {
            enabled,
            debug: false,
            t0: Instant::now(),
            entries: RefCell::new(Vec::new()),
        }
    }

    pub fn with_debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    pub fn debug(&self, msg: impl AsRef<str>) {
        if self.debug {
            self.log(LogLevel::Debug, msg.as_ref());
        }
    }

    pub fn info(&self, msg: impl AsRef<str>) {
        self.log(LogLevel::Info, msg.as_ref());
    }

    pub fn success(&self, msg: impl AsRef<str>) {
        self.log(LogLevel::Success, msg.as_ref());
    }

    pub fn warn(&self, msg: impl AsRef<str>) {
        self.log(LogLevel::Warning, msg.as_ref());
    }

    pub fn error(&self, msg: impl AsRef<str>) {
        self.log(LogLevel::Error, msg.as_ref());
    }

    pub fn progress(&self, label: &str, current: usize, total: usize) {
        let total = total.max(1);
        let current = current.min(total);
        let pct = (current as f64 / total as f64) * 100.0;
        self.log(
            LogLevel::Info,
            &format!("{label} {current}/{total} ({pct:5.1}%)"),
        );
    }

    pub fn entries(&self) -> Vec<LogEntry> {
        self.entries.borrow().clone()
    }

    pub fn count(&self, level: LogLevel) -> usize {
        self.entries
            .borrow()
            .iter()
            .filter(|e| e.level == level)
            .count()
    }

    fn log(&self, level: LogLevel, msg: &str) {
        let elapsed = self.t0.elapsed().as_secs_f64();
        self.entries.borrow_mut().push(LogEntry {
            elapsed_secs: elapsed,
            level,
            message: msg.to_string(),
        });
        if !self.enabled {
            return;
        }
        let ts = fmt_elapsed(elapsed);
        let mut stderr = io::stderr().lock();
        let _ = writeln!(stderr, "[{ts}] {} {msg}", level.tag());
    }
}

fn fmt_elapsed(seconds: f64) -> String {
    let seconds = seconds.max(0.0) as u64;
    let h = seconds / 3600;
    let m = (seconds % 3600) / 60;
    let s = seconds % 60;
    if h > 0 {
        format!("{h:02}:{m:02}:{s:02}")
    } else {
        format!("{m:02}:{s:02}")
    }
}
