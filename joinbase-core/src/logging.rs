// logging.rs - Simple, embedded-friendly logging
// No external logging crates; every component receives a `Logger` handle
// instead of writing to process-wide state.

use std::str::FromStr;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::error::JoinBaseError;

/// Log levels (ordered by severity)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[repr(u8)]
pub enum LogLevel {
    /// Errors - failures reported to the caller
    Error = 0,
    /// Warnings - ignored input such as duplicate clause fields
    Warn = 1,
    /// Info - high-level progress (loading a collection, store start/stop)
    Info = 2,
    /// Debug - per-batch and per-query detail
    Debug = 3,
    /// Trace - cursor pages and other per-call noise
    Trace = 4,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Error => "ERROR",
            LogLevel::Warn => "WARN",
            LogLevel::Info => "INFO",
            LogLevel::Debug => "DEBUG",
            LogLevel::Trace => "TRACE",
        }
    }

    fn icon(&self) -> &'static str {
        match self {
            LogLevel::Error => "❌",
            LogLevel::Warn => "⚠️",
            LogLevel::Info => "ℹ️",
            LogLevel::Debug => "🔍",
            LogLevel::Trace => "📝",
        }
    }

    fn from_u8(level: u8) -> LogLevel {
        match level {
            0 => LogLevel::Error,
            1 => LogLevel::Warn,
            2 => LogLevel::Info,
            3 => LogLevel::Debug,
            4 => LogLevel::Trace,
            _ => LogLevel::Warn,
        }
    }
}

impl FromStr for LogLevel {
    type Err = JoinBaseError;

    /// Case-insensitive level name
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "ERROR" => Ok(LogLevel::Error),
            "WARN" => Ok(LogLevel::Warn),
            "INFO" => Ok(LogLevel::Info),
            "DEBUG" => Ok(LogLevel::Debug),
            "TRACE" => Ok(LogLevel::Trace),
            _ => Err(JoinBaseError::ConfigurationError(format!(
                "Unknown log level: {}",
                s
            ))),
        }
    }
}

/// Destination for formatted log lines
pub trait LogSink: Send + Sync {
    fn write_line(&self, level: LogLevel, module: &str, message: &str);
}

/// Writes `<icon> [LEVEL] module: message` to stderr
#[derive(Debug, Default)]
pub struct StderrSink;

impl LogSink for StderrSink {
    fn write_line(&self, level: LogLevel, module: &str, message: &str) {
        eprintln!("{} [{}] {}: {}", level.icon(), level.as_str(), module, message);
    }
}

/// Keeps every line in memory, used by tests to assert on warnings
#[derive(Debug, Default)]
pub struct MemorySink {
    lines: Mutex<Vec<(LogLevel, String)>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// All captured messages at exactly `level`
    pub fn messages(&self, level: LogLevel) -> Vec<String> {
        self.lines
            .lock()
            .iter()
            .filter(|(l, _)| *l == level)
            .map(|(_, message)| message.clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.lines.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.lock().is_empty()
    }
}

impl LogSink for MemorySink {
    fn write_line(&self, level: LogLevel, _module: &str, message: &str) {
        self.lines.lock().push((level, message.to_string()));
    }
}

struct LoggerInner {
    level: AtomicU8,
    sink: Arc<dyn LogSink>,
}

/// Cheaply cloneable logging handle.
///
/// Clones share the level and the sink, so changing the level through one
/// handle affects every component that was given a clone.
#[derive(Clone)]
pub struct Logger {
    inner: Arc<LoggerInner>,
}

impl Logger {
    pub fn new(level: LogLevel, sink: Arc<dyn LogSink>) -> Self {
        Logger {
            inner: Arc::new(LoggerInner {
                level: AtomicU8::new(level as u8),
                sink,
            }),
        }
    }

    /// Logger writing to stderr
    pub fn stderr(level: LogLevel) -> Self {
        Self::new(level, Arc::new(StderrSink))
    }

    /// Logger that keeps lines in the returned sink
    pub fn capturing(level: LogLevel) -> (Self, Arc<MemorySink>) {
        let sink = Arc::new(MemorySink::new());
        (Self::new(level, sink.clone()), sink)
    }

    pub fn level(&self) -> LogLevel {
        LogLevel::from_u8(self.inner.level.load(Ordering::Relaxed))
    }

    pub fn set_level(&self, level: LogLevel) {
        self.inner.level.store(level as u8, Ordering::Relaxed);
    }

    #[inline]
    pub fn should_log(&self, level: LogLevel) -> bool {
        level <= self.level()
    }

    #[doc(hidden)]
    pub fn log_message(&self, level: LogLevel, module: &str, message: &str) {
        if self.should_log(level) {
            self.inner.sink.write_line(level, module, message);
        }
    }
}

impl Default for Logger {
    /// WARN to stderr
    fn default() -> Self {
        Logger::stderr(LogLevel::Warn)
    }
}

impl std::fmt::Debug for Logger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Logger").field("level", &self.level()).finish()
    }
}

#[doc(hidden)]
#[macro_export]
macro_rules! __log_at {
    ($level:expr, $logger:expr, $($arg:tt)*) => {{
        let logger: &$crate::logging::Logger = &$logger;
        if logger.should_log($level) {
            logger.log_message($level, module_path!(), &format!($($arg)*));
        }
    }};
}

/// Log an error message
#[macro_export]
macro_rules! log_error {
    ($logger:expr, $($arg:tt)*) => {
        $crate::__log_at!($crate::logging::LogLevel::Error, $logger, $($arg)*)
    };
}

/// Log a warning message
#[macro_export]
macro_rules! log_warn {
    ($logger:expr, $($arg:tt)*) => {
        $crate::__log_at!($crate::logging::LogLevel::Warn, $logger, $($arg)*)
    };
}

/// Log an info message
#[macro_export]
macro_rules! log_info {
    ($logger:expr, $($arg:tt)*) => {
        $crate::__log_at!($crate::logging::LogLevel::Info, $logger, $($arg)*)
    };
}

/// Log a debug message
#[macro_export]
macro_rules! log_debug {
    ($logger:expr, $($arg:tt)*) => {
        $crate::__log_at!($crate::logging::LogLevel::Debug, $logger, $($arg)*)
    };
}

/// Log a trace message
#[macro_export]
macro_rules! log_trace {
    ($logger:expr, $($arg:tt)*) => {
        $crate::__log_at!($crate::logging::LogLevel::Trace, $logger, $($arg)*)
    };
}
