//! Pluggable logging sink for pipeline diagnostics.

use pipeline_types::{LogBucket, LogLevel};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LogRecord<'a> {
    pub level: LogLevel,
    pub file: &'a str,
    pub function: &'a str,
    pub line: u32,
    pub message: &'a str,
}

impl LogRecord<'_> {
    pub fn bucket(&self) -> LogBucket {
        self.level.bucket()
    }

    /// `[ERR] message`
    pub fn format_line(&self) -> String {
        format!("[{}] {}", self.bucket().tag(), self.message)
    }

    /// `[ERR] message (file:line function)`
    pub fn format_verbose(&self) -> String {
        format!(
            "[{}] {} ({}:{} {})",
            self.bucket().tag(),
            self.message,
            self.file,
            self.line,
            self.function
        )
    }
}

impl fmt::Display for LogRecord<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.format_line())
    }
}

pub trait Logger: Send + Sync {
    fn log(&self, record: &LogRecord<'_>);
}

/// Default sink: forwards records to `tracing`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingLogger;

impl Logger for TracingLogger {
    fn log(&self, record: &LogRecord<'_>) {
        let LogRecord {
            file,
            function,
            line,
            message,
            ..
        } = *record;

        match (record.level, record.bucket()) {
            (LogLevel::Debug, _) => tracing::debug!(file, function, line, "{message}"),
            (_, LogBucket::Error) => tracing::error!(file, function, line, "{message}"),
            (_, LogBucket::Warning) => tracing::warn!(file, function, line, "{message}"),
            (_, LogBucket::Info) => tracing::info!(file, function, line, "{message}"),
        }
    }
}

/// Logs through a [`Logger`], capturing the call site.
///
/// ```ignore
/// pipeline_log!(global.logger(), LogLevel::Warning, "fetch failed: {err}");
/// ```
#[macro_export]
macro_rules! pipeline_log {
    ($logger:expr, $level:expr, $($arg:tt)+) => {{
        let message = ::std::format!($($arg)+);
        $crate::logger::Logger::log(
            &*$logger,
            &$crate::logger::LogRecord {
                level: $level,
                file: ::std::file!(),
                function: ::std::module_path!(),
                line: ::std::line!(),
                message: &message,
            },
        );
    }};
}
