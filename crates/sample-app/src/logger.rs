use pipeline::{LogRecord, Logger};

/// Prints pipeline log records to stdout as `[TAG] message`.
#[derive(Debug, Clone, Copy, Default)]
pub struct ConsoleLogger {
    pub verbose: bool,
}

impl ConsoleLogger {
    pub fn line(&self, record: &LogRecord<'_>) -> String {
        if self.verbose {
            record.format_verbose()
        } else {
            record.format_line()
        }
    }
}

impl Logger for ConsoleLogger {
    fn log(&self, record: &LogRecord<'_>) {
        println!("{}", self.line(record));
    }
}
