use std::{
    any::Any,
    io::Write,
    sync::{Arc, RwLock},
};

use env_logger::{Target, WriteStyle};
use log::{LevelFilter, Log};

use crate::logging::{filter::RecordFilter, formatter::LogFormatter, record::LogRecord};

/// Destination of log records attached to an [`AppLogger`](super::AppLogger).
pub trait Handler: Send + Sync {
    fn handle(&self, record: &LogRecord);

    fn flush(&self) {}

    fn into_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync>;
}

/// Writes formatted records to the console (stderr unless told otherwise).
///
/// The actual writing goes through an `env_logger` sink; formatting and
/// filtering happen here so both can be swapped after the handler is attached.
pub struct ConsoleHandler {
    formatter: RwLock<LogFormatter>,
    filters: RwLock<Vec<Arc<dyn RecordFilter>>>,
    sink: env_logger::Logger,
}

impl ConsoleHandler {
    pub fn stderr() -> Self {
        Self::with_target(Target::Stderr)
    }

    pub fn with_target(target: Target) -> Self {
        let sink = env_logger::Builder::new()
            .target(target)
            .write_style(WriteStyle::Never)
            .filter_level(LevelFilter::Trace)
            .format(|buf, record| writeln!(buf, "{}", record.args()))
            .build();
        Self {
            formatter: RwLock::new(LogFormatter::default()),
            filters: RwLock::new(Vec::new()),
            sink,
        }
    }

    pub fn formatter(&self) -> LogFormatter {
        self.formatter
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    pub fn set_formatter(&self, formatter: LogFormatter) {
        *self.formatter.write().unwrap_or_else(|e| e.into_inner()) = formatter;
    }

    /// Attach `filter` unless a filter with the same id is already attached.
    pub fn add_filter(&self, filter: Arc<dyn RecordFilter>) -> bool {
        let mut filters = self.filters.write().unwrap_or_else(|e| e.into_inner());
        if filters.iter().any(|f| f.id() == filter.id()) {
            return false;
        }
        filters.push(filter);
        true
    }

    pub fn filter_ids(&self) -> Vec<&'static str> {
        self.filters
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .map(|f| f.id())
            .collect()
    }

    /// Run the filters and format the record; `None` if a filter dropped it.
    pub fn render(&self, record: &LogRecord) -> Option<String> {
        let mut record = record.clone();
        let filters = self.filters.read().unwrap_or_else(|e| e.into_inner());
        for filter in filters.iter() {
            if !filter.filter(&mut record) {
                return None;
            }
        }
        Some(self.formatter().format(&record))
    }
}

impl Handler for ConsoleHandler {
    fn handle(&self, record: &LogRecord) {
        let Some(line) = self.render(record) else {
            return;
        };
        self.sink.log(
            &log::Record::builder()
                .args(format_args!("{}", line))
                .level(record.level)
                .target(&record.target)
                .build(),
        );
    }

    fn flush(&self) {
        self.sink.flush();
    }

    fn into_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync> {
        self
    }
}
