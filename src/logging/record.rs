use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use log::Level;

/// A log event as seen by filters and formatters.
///
/// Filters may add fields to `extra`; formatters can reference them by name.
#[derive(Debug, Clone, PartialEq)]
pub struct LogRecord {
    /// Name of the logger that emitted the record.
    pub name: String,
    pub level: Level,
    pub message: String,
    pub target: String,
    pub module_path: Option<String>,
    pub file: Option<String>,
    pub line: Option<u32>,
    pub created: DateTime<Utc>,
    pub extra: BTreeMap<String, String>,
}

impl LogRecord {
    pub fn new(name: impl Into<String>, level: Level, message: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            target: name.clone(),
            name,
            level,
            message: message.into(),
            module_path: None,
            file: None,
            line: None,
            created: Utc::now(),
            extra: BTreeMap::new(),
        }
    }

    pub fn from_log(name: &str, record: &log::Record<'_>) -> Self {
        Self {
            name: name.to_string(),
            level: record.level(),
            message: record.args().to_string(),
            target: record.target().to_string(),
            module_path: record.module_path().map(str::to_string),
            file: record.file().map(str::to_string),
            line: record.line(),
            created: Utc::now(),
            extra: BTreeMap::new(),
        }
    }

    /// Last path segment of the emitting module, or the target.
    pub fn module(&self) -> &str {
        let path = self.module_path.as_deref().unwrap_or(&self.target);
        path.rsplit("::").next().unwrap_or(path)
    }

    pub fn set_extra(&mut self, key: &str, value: &str) {
        self.extra.insert(key.to_string(), value.to_string());
    }

    pub fn extra(&self, key: &str) -> Option<&str> {
        self.extra.get(key).map(String::as_str)
    }
}
