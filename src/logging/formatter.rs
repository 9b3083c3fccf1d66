use std::fmt::Write;

use crate::{consts::DEFAULT_LOG_DATEFMT, logging::record::LogRecord};

/// Renders records through a `{field}` pattern, with timestamps in UTC.
///
/// Known fields: `asctime`, `levelname`, `name`, `module`, `pathname`,
/// `lineno`, `message`, plus anything a filter stored in the record's extras.
/// Unknown placeholders are copied verbatim.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogFormatter {
    pattern: String,
    datefmt: String,
}

impl Default for LogFormatter {
    fn default() -> Self {
        Self::new("{message}", DEFAULT_LOG_DATEFMT)
    }
}

impl LogFormatter {
    pub fn new(pattern: impl Into<String>, datefmt: impl Into<String>) -> Self {
        Self {
            pattern: pattern.into(),
            datefmt: datefmt.into(),
        }
    }

    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    pub fn datefmt(&self) -> &str {
        &self.datefmt
    }

    pub fn format(&self, record: &LogRecord) -> String {
        let mut out = String::with_capacity(self.pattern.len() + record.message.len());
        let mut rest = self.pattern.as_str();

        while let Some(start) = rest.find('{') {
            out.push_str(&rest[..start]);
            let after = &rest[start + 1..];
            match after.find('}') {
                Some(end) if is_field_name(&after[..end]) => {
                    let field = &after[..end];
                    if !self.push_field(&mut out, field, record) {
                        out.push('{');
                        out.push_str(field);
                        out.push('}');
                    }
                    rest = &after[end + 1..];
                }
                _ => {
                    out.push('{');
                    rest = after;
                }
            }
        }
        out.push_str(rest);
        out
    }

    fn push_field(&self, out: &mut String, field: &str, record: &LogRecord) -> bool {
        match field {
            "asctime" => out.push_str(&self.format_time(record)),
            "levelname" => out.push_str(level_name(record.level)),
            "name" => out.push_str(&record.name),
            "module" => out.push_str(record.module()),
            "pathname" => out.push_str(record.file.as_deref().unwrap_or("?")),
            "lineno" => {
                let _ = write!(out, "{}", record.line.unwrap_or(0));
            }
            "message" => out.push_str(&record.message),
            other => match record.extra(other) {
                Some(value) => out.push_str(value),
                None => return false,
            },
        }
        true
    }

    fn format_time(&self, record: &LogRecord) -> String {
        let mut stamp = String::new();
        if write!(stamp, "{}", record.created.format(&self.datefmt)).is_err() {
            return record.created.to_rfc3339();
        }
        stamp
    }
}

fn is_field_name(s: &str) -> bool {
    !s.is_empty() && s.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
}

fn level_name(level: log::Level) -> &'static str {
    match level {
        log::Level::Error => "ERROR",
        log::Level::Warn => "WARNING",
        log::Level::Info => "INFO",
        log::Level::Debug => "DEBUG",
        log::Level::Trace => "TRACE",
    }
}
