use crate::logging::record::LogRecord;

/// Inspects or amends a record before it is formatted. Returning `false`
/// drops the record for the handler the filter is attached to.
pub trait RecordFilter: Send + Sync {
    /// Stable identity; a handler keeps at most one filter per id.
    fn id(&self) -> &'static str;

    fn filter(&self, record: &mut LogRecord) -> bool;
}

pub const UNKNOWN_ADDR: &str = "unknown";
pub const ANONYMOUS_USER: &str = "anonymous";

/// Stamps the client address and user on every record.
///
/// No request identity is propagated yet, so both fields carry fixed
/// placeholders.
#[derive(Debug, Default, Clone, Copy)]
pub struct RequestContextFilter;

impl RecordFilter for RequestContextFilter {
    fn id(&self) -> &'static str {
        "request_context"
    }

    fn filter(&self, record: &mut LogRecord) -> bool {
        record.set_extra("addr", UNKNOWN_ADDR);
        record.set_extra("user", ANONYMOUS_USER);
        true
    }
}

#[cfg(test)]
mod tests {
    use log::Level;

    use super::*;

    #[test]
    fn stamps_placeholders() {
        let mut record = LogRecord::new("app", Level::Info, "hi");
        assert!(RequestContextFilter.filter(&mut record));
        assert_eq!(record.extra("addr"), Some("unknown"));
        assert_eq!(record.extra("user"), Some("anonymous"));
    }
}
