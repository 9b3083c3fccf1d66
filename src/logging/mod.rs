use std::sync::{Arc, OnceLock, RwLock};

use log::{LevelFilter, Log, Metadata, Record};

use crate::{
    app::App,
    config::Settings,
    consts::{DEFAULT_LOG_DATEFMT, DEFAULT_LOG_FORMAT, DEFAULT_LOG_FORMAT_DEV},
};

pub mod filter;
pub mod formatter;
pub mod handler;
pub mod record;

pub use filter::{RecordFilter, RequestContextFilter};
pub use formatter::LogFormatter;
pub use handler::{ConsoleHandler, Handler};
pub use record::LogRecord;

/// Named logger owned by an [`App`]: a level and a list of handlers.
pub struct AppLogger {
    name: String,
    level: RwLock<LevelFilter>,
    handlers: RwLock<Vec<Arc<dyn Handler>>>,
}

impl AppLogger {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            level: RwLock::new(LevelFilter::Info),
            handlers: RwLock::new(Vec::new()),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn level(&self) -> LevelFilter {
        *self.level.read().unwrap_or_else(|e| e.into_inner())
    }

    pub fn set_level(&self, level: LevelFilter) {
        *self.level.write().unwrap_or_else(|e| e.into_inner()) = level;
    }

    pub fn add_handler(&self, handler: Arc<dyn Handler>) {
        self.handlers
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .push(handler);
    }

    pub fn handler_count(&self) -> usize {
        self.handlers.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    /// First attached handler of type `H`.
    pub fn find<H: Handler + 'static>(&self) -> Option<Arc<H>> {
        self.handlers
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .find_map(|h| Arc::clone(h).into_any().downcast::<H>().ok())
    }

    /// The attached handler of type `H`, attaching `make()` if there is none.
    pub fn find_or_add<H, F>(&self, make: F) -> Arc<H>
    where
        H: Handler + 'static,
        F: FnOnce() -> H,
    {
        let mut handlers = self.handlers.write().unwrap_or_else(|e| e.into_inner());
        if let Some(found) = handlers
            .iter()
            .find_map(|h| Arc::clone(h).into_any().downcast::<H>().ok())
        {
            return found;
        }
        let handler = Arc::new(make());
        handlers.push(handler.clone());
        handler
    }

    pub fn emit(&self, record: &LogRecord) {
        if record.level > self.level() {
            return;
        }
        let handlers = self.handlers.read().unwrap_or_else(|e| e.into_inner());
        for handler in handlers.iter() {
            handler.handle(record);
        }
    }
}

impl Log for AppLogger {
    fn enabled(&self, metadata: &Metadata<'_>) -> bool {
        metadata.level() <= self.level()
    }

    fn log(&self, record: &Record<'_>) {
        if self.enabled(record.metadata()) {
            self.emit(&LogRecord::from_log(&self.name, record));
        }
    }

    fn flush(&self) {
        for handler in self.handlers.read().unwrap_or_else(|e| e.into_inner()).iter() {
            handler.flush();
        }
    }
}

/// Pattern chosen for `settings`: the explicit `log_format`, else the
/// development pattern in debug/development mode, else the production one.
pub fn detect_format(settings: &Settings) -> &str {
    if let Some(format) = settings.log_format.as_deref() {
        return format;
    }
    if settings.is_development() {
        DEFAULT_LOG_FORMAT_DEV
    } else {
        DEFAULT_LOG_FORMAT
    }
}

/// Configure the app's logger. Safe to call repeatedly: the logger keeps a
/// single console handler carrying a single request-context filter.
pub fn setup_logger(app: &App) {
    let settings = app.settings();
    let logger = app.logger();
    logger.set_level(settings.log_level);

    let handler = logger.find_or_add(ConsoleHandler::stderr);
    handler.add_filter(Arc::new(RequestContextFilter));

    let datefmt = settings
        .log_datefmt
        .as_deref()
        .unwrap_or(DEFAULT_LOG_DATEFMT);
    handler.set_formatter(LogFormatter::new(detect_format(settings), datefmt));
}

static ACTIVE: RwLock<Option<Arc<AppLogger>>> = RwLock::new(None);
// Whether `GlobalLogger` won the facade, decided on the first install.
static FACADE_OWNED: OnceLock<bool> = OnceLock::new();

struct GlobalLogger;

impl Log for GlobalLogger {
    fn enabled(&self, metadata: &Metadata<'_>) -> bool {
        active().is_some_and(|l| l.enabled(metadata))
    }

    fn log(&self, record: &Record<'_>) {
        if let Some(logger) = active() {
            logger.log(record);
        }
    }

    fn flush(&self) {
        if let Some(logger) = active() {
            logger.flush();
        }
    }
}

fn active() -> Option<Arc<AppLogger>> {
    ACTIVE.read().unwrap_or_else(|e| e.into_inner()).clone()
}

/// Route the `log` facade to `logger`. A later call swaps the target.
///
/// Returns `false` if some other logger already owns the facade, on this
/// and every later call.
pub fn install(logger: Arc<AppLogger>) -> bool {
    let owned = *FACADE_OWNED.get_or_init(|| log::set_logger(&GlobalLogger).is_ok());
    log::set_max_level(logger.level());
    *ACTIVE.write().unwrap_or_else(|e| e.into_inner()) = Some(logger);
    owned
}
