use std::{any::Any, collections::HashMap, sync::Arc};

use axum::Router;

use crate::{
    config::Settings,
    consts::TASK_QUEUE_EXTENSION,
    logging::AppLogger,
    mq::TaskQueue,
    routes,
    state::{AppContext, AppState},
};

/// Subsystem handles attached to an [`App`], keyed by name.
#[derive(Default)]
pub struct Extensions {
    entries: HashMap<String, Box<dyn Any + Send + Sync>>,
}

impl Extensions {
    /// Store `value` under `name`. Returns whether an entry was replaced.
    pub fn insert<T: Any + Send + Sync>(&mut self, name: impl Into<String>, value: T) -> bool {
        self.entries.insert(name.into(), Box::new(value)).is_some()
    }

    /// The entry stored under `name`, if it has type `T`.
    pub fn get<T: Any>(&self, name: &str) -> Option<&T> {
        self.entries.get(name).and_then(|v| v.downcast_ref::<T>())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    /// Number of entries holding a `T`.
    pub fn count<T: Any>(&self) -> usize {
        self.entries.values().filter(|v| v.is::<T>()).count()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// The web application: settings, logger and extension registry.
///
/// Built once per process by the factory; only mutated while it initializes.
pub struct App {
    context: AppContext,
    logger: Arc<AppLogger>,
    extensions: Extensions,
}

impl App {
    pub fn new(settings: Settings) -> Self {
        let logger = Arc::new(AppLogger::new(settings.name.clone()));
        Self {
            context: AppContext::new(settings),
            logger,
            extensions: Extensions::default(),
        }
    }

    pub fn name(&self) -> &str {
        &self.context.name
    }

    pub fn settings(&self) -> &Settings {
        &self.context.settings
    }

    pub fn context(&self) -> &AppContext {
        &self.context
    }

    pub fn logger(&self) -> &Arc<AppLogger> {
        &self.logger
    }

    pub fn extensions(&self) -> &Extensions {
        &self.extensions
    }

    pub fn extensions_mut(&mut self) -> &mut Extensions {
        &mut self.extensions
    }

    pub fn task_queue(&self) -> Option<&TaskQueue> {
        self.extensions.get::<TaskQueue>(TASK_QUEUE_EXTENSION)
    }

    pub fn router(&self) -> Router {
        routes::router(AppState {
            context: self.context.clone(),
            task_queue: self.task_queue().cloned(),
        })
    }
}
