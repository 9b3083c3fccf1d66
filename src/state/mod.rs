use std::{future::Future, sync::Arc};

use crate::{config::Settings, mq::TaskQueue};

tokio::task_local! {
    static CURRENT_APP: AppContext;
}

/// The slice of the application a task body or request handler may use.
#[derive(Clone, Debug)]
pub struct AppContext {
    pub name: Arc<str>,
    pub settings: Arc<Settings>,
}

impl AppContext {
    pub fn new(settings: Settings) -> Self {
        Self {
            name: Arc::from(settings.name.as_str()),
            settings: Arc::new(settings),
        }
    }

    /// Run `fut` with this context reachable through [`current_app`].
    pub async fn scope<F: Future>(&self, fut: F) -> F::Output {
        CURRENT_APP.scope(self.clone(), fut).await
    }
}

/// The context entered by the innermost enclosing [`AppContext::scope`].
pub fn current_app() -> Option<AppContext> {
    CURRENT_APP.try_with(Clone::clone).ok()
}

/// Router state.
#[derive(Clone)]
pub struct AppState {
    pub context: AppContext,
    pub task_queue: Option<TaskQueue>,
}
