use std::{
    collections::HashMap,
    future::Future,
    sync::{Arc, RwLock},
};

use log::{debug, info};
use serde_json::Value;
use tokio::sync::OnceCell;

use crate::{
    config::TaskQueueSettings,
    error::TaskQueueError,
    mq::{
        broker::{Broker, connect},
        message::{TaskMessage, TaskState},
        task::ContextTask,
        worker::Worker,
    },
    state::AppContext,
};

pub mod broker;
pub mod memory;
pub mod message;
pub mod spool;
pub mod task;
pub mod worker;

/// Client handle of the background task queue.
///
/// Cloning is cheap and every clone talks to the same broker and task
/// registry. The broker is connected on first use, so a missing or broken
/// broker only fails the first call that needs it.
#[derive(Clone)]
pub struct TaskQueue {
    inner: Arc<Inner>,
}

struct Inner {
    main: String,
    settings: TaskQueueSettings,
    context: AppContext,
    broker: OnceCell<Arc<dyn Broker>>,
    tasks: RwLock<HashMap<String, Arc<ContextTask>>>,
}

// Process-wide default client, set once during startup.
static DEFAULT: RwLock<Option<TaskQueue>> = RwLock::new(None);

/// The client most recently marked with [`TaskQueue::set_default`].
pub fn default_task_queue() -> Option<TaskQueue> {
    DEFAULT
        .read()
        .unwrap_or_else(|e| e.into_inner())
        .clone()
}

impl TaskQueue {
    pub fn new(context: AppContext, settings: TaskQueueSettings) -> Self {
        Self {
            inner: Arc::new(Inner {
                main: context.name.to_string(),
                settings,
                context,
                broker: OnceCell::new(),
                tasks: RwLock::new(HashMap::new()),
            }),
        }
    }

    /// Name of the application this client belongs to.
    pub fn main_name(&self) -> &str {
        &self.inner.main
    }

    pub fn settings(&self) -> &TaskQueueSettings {
        &self.inner.settings
    }

    pub fn context(&self) -> &AppContext {
        &self.inner.context
    }

    /// Whether both handles refer to the same client.
    pub fn ptr_eq(&self, other: &TaskQueue) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    pub fn set_default(&self) {
        *DEFAULT.write().unwrap_or_else(|e| e.into_inner()) = Some(self.clone());
        debug!("Task queue of '{}' is now the default", self.inner.main);
    }

    pub fn is_default(&self) -> bool {
        default_task_queue().is_some_and(|d| d.ptr_eq(self))
    }

    /// Register `body` under `name`, replacing any task of the same name.
    pub fn register<F, Fut>(&self, name: impl Into<String>, body: F)
    where
        F: Fn(AppContext, Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<Value>> + Send + 'static,
    {
        let task = ContextTask::new(name, self.inner.context.clone(), body);
        debug!("Registered task '{}'", task.name());
        self.inner
            .tasks
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(task.name().to_string(), Arc::new(task));
    }

    pub fn task(&self, name: &str) -> Option<Arc<ContextTask>> {
        self.inner
            .tasks
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(name)
            .cloned()
    }

    pub fn registered_tasks(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .inner
            .tasks
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .keys()
            .cloned()
            .collect();
        names.sort();
        names
    }

    pub async fn broker(&self) -> Result<Arc<dyn Broker>, TaskQueueError> {
        let broker = self
            .inner
            .broker
            .get_or_try_init(|| async {
                let url = self
                    .inner
                    .settings
                    .broker_url
                    .as_deref()
                    .ok_or(TaskQueueError::MissingBrokerUrl)?;
                info!("Connecting task queue '{}' to {}", self.inner.main, url);
                connect(url).await
            })
            .await?;
        Ok(Arc::clone(broker))
    }

    /// Publish a call of `name` to the default queue and return its id.
    ///
    /// The task does not have to be registered in this process; whichever
    /// worker consumes the queue resolves it.
    pub async fn send_task(&self, name: &str, args: Value) -> Result<String, TaskQueueError> {
        let message = TaskMessage::new(name, self.inner.settings.default_queue.as_str(), args);
        self.broker().await?.publish(&message).await?;
        debug!("Sent task '{}' as {}", name, message.id);
        Ok(message.id)
    }

    /// Run a registered task inline, inside the application context.
    pub async fn apply(&self, name: &str, args: Value) -> Result<Value, TaskQueueError> {
        let task = self
            .task(name)
            .ok_or_else(|| TaskQueueError::UnknownTask(name.to_string()))?;
        task.call(args)
            .await
            .map_err(|e| TaskQueueError::task_failed(name, format!("{:#}", e)))
    }

    pub async fn result(&self, id: &str) -> Result<TaskState, TaskQueueError> {
        Ok(self
            .broker()
            .await?
            .get_result(id)
            .await?
            .map_or(TaskState::Pending, TaskState::from))
    }

    pub fn worker(&self) -> Worker {
        Worker::new(self.clone())
    }
}

#[cfg(test)]
pub(crate) static DEFAULT_LOCK: std::sync::Mutex<()> = std::sync::Mutex::new(());
