use std::{path::PathBuf, sync::Arc};

use async_trait::async_trait;
use url::Url;

use crate::{
    error::TaskQueueError,
    mq::{
        memory::MemoryBroker,
        message::{TaskMessage, TaskResult},
        spool::SpoolBroker,
    },
};

/// A message claimed by a worker, to be acked once processed.
#[derive(Debug, Clone)]
pub struct Delivery {
    pub message: TaskMessage,
    pub(crate) receipt: Option<PathBuf>,
}

impl Delivery {
    pub(crate) fn new(message: TaskMessage, receipt: Option<PathBuf>) -> Self {
        Self { message, receipt }
    }
}

/// Transport between task producers and workers.
#[async_trait]
pub trait Broker: Send + Sync {
    async fn publish(&self, message: &TaskMessage) -> Result<(), TaskQueueError>;

    /// Claim the oldest message of `queue`. A claimed message is not handed
    /// out again.
    async fn fetch(&self, queue: &str) -> Result<Option<Delivery>, TaskQueueError>;

    async fn ack(&self, delivery: &Delivery) -> Result<(), TaskQueueError>;

    async fn store_result(&self, result: &TaskResult) -> Result<(), TaskQueueError>;

    async fn get_result(&self, id: &str) -> Result<Option<TaskResult>, TaskQueueError>;
}

/// Open the broker named by `url`.
///
/// `memory://` keeps everything in this process; `file:///some/dir` spools
/// messages to a directory shared by the web and worker processes.
pub async fn connect(url: &str) -> Result<Arc<dyn Broker>, TaskQueueError> {
    let parsed = Url::parse(url).map_err(|source| TaskQueueError::InvalidBrokerUrl {
        url: url.to_string(),
        source,
    })?;

    match parsed.scheme() {
        "memory" => Ok(Arc::new(MemoryBroker::new())),
        "file" => {
            let root = parsed
                .to_file_path()
                .map_err(|_| TaskQueueError::UnsupportedBroker(url.to_string()))?;
            Ok(Arc::new(SpoolBroker::open(root).await?))
        }
        other => Err(TaskQueueError::UnsupportedBroker(other.to_string())),
    }
}
