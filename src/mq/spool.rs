use std::{
    io::ErrorKind,
    path::{Path, PathBuf},
};

use async_trait::async_trait;
use log::{debug, warn};
use tokio::fs;

use crate::{
    error::TaskQueueError,
    mq::{
        broker::{Broker, Delivery},
        message::{TaskMessage, TaskResult},
    },
    utils::{is_valid_queue_name, is_valid_task_id},
};

/// Directory-backed broker shared by every process that points at the same
/// root.
///
/// Layout:
/// - `queues/<queue>/<id>.json`: published, not yet claimed
/// - `processing/<queue>/<id>.json`: claimed by a worker, removed on ack
/// - `results/<id>.json`: finished task outcomes
/// - `tmp/`: staging area so readers never see half-written files
///
/// Claiming is a rename out of `queues/`, which succeeds for exactly one
/// contender.
pub struct SpoolBroker {
    root: PathBuf,
}

impl SpoolBroker {
    pub async fn open(root: impl Into<PathBuf>) -> Result<Self, TaskQueueError> {
        let root = root.into();
        for sub in ["queues", "processing", "results", "tmp"] {
            fs::create_dir_all(root.join(sub)).await?;
        }
        debug!("Spool broker opened at {}", root.display());
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn queue_dir(&self, queue: &str) -> Result<PathBuf, TaskQueueError> {
        if !is_valid_queue_name(queue) {
            return Err(TaskQueueError::InvalidQueue(queue.to_string()));
        }
        Ok(self.root.join("queues").join(queue))
    }

    fn processing_dir(&self, queue: &str) -> PathBuf {
        self.root.join("processing").join(queue)
    }

    fn result_path(&self, id: &str) -> Result<PathBuf, TaskQueueError> {
        if !is_valid_task_id(id) {
            return Err(TaskQueueError::InvalidTaskId(id.to_string()));
        }
        Ok(self.root.join("results").join(format!("{}.json", id)))
    }

    /// Write `bytes` to `dest` through `tmp/` so the file appears atomically.
    async fn write_atomic(&self, name: &str, bytes: &[u8], dest: &Path) -> Result<(), TaskQueueError> {
        let staging = self.root.join("tmp").join(name);
        fs::write(&staging, bytes).await?;
        fs::rename(&staging, dest).await?;
        Ok(())
    }
}

#[async_trait]
impl Broker for SpoolBroker {
    async fn publish(&self, message: &TaskMessage) -> Result<(), TaskQueueError> {
        let dir = self.queue_dir(&message.queue)?;
        fs::create_dir_all(&dir).await?;
        let name = format!("{}.json", message.id);
        let bytes = serde_json::to_vec(message)?;
        self.write_atomic(&name, &bytes, &dir.join(&name)).await
    }

    async fn fetch(&self, queue: &str) -> Result<Option<Delivery>, TaskQueueError> {
        let dir = self.queue_dir(queue)?;
        let mut entries = match fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        let mut names = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name().to_string_lossy().into_owned();
            if name.ends_with(".json") {
                names.push(name);
            }
        }
        names.sort();

        let claimed_dir = self.processing_dir(queue);
        fs::create_dir_all(&claimed_dir).await?;

        for name in names {
            let claimed = claimed_dir.join(&name);
            match fs::rename(dir.join(&name), &claimed).await {
                Ok(()) => {}
                // Another worker won the race.
                Err(e) if e.kind() == ErrorKind::NotFound => continue,
                Err(e) => return Err(e.into()),
            }

            let bytes = fs::read(&claimed).await?;
            match serde_json::from_slice::<TaskMessage>(&bytes) {
                Ok(message) => return Ok(Some(Delivery::new(message, Some(claimed)))),
                Err(e) => {
                    warn!("Dropping unreadable spool message {}: {}", claimed.display(), e);
                    fs::remove_file(&claimed).await?;
                }
            }
        }
        Ok(None)
    }

    async fn ack(&self, delivery: &Delivery) -> Result<(), TaskQueueError> {
        if let Some(path) = &delivery.receipt {
            match fs::remove_file(path).await {
                Ok(()) => {}
                Err(e) if e.kind() == ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
        }
        Ok(())
    }

    async fn store_result(&self, result: &TaskResult) -> Result<(), TaskQueueError> {
        let dest = self.result_path(&result.id)?;
        let name = format!("result-{}.json", result.id);
        let bytes = serde_json::to_vec(result)?;
        self.write_atomic(&name, &bytes, &dest).await
    }

    async fn get_result(&self, id: &str) -> Result<Option<TaskResult>, TaskQueueError> {
        match fs::read(self.result_path(id)?).await {
            Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}
