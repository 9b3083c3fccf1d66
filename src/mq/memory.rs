use std::collections::{HashMap, VecDeque};

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::{
    error::TaskQueueError,
    mq::{
        broker::{Broker, Delivery},
        message::{TaskMessage, TaskResult},
    },
};

/// In-process broker: FIFO queues and a result map, lost on exit.
#[derive(Default)]
pub struct MemoryBroker {
    queues: Mutex<HashMap<String, VecDeque<TaskMessage>>>,
    results: Mutex<HashMap<String, TaskResult>>,
}

impl MemoryBroker {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self, queue: &str) -> usize {
        self.queues.lock().await.get(queue).map_or(0, VecDeque::len)
    }
}

#[async_trait]
impl Broker for MemoryBroker {
    async fn publish(&self, message: &TaskMessage) -> Result<(), TaskQueueError> {
        self.queues
            .lock()
            .await
            .entry(message.queue.clone())
            .or_default()
            .push_back(message.clone());
        Ok(())
    }

    async fn fetch(&self, queue: &str) -> Result<Option<Delivery>, TaskQueueError> {
        let message = self
            .queues
            .lock()
            .await
            .get_mut(queue)
            .and_then(VecDeque::pop_front);
        Ok(message.map(|m| Delivery::new(m, None)))
    }

    async fn ack(&self, _delivery: &Delivery) -> Result<(), TaskQueueError> {
        Ok(())
    }

    async fn store_result(&self, result: &TaskResult) -> Result<(), TaskQueueError> {
        self.results
            .lock()
            .await
            .insert(result.id.clone(), result.clone());
        Ok(())
    }

    async fn get_result(&self, id: &str) -> Result<Option<TaskResult>, TaskQueueError> {
        Ok(self.results.lock().await.get(id).cloned())
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[tokio::test]
    async fn fifo_per_queue() {
        let broker = MemoryBroker::new();
        let first = TaskMessage::new("a", "celery", json!(1));
        let second = TaskMessage::new("b", "celery", json!(2));
        let other = TaskMessage::new("c", "reports", json!(3));
        broker.publish(&first).await.unwrap();
        broker.publish(&second).await.unwrap();
        broker.publish(&other).await.unwrap();
        assert_eq!(broker.len("celery").await, 2);

        assert_eq!(broker.fetch("celery").await.unwrap().unwrap().message, first);
        assert_eq!(broker.fetch("celery").await.unwrap().unwrap().message, second);
        assert!(broker.fetch("celery").await.unwrap().is_none());
        assert_eq!(broker.fetch("reports").await.unwrap().unwrap().message, other);
        assert!(broker.fetch("missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn results_round_trip() {
        let broker = MemoryBroker::new();
        let message = TaskMessage::new("a", "celery", json!(null));
        assert!(broker.get_result(&message.id).await.unwrap().is_none());

        let result = TaskResult::success(&message, json!("done"));
        broker.store_result(&result).await.unwrap();
        assert_eq!(broker.get_result(&message.id).await.unwrap(), Some(result));
    }
}
