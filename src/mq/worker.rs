use std::{future::Future, panic::AssertUnwindSafe, sync::Arc, time::Duration};

use futures::FutureExt;
use log::{debug, error, info, warn};
use tokio::sync::Semaphore;

use crate::{
    consts::MAX_WORKER_CONCURRENCY,
    error::TaskQueueError,
    mq::{
        TaskQueue,
        broker::{Broker, Delivery},
        message::TaskResult,
    },
};

/// Consumes the default queue of a [`TaskQueue`] and runs the registered
/// tasks.
///
/// Messages are acked once their task has run. A result that cannot be
/// stored is reported as an error but does not put the message back.
pub struct Worker {
    queue: TaskQueue,
    concurrency: usize,
    poll_interval: Duration,
}

impl Worker {
    pub fn new(queue: TaskQueue) -> Self {
        let settings = queue.settings();
        let concurrency = settings
            .worker_concurrency
            .clamp(1, MAX_WORKER_CONCURRENCY);
        let poll_interval = Duration::from_millis(settings.worker_poll_interval_ms);
        Self {
            queue,
            concurrency,
            poll_interval,
        }
    }

    pub fn concurrency(&self) -> usize {
        self.concurrency
    }

    /// Process at most one message. Returns whether a message was found.
    pub async fn run_once(&self) -> Result<bool, TaskQueueError> {
        let broker = self.queue.broker().await?;
        let queue_name = &self.queue.settings().default_queue;
        match broker.fetch(queue_name).await? {
            Some(delivery) => {
                process(&self.queue, broker.as_ref(), delivery).await?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Poll until `shutdown` resolves, then wait for in-flight tasks.
    pub async fn run<S>(&self, shutdown: S) -> Result<(), TaskQueueError>
    where
        S: Future<Output = ()>,
    {
        let broker = self.queue.broker().await?;
        let queue_name = self.queue.settings().default_queue.clone();
        let permits = u32::try_from(self.concurrency).unwrap_or(u32::MAX);
        let sem = Arc::new(Semaphore::new(permits as usize));
        tokio::pin!(shutdown);

        info!(
            "Worker for '{}' started: queue={} concurrency={} tasks={:?}",
            self.queue.main_name(),
            queue_name,
            self.concurrency,
            self.queue.registered_tasks()
        );

        loop {
            let permit = tokio::select! {
                _ = &mut shutdown => break,
                permit = Arc::clone(&sem).acquire_owned() => match permit {
                    Ok(permit) => permit,
                    Err(_) => break,
                },
            };

            let delivery = match broker.fetch(&queue_name).await {
                Ok(Some(delivery)) => delivery,
                Ok(None) => {
                    drop(permit);
                    tokio::select! {
                        _ = &mut shutdown => break,
                        _ = tokio::time::sleep(self.poll_interval) => continue,
                    }
                }
                Err(e) if e.is_configuration() => return Err(e),
                Err(e) => {
                    warn!("Fetching from queue '{}' failed: {}", queue_name, e);
                    drop(permit);
                    tokio::select! {
                        _ = &mut shutdown => break,
                        _ = tokio::time::sleep(self.poll_interval) => continue,
                    }
                }
            };

            let queue = self.queue.clone();
            let broker = Arc::clone(&broker);
            tokio::spawn(async move {
                let _permit = permit;
                let id = delivery.message.id.clone();
                if let Err(e) = process(&queue, broker.as_ref(), delivery).await {
                    error!("Task {} could not be completed: {}", id, e);
                }
            });
        }

        info!("Worker shutting down, waiting for in-flight tasks");
        // Every permit back means every spawned task has finished.
        let _all = sem.acquire_many(permits).await;
        Ok(())
    }
}

async fn process(
    queue: &TaskQueue,
    broker: &dyn Broker,
    delivery: Delivery,
) -> Result<(), TaskQueueError> {
    let message = &delivery.message;
    debug!("Received task '{}' ({})", message.task, message.id);

    let result = match queue.task(&message.task) {
        Some(task) => {
            match AssertUnwindSafe(task.call(message.args.clone()))
                .catch_unwind()
                .await
            {
                Ok(Ok(value)) => {
                    info!("Task '{}' ({}) succeeded", message.task, message.id);
                    TaskResult::success(message, value)
                }
                Ok(Err(e)) => {
                    warn!("Task '{}' ({}) failed: {:#}", message.task, message.id, e);
                    TaskResult::failure(message, format!("{:#}", e))
                }
                Err(_) => {
                    error!("Task '{}' ({}) panicked", message.task, message.id);
                    TaskResult::failure(message, "task panicked")
                }
            }
        }
        None => {
            warn!("Received unregistered task '{}' ({})", message.task, message.id);
            TaskResult::failure(message, TaskQueueError::UnknownTask(message.task.clone()))
        }
    };

    let stored = if queue.settings().task_ignore_result {
        Ok(())
    } else {
        broker.store_result(&result).await
    };
    // Acked even when the result was lost; a task never runs twice.
    broker.ack(&delivery).await?;
    stored
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use serde_json::{Value, json};

    use super::*;
    use crate::{
        config::Settings,
        mq::{
            memory::MemoryBroker,
            message::{TaskMessage, TaskState},
        },
        state::{AppContext, current_app},
    };

    fn queue(ignore_result: bool) -> TaskQueue {
        let mut settings = Settings::default();
        settings.name = "worker-test".to_string();
        settings.celery.broker_url = Some("memory://".to_string());
        settings.celery.task_ignore_result = ignore_result;
        settings.celery.worker_concurrency = 2;
        settings.celery.worker_poll_interval_ms = 10;
        let celery = settings.celery.clone();
        let q = TaskQueue::new(AppContext::new(settings), celery);
        q.register("whoami", |_ctx, _args| async move {
            let ctx = current_app().ok_or_else(|| anyhow::anyhow!("no app context"))?;
            Ok::<_, anyhow::Error>(json!(ctx.name.as_ref()))
        });
        q.register("fail", |_ctx, _args| async move {
            Err::<Value, _>(anyhow::anyhow!("boom"))
        });
        q.register("panic", |_ctx, _args| async move {
            if true {
                panic!("kaboom");
            }
            Ok::<_, anyhow::Error>(Value::Null)
        });
        q
    }

    #[tokio::test]
    async fn run_once_executes_inside_app_context() {
        let q = queue(false);
        let worker = q.worker();
        assert!(!worker.run_once().await.unwrap());

        let id = q.send_task("whoami", Value::Null).await.unwrap();
        assert_eq!(q.result(&id).await.unwrap(), TaskState::Pending);
        assert!(worker.run_once().await.unwrap());
        assert_eq!(q.result(&id).await.unwrap(), TaskState::Success(json!("worker-test")));
    }

    #[tokio::test]
    async fn failures_are_recorded() {
        let q = queue(false);
        let worker = q.worker();

        let failed = q.send_task("fail", Value::Null).await.unwrap();
        let panicked = q.send_task("panic", Value::Null).await.unwrap();
        let unknown = q.send_task("missing", Value::Null).await.unwrap();
        while worker.run_once().await.unwrap() {}

        assert_eq!(q.result(&failed).await.unwrap(), TaskState::Failure("boom".into()));
        assert_eq!(
            q.result(&panicked).await.unwrap(),
            TaskState::Failure("task panicked".into())
        );
        assert!(matches!(
            q.result(&unknown).await.unwrap(),
            TaskState::Failure(msg) if msg.contains("missing")
        ));
    }

    #[tokio::test]
    async fn ignored_results_stay_pending() {
        let q = queue(true);
        let id = q.send_task("whoami", Value::Null).await.unwrap();
        assert!(q.worker().run_once().await.unwrap());
        assert_eq!(q.result(&id).await.unwrap(), TaskState::Pending);
    }

    #[tokio::test]
    async fn run_drains_queue_until_shutdown() {
        let q = queue(false);
        let mut ids = Vec::new();
        for _ in 0..5 {
            ids.push(q.send_task("whoami", Value::Null).await.unwrap());
        }

        let (tx, rx) = tokio::sync::oneshot::channel::<()>();
        let worker = q.worker();
        let handle = tokio::spawn(async move {
            worker
                .run(async {
                    let _ = rx.await;
                })
                .await
        });

        for id in &ids {
            let mut state = TaskState::Pending;
            for _ in 0..200 {
                state = q.result(id).await.unwrap();
                if state != TaskState::Pending {
                    break;
                }
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
            assert_eq!(state, TaskState::Success(json!("worker-test")));
        }

        tx.send(()).unwrap();
        handle.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn shutdown_interrupts_backoff_after_fetch_errors() {
        let dir = tempfile::tempdir().unwrap();
        // A file where the queue directory should be makes every fetch fail.
        std::fs::create_dir_all(dir.path().join("queues")).unwrap();
        std::fs::write(dir.path().join("queues").join("celery"), b"").unwrap();

        let mut settings = Settings::default();
        settings.celery.broker_url = Some(
            url::Url::from_directory_path(dir.path())
                .unwrap()
                .to_string(),
        );
        settings.celery.worker_poll_interval_ms = 60_000;
        let celery = settings.celery.clone();
        let q = TaskQueue::new(AppContext::new(settings), celery);

        let (tx, rx) = tokio::sync::oneshot::channel::<()>();
        let worker = q.worker();
        let handle = tokio::spawn(async move {
            worker
                .run(async {
                    let _ = rx.await;
                })
                .await
        });

        tokio::time::sleep(Duration::from_millis(50)).await;
        tx.send(()).unwrap();
        let finished = tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .expect("worker stopped before the poll interval elapsed");
        finished.unwrap().unwrap();
    }

    /// Memory broker whose result store is broken; counts acks.
    #[derive(Default)]
    struct LosesResults {
        inner: MemoryBroker,
        acks: AtomicUsize,
    }

    #[async_trait]
    impl Broker for LosesResults {
        async fn publish(&self, message: &TaskMessage) -> Result<(), TaskQueueError> {
            self.inner.publish(message).await
        }

        async fn fetch(&self, queue: &str) -> Result<Option<Delivery>, TaskQueueError> {
            self.inner.fetch(queue).await
        }

        async fn ack(&self, delivery: &Delivery) -> Result<(), TaskQueueError> {
            self.acks.fetch_add(1, Ordering::SeqCst);
            self.inner.ack(delivery).await
        }

        async fn store_result(&self, _result: &TaskResult) -> Result<(), TaskQueueError> {
            Err(std::io::Error::other("disk full").into())
        }

        async fn get_result(&self, id: &str) -> Result<Option<TaskResult>, TaskQueueError> {
            self.inner.get_result(id).await
        }
    }

    #[tokio::test]
    async fn message_is_acked_when_result_cannot_be_stored() {
        let q = queue(false);
        let broker = LosesResults::default();
        broker
            .publish(&TaskMessage::new("whoami", "celery", Value::Null))
            .await
            .unwrap();
        let delivery = broker.fetch("celery").await.unwrap().unwrap();

        let err = process(&q, &broker, delivery).await.unwrap_err();
        assert!(matches!(err, TaskQueueError::Io(_)));
        assert_eq!(broker.acks.load(Ordering::SeqCst), 1);
        assert!(broker.fetch("celery").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn run_without_broker_fails_fast() {
        let settings = Settings::default();
        let celery = settings.celery.clone();
        let q = TaskQueue::new(AppContext::new(settings), celery);
        let err = q.worker().run(std::future::pending()).await.unwrap_err();
        assert!(matches!(err, TaskQueueError::MissingBrokerUrl));
    }
}
