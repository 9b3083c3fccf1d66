use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::utils::time_sortable_uid;

/// A task invocation as it travels through the broker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskMessage {
    /// Time-sortable id, also the spool file name.
    pub id: String,
    /// Registered name of the task to run.
    pub task: String,
    pub queue: String,
    pub args: Value,
    pub created_at: DateTime<Utc>,
}

impl TaskMessage {
    pub fn new(task: impl Into<String>, queue: impl Into<String>, args: Value) -> Self {
        Self {
            id: time_sortable_uid(),
            task: task.into(),
            queue: queue.into(),
            args,
            created_at: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Success,
    Failure,
}

/// Outcome of a finished task, stored by the worker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskResult {
    pub id: String,
    pub task: String,
    pub status: TaskStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub finished_at: DateTime<Utc>,
}

impl TaskResult {
    pub fn success(message: &TaskMessage, value: Value) -> Self {
        Self {
            id: message.id.clone(),
            task: message.task.clone(),
            status: TaskStatus::Success,
            value: Some(value),
            error: None,
            finished_at: Utc::now(),
        }
    }

    pub fn failure<T: std::fmt::Display>(message: &TaskMessage, error: T) -> Self {
        Self {
            id: message.id.clone(),
            task: message.task.clone(),
            status: TaskStatus::Failure,
            value: None,
            error: Some(error.to_string()),
            finished_at: Utc::now(),
        }
    }
}

/// What a caller sees when asking for a task's outcome.
#[derive(Debug, Clone, PartialEq)]
pub enum TaskState {
    /// Not finished yet, unknown, or finished with results ignored.
    Pending,
    Success(Value),
    Failure(String),
}

impl From<TaskResult> for TaskState {
    fn from(result: TaskResult) -> Self {
        match result.status {
            TaskStatus::Success => TaskState::Success(result.value.unwrap_or(Value::Null)),
            TaskStatus::Failure => TaskState::Failure(result.error.unwrap_or_default()),
        }
    }
}
