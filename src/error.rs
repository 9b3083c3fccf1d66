use thiserror::Error;

use crate::config::ConfigError;

/// Startup failures surfaced by the app factory and the entry points.
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Task queue error: {0}")]
    TaskQueue(#[from] TaskQueueError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

#[derive(Error, Debug)]
pub enum TaskQueueError {
    #[error("no broker configured (set celery.broker_url)")]
    MissingBrokerUrl,

    #[error("invalid broker url '{url}': {source}")]
    InvalidBrokerUrl {
        url: String,
        #[source]
        source: url::ParseError,
    },

    #[error("unsupported broker scheme '{0}'")]
    UnsupportedBroker(String),

    #[error("invalid queue name '{0}'")]
    InvalidQueue(String),

    #[error("invalid task id '{0}'")]
    InvalidTaskId(String),

    #[error("task '{0}' is not registered")]
    UnknownTask(String),

    #[error("task '{name}' failed: {reason}")]
    TaskFailed { name: String, reason: String },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl TaskQueueError {
    pub fn task_failed<T: std::fmt::Display>(name: &str, reason: T) -> Self {
        Self::TaskFailed {
            name: name.to_string(),
            reason: reason.to_string(),
        }
    }

    /// Configuration problems will not go away by retrying.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            TaskQueueError::MissingBrokerUrl
                | TaskQueueError::InvalidBrokerUrl { .. }
                | TaskQueueError::UnsupportedBroker(_)
                | TaskQueueError::InvalidQueue(_)
        )
    }
}

pub type AppResult<T> = Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_conversions() {
        let io_error = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        let app_error: AppError = io_error.into();
        assert!(matches!(app_error, AppError::Io(_)));

        let app_error: AppError = TaskQueueError::MissingBrokerUrl.into();
        assert!(matches!(app_error, AppError::TaskQueue(_)));

        let anyhow_error = anyhow::anyhow!("test error");
        let app_error: AppError = anyhow_error.into();
        assert!(matches!(app_error, AppError::Internal(_)));
    }

    #[test]
    fn test_is_configuration() {
        assert!(TaskQueueError::MissingBrokerUrl.is_configuration());
        assert!(TaskQueueError::UnsupportedBroker("amqp".into()).is_configuration());
        assert!(!TaskQueueError::UnknownTask("ping".into()).is_configuration());
        assert!(!TaskQueueError::task_failed("ping", "boom").is_configuration());
    }

    #[test]
    fn test_messages() {
        assert_eq!(
            TaskQueueError::task_failed("ping", "boom").to_string(),
            "task 'ping' failed: boom"
        );
        assert_eq!(
            AppError::from(TaskQueueError::MissingBrokerUrl).to_string(),
            "Task queue error: no broker configured (set celery.broker_url)"
        );
    }
}
