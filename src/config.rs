use std::{path::Path, str::FromStr};

use chrono::format::{Item, StrftimeItems};
use log::LevelFilter;
use serde::{Deserialize, Deserializer};
use thiserror::Error;
use url::Url;

use crate::{
    consts::{DEFAULT_CONFIG_PATH, ENV_PREFIX, ENV_SEPARATOR, MAX_WORKER_CONCURRENCY},
    utils::is_valid_queue_name,
};

/// Runtime configuration for the web UI and its workers.
///
/// Values are loaded from (in order): built-in defaults, a config file (the
/// explicit path, or the optional [`DEFAULT_CONFIG_PATH`]), and environment
/// variables prefixed with `MAPWEBUI_` (e.g. `MAPWEBUI_PORT`,
/// `MAPWEBUI_CELERY__BROKER_URL`).
#[derive(Debug, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct Settings {
    pub name: String,
    pub host: String,
    pub port: u16,
    pub env: RunMode,
    pub debug: bool,
    #[serde(deserialize_with = "deserialize_level")]
    pub log_level: LevelFilter,
    pub log_format: Option<String>,
    pub log_datefmt: Option<String>,
    pub celery: TaskQueueSettings,
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum RunMode {
    #[default]
    Production,
    Development,
}

/// The `celery` section, handed to the task-queue client as is.
#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct TaskQueueSettings {
    pub broker_url: Option<String>,
    pub task_ignore_result: bool,
    pub default_queue: String,
    pub worker_concurrency: usize,
    pub worker_poll_interval_ms: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            name: "map-webui".to_string(),
            host: "0.0.0.0".to_string(),
            port: 5000,
            env: RunMode::Production,
            debug: false,
            log_level: LevelFilter::Info,
            log_format: None,
            log_datefmt: None,
            celery: TaskQueueSettings::default(),
        }
    }
}

impl Default for TaskQueueSettings {
    fn default() -> Self {
        Self {
            broker_url: None,
            task_ignore_result: false,
            default_queue: "celery".to_string(),
            worker_concurrency: 4,
            worker_poll_interval_ms: 500,
        }
    }
}

impl Settings {
    pub fn is_development(&self) -> bool {
        self.debug || self.env == RunMode::Development
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.name.trim().is_empty() {
            return Err(ConfigError::invalid("name", "must not be empty"));
        }
        if matches!(&self.log_format, Some(f) if f.is_empty()) {
            return Err(ConfigError::invalid("log_format", "must not be empty when set"));
        }
        if let Some(datefmt) = &self.log_datefmt {
            if StrftimeItems::new(datefmt).any(|item| matches!(item, Item::Error)) {
                return Err(ConfigError::invalid(
                    "log_datefmt",
                    format!("'{}' is not a valid strftime pattern", datefmt),
                ));
            }
        }
        self.celery.validate()
    }
}

impl TaskQueueSettings {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(1..=MAX_WORKER_CONCURRENCY).contains(&self.worker_concurrency) {
            return Err(ConfigError::invalid(
                "celery.worker_concurrency",
                format!(
                    "{} is out of range (1..={})",
                    self.worker_concurrency, MAX_WORKER_CONCURRENCY
                ),
            ));
        }
        if !is_valid_queue_name(&self.default_queue) {
            return Err(ConfigError::invalid(
                "celery.default_queue",
                format!("'{}' is not a valid queue name", self.default_queue),
            ));
        }
        // A missing broker URL is reported by the client on first use.
        if let Some(raw) = &self.broker_url {
            let url = Url::parse(raw).map_err(|e| {
                ConfigError::invalid("celery.broker_url", format!("'{}': {}", raw, e))
            })?;
            if !matches!(url.scheme(), "memory" | "file") {
                return Err(ConfigError::invalid(
                    "celery.broker_url",
                    format!("unsupported scheme '{}'", url.scheme()),
                ));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("configuration error: {0}")]
    Source(#[from] config::ConfigError),

    #[error("invalid configuration value for '{key}': {reason}")]
    Invalid { key: &'static str, reason: String },
}

impl ConfigError {
    fn invalid<T: std::fmt::Display>(key: &'static str, reason: T) -> Self {
        Self::Invalid {
            key,
            reason: reason.to_string(),
        }
    }
}

fn deserialize_level<'de, D>(deserializer: D) -> Result<LevelFilter, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    LevelFilter::from_str(&raw).map_err(serde::de::Error::custom)
}

/// Load settings from the given file (or the default one) and the environment.
///
/// An explicit `path` must exist; the default path is optional.
pub fn load(path: Option<&Path>) -> Result<Settings, ConfigError> {
    let file = match path {
        Some(path) => config::File::from(path).required(true),
        None => config::File::with_name(DEFAULT_CONFIG_PATH).required(false),
    };

    let cfg = config::Config::builder()
        .add_source(file)
        .add_source(
            config::Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("_")
                .separator(ENV_SEPARATOR)
                .try_parsing(true),
        )
        .build()?;

    let settings: Settings = cfg.try_deserialize()?;
    settings.validate()?;
    Ok(settings)
}

#[cfg(test)]
pub(crate) static ENV_LOCK: std::sync::Mutex<()> = std::sync::Mutex::new(());
