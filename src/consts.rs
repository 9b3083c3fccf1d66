/// Config file loaded when no explicit path is given. The extension is
/// resolved by the loader, so `config/server.toml` and `config/server.yaml`
/// both match.
pub const DEFAULT_CONFIG_PATH: &str = "config/server";

/// Prefix for environment overrides, e.g. `MAPWEBUI_PORT`.
pub const ENV_PREFIX: &str = "MAPWEBUI";

/// Separator for nested keys, e.g. `MAPWEBUI_CELERY__BROKER_URL`.
pub const ENV_SEPARATOR: &str = "__";

pub const DEFAULT_LOG_FORMAT: &str = "[{asctime}] {levelname} in {module}: {message}";

pub const DEFAULT_LOG_FORMAT_DEV: &str =
    "[{asctime}] {levelname} {addr} {user} {pathname}:{lineno}: {message}";

pub const DEFAULT_LOG_DATEFMT: &str = "%Y-%m-%d %H:%M:%S";

/// Upper bound for `celery.worker_concurrency`.
pub const MAX_WORKER_CONCURRENCY: usize = 1024;

/// Key of the task-queue client in the extension registry.
pub const TASK_QUEUE_EXTENSION: &str = "celery";

pub const WELCOME_MESSAGE: &str = "Welcome to the mAP Web UI!";
