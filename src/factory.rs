use std::path::Path;

use log::debug;

use crate::{
    app::App,
    config::{self, Settings},
    consts::TASK_QUEUE_EXTENSION,
    error::AppResult,
    logging::setup_logger,
    mq::TaskQueue,
    tasks::register_builtin_tasks,
};

/// Build the application from the config file at `config_path` (or the
/// default one) and the `MAPWEBUI_` environment.
pub fn create_app(config_path: Option<&Path>) -> AppResult<App> {
    let settings = config::load(config_path)?;
    Ok(create_app_with_settings(settings))
}

/// Build the application from already loaded settings.
pub fn create_app_with_settings(settings: Settings) -> App {
    let mut app = App::new(settings);
    setup_logger(&app);
    let queue = task_queue_init_app(&mut app);
    register_builtin_tasks(&queue);
    app
}

/// Create the task-queue client for `app`, make it the process default and
/// store it in the extension registry.
///
/// Task bodies registered on the returned client run inside the app context.
pub fn task_queue_init_app(app: &mut App) -> TaskQueue {
    let queue = TaskQueue::new(app.context().clone(), app.settings().celery.clone());
    queue.set_default();
    if app
        .extensions_mut()
        .insert(TASK_QUEUE_EXTENSION, queue.clone())
    {
        debug!("Replaced the task queue of '{}'", app.name());
    }
    queue
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;
    use crate::{
        config::ENV_LOCK,
        logging::ConsoleHandler,
        mq::{DEFAULT_LOCK, default_task_queue},
    };

    fn registry_holds_single_default_client(app: &App) {
        assert_eq!(app.extensions().count::<TaskQueue>(), 1);
        let queue = app.task_queue().expect("task queue registered");
        assert!(queue.is_default());
        assert!(default_task_queue().unwrap().ptr_eq(queue));
        assert_eq!(queue.main_name(), app.name());
    }

    #[test]
    fn create_app_registers_default_task_queue() {
        let _guard = DEFAULT_LOCK.lock().unwrap_or_else(|e| e.into_inner());

        for name in ["first", "second"] {
            let mut settings = Settings::default();
            settings.name = name.to_string();
            let app = create_app_with_settings(settings);
            registry_holds_single_default_client(&app);
            assert_eq!(app.logger().handler_count(), 1);
            assert!(app.logger().find::<ConsoleHandler>().is_some());
        }
    }

    #[test]
    fn create_app_loads_config_file() {
        let _env = ENV_LOCK.lock().unwrap_or_else(|e| e.into_inner());
        let _guard = DEFAULT_LOCK.lock().unwrap_or_else(|e| e.into_inner());

        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        file.write_all(b"name = \"from-file\"\n[celery]\nbroker_url = \"memory://\"\n")
            .unwrap();

        let app = create_app(Some(file.path())).expect("app builds");
        assert_eq!(app.name(), "from-file");
        assert_eq!(
            app.task_queue().unwrap().settings().broker_url.as_deref(),
            Some("memory://")
        );
        registry_holds_single_default_client(&app);
    }

    #[test]
    fn create_app_reports_invalid_config() {
        let _env = ENV_LOCK.lock().unwrap_or_else(|e| e.into_inner());

        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        file.write_all(b"[celery]\nbroker_url = \"amqp://localhost\"\n")
            .unwrap();
        assert!(create_app(Some(file.path())).is_err());
    }

    #[test]
    fn reinitializing_replaces_the_client() {
        let _guard = DEFAULT_LOCK.lock().unwrap_or_else(|e| e.into_inner());

        let mut app = create_app_with_settings(Settings::default());
        let before = app.task_queue().unwrap().clone();
        let returned = task_queue_init_app(&mut app);

        registry_holds_single_default_client(&app);
        assert!(app.task_queue().unwrap().ptr_eq(&returned));
        assert!(!before.ptr_eq(&returned));
    }
}
