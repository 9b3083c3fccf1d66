pub mod app;
pub mod config;
pub mod consts;
pub mod error;
pub mod factory;
pub mod logging;
pub mod mq;
pub mod routes;
pub mod state;
pub mod tasks;
pub mod utils;

pub use app::App;
pub use factory::{create_app, create_app_with_settings, task_queue_init_app};
