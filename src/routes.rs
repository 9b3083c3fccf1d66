use axum::{Json, Router, extract::State, routing::get};
use serde_json::{Value, json};
use tower_http::trace::TraceLayer;

use crate::{config::RunMode, consts::WELCOME_MESSAGE, state::AppState};

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(home))
        .route("/health", get(health_check))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}

async fn home() -> &'static str {
    WELCOME_MESSAGE
}

async fn health_check(State(state): State<AppState>) -> Json<Value> {
    let settings = &state.context.settings;
    let env = match settings.env {
        RunMode::Production => "production",
        RunMode::Development => "development",
    };
    let task_queue = state.task_queue.as_ref().map(|q| {
        json!({
            "default_queue": q.settings().default_queue,
            "broker_configured": q.settings().broker_url.is_some(),
            "tasks": q.registered_tasks(),
        })
    });

    Json(json!({
        "status": "healthy",
        "app": state.context.name.as_ref(),
        "env": env,
        "debug": settings.debug,
        "task_queue": task_queue,
        "timestamp": chrono::Utc::now()
    }))
}
