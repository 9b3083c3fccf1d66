use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use log::info;
use map_webui::{create_app, logging};

#[derive(Parser)]
#[command(name = "map-webui-worker", about = "Background task worker for the mAP Web UI")]
struct Cli {
    /// Config file; defaults to config/server.{toml,yaml,json} when present
    #[arg(long, env = "MAPWEBUI_CONFIG")]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let app = create_app(cli.config.as_deref())?;
    logging::install(app.logger().clone());

    let queue = app
        .task_queue()
        .cloned()
        .context("application has no task queue")?;

    queue
        .worker()
        .run(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("Shutdown requested");
        })
        .await?;

    info!("Worker stopped");
    Ok(())
}
