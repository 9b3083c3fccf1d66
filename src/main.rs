use std::path::PathBuf;

use clap::Parser;
use log::info;
use map_webui::{create_app, logging};
use tokio::net::TcpListener;

#[derive(Parser)]
#[command(name = "map-webui", about = "mAP Web UI server")]
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

    let settings = app.settings();
    info!("Starting application with config:");
    info!("  Name: {}", app.name());
    info!("  Env: {:?} (debug: {})", settings.env, settings.debug);
    info!("  Broker: {:?}", settings.celery.broker_url);

    let bind_address = settings.bind_address();
    let listener = TcpListener::bind(&bind_address).await?;
    info!("Server starting on http://{}", bind_address);

    axum::serve(listener, app.router())
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("Shutdown requested");
        })
        .await?;

    Ok(())
}
