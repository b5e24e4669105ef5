//! Overlay API server

use anyhow::Result;
use clap::Parser;
use overlay_api::{router, AppState, Config};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "overlay-api")]
#[command(about = "Field store, signing sessions and public forms for PDF overlays")]
struct Args {
    /// TOML config file (defaults to $OVERLAY_API_CONFIG)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Port to listen on
    #[arg(short, long)]
    port: Option<u16>,

    /// Address to bind
    #[arg(long)]
    host: Option<String>,

    /// Enable debug logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    let args = Args::parse();

    let level = if args.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(format!("overlay_api={}", level).parse()?)
                .add_directive(format!("overlay_core={}", level).parse()?)
                .add_directive(format!("flatten_core={}", level).parse()?)
                .add_directive("tower_http=debug".parse()?),
        )
        .init();

    let config_path = args
        .config
        .or_else(|| std::env::var_os("OVERLAY_API_CONFIG").map(PathBuf::from));
    let mut config = match config_path {
        Some(path) => {
            info!("Loading config from {}", path.display());
            Config::from_file(path)?
        }
        None => Config::default(),
    };
    config.apply_env()?;
    if let Some(port) = args.port {
        config.server.port = port;
    }
    if let Some(host) = args.host {
        config.server.host = host;
    }

    // Initialize application state
    info!("Initializing Overlay API...");
    let state = AppState::connect(&config.database, config.limits.clone()).await?;
    let app = router(Arc::new(state));

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port).parse()?;
    info!("Starting Overlay API on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    if tokio::signal::ctrl_c().await.is_ok() {
        info!("Shutting down");
    }
}
