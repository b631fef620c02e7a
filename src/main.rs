use anyhow::{Context, Result};
use clap::Parser;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use vishing_sim::speech::{HttpDialogueEngine, NatsSpeechProvider};
use vishing_sim::storage::{JsonlRecordStore, StaticUserDirectory};
use vishing_sim::{create_router, AppState, Config, SessionConfig, SessionServices};

#[derive(Debug, Parser)]
#[command(name = "vishing-sim", about = "Voice phishing simulation server")]
struct Cli {
    /// Configuration file (extension optional)
    #[arg(short, long, default_value = "config/vishing-sim")]
    config: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();
    let cfg = Config::load(&cli.config)
        .with_context(|| format!("Failed to load config from {}", cli.config))?;

    info!("{} v{}", cfg.service.name, env!("CARGO_PKG_VERSION"));
    info!("Recordings will be stored under {}", cfg.archive.records_root.display());
    if cfg.users.is_empty() {
        warn!("No users configured; every simulation upgrade will be rejected");
    }

    let speech = NatsSpeechProvider::connect(cfg.speech.clone()).await?;
    let dialogue = HttpDialogueEngine::new(&cfg.dialogue)?;
    let records = JsonlRecordStore::new(cfg.storage.records_file.clone());

    let services = SessionServices {
        speech: Arc::new(speech),
        dialogue: Arc::new(dialogue),
        records: Arc::new(records),
    };

    let shutdown = CancellationToken::new();
    let state = AppState::new(
        services,
        Arc::new(StaticUserDirectory::new(&cfg.users)),
        SessionConfig::from_config(&cfg),
        shutdown.clone(),
    );

    let addr = format!("{}:{}", cfg.service.http.bind, cfg.service.http.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    info!("HTTP server listening on {}", addr);

    axum::serve(listener, create_router(state))
        .with_graceful_shutdown(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!("Failed to listen for shutdown signal: {}", e);
            }
            info!("Shutting down, cancelling live sessions");
            shutdown.cancel();
        })
        .await
        .context("HTTP server failed")?;

    Ok(())
}
