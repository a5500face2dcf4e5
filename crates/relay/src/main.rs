//! Relay server binary
//!
//! Composition root: builds the configuration, session store, forward
//! worker, and router, then serves until interrupted or asked to shut
//! down over HTTP.

use std::sync::Arc;

use easel_config::BridgeConfig;
use easel_relay::forward::FORWARD_ATTEMPTS;
use easel_relay::{app_router, spawn_forwarder, AppState, ForwardResult, SessionStore};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = BridgeConfig::from_env();

    let default_level = if config.debug { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(format!("easel_relay={default_level},info"))),
        )
        .init();

    info!("Easel relay starting");
    info!("Frontend directory: {}", config.frontend_dir.display());
    info!("Pipeline host: {}", config.pipeline_url);
    info!("Serving on: {}", config.url());
    if !config.frontend_dir.is_dir() {
        warn!(
            "Frontend directory {} does not exist; only the API will be served",
            config.frontend_dir.display()
        );
    }
    if let Some(dir) = &config.dump_dir {
        std::fs::create_dir_all(dir)?;
        info!("Dumping output images to {}", dir.display());
    }

    let client = reqwest::Client::builder().build()?;
    let shutdown = CancellationToken::new();

    let forwarder = if config.auto_forward {
        let (queue, mut results) =
            spawn_forwarder(client.clone(), config.pipeline_url.clone(), FORWARD_ATTEMPTS);
        // Drain worker outcomes into the log; nobody else waits on them.
        tokio::spawn(async move {
            while let Some(result) = results.recv().await {
                match result {
                    ForwardResult::Delivered { status } => {
                        info!("Auto-forward delivered, upstream status {status}");
                    }
                    ForwardResult::Failed { attempts, detail } => {
                        warn!("Auto-forward gave up after {attempts} attempts: {detail}");
                    }
                }
            }
        });
        Some(queue)
    } else {
        None
    };

    let state = AppState {
        store: SessionStore::new(),
        config: Arc::new(config.clone()),
        client,
        forwarder,
        shutdown: shutdown.clone(),
    };

    let listener = tokio::net::TcpListener::bind(config.bind_addr()).await?;
    axum::serve(listener, app_router(state))
        .with_graceful_shutdown(wait_for_stop(shutdown))
        .await?;

    info!("Easel relay stopped");
    Ok(())
}

/// Resolve on Ctrl-C or on the HTTP shutdown endpoint's token.
async fn wait_for_stop(shutdown: CancellationToken) {
    tokio::select! {
        _ = shutdown.cancelled() => {}
        result = tokio::signal::ctrl_c() => {
            if let Err(err) = result {
                warn!("Failed to listen for interrupt: {err}");
                shutdown.cancelled().await;
            }
        }
    }
}
