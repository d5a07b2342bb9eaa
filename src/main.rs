// Cropsync - Main Entry Point
// Real-time map synchronization engine for the crop monitoring dashboard

use std::sync::Arc;

use clap::Parser;
use cropsync::config::Config;
use cropsync::net::push::PushClient;
use cropsync::net::rest::ApiClient;
use cropsync::sync::SyncEngine;
use tokio::signal;
use tower_http::services::ServeDir;
use tracing::{error, info};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Parse command-line arguments
    let config = Config::parse();

    // Initialize logging
    init_logging(config.verbose);

    info!("Starting sync engine");
    info!("API base: {}", config.api_base);
    info!("Push stream: {}", config.push_connect);

    let api = ApiClient::new(config.api_base.clone());
    let engine = Arc::new(SyncEngine::new(
        api,
        config.work_dir.clone(),
        config.status_interval,
        config.refresh_interval,
    ));
    engine.init_work_dir().await;
    info!("Engine initialized");

    // Optional: HTTP server to expose the work directory (layers.json, status.json)
    if let Some(port) = config.http_port {
        if config.work_dir.is_empty() {
            error!("--http-port given without --work-dir; nothing to serve");
        } else {
            let work_dir = config.work_dir.clone();
            tokio::spawn(async move {
                let listener = match tokio::net::TcpListener::bind((
                    std::net::Ipv4Addr::UNSPECIFIED,
                    port,
                ))
                .await
                {
                    Ok(l) => l,
                    Err(e) => {
                        error!("HTTP server failed to bind to port {}: {}", port, e);
                        return;
                    }
                };
                info!("HTTP server on port {} serving {}", port, work_dir);
                let app = axum::Router::new().nest_service("/", ServeDir::new(work_dir));
                if let Err(e) = axum::serve(listener, app).await {
                    error!("HTTP server error: {}", e);
                }
            });
        }
    }

    // Push client: feeds validated events into the engine's channel
    let push_client = PushClient::new(
        config.push_connect.clone(),
        engine.events_sender(),
        engine.conn_state_handle(),
    );
    tokio::spawn(async move {
        push_client.run().await;
    });

    // Engine loop: push ingestion, periodic refresh, status, state writes
    let engine_clone = engine.clone();
    tokio::spawn(async move {
        engine_clone.run().await;
    });

    info!("Engine ready");

    // Wait for shutdown signal (Ctrl+C)
    match signal::ctrl_c().await {
        Ok(()) => {
            info!("Received shutdown signal (Ctrl+C)");
        }
        Err(err) => {
            error!("Unable to listen for shutdown signal: {}", err);
            return Err(err.into());
        }
    }

    info!("Shutting down...");

    // Report final state
    let layers = engine.compose_layers().await;
    info!(
        "Engine stopped. Final state: {} markers, {} polygons",
        layers.markers.len(),
        layers.polygons.len()
    );

    Ok(())
}

/// Initialize logging subsystem
fn init_logging(verbose: bool) {
    use tracing_subscriber::fmt::format::FmtSpan;

    let subscriber = tracing_subscriber::fmt()
        .with_target(false)
        .with_thread_ids(false)
        .with_level(true)
        .with_span_events(if verbose {
            FmtSpan::ENTER | FmtSpan::CLOSE
        } else {
            FmtSpan::NONE
        });

    if verbose {
        subscriber.with_max_level(tracing::Level::DEBUG).init();
        info!("Verbose logging enabled (DEBUG level)");
    } else {
        subscriber.with_max_level(tracing::Level::INFO).init();
    }
}
