//! seqclock supreme
//!
//! Cluster-level coordinator. Accepts resource requests from pipeline-step
//! invokers and routes them to the watcher on the node hosting the
//! function's container.

use std::sync::Arc;

use anyhow::{Context, Result};
use seqclock_supreme::{api, config, state::AppState, Coordinator, WatcherClient, WatcherNode};
use tokio::sync::watch;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> Result<()> {
    let config = config::Config::from_env()?;

    // Initialize tracing (prefer RUST_LOG, fallback to SEQCLOCK_LOG_LEVEL)
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| config.log_level.clone().into()))
        .with(tracing_subscriber::fmt::layer().json())
        .init();

    info!("Starting seqclock supreme");
    info!(
        listen_addr = %config.listen_addr,
        watcher_nodes = ?config.watcher_nodes,
        max_attempts = config.dispatch.max_attempts,
        backoff_ms = config.dispatch.backoff.as_millis() as u64,
        "Configuration loaded"
    );

    let mut nodes: Vec<Arc<dyn WatcherNode>> = Vec::with_capacity(config.watcher_nodes.len());
    for node in &config.watcher_nodes {
        let client = WatcherClient::new(node, config.watcher_port, config.rpc_timeout)
            .with_context(|| format!("Failed to create client for watcher {node}"))?;
        nodes.push(Arc::new(client));
    }

    let coordinator = Coordinator::new(nodes, config.dispatch);
    let state = AppState::new(coordinator.clone());
    let app = api::create_router(state);

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let listener = tokio::net::TcpListener::bind(&config.listen_addr).await?;
    info!(addr = %config.listen_addr, "Listening for connections");

    let mut server_handle = tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let mut shutdown_rx = shutdown_rx;
                let _ = shutdown_rx.wait_for(|stop| *stop).await;
                info!("HTTP server shutting down");
            })
            .await
    });

    let server_exited = tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("Received shutdown signal");
            false
        }
        result = &mut server_handle => {
            log_server_exit(result);
            true
        }
    };

    // Stop placements, then let in-flight requests and accepted resets finish
    coordinator.shutdown();
    let _ = shutdown_tx.send(true);

    info!(grace_ms = config.shutdown_grace.as_millis() as u64, "Waiting for in-flight work...");
    let drained = tokio::time::timeout(config.shutdown_grace, async {
        if !server_exited {
            log_server_exit(server_handle.await);
        }
        coordinator.drain().await;
    })
    .await;
    if drained.is_err() {
        warn!("Shutdown grace period elapsed with work still in flight");
    }

    info!("Supreme shutdown complete");
    Ok(())
}

fn log_server_exit(result: Result<std::io::Result<()>, tokio::task::JoinError>) {
    match result {
        Ok(Ok(())) => info!("Server exited normally"),
        Ok(Err(e)) => error!(error = %e, "Server error"),
        Err(e) => error!(error = %e, "Server task panicked"),
    }
}
