//! seqclock watcher
//!
//! Per-node conflict resolver. Receives resource requests from the
//! coordinator, computes bounded CPU quotas for the function containers on
//! this node, and applies them through the container runtime.

use std::sync::Arc;

use anyhow::Result;
use seqclock_watcher::{
    api,
    config::{self, RuntimeKind},
    runtime::ContainerRuntime,
    state::AppState,
    ConflictResolver, DockerRuntime, MockRuntime,
};
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

    info!("Starting seqclock watcher");
    info!(
        listen_addr = %config.listen_addr,
        host_ip = %config.host_ip,
        cores = config.cores,
        quota_floor = config.bounds.floor,
        throttle_floor = config.bounds.throttle_floor,
        runtime = ?config.runtime,
        "Configuration loaded"
    );

    let runtime: Arc<dyn ContainerRuntime> = match config.runtime {
        RuntimeKind::Docker => {
            let docker = DockerRuntime::new(&config.docker_socket);
            if !docker.socket_exists() {
                warn!(socket = %config.docker_socket, "Docker socket not found");
            }
            Arc::new(docker)
        }
        RuntimeKind::Mock => Arc::new(MockRuntime::new()),
    };

    let resolver = ConflictResolver::new(runtime, config.cores, config.bounds);
    let state = AppState::new(resolver, config.host_ip.clone());
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

    let _ = shutdown_tx.send(true);

    if !server_exited {
        info!(grace_ms = config.shutdown_grace.as_millis() as u64, "Waiting for in-flight requests...");
        match tokio::time::timeout(config.shutdown_grace, server_handle).await {
            Ok(result) => log_server_exit(result),
            Err(_) => warn!("Shutdown grace period elapsed with requests still in flight"),
        }
    }

    info!("Watcher shutdown complete");
    Ok(())
}

fn log_server_exit(result: Result<std::io::Result<()>, tokio::task::JoinError>) {
    match result {
        Ok(Ok(())) => info!("Server exited normally"),
        Ok(Err(e)) => error!(error = %e, "Server error"),
        Err(e) => error!(error = %e, "Server task panicked"),
    }
}
