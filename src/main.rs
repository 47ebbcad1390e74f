//! mcp-hub: a single MCP endpoint in front of many MCP servers.
//!
//! Downstream connections are opened lazily on first use and closed together on
//! shutdown (SIGINT, SIGTERM, or end of stdin for the stdio endpoint).

mod cli;
mod logging;
mod server;

use anyhow::Context;
use clap::Parser;
use hub_mcp::{McpConnectionPool, McpDispatcher, McpHubConfig};
use rmcp::{
    transport::{
        stdio,
        streamable_http_server::{
            session::local::LocalSessionManager, StreamableHttpServerConfig,
            StreamableHttpService,
        },
    },
    ServiceExt,
};
use tracing::{info, warn};

use crate::{
    cli::{Cli, Transport},
    server::HubServer,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    logging::init(&cli.log_level, cli.log_json)?;

    info!(version = env!("CARGO_PKG_VERSION"), "Starting mcp-hub");

    let config = McpHubConfig::from_file(&cli.config)
        .await
        .with_context(|| format!("failed to load configuration from {}", cli.config))?;
    info!(
        servers = config.servers.len(),
        max_concurrent_fetches = config.dispatch.max_concurrent_fetches,
        "Loaded MCP hub configuration"
    );

    let pool = McpConnectionPool::new(&config);
    let hub = HubServer::new(McpDispatcher::new(pool.clone(), config.dispatch.clone()));

    let served = match cli.transport {
        Transport::Stdio => serve_stdio(hub, &pool).await,
        Transport::Http => serve_http(hub, &pool, &cli).await,
    };

    // No-op when shutdown already closed the pool.
    pool.close_all().await;

    let snapshot = pool.metrics().snapshot();
    info!(
        connect_attempts = snapshot.connect_attempts,
        connect_failures = snapshot.connect_failures,
        reconnect_attempts = snapshot.reconnect_attempts,
        total_calls = snapshot.total_calls,
        failed_calls = snapshot.failed_calls,
        success_rate = snapshot.success_rate(),
        "mcp-hub stopped"
    );

    served
}

async fn serve_stdio(hub: HubServer, pool: &McpConnectionPool) -> anyhow::Result<()> {
    info!("Serving MCP over stdio");

    let service = hub
        .serve(stdio())
        .await
        .context("failed to start stdio endpoint")?;
    let cancel = service.cancellation_token();

    tokio::select! {
        ended = service.waiting() => match ended {
            Ok(reason) => info!(reason = ?reason, "Stdio session ended"),
            Err(e) => warn!(error = %e, "Stdio session task failed"),
        },
        _ = shutdown_signal() => {
            pool.close_all().await;
            cancel.cancel();
        }
    }

    Ok(())
}

async fn serve_http(hub: HubServer, pool: &McpConnectionPool, cli: &Cli) -> anyhow::Result<()> {
    let service = StreamableHttpService::new(
        move || Ok(hub.clone()),
        LocalSessionManager::default().into(),
        StreamableHttpServerConfig::default(),
    );
    let router = axum::Router::new().nest_service(&cli.http_path, service);

    let addr = format!("{}:{}", cli.host, cli.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {}", addr))?;
    info!(address = %addr, path = %cli.http_path, "Serving MCP over streamable HTTP");

    let pool = pool.clone();
    axum::serve(listener, router)
        .with_graceful_shutdown(async move {
            shutdown_signal().await;
            pool.close_all().await;
        })
        .await
        .context("HTTP endpoint failed")
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C, shutting down"),
        _ = terminate => info!("Received SIGTERM, shutting down"),
    }
}
