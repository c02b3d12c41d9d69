use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;

use glowhouse::config::{default_state_dir, BridgeSettings};
use glowhouse::handler::GlowHandler;
use glowhouse::hub::{setup, HubClient};
use glowhouse::web;

/// The Glowhouse lighting gateway
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Cli {
    /// Port to listen on
    #[arg(short, long, default_value = "8130")]
    port: u16,

    /// Directory holding bridge credentials
    #[arg(long)]
    state_dir: Option<PathBuf>,

    /// Bridge IP, overriding stored credentials
    #[arg(long)]
    bridge: Option<String>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Discover the bridge and perform the link-button handshake
    Setup,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let cli = Cli::parse();
    let state_dir = cli.state_dir.clone().unwrap_or_else(default_state_dir);

    let mut settings = BridgeSettings::load(&state_dir)
        .with_context(|| format!("Failed to load settings from {}", state_dir.display()))?;
    if let Some(bridge) = &cli.bridge {
        settings.ip = Some(bridge.clone());
    }

    if matches!(cli.command, Some(Command::Setup)) {
        return run_setup(settings, &state_dir).await;
    }

    serve(cli, settings).await
}

/// Discover a bridge if needed, then poll for the link button.
async fn run_setup(mut settings: BridgeSettings, state_dir: &std::path::Path) -> Result<()> {
    let ip = match settings.ip.clone() {
        Some(ip) => ip,
        None => {
            tracing::info!("Discovering bridges on this network...");
            let bridges = setup::discover().await?;
            let bridge = bridges
                .first()
                .context("no bridge found; pass --bridge <ip> explicitly")?;
            tracing::info!(id = %bridge.id, ip = %bridge.ip, "Found bridge");
            bridge.ip.clone()
        }
    };

    let host = std::env::var("HOSTNAME").unwrap_or_else(|_| "gateway".to_string());
    tracing::info!("Press the link button on the bridge...");
    let username = setup::register(&ip, &host, 30).await?;

    settings.ip = Some(ip);
    settings.username = Some(username);
    settings.save(state_dir)?;
    tracing::info!("Credentials saved to {}", state_dir.display());
    Ok(())
}

async fn serve(cli: Cli, settings: BridgeSettings) -> Result<()> {
    if !settings.is_complete() {
        tracing::warn!(
            "Bridge credentials are not configured; requests will get 503 until `glowhouse setup` runs"
        );
    }

    let hub = Arc::new(HubClient::new(
        settings.ip.as_deref(),
        settings.username.as_deref(),
    )?);

    // One registry, injected into both front ends; its lifetime is the
    // process's.
    let sessions = wick::SessionRegistry::new_shared();

    let mcp_state = Arc::new(wick::McpState::with_registry(
        GlowHandler::new(hub.clone()),
        sessions.clone(),
        "glowhouse",
        env!("CARGO_PKG_VERSION"),
    ));
    let mcp_router = wick::router(mcp_state);

    let rest_state = web::RestState {
        hub,
        sessions: sessions.clone(),
        started: Instant::now(),
    };
    let rest_router = web::router(rest_state);

    let app = axum::Router::new()
        .nest("/mcp", mcp_router)
        .merge(rest_router);

    let addr = format!("0.0.0.0:{}", cli.port);
    tracing::info!("Glowhouse starting on http://{}", addr);
    tracing::info!("   MCP Streamable HTTP: POST http://{}/mcp", addr);
    tracing::info!("   REST: http://{}/api/lights", addr);
    tracing::info!("   Health: GET http://{}/health", addr);

    let shutdown_token = CancellationToken::new();

    wick::spawn_cleanup_task(
        sessions,
        Duration::from_secs(30),
        Duration::from_secs(1800),
        shutdown_token.clone(),
    );

    let bind_addr: std::net::SocketAddr = addr.parse().context("Failed to parse bind address")?;
    let listener = tokio::net::TcpListener::bind(bind_addr).await?;

    let serve_token = shutdown_token.clone();
    let server = axum::serve(listener, app).with_graceful_shutdown(async move {
        serve_token.cancelled().await;
        tracing::info!("Server shutdown signal received");
    });

    let server_task = tokio::spawn(async move {
        if let Err(e) = server.await {
            tracing::error!("Server exited with error: {:?}", e);
        }
    });

    // SIGINT from a terminal, SIGTERM from systemd and friends.
    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Received SIGINT, shutting down gracefully...");
        }
        _ = async {
            #[cfg(unix)]
            {
                use tokio::signal::unix::{signal, SignalKind};
                match signal(SignalKind::terminate()) {
                    Ok(mut sigterm) => { sigterm.recv().await; }
                    Err(e) => {
                        tracing::error!("Failed to install SIGTERM handler: {}", e);
                        std::future::pending::<()>().await;
                    }
                }
            }
            #[cfg(not(unix))]
            {
                std::future::pending::<()>().await;
            }
        } => {
            tracing::info!("Received SIGTERM, shutting down gracefully...");
        }
    }

    shutdown_token.cancel();
    let _ = server_task.await;
    tracing::info!("Shutdown complete");
    Ok(())
}
