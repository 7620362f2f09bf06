//! PKCE Auth Gateway
//!
//! Single-binary Rust service that:
//! 1. Redirects users to an OAuth 2.0 provider with a PKCE challenge
//! 2. Redeems the callback's authorization code upstream, exactly once
//! 3. Returns a short-lived signed credential
//! 4. Tracks revoked credentials until they expire

mod config;
mod error;
mod metrics;
mod routes;

use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use pkce_flow::{
    CorrelationStore, FlowCoordinator, HttpUpstream, RevocationRegistry, SigningKey, TokenIssuer,
    spawn_sweep_task,
};
use tokio::net::TcpListener;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::Config;
use crate::routes::{AppState, build_router};

/// Grace period for in-flight requests after a shutdown signal.
const DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing with JSON output and LOG_LEVEL / RUST_LOG support
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_env("LOG_LEVEL")
                .or_else(|_| EnvFilter::try_from_default_env())
                .unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with(tracing_subscriber::fmt::layer().json())
        .init();

    info!("starting pkce-auth-gateway");

    // Install Prometheus metrics recorder before any metrics are emitted
    let prometheus_handle =
        metrics::install_recorder().context("failed to install Prometheus recorder")?;

    // CLI: simple --config flag parsing
    let args: Vec<String> = std::env::args().collect();
    let cli_config_path = args
        .iter()
        .position(|a| a == "--config")
        .and_then(|i| args.get(i + 1))
        .map(|s| s.as_str());

    let config_path = Config::resolve_path(cli_config_path);
    info!(path = %config_path.display(), "loading configuration");

    let config = Config::load(&config_path)
        .with_context(|| format!("failed to load config from {}", config_path.display()))?;

    info!(
        listen_addr = %config.server.listen_addr,
        authorize_url = %config.upstream.authorize_url,
        token_url = %config.upstream.token_url,
        identity = ?config.upstream.identity,
        client_secret = config.upstream.client_secret.is_some(),
        "configuration loaded"
    );

    let upstream = HttpUpstream::new(config.http_upstream(), config.upstream_timeout())
        .context("failed to build upstream client")?;

    let signing_key = config
        .credential
        .signing_key
        .as_ref()
        .context("signing key missing after config load")?;
    let signing_key = SigningKey::hmac(signing_key).context("invalid signing key")?;
    let issuer = TokenIssuer::new(signing_key, config.credential.issuer.clone());

    let store = Arc::new(CorrelationStore::new());
    let registry = Arc::new(RevocationRegistry::new(config.credential_ttl()));
    let coordinator = FlowCoordinator::new(
        store.clone(),
        Arc::new(upstream),
        issuer,
        registry.clone(),
        config.coordinator_settings(),
    );

    let sweeper = spawn_sweep_task(store, registry, config.sweep_interval());

    let app_state = AppState {
        coordinator: Arc::new(coordinator),
        authorize: Arc::new(config.authorize_endpoint()),
        prometheus: prometheus_handle,
        started_at: Instant::now(),
    };

    let app = build_router(app_state, config.server.max_connections);

    let listen_addr = config.server.listen_addr;
    let listener = TcpListener::bind(listen_addr)
        .await
        .with_context(|| format!("failed to bind to {listen_addr}"))?;
    info!(addr = %listen_addr, "accepting requests");

    // The drain timeout starts when the shutdown signal fires, not when the
    // server starts: signal the server to drain, then race it against the timer.
    let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel::<()>();

    let server_handle = tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(async {
                let _ = shutdown_rx.await;
            })
            .await
    });

    shutdown_signal().await;
    let _ = shutdown_tx.send(());

    match tokio::time::timeout(DRAIN_TIMEOUT, server_handle).await {
        Ok(Ok(Ok(()))) => {
            info!("all in-flight requests drained");
        }
        Ok(Ok(Err(e))) => {
            error!(error = %e, "server error during shutdown");
        }
        Ok(Err(e)) => {
            error!(error = %e, "server task panicked");
        }
        Err(_) => {
            warn!(
                drain_timeout_secs = DRAIN_TIMEOUT.as_secs(),
                "drain timeout exceeded, forcing shutdown"
            );
        }
    }

    sweeper.abort();

    info!("shutdown complete");
    Ok(())
}

/// Wait for SIGTERM or SIGINT for graceful shutdown.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "failed to listen for Ctrl+C");
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
                error!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("received SIGINT, shutting down"),
        _ = terminate => info!("received SIGTERM, shutting down"),
    }
}

