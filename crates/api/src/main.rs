use std::net::SocketAddr;

use anyhow::Context;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use aiops_api::config::{LogFormat, ServerConfig};
use aiops_api::router::build_app_router;
use aiops_api::state::AppState;
use aiops_api::tls;

const DEFAULT_LOG_FILTER: &str = "aiops_api=debug,aiops_core=debug,tower_http=info";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    // --- Configuration ---
    let config = ServerConfig::from_env().context("invalid configuration")?;

    // --- Tracing ---
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| DEFAULT_LOG_FILTER.into());
    let registry = tracing_subscriber::registry().with(filter);
    match config.log_format {
        LogFormat::Text => registry.with(tracing_subscriber::fmt::layer()).init(),
        LogFormat::Json => registry.with(tracing_subscriber::fmt::layer().json()).init(),
    }

    tracing::info!(
        host = %config.host,
        port = config.port,
        tls = config.tls.is_some(),
        exec_timeout_secs = config.exec_timeout_secs,
        temp_dir = %config.temp_dir.display(),
        "Loaded agent configuration"
    );

    // --- Identity switching ---
    let switcher = match aiops_core::identity::detect() {
        Ok(switcher) => {
            tracing::info!(platform = switcher.platform(), "Identity switching available");
            Some(switcher)
        }
        Err(e) => {
            tracing::warn!(error = %e, "Identity switching unavailable, requests naming a user will fail");
            None
        }
    };

    // --- TLS ---
    let tls_config = match &config.tls {
        Some(tls) => {
            let server = tls::load_server_config(tls).context("failed to load TLS material")?;
            tracing::info!(
                cert = %tls.cert.display(),
                mutual = tls.client_ca.is_some(),
                "TLS enabled"
            );
            Some(server)
        }
        None => {
            tracing::warn!("AIOPS_TLS_CERT/AIOPS_TLS_KEY not set, serving plain HTTP");
            None
        }
    };

    // --- App ---
    let addr = SocketAddr::new(
        config.host.parse().context("AIOPS_HOST is not an IP address")?,
        config.port,
    );
    let state = AppState::new(config.clone(), switcher);
    let app = build_app_router(state, &config);

    // --- Start server ---
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    tracing::info!(%addr, "Agent listening");

    match tls_config {
        Some(server) => tls::serve_tls(listener, server, app, shutdown_signal()).await,
        None => tls::serve_plain(listener, app, shutdown_signal())
            .await
            .context("server error")?,
    }

    tracing::info!("Graceful shutdown complete");
    Ok(())
}

/// Wait for a termination signal to initiate graceful shutdown.
///
/// Handles both SIGINT (Ctrl-C) and SIGTERM (on Unix) so the agent shuts
/// down cleanly whether stopped interactively or by a process manager.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl-C handler");
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
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received SIGINT (Ctrl-C), starting graceful shutdown");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, starting graceful shutdown");
        }
    }
}
