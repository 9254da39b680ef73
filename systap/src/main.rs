//! Entry point for the systap agent.

use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::{info, warn};
use tracing_subscriber::filter::Directive;
use tracing_subscriber::EnvFilter;

use systap::config::{Args, LogFormat};
use systap::error::ConfigError;
use systap::{AppState, Config, SysinfoProvider};

fn init_tracing(config: &Config) -> Result<(), ConfigError> {
    let directive = format!("systap={}", config.log_level)
        .parse::<Directive>()
        .map_err(|e| ConfigError::LogFilter(format!("{e}")))?;
    let filter = EnvFilter::from_default_env().add_directive(directive);

    match config.log_format {
        LogFormat::Json => tracing_subscriber::fmt().with_env_filter(filter).json().init(),
        LogFormat::Text => tracing_subscriber::fmt().with_env_filter(filter).init(),
    }
    Ok(())
}

async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => info!("received Ctrl+C"),
                    _ = sigterm.recv() => info!("received SIGTERM"),
                }
            }
            Err(e) => {
                warn!(error = %e, "SIGTERM handler unavailable; waiting for Ctrl+C only");
                let _ = tokio::signal::ctrl_c().await;
            }
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
        info!("received Ctrl+C");
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::from_args(Args::parse())?;
    init_tracing(&config)?;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let provider = Arc::new(SysinfoProvider::new());
    let state = AppState::new(provider, &config, shutdown_rx);

    let listener = TcpListener::bind(config.addr)
        .await
        .with_context(|| format!("failed to bind {}", config.addr))?;
    info!(
        addr = %listener.local_addr()?,
        interval = ?config.default_interval,
        per_cpu = config.per_cpu,
        cache_ttl = ?config.cache_ttl,
        "systap listening"
    );

    let sessions = state.clone();
    let mut server = tokio::spawn(systap::http::serve(listener, state));

    tokio::select! {
        res = &mut server => {
            // server ended on its own: a listener error
            res.context("server task panicked")?.context("server error")?;
            return Ok(());
        }
        _ = shutdown_signal() => {}
    }

    // Streams observe this and close, which lets the graceful drain finish.
    shutdown_tx.send(true)?;
    match tokio::time::timeout(config.shutdown_timeout, &mut server).await {
        Ok(res) => res.context("server task panicked")?.context("server error")?,
        Err(_) => {
            warn!(
                timeout = ?config.shutdown_timeout,
                active_sessions = sessions.active_sessions(),
                "shutdown timed out; abandoning open connections"
            );
            server.abort();
        }
    }

    info!("done");
    Ok(())
}
