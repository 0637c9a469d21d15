//! pubrelay service.
//!
//! Reads newline-delimited JSON trigger calls from stdin, for example
//! `{"call":"publish","args":["orders","{\"id\":7}","h"]}`, and relays them
//! to the remote pub/sub service. Stops on end of input, Ctrl+C or SIGTERM,
//! delivering what was already accepted.

use std::sync::Arc;

use anyhow::{Context, Result};
use pubrelay_api::{boundary, Config, TriggerCall};
use pubrelay_core::RealClock;
use pubrelay_delivery::RelayService;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{debug, error, info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::load()?;
    init_tracing(&config.rust_log);

    info!(
        origin = %config.origin,
        publish_key = %config.publish_key,
        secret_key = %config.secret_key_masked(),
        pool_size = config.session_pool_size,
        "configuration loaded"
    );

    let mut service = RelayService::with_agents(
        config.to_delivery_config(),
        config.to_agent_config(),
        Arc::new(RealClock::new()),
    )
    .context("failed to start relay service")?;
    service.start();

    info!("pubrelay is ready to accept trigger calls");
    tokio::select! {
        result = read_calls(&service) => {
            if let Err(e) = result {
                error!(error = %e, "stopped reading trigger calls");
            }
            info!("input closed, starting graceful shutdown");
        },
        () = shutdown_signal() => {
            info!("shutdown signal received, starting graceful shutdown");
        },
    }

    match service.shutdown().await {
        Ok(stats) => info!(
            enqueued = stats.enqueued,
            delivered = stats.delivered,
            rejected = stats.rejected,
            unaccepted = stats.unaccepted,
            exhausted = stats.exhausted,
            failed = stats.failed,
            "pubrelay shutdown complete"
        ),
        Err(e) => warn!(error = %e, "shutdown did not complete cleanly"),
    }
    Ok(())
}

/// Feeds every stdin line to the boundary until end of input.
async fn read_calls(service: &RelayService) -> Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    while let Some(line) = lines.next_line().await.context("failed to read stdin")? {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let call: TriggerCall = match serde_json::from_str(line) {
            Ok(call) => call,
            Err(e) => {
                warn!(error = %e, line, "malformed trigger call");
                continue;
            },
        };

        if let Ok(id) = boundary::dispatch_call(service, &call) {
            debug!(operation_id = %id, call = %call.call, "trigger call accepted");
        }
    }

    Ok(())
}

/// Initializes tracing with environment-based configuration.
fn init_tracing(default_filter: &str) {
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_filter))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let fmt_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_thread_ids(true)
        .with_thread_names(true)
        .with_file(true)
        .with_line_number(true);

    tracing_subscriber::registry().with(filter).with(fmt_layer).init();
}

/// Resolves on Ctrl+C or SIGTERM.
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
            },
            Err(e) => {
                error!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            },
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            info!("received Ctrl+C signal");
        },
        () = terminate => {
            info!("received SIGTERM signal");
        },
    }
}
