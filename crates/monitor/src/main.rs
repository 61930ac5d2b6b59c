//! Monitor binary that tails a ledger RPC endpoint for transactions
//! addressed to the configured programs and emits their co-signed payloads.

use std::io;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tracing::{info, warn};

use sigtail_domain::config::BootstrapConfig;
use sigtail_domain::services::telemetry::{init_telemetry, TelemetryConfig};
use sigtail_monitor::rpc::HttpLedgerSource;
use sigtail_monitor::sink::run_event_sink;
use sigtail_monitor::worker::{run_program_monitor, MonitorError};

/// Bounded so a stalled sink applies backpressure to the workers instead of
/// growing without limit.
const EVENT_CHANNEL_CAPACITY: usize = 256;

#[tokio::main]
async fn main() -> io::Result<()> {
    if let Err(err) = bootstrap().await {
        eprintln!("[monitor] bootstrap failed: {err}");
        return Err(io::Error::other(err.to_string()));
    }

    Ok(())
}

async fn bootstrap() -> Result<(), MonitorError> {
    let config = BootstrapConfig::load_from_env()?;
    let telemetry_config = TelemetryConfig::from_env("MONITOR");
    init_telemetry(&telemetry_config)?;

    let source = Arc::new(HttpLedgerSource::new(
        config.ledger_rpc_url().to_owned(),
        Duration::from_millis(config.rpc_timeout_ms()),
    )?);

    let (event_tx, event_rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let sink = tokio::spawn(run_event_sink(event_rx));

    let mut workers = Vec::with_capacity(config.programs().len());
    for program in config.programs() {
        workers.push(tokio::spawn(run_program_monitor(
            Arc::clone(&source),
            program.clone(),
            config.secp_program().clone(),
            Duration::from_millis(config.poll_interval_ms()),
            event_tx.clone(),
            shutdown_rx.clone(),
        )));
    }
    // The sink exits once every worker sender is gone.
    drop(event_tx);

    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("shutdown requested, draining in-flight cycles"),
        Err(err) => warn!(?err, "ctrl-c handler failed, shutting down"),
    }
    let _ = shutdown_tx.send(true);

    for worker in workers {
        let _ = worker.await;
    }
    let _ = sink.await;

    Ok(())
}
