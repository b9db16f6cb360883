//! ==============================================================================
//! main.rs - sync daemon entry point
//! ==============================================================================
//!
//! purpose:
//!     long-running process that reports one display's telemetry to the
//!     impressions ledger. no subcommands; it runs until terminated.
//!
//! startup:
//!     config -> logging -> settings -> signer -> clients -> state ->
//!     device resolution (once) -> optional status server -> sync loop
//!
//! any configuration-fatal condition logs one error line naming the failed
//! precondition and exits non-zero. per-cycle failures never exit.
//!
//!     ┌───────────────┐   fetch    ┌──────────────┐
//!     │ telemetry feed│ ─────────> │  sync loop   │ ──> state file
//!     └───────────────┘            │ (interval)   │
//!                                  └──────┬───────┘
//!                                         │ submit
//!                                  ┌──────┴───────┐
//!                                  │ ledger       │
//!                                  └──────────────┘
//!
//! ==============================================================================

use anyhow::{Context, Result};
use displaysync::config::SyncConfig;
use displaysync::identity;
use displaysync::ledger::HttpLedgerClient;
use displaysync::resolver::DeviceResolver;
use displaysync::runner::SyncRunner;
use displaysync::state::SyncState;
use displaysync::status;
use displaysync::telemetry::TelemetryClient;
use std::sync::Arc;

#[tokio::main]
async fn main() -> Result<()> {
    println!("===========================================================");
    println!("  displaysync - display telemetry -> impressions ledger");
    println!("===========================================================");

    // step 1: load configuration
    let mut config = SyncConfig::load_or_default();
    config.apply_env();
    config.print_summary();
    displaysync::init_logging(&config.logging.level);

    let settings = match config.resolve() {
        Ok(settings) => settings,
        Err(e) => {
            tracing::error!("fatal configuration error: {e}");
            return Err(e.into());
        }
    };
    tracing::info!(channel = settings.channel_id, "feed channel resolved");

    // step 2: signing identity
    let signer = match identity::load_signer(&settings.keypair_path) {
        Ok(signer) => signer,
        Err(e) => {
            tracing::error!("fatal: cannot load signing key: {e}");
            return Err(e.into());
        }
    };
    let me = signer.identity();
    tracing::info!(identity = %me, "signing identity loaded");

    // step 3: clients, constructed once and injected
    let ledger = Arc::new(
        HttpLedgerClient::new(&settings.ledger_url, signer, settings.request_timeout)
            .context("failed to build ledger client")?,
    );
    let feed = Arc::new(
        TelemetryClient::new(&settings.feed_url, settings.channel_id, settings.request_timeout)
            .context("failed to build telemetry client")?,
    );

    // step 4: local cursor
    let state = SyncState::load(&settings.state_path);
    tracing::info!(
        cursor = state.last_sample_id,
        cached_device = state.device_index.as_deref().unwrap_or("-"),
        "sync state loaded"
    );

    // step 5: device resolution, once per process
    let device = match DeviceResolver::new(&*ledger, me, &settings.hints)
        .ensure_device(&state, settings.auto_register)
        .await
    {
        Ok(device) => device,
        Err(e) => {
            tracing::error!("fatal: device resolution failed: {e}");
            return Err(e.into());
        }
    };
    tracing::info!(
        authority = %device.device_authority,
        device_index = device.device_index,
        status = %device.device_record.status,
        location = %device.device_record.location,
        "reporting for device"
    );

    let runner = SyncRunner::new(feed, ledger, settings.state_path.clone());

    // step 6: status endpoint in background
    if let Some(addr) = settings.status_listen {
        let listener = tokio::net::TcpListener::bind(addr)
            .await
            .with_context(|| format!("failed to bind status endpoint on {addr}"))?;
        let handle = runner.status();
        tokio::spawn(async move {
            tracing::info!(%addr, "status endpoint live at /api/status");
            if let Err(e) = status::serve(listener, handle).await {
                tracing::error!("status endpoint stopped: {e}");
            }
        });
    }

    // step 7: sync loop
    tracing::info!(interval_ms = settings.poll_interval.as_millis() as u64, "starting sync loop");
    let shutdown = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::warn!("cannot listen for ctrl-c: {e}");
            std::future::pending::<()>().await;
        }
    };
    let final_state = runner.run(&device, state, settings.poll_interval, shutdown).await;
    tracing::info!(cursor = final_state.last_sample_id, "sync daemon stopped");

    Ok(())
}
