//! displaysync-report - print the device snapshot and exit.
//!
//! read-only: resolves the device without registering anything and without
//! creating a registry. exits 0 with the snapshot, 1 if it could not be fetched.

use displaysync::config::SyncConfig;
use displaysync::identity;
use displaysync::ledger::HttpLedgerClient;
use displaysync::runner::query_snapshot;
use std::process::ExitCode;

#[tokio::main]
async fn main() -> ExitCode {
    let mut config = SyncConfig::load_or_default();
    config.apply_env();
    displaysync::init_logging(&config.logging.level);

    let settings = match config.resolve() {
        Ok(settings) => settings,
        Err(e) => {
            tracing::error!("fatal configuration error: {e}");
            return ExitCode::FAILURE;
        }
    };

    let signer = match identity::load_signer(&settings.keypair_path) {
        Ok(signer) => signer,
        Err(e) => {
            tracing::error!("fatal: cannot load signing key: {e}");
            return ExitCode::FAILURE;
        }
    };
    let me = signer.identity();

    let ledger = match HttpLedgerClient::new(&settings.ledger_url, signer, settings.request_timeout) {
        Ok(ledger) => ledger,
        Err(e) => {
            tracing::error!("failed to build ledger client: {e}");
            return ExitCode::FAILURE;
        }
    };

    match query_snapshot(&ledger, me, &settings.hints, &settings.state_path).await {
        Some(snapshot) => {
            println!("{snapshot}");
            ExitCode::SUCCESS
        }
        None => {
            eprintln!("device snapshot unavailable");
            ExitCode::FAILURE
        }
    }
}
