//! ==============================================================================
//! displaysync - display telemetry to impressions ledger sync daemon
//! ==============================================================================
//!
//! modules, leaves first:
//!     - config:    sync.toml + DISPLAYSYNC_* env -> SyncSettings
//!     - identity:  recorder keypair and ledger identities
//!     - state:     durable cursor file
//!     - telemetry: feed window client
//!     - delta:     window + cursor -> MetricDelta
//!     - ledger:    ledger client trait and http gateway client
//!     - resolver:  which device this process reports for
//!     - runner:    sync cycle, scheduler, read-only snapshot
//!     - status:    read-only http status endpoint
//!
//! ==============================================================================

pub mod config;
pub mod delta;
pub mod identity;
pub mod ledger;
pub mod resolver;
pub mod runner;
pub mod state;
pub mod status;
pub mod telemetry;

use tracing_subscriber::EnvFilter;

/// Initialise logging. `RUST_LOG` wins over the configured level.
pub fn init_logging(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}
