//! ==============================================================================
//! runner.rs - sync cycle and scheduler
//! ==============================================================================
//!
//! purpose:
//!     one cycle = fetch window -> compute delta -> skip if empty -> submit ->
//!     persist cursor. `run` repeats it on a fixed interval until shutdown.
//!
//! guarantees:
//!     - an empty delta makes no ledger call and no disk write
//!     - the cursor only moves after the ledger confirmed the submission
//!     - a failed cycle is logged and the loop carries on; cycles never overlap
//!
//! known gap:
//!     if the submission lands but the state write fails, the next cycle starts
//!     from the old cursor and the same delta is submitted again (at-least-once).
//!
//! relationships:
//!     - uses: telemetry.rs (FeedSource), delta.rs, ledger (LedgerClient), state.rs
//!     - uses: resolver.rs (query path), status.rs (shared status)
//!
//! ==============================================================================

use crate::config::DeviceHints;
use crate::delta::{compute_delta, MetricDelta};
use crate::identity::Identity;
use crate::ledger::{DeviceStatus, LedgerClient, LedgerError, MetricSubmission};
use crate::resolver::{DeviceContext, DeviceResolver};
use crate::state::{StateError, SyncState};
use crate::status::{self, CycleOutcome, StatusHandle};
use crate::telemetry::{FeedSource, FetchError};
use serde::Serialize;
use std::fmt;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::time::MissedTickBehavior;

#[derive(Debug, Error)]
pub enum CycleError {
    #[error("telemetry fetch failed: {0}")]
    Fetch(#[from] FetchError),
    #[error("metric submission failed: {0}")]
    Submit(#[source] LedgerError),
    /// the ledger has the delta, the state file does not
    #[error("submitted {} samples up to entry {} but failed to persist cursor: {}", .submitted.sample_count, .submitted.new_cursor, .source)]
    Persist {
        submitted: MetricDelta,
        #[source]
        source: StateError,
    },
}

pub struct SyncRunner {
    feed: Arc<dyn FeedSource>,
    ledger: Arc<dyn LedgerClient>,
    state_path: PathBuf,
    status: StatusHandle,
}

impl SyncRunner {
    pub fn new(feed: Arc<dyn FeedSource>, ledger: Arc<dyn LedgerClient>, state_path: impl Into<PathBuf>) -> Self {
        Self {
            feed,
            ledger,
            state_path: state_path.into(),
            status: status::new_handle(),
        }
    }

    pub fn with_status(mut self, status: StatusHandle) -> Self {
        self.status = status;
        self
    }

    pub fn status(&self) -> StatusHandle {
        self.status.clone()
    }

    pub fn state_path(&self) -> &Path {
        &self.state_path
    }

    /// Run a single cycle against `state`; returns the state to use next.
    pub async fn run_once(&self, device: &DeviceContext, state: &SyncState) -> Result<SyncState, CycleError> {
        let result = self.cycle(device, state).await;

        let mut current = self.status.write().await;
        current.device = Some(device.clone());
        current.cycles += 1;
        current.last_update = status::now_ms();
        match &result {
            Ok((next, delta)) if delta.is_empty() => {
                current.last_sample_id = next.last_sample_id;
                current.last_outcome = Some(CycleOutcome::Idle);
                current.last_error = None;
            }
            Ok((next, delta)) => {
                current.last_sample_id = next.last_sample_id;
                current.last_outcome = Some(CycleOutcome::Submitted);
                current.last_error = None;
                current.views_submitted = current.views_submitted.saturating_add(delta.views_sum);
                current.impressions_submitted = current.impressions_submitted.saturating_add(delta.impressions_sum);
            }
            Err(e) => {
                current.last_sample_id = state.last_sample_id;
                current.last_outcome = Some(CycleOutcome::Failed);
                current.last_error = Some(e.to_string());
            }
        }
        drop(current);

        result.map(|(next, _)| next)
    }

    async fn cycle(&self, device: &DeviceContext, state: &SyncState) -> Result<(SyncState, MetricDelta), CycleError> {
        tracing::info!(
            authority = %device.device_authority,
            device_index = device.device_index,
            recorder = %device.recorder_identity,
            cursor = state.last_sample_id,
            "starting sync cycle"
        );

        let window = self.feed.fetch().await?;
        let delta = compute_delta(&window, state.last_sample_id);

        if delta.is_empty() {
            tracing::info!(cursor = state.last_sample_id, window = window.feeds.len(), "no new data");
            return Ok((state.clone(), delta));
        }

        let submission = MetricSubmission {
            device_authority: device.device_authority,
            device_index: device.device_index,
            recorder: device.recorder_identity,
            views: delta.views_sum,
            impressions: delta.impressions_sum,
        };
        let receipt = self
            .ledger
            .submit_metrics(&submission)
            .await
            .map_err(CycleError::Submit)?;

        tracing::info!(
            device_index = device.device_index,
            samples = delta.sample_count,
            views = delta.views_sum,
            impressions = delta.impressions_sum,
            cursor = delta.new_cursor,
            reference = %receipt.reference,
            "submitted metric delta"
        );

        let next = state.advance(&delta, device.device_index);
        next.save(&self.state_path)
            .map_err(|source| CycleError::Persist { submitted: delta, source })?;

        Ok((next, delta))
    }

    /// Cycle now, then every `interval`, until `shutdown` resolves between cycles.
    pub async fn run<F>(&self, device: &DeviceContext, initial: SyncState, interval: Duration, shutdown: F) -> SyncState
    where
        F: Future<Output = ()>,
    {
        let mut ticker = tokio::time::interval(interval);
        // a cycle that overruns swallows the ticks it missed
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        tokio::pin!(shutdown);

        let mut state = initial;
        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    tracing::info!(cursor = state.last_sample_id, "shutdown requested, stopping sync loop");
                    break;
                }
                _ = ticker.tick() => {}
            }

            match self.run_once(device, &state).await {
                Ok(next) => state = next,
                Err(e @ CycleError::Persist { .. }) => {
                    tracing::error!("{e}; the next cycle will resubmit from cursor {}", state.last_sample_id);
                }
                Err(e) => tracing::warn!("sync cycle failed: {e}"),
            }
        }
        state
    }
}

/// Flattened device view for the report binary and other read-only callers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceSnapshot {
    pub device_authority: Identity,
    pub device_index: u64,
    pub recorder: Identity,
    pub location: String,
    pub status: DeviceStatus,
    pub total_views: u64,
    pub total_impressions: u64,
    pub last_sample_id: u64,
}

impl DeviceSnapshot {
    pub fn new(context: &DeviceContext, state: &SyncState) -> Self {
        let record = &context.device_record;
        Self {
            device_authority: context.device_authority,
            device_index: context.device_index,
            recorder: record.recorder,
            location: record.location.clone(),
            status: record.status,
            total_views: record.total_views,
            total_impressions: record.total_impressions,
            last_sample_id: state.last_sample_id,
        }
    }
}

impl fmt::Display for DeviceSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Device authority : {}", self.device_authority)?;
        writeln!(f, "Device index     : {}", self.device_index)?;
        writeln!(f, "Recorder         : {}", self.recorder)?;
        writeln!(f, "Location         : {}", self.location)?;
        writeln!(f, "Status           : {}", self.status)?;
        writeln!(f, "Total views      : {}", self.total_views)?;
        writeln!(f, "Total impressions: {}", self.total_impressions)?;
        write!(f, "Local cursor     : {}", self.last_sample_id)
    }
}

/// Read-only lookup of the device and local cursor. never registers, never writes;
/// any failure is logged and yields `None`.
pub async fn query_snapshot(
    ledger: &dyn LedgerClient,
    signer: Identity,
    hints: &DeviceHints,
    state_path: &Path,
) -> Option<DeviceSnapshot> {
    let state = SyncState::load(state_path);
    match DeviceResolver::new(ledger, signer, hints).inspect_device(&state).await {
        Ok(context) => Some(DeviceSnapshot::new(&context, &state)),
        Err(e) => {
            tracing::warn!("device snapshot unavailable: {e}");
            None
        }
    }
}
