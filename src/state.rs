//! ==============================================================================
//! state.rs - durable sync cursor
//! ==============================================================================
//!
//! purpose:
//!     the state file is the only thing that survives a restart. it records the
//!     highest feed entry already reported on-ledger and the device index the
//!     resolver settled on, so a restart neither re-registers nor re-counts.
//!
//! format:
//!     pretty json, `{ "lastSampleId": 42, "deviceIndex": "3" }`
//!
//! write discipline:
//!     save() is only called after the ledger confirmed a submission. the file
//!     is written to a sibling temp file and renamed over the target.
//!
//! ==============================================================================

use crate::delta::MetricDelta;
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StateError {
    #[error("failed to write state file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to encode state: {0}")]
    Encode(#[from] serde_json::Error),
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncState {
    /// highest feed entry id already reported on-ledger
    #[serde(default)]
    pub last_sample_id: u64,
    /// stringified device index, cached so restarts skip discovery
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device_index: Option<String>,
}

impl SyncState {
    /// Read the state file. any failure, including a missing file, yields a fresh state.
    pub fn load(path: &Path) -> Self {
        let bytes = match std::fs::read(path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!(path = %path.display(), "no state file yet, starting from zero");
                return Self::default();
            }
            Err(e) => {
                tracing::warn!(path = %path.display(), "state file unreadable, starting from zero: {e}");
                return Self::default();
            }
        };

        match serde_json::from_slice(&bytes) {
            Ok(state) => state,
            Err(e) => {
                tracing::warn!(path = %path.display(), "state file unparsable, starting from zero: {e}");
                Self::default()
            }
        }
    }

    /// Persist the state, creating the parent directory if needed.
    pub fn save(&self, path: &Path) -> Result<(), StateError> {
        let io_err = |source| StateError::Io { path: path.display().to_string(), source };

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(io_err)?;
        }

        let mut body = serde_json::to_vec_pretty(self)?;
        body.push(b'\n');

        let mut tmp_name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
        tmp_name.push(".tmp");
        let tmp_path = path.with_file_name(tmp_name);

        let mut file = std::fs::File::create(&tmp_path).map_err(io_err)?;
        file.write_all(&body).map_err(io_err)?;
        file.sync_all().map_err(io_err)?;
        drop(file);

        std::fs::rename(&tmp_path, path).map_err(io_err)
    }

    /// The state after `delta` was confirmed on-ledger for `device_index`.
    pub fn advance(&self, delta: &MetricDelta, device_index: u64) -> Self {
        Self {
            last_sample_id: self.last_sample_id.max(delta.new_cursor),
            device_index: Some(device_index.to_string()),
        }
    }

    /// The cached device index, if it parses.
    pub fn cached_device_index(&self) -> Option<u64> {
        let raw = self.device_index.as_deref()?;
        match raw.trim().parse() {
            Ok(index) => Some(index),
            Err(_) => {
                tracing::warn!(value = raw, "ignoring unparsable cached device index");
                None
            }
        }
    }
}
