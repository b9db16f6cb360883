//! ==============================================================================
//! ledger/mod.rs - impressions ledger interface
//! ==============================================================================
//!
//! purpose:
//!     the operations the daemon needs from the ledger, behind one object-safe
//!     trait so the resolver and runner take it as an injected dependency.
//!
//! error model:
//!     `LedgerError::NotFound` is its own variant. the resolver branches on it
//!     (create the registry, register the device); every other variant is
//!     treated as a failure of that call.
//!
//! relationships:
//!     - implemented by: http.rs (gateway client), tests/common (fake)
//!     - used by: resolver.rs, runner.rs
//!
//! ==============================================================================

pub mod http;

use crate::identity::Identity;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use http::HttpLedgerClient;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LedgerError {
    #[error("account not found: {0}")]
    NotFound(String),
    #[error("ledger rejected request ({status}): {message}")]
    Rejected { status: u16, message: String },
    #[error("ledger unreachable: {0}")]
    Transport(String),
    #[error("ledger response could not be decoded: {0}")]
    Decode(String),
}

impl LedgerError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}

/// per-authority device registry; `device_count` is the next index to be assigned.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Registry {
    pub authority: Identity,
    pub device_count: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceStatus {
    Active,
    Inactive,
    Suspended,
}

impl std::fmt::Display for DeviceStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            Self::Active => "active",
            Self::Inactive => "inactive",
            Self::Suspended => "suspended",
        };
        f.write_str(label)
    }
}

/// On-ledger device snapshot. cumulative totals are the ledger's, never adjusted locally.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceRecord {
    pub authority: Identity,
    pub index: u64,
    pub recorder: Identity,
    pub location: String,
    pub status: DeviceStatus,
    pub total_views: u64,
    pub total_impressions: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisteredDevice {
    pub index: u64,
    pub record: DeviceRecord,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitReceipt {
    pub reference: String,
}

/// One metric submission for a device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricSubmission {
    pub device_authority: Identity,
    pub device_index: u64,
    pub recorder: Identity,
    pub views: u64,
    pub impressions: u64,
}

#[async_trait]
pub trait LedgerClient: Send + Sync {
    async fn fetch_registry(&self, authority: &Identity) -> Result<Registry, LedgerError>;

    /// create the registry owned by the signing identity
    async fn create_registry(&self, authority: &Identity) -> Result<Registry, LedgerError>;

    async fn fetch_device(&self, authority: &Identity, index: u64) -> Result<DeviceRecord, LedgerError>;

    /// register a device under the signing identity's registry; the ledger assigns the index
    async fn register_device(&self, location: &str, recorder: &Identity) -> Result<RegisteredDevice, LedgerError>;

    async fn submit_metrics(&self, submission: &MetricSubmission) -> Result<SubmitReceipt, LedgerError>;
}
