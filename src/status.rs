//! ==============================================================================
//! status.rs - read-only status endpoint
//! ==============================================================================
//!
//! purpose:
//!     shares what the sync loop last did with anyone who asks over http.
//!     the runner writes, the web server reads; nothing here touches the ledger.
//!
//! routes:
//!     GET /api/status  -> SyncStatus as json
//!
//! ==============================================================================

use crate::resolver::DeviceContext;
use anyhow::Result;
use axum::{extract::State, response::Json, routing::get, Router};
use serde::Serialize;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::RwLock;
use tower_http::cors::CorsLayer;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CycleOutcome {
    /// a delta was submitted and the cursor persisted
    Submitted,
    /// nothing new in the window
    Idle,
    Failed,
}

#[derive(Clone, Debug, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncStatus {
    pub device: Option<DeviceContext>,
    pub last_sample_id: u64,
    pub cycles: u64,
    pub last_outcome: Option<CycleOutcome>,
    pub last_error: Option<String>,
    /// views/impressions submitted by this process since it started
    pub views_submitted: u64,
    pub impressions_submitted: u64,
    /// unix timestamp (ms) of the last finished cycle
    pub last_update: u64,
}

pub type StatusHandle = Arc<RwLock<SyncStatus>>;

pub fn new_handle() -> StatusHandle {
    Arc::new(RwLock::new(SyncStatus::default()))
}

pub fn router(status: StatusHandle) -> Router {
    Router::new()
        .route("/api/status", get(status_handler))
        .layer(CorsLayer::permissive())
        .with_state(status)
}

pub async fn serve(listener: TcpListener, status: StatusHandle) -> Result<()> {
    axum::serve(listener, router(status)).await?;
    Ok(())
}

async fn status_handler(State(status): State<StatusHandle>) -> Json<SyncStatus> {
    let status = status.read().await;
    Json(status.clone())
}

pub(crate) fn now_ms() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
