//! ==============================================================================
//! ledger/http.rs - ledger gateway client
//! ==============================================================================
//!
//! purpose:
//!     speaks json to the ledger gateway. reads are plain GETs; writes are
//!     POSTs whose exact body is signed with the recorder key.
//!
//! routes:
//!     GET  /v1/registries/{authority}
//!     POST /v1/registries
//!     GET  /v1/devices/{authority}/{index}
//!     POST /v1/devices
//!     POST /v1/metrics
//!
//! headers on writes:
//!     x-signer     identity hex
//!     x-signature  ed25519 signature of the body, hex
//!
//! ==============================================================================

use super::{
    DeviceRecord, LedgerClient, LedgerError, MetricSubmission, RegisteredDevice, Registry, SubmitReceipt,
};
use crate::identity::{Identity, Signer};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::time::Duration;

pub const SIGNER_HEADER: &str = "x-signer";
pub const SIGNATURE_HEADER: &str = "x-signature";

pub struct HttpLedgerClient {
    http: reqwest::Client,
    base_url: String,
    signer: Signer,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct CreateRegistryRequest<'a> {
    authority: &'a Identity,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct RegisterDeviceRequest<'a> {
    authority: Identity,
    location: &'a str,
    recorder: &'a Identity,
}

impl HttpLedgerClient {
    pub fn new(base_url: impl Into<String>, signer: Signer, timeout: Duration) -> Result<Self, LedgerError> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| LedgerError::Transport(e.to_string()))?;
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Ok(Self { http, base_url, signer })
    }

    pub fn identity(&self) -> Identity {
        self.signer.identity()
    }

    async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T, LedgerError> {
        let url = format!("{}{}", self.base_url, path);
        let response = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(|e| LedgerError::Transport(e.to_string()))?;
        decode(response, path).await
    }

    async fn post<B: Serialize, T: DeserializeOwned>(&self, path: &str, body: &B) -> Result<T, LedgerError> {
        let url = format!("{}{}", self.base_url, path);
        let body = serde_json::to_vec(body).map_err(|e| LedgerError::Decode(e.to_string()))?;
        let signature = self.signer.sign_hex(&body);

        let response = self
            .http
            .post(&url)
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .header(SIGNER_HEADER, self.signer.identity().to_string())
            .header(SIGNATURE_HEADER, signature)
            .body(body)
            .send()
            .await
            .map_err(|e| LedgerError::Transport(e.to_string()))?;
        decode(response, path).await
    }
}

async fn decode<T: DeserializeOwned>(response: reqwest::Response, path: &str) -> Result<T, LedgerError> {
    let status = response.status();
    if status == reqwest::StatusCode::NOT_FOUND {
        return Err(LedgerError::NotFound(path.to_string()));
    }
    if !status.is_success() {
        let message = response.text().await.unwrap_or_default();
        return Err(LedgerError::Rejected { status: status.as_u16(), message });
    }
    response.json().await.map_err(|e| LedgerError::Decode(e.to_string()))
}

#[async_trait]
impl LedgerClient for HttpLedgerClient {
    async fn fetch_registry(&self, authority: &Identity) -> Result<Registry, LedgerError> {
        self.get(&format!("/v1/registries/{authority}")).await
    }

    async fn create_registry(&self, authority: &Identity) -> Result<Registry, LedgerError> {
        self.post("/v1/registries", &CreateRegistryRequest { authority }).await
    }

    async fn fetch_device(&self, authority: &Identity, index: u64) -> Result<DeviceRecord, LedgerError> {
        self.get(&format!("/v1/devices/{authority}/{index}")).await
    }

    async fn register_device(&self, location: &str, recorder: &Identity) -> Result<RegisteredDevice, LedgerError> {
        let request = RegisterDeviceRequest { authority: self.identity(), location, recorder };
        self.post("/v1/devices", &request).await
    }

    async fn submit_metrics(&self, submission: &MetricSubmission) -> Result<SubmitReceipt, LedgerError> {
        self.post("/v1/metrics", submission).await
    }
}
