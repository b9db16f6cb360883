//! ==============================================================================
//! telemetry.rs - display telemetry feed client
//! ==============================================================================
//!
//! purpose:
//!     fetches the feed's current sample window with a single http GET and
//!     parses it into typed samples. no retries here; the next scheduled
//!     cycle is the retry.
//!
//! wire format:
//!     { "channel": { "id": 123, ... },
//!       "feeds": [ { "entry_id": 5, "created_at": "...", "field1": "10", "field2": "3" } ] }
//!
//! relationships:
//!     - used by: runner.rs (through the FeedSource trait)
//!     - feeds: delta.rs (window -> MetricDelta)
//!
//! ==============================================================================

use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("feed returned http {status}")]
    Status { status: u16 },
    #[error("feed request failed: {0}")]
    Transport(String),
    #[error("feed body could not be decoded: {0}")]
    Decode(String),
    #[error("feed reported channel {actual}, expected {expected}")]
    ChannelMismatch { expected: u64, actual: u64 },
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Channel {
    pub id: u64,
    #[serde(default)]
    pub name: Option<String>,
}

/// one feed entry. metric fields stay as the feed sent them; delta.rs decides what counts.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct TelemetrySample {
    #[serde(rename = "entry_id")]
    pub sample_id: u64,
    #[serde(default)]
    pub created_at: Option<String>,
    /// views
    #[serde(default, rename = "field1", deserialize_with = "lenient_field")]
    pub metric_a: Option<String>,
    /// impressions
    #[serde(default, rename = "field2", deserialize_with = "lenient_field")]
    pub metric_b: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct FeedWindow {
    pub channel: Channel,
    #[serde(default)]
    pub feeds: Vec<TelemetrySample>,
}

/// Anything that can hand the runner a sample window.
#[async_trait]
pub trait FeedSource: Send + Sync {
    async fn fetch(&self) -> Result<FeedWindow, FetchError>;
}

pub struct TelemetryClient {
    http: reqwest::Client,
    url: String,
    channel_id: u64,
}

impl TelemetryClient {
    pub fn new(url: impl Into<String>, channel_id: u64, timeout: Duration) -> Result<Self, FetchError> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| FetchError::Transport(e.to_string()))?;
        Ok(Self { http, url: url.into(), channel_id })
    }
}

#[async_trait]
impl FeedSource for TelemetryClient {
    async fn fetch(&self) -> Result<FeedWindow, FetchError> {
        let response = self
            .http
            .get(&self.url)
            .send()
            .await
            .map_err(|e| FetchError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status { status: status.as_u16() });
        }

        let window: FeedWindow = response
            .json()
            .await
            .map_err(|e| FetchError::Decode(e.to_string()))?;

        if window.channel.id != self.channel_id {
            return Err(FetchError::ChannelMismatch {
                expected: self.channel_id,
                actual: window.channel.id,
            });
        }

        tracing::debug!(channel = window.channel.id, samples = window.feeds.len(), "fetched feed window");
        Ok(window)
    }
}

// feeds sometimes send numbers instead of strings, or null. keep whatever arrives as text
// so a single odd field never fails the whole window.
fn lenient_field<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(match value {
        None | Some(serde_json::Value::Null) => None,
        Some(serde_json::Value::String(s)) => Some(s),
        Some(other) => Some(other.to_string()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn window_parses_mixed_field_types() {
        let window: FeedWindow = serde_json::from_str(
            r#"{
                "channel": {"id": 99, "name": "lobby screen"},
                "feeds": [
                    {"entry_id": 2, "created_at": "2026-01-02T00:00:00Z", "field1": "12", "field2": null},
                    {"entry_id": 1, "field1": 7},
                    {"entry_id": 3}
                ]
            }"#,
        )
        .unwrap();

        assert_eq!(window.channel.id, 99);
        assert_eq!(window.feeds.len(), 3);
        assert_eq!(window.feeds[0].metric_a.as_deref(), Some("12"));
        assert_eq!(window.feeds[0].metric_b, None);
        assert_eq!(window.feeds[1].metric_a.as_deref(), Some("7"));
        assert_eq!(window.feeds[2].metric_a, None);
    }

    #[test]
    fn window_without_feeds_is_empty() {
        let window: FeedWindow = serde_json::from_str(r#"{"channel": {"id": 1}}"#).unwrap();
        assert!(window.feeds.is_empty());
    }
}
