//! ==============================================================================
//! delta.rs - incremental metric delta
//! ==============================================================================
//!
//! purpose:
//!     turns a fetched window plus the stored cursor into one non-overlapping
//!     delta: only entries past the cursor, sorted, summed.
//!
//! invariants:
//!     - new_cursor >= the input cursor
//!     - sample_count == 0 means zero sums and new_cursor == input cursor
//!     - a malformed metric counts as 0 and never drops its neighbours
//!
//! ==============================================================================

use crate::telemetry::{FeedWindow, TelemetrySample};
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct MetricDelta {
    pub views_sum: u64,
    pub impressions_sum: u64,
    pub new_cursor: u64,
    pub sample_count: usize,
}

impl MetricDelta {
    pub fn empty(cursor: u64) -> Self {
        Self { views_sum: 0, impressions_sum: 0, new_cursor: cursor, sample_count: 0 }
    }

    pub fn is_empty(&self) -> bool {
        self.sample_count == 0
    }
}

pub fn compute_delta(window: &FeedWindow, last_sample_id: u64) -> MetricDelta {
    let mut fresh: Vec<&TelemetrySample> = window
        .feeds
        .iter()
        .filter(|s| s.sample_id > last_sample_id)
        .collect();
    fresh.sort_by_key(|s| s.sample_id);

    let Some(last) = fresh.last() else {
        return MetricDelta::empty(last_sample_id);
    };

    let (views_sum, impressions_sum) = fresh.iter().fold((0u64, 0u64), |(views, impressions), s| {
        (
            views.saturating_add(parse_metric(s.metric_a.as_deref())),
            impressions.saturating_add(parse_metric(s.metric_b.as_deref())),
        )
    });

    MetricDelta {
        views_sum,
        impressions_sum,
        new_cursor: last.sample_id,
        sample_count: fresh.len(),
    }
}

/// Parse a feed metric. integers as-is, finite non-negative decimals truncated, else 0.
pub fn parse_metric(raw: Option<&str>) -> u64 {
    let Some(text) = raw.map(str::trim).filter(|t| !t.is_empty()) else {
        return 0;
    };
    if let Ok(n) = text.parse::<u64>() {
        return n;
    }
    match text.parse::<f64>() {
        Ok(f) if f.is_finite() && f >= 0.0 => f.trunc() as u64,
        _ => 0,
    }
}
