#![allow(dead_code)]

use async_trait::async_trait;
use displaysync::identity::{Identity, Signer};
use displaysync::ledger::{
    DeviceRecord, DeviceStatus, LedgerClient, LedgerError, MetricSubmission, RegisteredDevice, Registry,
    SubmitReceipt,
};
use displaysync::telemetry::{Channel, FeedSource, FeedWindow, FetchError, TelemetrySample};
use std::collections::HashMap;
use std::sync::Mutex;

pub fn identity(seed: u8) -> Identity {
    Signer::from_seed([seed; 32]).identity()
}

pub fn window(entries: &[(u64, &str, &str)]) -> FeedWindow {
    FeedWindow {
        channel: Channel { id: 1, name: None },
        feeds: entries
            .iter()
            .map(|(id, a, b)| TelemetrySample {
                sample_id: *id,
                created_at: None,
                metric_a: Some(a.to_string()),
                metric_b: Some(b.to_string()),
            })
            .collect(),
    }
}

#[derive(Default)]
pub struct LedgerBook {
    pub registries: HashMap<Identity, Registry>,
    pub devices: HashMap<(Identity, u64), DeviceRecord>,
    pub submissions: Vec<MetricSubmission>,
    pub registry_creations: usize,
    pub registrations: usize,
    pub device_fetches: usize,
    pub fail_registry_fetch: Option<LedgerError>,
    pub fail_device_fetch: Option<LedgerError>,
    pub fail_submit: Option<LedgerError>,
}

/// In-memory ledger. The signer is whoever the client would sign as.
pub struct FakeLedger {
    signer: Identity,
    pub book: Mutex<LedgerBook>,
}

impl FakeLedger {
    pub fn new(signer: Identity) -> Self {
        Self { signer, book: Mutex::new(LedgerBook::default()) }
    }

    pub fn with_registry(self, authority: Identity) -> Self {
        self.book
            .lock()
            .unwrap()
            .registries
            .insert(authority, Registry { authority, device_count: 0 });
        self
    }

    pub fn with_device(self, authority: Identity, index: u64, recorder: Identity) -> Self {
        {
            let mut book = self.book.lock().unwrap();
            let registry = book
                .registries
                .entry(authority)
                .or_insert(Registry { authority, device_count: 0 });
            registry.device_count = registry.device_count.max(index + 1);
            book.devices.insert(
                (authority, index),
                DeviceRecord {
                    authority,
                    index,
                    recorder,
                    location: "lobby".into(),
                    status: DeviceStatus::Active,
                    total_views: 0,
                    total_impressions: 0,
                },
            );
        }
        self
    }

    pub fn submissions(&self) -> Vec<MetricSubmission> {
        self.book.lock().unwrap().submissions.clone()
    }

    pub fn registrations(&self) -> usize {
        self.book.lock().unwrap().registrations
    }

    pub fn registry_creations(&self) -> usize {
        self.book.lock().unwrap().registry_creations
    }

    pub fn device(&self, authority: Identity, index: u64) -> Option<DeviceRecord> {
        self.book.lock().unwrap().devices.get(&(authority, index)).cloned()
    }
}

#[async_trait]
impl LedgerClient for FakeLedger {
    async fn fetch_registry(&self, authority: &Identity) -> Result<Registry, LedgerError> {
        let book = self.book.lock().unwrap();
        if let Some(e) = book.fail_registry_fetch.clone() {
            return Err(e);
        }
        book.registries
            .get(authority)
            .cloned()
            .ok_or_else(|| LedgerError::NotFound(format!("registry {authority}")))
    }

    async fn create_registry(&self, authority: &Identity) -> Result<Registry, LedgerError> {
        let mut book = self.book.lock().unwrap();
        book.registry_creations += 1;
        let registry = Registry { authority: *authority, device_count: 0 };
        book.registries.insert(*authority, registry.clone());
        Ok(registry)
    }

    async fn fetch_device(&self, authority: &Identity, index: u64) -> Result<DeviceRecord, LedgerError> {
        let mut book = self.book.lock().unwrap();
        book.device_fetches += 1;
        if let Some(e) = book.fail_device_fetch.clone() {
            return Err(e);
        }
        book.devices
            .get(&(*authority, index))
            .cloned()
            .ok_or_else(|| LedgerError::NotFound(format!("device {authority}/{index}")))
    }

    async fn register_device(&self, location: &str, recorder: &Identity) -> Result<RegisteredDevice, LedgerError> {
        let mut book = self.book.lock().unwrap();
        let signer = self.signer;
        let registry = book
            .registries
            .get_mut(&signer)
            .ok_or_else(|| LedgerError::NotFound(format!("registry {signer}")))?;
        let index = registry.device_count;
        registry.device_count += 1;

        let record = DeviceRecord {
            authority: signer,
            index,
            recorder: *recorder,
            location: location.to_string(),
            status: DeviceStatus::Active,
            total_views: 0,
            total_impressions: 0,
        };
        book.devices.insert((signer, index), record.clone());
        book.registrations += 1;
        Ok(RegisteredDevice { index, record })
    }

    async fn submit_metrics(&self, submission: &MetricSubmission) -> Result<SubmitReceipt, LedgerError> {
        let mut book = self.book.lock().unwrap();
        if let Some(e) = book.fail_submit.clone() {
            return Err(e);
        }
        let key = (submission.device_authority, submission.device_index);
        let device = book
            .devices
            .get_mut(&key)
            .ok_or_else(|| LedgerError::NotFound("device".into()))?;
        if device.recorder != submission.recorder {
            return Err(LedgerError::Rejected { status: 403, message: "recorder mismatch".into() });
        }
        device.total_views += submission.views;
        device.total_impressions += submission.impressions;
        book.submissions.push(*submission);
        Ok(SubmitReceipt { reference: format!("tx-{}", book.submissions.len()) })
    }
}

/// Feed that serves whatever window the test set last; `None` means unreachable.
#[derive(Default)]
pub struct FakeFeed {
    window: Mutex<Option<FeedWindow>>,
    fetches: Mutex<usize>,
}

impl FakeFeed {
    pub fn serving(window: FeedWindow) -> Self {
        Self { window: Mutex::new(Some(window)), fetches: Mutex::new(0) }
    }

    pub fn set(&self, window: Option<FeedWindow>) {
        *self.window.lock().unwrap() = window;
    }

    pub fn fetches(&self) -> usize {
        *self.fetches.lock().unwrap()
    }
}

#[async_trait]
impl FeedSource for FakeFeed {
    async fn fetch(&self) -> Result<FeedWindow, FetchError> {
        *self.fetches.lock().unwrap() += 1;
        self.window
            .lock()
            .unwrap()
            .clone()
            .ok_or_else(|| FetchError::Transport("feed offline".into()))
    }
}
