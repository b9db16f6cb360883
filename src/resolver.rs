//! ==============================================================================
//! resolver.rs - device identity resolution
//! ==============================================================================
//!
//! purpose:
//!     decides which on-ledger device this process reports for, registering
//!     one when allowed. runs once per process; the result is cached by the
//!     caller for the process lifetime.
//!
//! steps (ensure_device):
//!     1. signing identity          (passed in, loaded by the binary)
//!     2. device authority          (configured override, else self)
//!     3. own registry              (fetch, create on not-found)
//!     4. candidate index           (configured, else cached in state)
//!     5. existing device           (fetch, recorder must equal self)
//!     6. registration gate         (no candidate + registration off = fatal)
//!     7. registration              (location required, authority must be self)
//!
//! an authority mismatch is always fatal. nothing here repairs a device
//! record or a cache that points at someone else's device.
//!
//! ==============================================================================

use crate::config::DeviceHints;
use crate::identity::Identity;
use crate::ledger::{DeviceRecord, LedgerClient, LedgerError};
use crate::state::SyncState;
use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("configured recorder authority {configured} does not match signing identity {signer}")]
    RecorderOverrideMismatch { configured: Identity, signer: Identity },
    #[error("failed to ensure device registry for {authority}: {source}")]
    Registry {
        authority: Identity,
        #[source]
        source: LedgerError,
    },
    #[error("failed to fetch device {authority}/{index}: {source}")]
    DeviceFetch {
        authority: Identity,
        index: u64,
        #[source]
        source: LedgerError,
    },
    #[error("device {authority}/{index} not found and auto-registration is disabled")]
    DeviceNotFound { authority: Identity, index: u64 },
    #[error("device {authority}/{index} records recorder {recorded}, but this process signs as {signer}")]
    RecorderMismatch {
        authority: Identity,
        index: u64,
        recorded: Identity,
        signer: Identity,
    },
    #[error("device index required, auto-registration disabled")]
    IndexRequired,
    #[error("device location is required to register a device")]
    LocationRequired,
    #[error("refusing to register a device under authority {authority}: this process signs as {signer}")]
    ForeignAuthority { authority: Identity, signer: Identity },
    #[error("device registration failed: {0}")]
    Registration(#[source] LedgerError),
}

/// The device this process reports for, resolved once per process.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceContext {
    pub device_authority: Identity,
    pub device_index: u64,
    pub recorder_identity: Identity,
    pub device_record: DeviceRecord,
}

pub struct DeviceResolver<'a> {
    ledger: &'a dyn LedgerClient,
    signer: Identity,
    hints: &'a DeviceHints,
}

impl<'a> DeviceResolver<'a> {
    pub fn new(ledger: &'a dyn LedgerClient, signer: Identity, hints: &'a DeviceHints) -> Self {
        Self { ledger, signer, hints }
    }

    /// Resolve (and if allowed, register) the device for this process.
    pub async fn ensure_device(&self, state: &SyncState, allow_register: bool) -> Result<DeviceContext, ResolveError> {
        self.check_recorder_override()?;
        let authority = self.device_authority();
        self.ensure_registry().await?;
        self.resolve(authority, state, allow_register).await
    }

    /// Resolve without touching ledger state: no registry creation, no registration.
    pub async fn inspect_device(&self, state: &SyncState) -> Result<DeviceContext, ResolveError> {
        self.check_recorder_override()?;
        let authority = self.device_authority();
        self.resolve(authority, state, false).await
    }

    async fn resolve(
        &self,
        authority: Identity,
        state: &SyncState,
        allow_register: bool,
    ) -> Result<DeviceContext, ResolveError> {
        match self.candidate_index(state) {
            Some(index) => match self.existing_device(authority, index).await {
                Ok(context) => return Ok(context),
                Err(ResolveError::DeviceNotFound { .. }) if allow_register => {
                    tracing::warn!(%authority, index, "device not found on ledger, registering a new one");
                }
                Err(e) => return Err(e),
            },
            None if !allow_register => return Err(ResolveError::IndexRequired),
            None => {
                tracing::info!(%authority, "no device index configured or cached, registering");
            }
        }

        self.register(authority).await
    }

    fn check_recorder_override(&self) -> Result<(), ResolveError> {
        match self.hints.recorder_authority {
            Some(configured) if configured != self.signer => Err(ResolveError::RecorderOverrideMismatch {
                configured,
                signer: self.signer,
            }),
            _ => Ok(()),
        }
    }

    pub fn device_authority(&self) -> Identity {
        self.hints.device_authority.unwrap_or(self.signer)
    }

    async fn ensure_registry(&self) -> Result<(), ResolveError> {
        match self.ledger.fetch_registry(&self.signer).await {
            Ok(registry) => {
                tracing::debug!(authority = %self.signer, devices = registry.device_count, "registry present");
                Ok(())
            }
            Err(e) if e.is_not_found() => {
                tracing::info!(authority = %self.signer, "registry missing, creating it");
                self.ledger
                    .create_registry(&self.signer)
                    .await
                    .map(|_| ())
                    .map_err(|source| ResolveError::Registry { authority: self.signer, source })
            }
            Err(source) => Err(ResolveError::Registry { authority: self.signer, source }),
        }
    }

    pub fn candidate_index(&self, state: &SyncState) -> Option<u64> {
        self.hints.device_index.or_else(|| state.cached_device_index())
    }

    async fn existing_device(&self, authority: Identity, index: u64) -> Result<DeviceContext, ResolveError> {
        let record = match self.ledger.fetch_device(&authority, index).await {
            Ok(record) => record,
            Err(e) if e.is_not_found() => return Err(ResolveError::DeviceNotFound { authority, index }),
            Err(source) => return Err(ResolveError::DeviceFetch { authority, index, source }),
        };
        self.verified_context(authority, index, record)
    }

    async fn register(&self, authority: Identity) -> Result<DeviceContext, ResolveError> {
        let location = self.hints.location.as_deref().ok_or(ResolveError::LocationRequired)?;
        if authority != self.signer {
            return Err(ResolveError::ForeignAuthority { authority, signer: self.signer });
        }

        let registered = self
            .ledger
            .register_device(location, &self.signer)
            .await
            .map_err(ResolveError::Registration)?;
        tracing::info!(%authority, index = registered.index, location, "registered device");

        self.verified_context(authority, registered.index, registered.record)
    }

    fn verified_context(&self, authority: Identity, index: u64, record: DeviceRecord) -> Result<DeviceContext, ResolveError> {
        if record.recorder != self.signer {
            return Err(ResolveError::RecorderMismatch {
                authority,
                index,
                recorded: record.recorder,
                signer: self.signer,
            });
        }
        Ok(DeviceContext {
            device_authority: authority,
            device_index: index,
            recorder_identity: self.signer,
            device_record: record,
        })
    }
}
