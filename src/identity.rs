//! ==============================================================================
//! identity.rs - recorder signing identity
//! ==============================================================================
//!
//! purpose:
//!     loads the keypair this process signs ledger requests with and exposes
//!     its public half as an `Identity`. the identity is what the resolver
//!     compares against a device's recorder authority.
//!
//! accepted key files:
//!     - raw 32-byte seed
//!     - 64 hex characters (the seed, whitespace trimmed)
//!     - json byte array of 32 (seed) or 64 (seed followed by public key) bytes
//!
//! relationships:
//!     - used by: main.rs / bin (load once at startup)
//!     - used by: ledger/http.rs (request signatures)
//!     - used by: resolver.rs (authority checks)
//!
//! ==============================================================================

use ed25519_dalek::{Signer as _, SigningKey};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::path::Path;
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum IdentityError {
    #[error("failed to read key file {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("key file {0} is not a 32-byte seed, 64-char hex seed or json byte array")]
    UnrecognizedFormat(String),
    #[error("key file {0}: embedded public key does not match the seed")]
    PublicKeyMismatch(String),
    #[error("invalid identity {0:?}: expected 64 hex characters")]
    InvalidIdentity(String),
}

/// 32-byte ed25519 public key naming an authority or recorder on the ledger.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Identity([u8; 32]);

impl Identity {
    pub const fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

impl fmt::Debug for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Identity({})", self)
    }
}

impl FromStr for Identity {
    type Err = IdentityError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        let bytes = hex::decode(trimmed).map_err(|_| IdentityError::InvalidIdentity(s.to_string()))?;
        let arr: [u8; 32] = bytes
            .try_into()
            .map_err(|_| IdentityError::InvalidIdentity(s.to_string()))?;
        Ok(Self(arr))
    }
}

impl Serialize for Identity {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for Identity {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

/// the process's signing key. never leaves this module except as signatures.
pub struct Signer {
    key: SigningKey,
}

impl Signer {
    pub fn from_seed(seed: [u8; 32]) -> Self {
        Self { key: SigningKey::from_bytes(&seed) }
    }

    pub fn identity(&self) -> Identity {
        Identity(self.key.verifying_key().to_bytes())
    }

    /// hex-encoded ed25519 signature over `message`
    pub fn sign_hex(&self, message: &[u8]) -> String {
        hex::encode(self.key.sign(message).to_bytes())
    }
}

impl fmt::Debug for Signer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Signer").field("identity", &self.identity()).finish()
    }
}

/// Load the signing key from disk.
pub fn load_signer(path: &Path) -> Result<Signer, IdentityError> {
    let display = path.display().to_string();
    let bytes = std::fs::read(path).map_err(|source| IdentityError::Read {
        path: display.clone(),
        source,
    })?;
    parse_key_material(&bytes, &display)
}

fn parse_key_material(bytes: &[u8], origin: &str) -> Result<Signer, IdentityError> {
    if bytes.len() == 32 {
        let mut seed = [0u8; 32];
        seed.copy_from_slice(bytes);
        return Ok(Signer::from_seed(seed));
    }

    let text = std::str::from_utf8(bytes)
        .map_err(|_| IdentityError::UnrecognizedFormat(origin.to_string()))?
        .trim();

    if text.starts_with('[') {
        let array: Vec<u8> = serde_json::from_str(text)
            .map_err(|_| IdentityError::UnrecognizedFormat(origin.to_string()))?;
        return match array.len() {
            32 | 64 => {
                let mut seed = [0u8; 32];
                seed.copy_from_slice(&array[..32]);
                let signer = Signer::from_seed(seed);
                if array.len() == 64 && signer.identity().as_bytes()[..] != array[32..] {
                    return Err(IdentityError::PublicKeyMismatch(origin.to_string()));
                }
                Ok(signer)
            }
            _ => Err(IdentityError::UnrecognizedFormat(origin.to_string())),
        };
    }

    let decoded = hex::decode(text).map_err(|_| IdentityError::UnrecognizedFormat(origin.to_string()))?;
    let seed: [u8; 32] = decoded
        .try_into()
        .map_err(|_| IdentityError::UnrecognizedFormat(origin.to_string()))?;
    Ok(Signer::from_seed(seed))
}
