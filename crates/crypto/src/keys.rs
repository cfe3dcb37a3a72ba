use std::fmt;

use hoplink_core::{Result, TunnelError};
use rand::rngs::OsRng;
use rand::RngCore;
use sha2::{Digest, Sha256};

/// Length of a tunnel master secret and of every derived hop key
pub const KEY_LEN: usize = 32;

/// Per-tunnel secret every hop key is derived from.
///
/// Debug output is redacted so the secret never ends up in logs.
#[derive(Clone, PartialEq, Eq)]
pub struct MasterSecret([u8; KEY_LEN]);

impl MasterSecret {
    /// Generate a fresh random master secret
    pub fn generate() -> Self {
        let mut secret = [0u8; KEY_LEN];
        OsRng.fill_bytes(&mut secret);
        Self(secret)
    }

    pub fn from_bytes(bytes: [u8; KEY_LEN]) -> Self {
        Self(bytes)
    }

    /// Create from a byte slice, which must be exactly [`KEY_LEN`] bytes
    pub fn from_slice(bytes: &[u8]) -> Result<Self> {
        let secret: [u8; KEY_LEN] =
            bytes
                .try_into()
                .map_err(|_| TunnelError::InvalidKeyLength {
                    expected: KEY_LEN,
                    actual: bytes.len(),
                })?;
        Ok(Self(secret))
    }

    pub fn as_bytes(&self) -> &[u8; KEY_LEN] {
        &self.0
    }
}

impl fmt::Debug for MasterSecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("MasterSecret(..)")
    }
}

/// Hash data using SHA-256
pub fn hash(data: &[u8]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hasher.finalize().into()
}

/// Derive the key for one hop: SHA-256(master_secret || relay_id)
pub fn derive_hop_key(master_secret: &MasterSecret, relay_id: &str) -> [u8; KEY_LEN] {
    let mut hasher = Sha256::new();
    hasher.update(master_secret.as_bytes());
    hasher.update(relay_id.as_bytes());
    hasher.finalize().into()
}
