//! Layered (onion) encryption over a tunnel route
//!
//! Layers are sealed from the last hop outward so that peeling starts at
//! hop 1, the way a packet would physically reach the relays. Every layer
//! carries its own hop identity, nonce and tag; the plaintext of every layer
//! except the innermost is the serialized envelope of the next one.

use hoplink_core::{Result, Route, TunnelError, MAX_HOPS, MIN_HOPS};
use serde::{Deserialize, Serialize};

use crate::encrypt::{open, seal, EncryptError, SealedBox, NONCE_LEN, TAG_LEN};
use crate::keys::{derive_hop_key, MasterSecret, KEY_LEN};

/// One encryption layer.
///
/// Serializes as JSON with hex-encoded byte fields. The hop identity is bound
/// to the ciphertext as associated data.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LayerEnvelope {
    /// Identity of the relay that peels this layer
    pub hop: String,
    #[serde(with = "hex_bytes")]
    pub nonce: [u8; NONCE_LEN],
    #[serde(with = "hex_bytes")]
    pub ciphertext: Vec<u8>,
    #[serde(with = "hex_bytes")]
    pub tag: [u8; TAG_LEN],
}

impl LayerEnvelope {
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        serde_json::to_vec(self).map_err(|e| TunnelError::Serialization(e.to_string()))
    }

    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        serde_json::from_slice(data).map_err(|e| TunnelError::Serialization(e.to_string()))
    }

    /// Size of the serialized envelope, which is what the tunnel accounts as transferred
    pub fn serialized_len(&self) -> Result<usize> {
        self.to_bytes().map(|b| b.len())
    }

    fn sealed_box(&self) -> SealedBox {
        SealedBox {
            nonce: self.nonce,
            ciphertext: self.ciphertext.clone(),
            tag: self.tag,
        }
    }
}

/// Seal `data` into a single layer addressed to `hop_id`
pub fn seal_layer(hop_id: &str, key: &[u8; KEY_LEN], data: &[u8]) -> std::result::Result<LayerEnvelope, EncryptError> {
    let sealed = seal(key, hop_id.as_bytes(), data)?;
    Ok(LayerEnvelope {
        hop: hop_id.to_string(),
        nonce: sealed.nonce,
        ciphertext: sealed.ciphertext,
        tag: sealed.tag,
    })
}

/// Verify and remove a single layer, returning its plaintext
pub fn peel_layer(key: &[u8; KEY_LEN], envelope: &LayerEnvelope) -> std::result::Result<Vec<u8>, EncryptError> {
    open(key, envelope.hop.as_bytes(), &envelope.sealed_box())
}

fn check_route(route: &Route) -> Result<()> {
    if route.len() < MIN_HOPS || route.len() > MAX_HOPS {
        return Err(TunnelError::InvalidRoute(route.len()));
    }
    Ok(())
}

/// Wrap `plaintext` in one layer per hop, innermost for the last hop.
pub fn encrypt_layered(
    route: &Route,
    master_secret: &MasterSecret,
    plaintext: &[u8],
) -> Result<LayerEnvelope> {
    check_route(route)?;

    let mut hops = route.hops().iter().rev();
    let innermost = hops.next().ok_or(TunnelError::InvalidRoute(0))?;

    let key = derive_hop_key(master_secret, &innermost.relay.id);
    let mut envelope = seal_layer(&innermost.relay.id, &key, plaintext)
        .map_err(|e| TunnelError::EncryptionFailed(e.to_string()))?;

    for hop in hops {
        let inner = envelope.to_bytes()?;
        let key = derive_hop_key(master_secret, &hop.relay.id);
        envelope = seal_layer(&hop.relay.id, &key, &inner)
            .map_err(|e| TunnelError::EncryptionFailed(e.to_string()))?;
    }

    Ok(envelope)
}

/// Peel every layer in hop order and return the innermost plaintext.
///
/// Aborts at the first layer that fails to authenticate or parse.
pub fn decrypt_layered(
    route: &Route,
    master_secret: &MasterSecret,
    envelope: &LayerEnvelope,
) -> Result<Vec<u8>> {
    check_route(route)?;

    let (last, outer) = route
        .hops()
        .split_last()
        .ok_or(TunnelError::InvalidRoute(0))?;

    let mut layer = envelope.clone();

    for hop in outer {
        let inner = peel_hop(master_secret, &hop.relay.id, hop.hop_number, &layer)?;
        layer = LayerEnvelope::from_bytes(&inner).map_err(|_| {
            TunnelError::DecryptionFailed(format!(
                "malformed inner layer after hop {}",
                hop.hop_number
            ))
        })?;
    }

    peel_hop(master_secret, &last.relay.id, last.hop_number, &layer)
}

fn peel_hop(
    master_secret: &MasterSecret,
    relay_id: &str,
    hop_number: u8,
    layer: &LayerEnvelope,
) -> Result<Vec<u8>> {
    if layer.hop != relay_id {
        return Err(TunnelError::DecryptionFailed(format!(
            "hop {} expected layer for {}, found {}",
            hop_number, relay_id, layer.hop
        )));
    }

    let key = derive_hop_key(master_secret, relay_id);
    peel_layer(&key, layer).map_err(|_| {
        TunnelError::DecryptionFailed(format!("authentication failed at hop {}", hop_number))
    })
}

mod hex_bytes {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S, T>(bytes: &T, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
        T: AsRef<[u8]>,
    {
        serializer.serialize_str(&hex::encode(bytes))
    }

    pub fn deserialize<'de, D, T>(deserializer: D) -> Result<T, D::Error>
    where
        D: Deserializer<'de>,
        T: TryFrom<Vec<u8>>,
    {
        let s = String::deserialize(deserializer)?;
        let bytes = hex::decode(&s).map_err(serde::de::Error::custom)?;
        T::try_from(bytes).map_err(|_| serde::de::Error::custom("invalid byte length"))
    }
}
