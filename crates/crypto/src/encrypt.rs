use chacha20poly1305::{
    aead::{AeadInPlace, KeyInit},
    ChaCha20Poly1305, Nonce, Tag,
};
use rand::rngs::OsRng;
use rand::RngCore;
use thiserror::Error;

/// ChaCha20-Poly1305 nonce length
pub const NONCE_LEN: usize = 12;

/// Poly1305 authentication tag length
pub const TAG_LEN: usize = 16;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum EncryptError {
    #[error("Encryption failed")]
    EncryptionFailed,
    #[error("Decryption failed")]
    DecryptionFailed,
    #[error("Invalid key")]
    InvalidKey,
}

/// Output of a single AEAD seal with the tag kept apart from the ciphertext
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SealedBox {
    pub nonce: [u8; NONCE_LEN],
    pub ciphertext: Vec<u8>,
    pub tag: [u8; TAG_LEN],
}

/// Encrypt with ChaCha20-Poly1305 under a fresh random nonce.
///
/// `aad` is authenticated but not encrypted.
pub fn seal(key: &[u8; 32], aad: &[u8], plaintext: &[u8]) -> Result<SealedBox, EncryptError> {
    let mut nonce_bytes = [0u8; NONCE_LEN];
    OsRng.fill_bytes(&mut nonce_bytes);
    let nonce = Nonce::from_slice(&nonce_bytes);

    let cipher = ChaCha20Poly1305::new_from_slice(key).map_err(|_| EncryptError::InvalidKey)?;

    let mut buffer = plaintext.to_vec();
    let tag = cipher
        .encrypt_in_place_detached(nonce, aad, &mut buffer)
        .map_err(|_| EncryptError::EncryptionFailed)?;

    let mut tag_bytes = [0u8; TAG_LEN];
    tag_bytes.copy_from_slice(&tag);

    Ok(SealedBox {
        nonce: nonce_bytes,
        ciphertext: buffer,
        tag: tag_bytes,
    })
}

/// Verify the tag and decrypt. Nothing is returned unless the tag checks out.
pub fn open(key: &[u8; 32], aad: &[u8], sealed: &SealedBox) -> Result<Vec<u8>, EncryptError> {
    let cipher = ChaCha20Poly1305::new_from_slice(key).map_err(|_| EncryptError::InvalidKey)?;

    let mut buffer = sealed.ciphertext.clone();
    cipher
        .decrypt_in_place_detached(
            Nonce::from_slice(&sealed.nonce),
            aad,
            &mut buffer,
            Tag::from_slice(&sealed.tag),
        )
        .map_err(|_| EncryptError::DecryptionFailed)?;

    Ok(buffer)
}
