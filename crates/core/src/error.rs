use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TunnelError {
    #[error("No active tunnel for user: {0}")]
    TunnelNotFound(String),

    #[error("Insufficient relays: need {required}, got {available}")]
    InsufficientRelays { required: usize, available: usize },

    #[error("Invalid route: {0} hops (2 to 4 required)")]
    InvalidRoute(usize),

    #[error("Decryption failed: {0}")]
    DecryptionFailed(String),

    #[error("Encryption failed: {0}")]
    EncryptionFailed(String),

    #[error("Invalid key length: expected {expected}, got {actual}")]
    InvalidKeyLength { expected: usize, actual: usize },

    #[error("Invalid relay catalog: {0}")]
    InvalidCatalog(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

pub type Result<T> = std::result::Result<T, TunnelError>;
