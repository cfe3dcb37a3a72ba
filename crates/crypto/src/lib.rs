//! HopLink Cryptography
//!
//! Per-hop key derivation and the layered (onion) authenticated encryption
//! applied to every packet sent through a tunnel.

mod keys;
mod encrypt;
mod onion;

pub use keys::*;
pub use encrypt::*;
pub use onion::*;
