//! HopLink Core Types
//!
//! This crate defines the data model shared by every HopLink crate: relays,
//! routes, tunnel state, lifecycle events, the error taxonomy, and the clock
//! abstraction the registry reads time from.

mod catalog;
mod clock;
mod error;
mod events;
mod types;

pub use catalog::*;
pub use clock::*;
pub use error::*;
pub use events::*;
pub use types::*;
