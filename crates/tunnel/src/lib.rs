//! HopLink Tunnel
//!
//! Route selection and the tunnel registry: the stateful core that owns every
//! user's tunnel, its keying material and its usage counters.

mod path;
mod registry;

pub use path::RouteSelector;
pub use registry::{RegistryConfig, RoutedPacket, TunnelRegistry};
