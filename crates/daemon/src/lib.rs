//! HopLink Daemon
//!
//! Service façade over the tunnel registry for the session layer.
//!
//! ## Components
//!
//! - **TunnelService**: lifecycle API shaping registry results into
//!   JSON-ready responses (camelCase, no keying material)
//! - **format_bytes**: human-readable byte counts for summaries
//!
//! ## Operations
//!
//! - `create_tunnel` - Build a tunnel for a user, replacing any existing one
//! - `route_and_encrypt` - Onion-encrypt a JSON payload through the user's route
//! - `refresh_tunnel` - Fresh route and secret on the same connection
//! - `close_tunnel` / `on_disconnect` - Tear down by user or by connection
//! - `get_tunnel_info`, `check_health`, `list_active_tunnels`, `aggregate_stats`

mod format;
mod service;

pub use format::format_bytes;
pub use service::{
    ActiveTunnelSummary, CloseResponse, CreateTunnelResponse, HealthResponse, RefreshResponse,
    RouteAndEncryptResponse, RouteHopSummary, RouteStop, RoutingStep, StatsResponse, TunnelInfo,
    TunnelInfoStats, TunnelService,
};

use thiserror::Error;

#[derive(Error, Debug)]
pub enum DaemonError {
    #[error("Tunnel error: {0}")]
    Tunnel(#[from] hoplink_core::TunnelError),

    #[error("Settings error: {0}")]
    Settings(#[from] hoplink_settings::SettingsError),

    #[error("Invalid payload: {0}")]
    Payload(String),
}

pub type Result<T> = std::result::Result<T, DaemonError>;
