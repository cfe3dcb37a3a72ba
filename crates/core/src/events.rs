//! Tunnel lifecycle notifications

use serde::{Deserialize, Serialize};

/// Event published by the registry whenever a tunnel appears or goes away
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TunnelEvent {
    Created {
        user_id: String,
        tunnel_id: String,
    },
    Refreshed {
        user_id: String,
        old_tunnel_id: String,
        new_tunnel_id: String,
    },
    Closed {
        user_id: String,
        tunnel_id: String,
    },
}

impl TunnelEvent {
    pub fn user_id(&self) -> &str {
        match self {
            Self::Created { user_id, .. }
            | Self::Refreshed { user_id, .. }
            | Self::Closed { user_id, .. } => user_id,
        }
    }
}
