//! Tunnel lifecycle service
//!
//! Thin façade over a shared [`TunnelRegistry`]. Holds no state of its own:
//! every call goes to the registry and the result is reshaped for the
//! session layer. Nothing returned here ever contains a master secret.

use std::sync::Arc;

use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::{debug, info};

use hoplink_core::{HopTiming, Relay, Route, TunnelEvent, TunnelSnapshot, TunnelStatus};
use hoplink_crypto::LayerEnvelope;
use hoplink_settings::Settings;
use hoplink_tunnel::{RegistryConfig, TunnelRegistry};

use crate::{DaemonError, Result};

/// One hop of a route as shown to clients
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RouteHopSummary {
    pub name: String,
    pub location: String,
    pub hop_number: u8,
}

/// Route stop without position, used for per-packet responses
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RouteStop {
    pub name: String,
    pub location: String,
}

/// Simulated per-hop timing attached to an encrypted packet
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoutingStep {
    pub hop_number: u8,
    pub relay_id: String,
    pub name: String,
    pub location: String,
    pub address: String,
    pub latency_ms: u32,
    pub processing_ms: f64,
    pub entry_ms: f64,
    pub exit_ms: f64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateTunnelResponse {
    pub tunnel_id: String,
    #[serde(rename = "virtualIP")]
    pub virtual_ip: String,
    pub route: Vec<RouteHopSummary>,
    pub status: TunnelStatus,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RouteAndEncryptResponse {
    pub tunnel_id: String,
    pub envelope: LayerEnvelope,
    pub route: Vec<RouteStop>,
    #[serde(rename = "virtualIP")]
    pub virtual_ip: String,
    pub total_latency_ms: f64,
    pub routing_info: Vec<RoutingStep>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshResponse {
    pub tunnel_id: String,
    #[serde(rename = "virtualIP")]
    pub virtual_ip: String,
    pub route: Vec<RouteHopSummary>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CloseResponse {
    pub closed: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TunnelInfoStats {
    pub bytes_transferred: u64,
    pub packets_transferred: u64,
    pub uptime_ms: u64,
    pub last_activity_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TunnelInfo {
    pub tunnel_id: String,
    pub status: TunnelStatus,
    #[serde(rename = "virtualIP")]
    pub virtual_ip: String,
    pub protocol: String,
    pub route: Vec<RouteHopSummary>,
    pub stats: TunnelInfoStats,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    pub healthy: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub idle_duration_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub uptime_ms: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActiveTunnelSummary {
    pub tunnel_id: String,
    pub user_id: String,
    pub status: TunnelStatus,
    #[serde(rename = "virtualIP")]
    pub virtual_ip: String,
    pub uptime_ms: u64,
    pub bytes_transferred: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatsResponse {
    pub active_tunnel_count: usize,
    pub total_bytes: u64,
    pub total_packets: u64,
    pub average_uptime_ms: f64,
    pub relay_count: usize,
}

fn hop_summaries(route: &Route) -> Vec<RouteHopSummary> {
    route
        .hops()
        .iter()
        .map(|hop| RouteHopSummary {
            name: hop.relay.name.clone(),
            location: hop.relay.location.clone(),
            hop_number: hop.hop_number,
        })
        .collect()
}

impl From<HopTiming> for RoutingStep {
    fn from(t: HopTiming) -> Self {
        Self {
            hop_number: t.hop_number,
            relay_id: t.relay_id,
            name: t.name,
            location: t.location,
            address: t.address,
            latency_ms: t.latency_ms,
            processing_ms: t.processing_ms,
            entry_ms: t.entry_ms,
            exit_ms: t.exit_ms,
        }
    }
}

/// Lifecycle API over a shared registry
#[derive(Clone)]
pub struct TunnelService {
    registry: Arc<TunnelRegistry>,
}

impl TunnelService {
    pub fn new(registry: Arc<TunnelRegistry>) -> Self {
        Self { registry }
    }

    /// Build a registry from validated settings
    pub fn from_settings(settings: &Settings) -> Result<Self> {
        let registry = Self::build_registry(settings)?;
        Ok(Self::new(Arc::new(registry)))
    }

    /// Same as [`from_settings`](Self::from_settings) with reproducible routes,
    /// virtual IPs and jitter
    pub fn from_settings_seeded(settings: &Settings, seed: u64) -> Result<Self> {
        let registry = Self::build_registry(settings)?.with_rng(StdRng::seed_from_u64(seed));
        Ok(Self::new(Arc::new(registry)))
    }

    fn build_registry(settings: &Settings) -> Result<TunnelRegistry> {
        settings.validate()?;

        let config = RegistryConfig {
            min_hops: settings.tunnel.min_hops,
            max_hops: settings.tunnel.max_hops,
            idle_timeout_ms: settings.tunnel.idle_timeout_ms(),
            jitter_min_ms: settings.tunnel.jitter_min_ms,
            jitter_max_ms: settings.tunnel.jitter_max_ms,
            event_capacity: settings.tunnel.event_capacity,
        };
        Ok(TunnelRegistry::new(settings.catalog()?, config)?)
    }

    pub fn registry(&self) -> &Arc<TunnelRegistry> {
        &self.registry
    }

    pub fn create_tunnel(&self, user_id: &str, connection_id: &str) -> Result<CreateTunnelResponse> {
        let tunnel = self.registry.create_tunnel(user_id, connection_id)?;

        Ok(CreateTunnelResponse {
            route: hop_summaries(&tunnel.route),
            tunnel_id: tunnel.tunnel_id,
            virtual_ip: tunnel.virtual_ip,
            status: tunnel.status,
        })
    }

    /// Serialize `payload` as JSON and onion-encrypt it through the user's tunnel
    pub fn route_and_encrypt<T: Serialize + ?Sized>(
        &self,
        user_id: &str,
        payload: &T,
    ) -> Result<RouteAndEncryptResponse> {
        let bytes = serde_json::to_vec(payload).map_err(|e| DaemonError::Payload(e.to_string()))?;
        let packet = self.registry.route_and_encrypt(user_id, &bytes)?;

        Ok(RouteAndEncryptResponse {
            tunnel_id: packet.tunnel_id,
            envelope: packet.envelope,
            route: packet
                .route
                .hops()
                .iter()
                .map(|hop| RouteStop {
                    name: hop.relay.name.clone(),
                    location: hop.relay.location.clone(),
                })
                .collect(),
            virtual_ip: packet.virtual_ip,
            total_latency_ms: packet.total_latency_ms,
            routing_info: packet.hop_timings.into_iter().map(RoutingStep::from).collect(),
        })
    }

    /// Peel an envelope with the user's current tunnel and decode the JSON payload
    pub fn decrypt_payload<T: DeserializeOwned>(
        &self,
        user_id: &str,
        envelope: &LayerEnvelope,
    ) -> Result<T> {
        let bytes = self.registry.decrypt_for_user(user_id, envelope)?;
        serde_json::from_slice(&bytes).map_err(|e| DaemonError::Payload(e.to_string()))
    }

    pub fn refresh_tunnel(&self, user_id: &str) -> Result<RefreshResponse> {
        let tunnel = self.registry.refresh_tunnel(user_id)?;

        Ok(RefreshResponse {
            route: hop_summaries(&tunnel.route),
            tunnel_id: tunnel.tunnel_id,
            virtual_ip: tunnel.virtual_ip,
        })
    }

    pub fn close_tunnel(&self, user_id: &str) -> CloseResponse {
        CloseResponse {
            closed: self.registry.close_tunnel(user_id),
        }
    }

    /// Session-layer hook: a connection went away
    pub fn on_disconnect(&self, connection_id: &str) -> bool {
        let closed = self.registry.close_by_connection(connection_id);
        if closed {
            info!("Connection {} dropped, tunnel closed", connection_id);
        } else {
            debug!("Connection {} dropped with no tunnel", connection_id);
        }
        closed
    }

    fn info_for(&self, tunnel: TunnelSnapshot) -> TunnelInfo {
        let now = self.registry.now_ms();

        TunnelInfo {
            route: hop_summaries(&tunnel.route),
            stats: TunnelInfoStats {
                bytes_transferred: tunnel.bytes_transferred,
                packets_transferred: tunnel.packets_transferred,
                uptime_ms: tunnel.uptime_ms(now),
                last_activity_ms: tunnel.last_activity_ms,
            },
            tunnel_id: tunnel.tunnel_id,
            status: tunnel.status,
            virtual_ip: tunnel.virtual_ip,
            protocol: tunnel.protocol,
        }
    }

    pub fn get_tunnel_info(&self, user_id: &str) -> Option<TunnelInfo> {
        self.registry.get_tunnel(user_id).map(|t| self.info_for(t))
    }

    pub fn tunnel_for_connection(&self, connection_id: &str) -> Option<TunnelInfo> {
        self.registry
            .get_tunnel_by_connection(connection_id)
            .map(|t| self.info_for(t))
    }

    pub fn check_health(&self, user_id: &str) -> HealthResponse {
        let report = self.registry.check_health(user_id);

        HealthResponse {
            healthy: report.healthy,
            reason: report.reason,
            idle_duration_ms: report.idle_duration_ms,
            uptime_ms: report.uptime_ms,
        }
    }

    pub fn list_active_tunnels(&self) -> Vec<ActiveTunnelSummary> {
        let now = self.registry.now_ms();

        self.registry
            .list_tunnels()
            .into_iter()
            .map(|t| ActiveTunnelSummary {
                uptime_ms: t.uptime_ms(now),
                tunnel_id: t.tunnel_id,
                user_id: t.user_id,
                status: t.status,
                virtual_ip: t.virtual_ip,
                bytes_transferred: t.bytes_transferred,
            })
            .collect()
    }

    pub fn aggregate_stats(&self) -> StatsResponse {
        let stats = self.registry.aggregate_stats();

        StatsResponse {
            active_tunnel_count: stats.active_tunnel_count,
            total_bytes: stats.total_bytes,
            total_packets: stats.total_packets,
            average_uptime_ms: stats.average_uptime_ms,
            relay_count: stats.relay_count,
        }
    }

    pub fn relays(&self) -> Vec<Relay> {
        self.registry.catalog().list_relays().to_vec()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<TunnelEvent> {
        self.registry.subscribe()
    }
}
