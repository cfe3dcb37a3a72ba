use serde::{Deserialize, Serialize};

/// Minimum number of hops in a tunnel route
pub const MIN_HOPS: usize = 2;

/// Maximum number of hops in a tunnel route
pub const MAX_HOPS: usize = 4;

/// Idle time after which a tunnel reports unhealthy (5 minutes)
pub const DEFAULT_IDLE_TIMEOUT_MS: u64 = 5 * 60 * 1000;

/// AEAD applied at every layer, reported in tunnel info
pub const TUNNEL_PROTOCOL: &str = "ChaCha20-Poly1305";

/// A simulated relay endpoint
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Relay {
    /// Stable identity, also the key-derivation label for this hop
    pub id: String,
    /// Display name (e.g. "US East")
    pub name: String,
    /// Geographic label (e.g. "Virginia")
    pub location: String,
    /// Simulated network address
    pub address: String,
    /// Fixed simulated latency in milliseconds
    pub latency_ms: u32,
}

impl Relay {
    pub fn new(id: &str, name: &str, location: &str, address: &str, latency_ms: u32) -> Self {
        Self {
            id: id.to_string(),
            name: name.to_string(),
            location: location.to_string(),
            address: address.to_string(),
            latency_ms,
        }
    }
}

/// A relay at a given position in a route
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouteHop {
    pub relay: Relay,
    /// 1-based position in traversal order
    pub hop_number: u8,
}

/// Ordered chain of relays a tunnel's traffic passes through (hop 1 first)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Route {
    hops: Vec<RouteHop>,
}

impl Route {
    /// Build a route from relays in traversal order, numbering hops from 1.
    ///
    /// No length check happens here; the layered cipher rejects routes
    /// outside [`MIN_HOPS`]..=[`MAX_HOPS`]. Hop numbers saturate at 255.
    pub fn from_relays(relays: Vec<Relay>) -> Self {
        let hops = relays
            .into_iter()
            .enumerate()
            .map(|(i, relay)| RouteHop {
                relay,
                hop_number: u8::try_from(i + 1).unwrap_or(u8::MAX),
            })
            .collect();
        Self { hops }
    }

    pub fn hops(&self) -> &[RouteHop] {
        &self.hops
    }

    pub fn len(&self) -> usize {
        self.hops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hops.is_empty()
    }

    /// Sum of the fixed relay latencies, without processing jitter
    pub fn base_latency_ms(&self) -> u64 {
        self.hops.iter().map(|h| h.relay.latency_ms as u64).sum()
    }

    /// Human-readable rendering, e.g. `US East → EU West`
    pub fn describe(&self) -> String {
        self.hops
            .iter()
            .map(|h| h.relay.name.as_str())
            .collect::<Vec<_>>()
            .join(" → ")
    }

    /// True if no relay identity appears twice
    pub fn has_distinct_relays(&self) -> bool {
        let mut seen = std::collections::HashSet::new();
        self.hops.iter().all(|h| seen.insert(h.relay.id.as_str()))
    }
}

/// Tunnel status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TunnelStatus {
    Active,
    Closed,
}

/// Public view of a tunnel. Never carries keying material.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TunnelSnapshot {
    pub tunnel_id: String,
    pub user_id: String,
    pub connection_id: String,
    pub route: Route,
    pub virtual_ip: String,
    pub status: TunnelStatus,
    pub protocol: String,
    pub bytes_transferred: u64,
    pub packets_transferred: u64,
    /// Milliseconds since the Unix epoch
    pub created_at_ms: u64,
    /// Milliseconds since the Unix epoch
    pub last_activity_ms: u64,
}

impl TunnelSnapshot {
    pub fn uptime_ms(&self, now_ms: u64) -> u64 {
        now_ms.saturating_sub(self.created_at_ms)
    }

    pub fn idle_ms(&self, now_ms: u64) -> u64 {
        now_ms.saturating_sub(self.last_activity_ms)
    }
}

/// Simulated passage of one packet through one hop
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HopTiming {
    pub hop_number: u8,
    pub relay_id: String,
    pub name: String,
    pub location: String,
    pub address: String,
    pub latency_ms: u32,
    /// Simulated processing delay added on top of the relay latency
    pub processing_ms: f64,
    pub entry_ms: f64,
    pub exit_ms: f64,
}

/// Result of a tunnel health check
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthReport {
    pub healthy: bool,
    pub reason: Option<String>,
    pub idle_duration_ms: Option<u64>,
    pub uptime_ms: Option<u64>,
}

impl HealthReport {
    pub fn healthy(uptime_ms: u64, idle_duration_ms: u64) -> Self {
        Self {
            healthy: true,
            reason: None,
            idle_duration_ms: Some(idle_duration_ms),
            uptime_ms: Some(uptime_ms),
        }
    }

    pub fn not_found() -> Self {
        Self {
            healthy: false,
            reason: Some("Tunnel not found".to_string()),
            idle_duration_ms: None,
            uptime_ms: None,
        }
    }

    pub fn idle(idle_duration_ms: u64) -> Self {
        Self {
            healthy: false,
            reason: Some("Tunnel idle for too long".to_string()),
            idle_duration_ms: Some(idle_duration_ms),
            uptime_ms: None,
        }
    }
}

/// Registry-wide statistics
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TunnelStats {
    pub active_tunnel_count: usize,
    pub total_bytes: u64,
    pub total_packets: u64,
    pub average_uptime_ms: f64,
    pub relay_count: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn relay(id: &str, latency_ms: u32) -> Relay {
        Relay::new(id, &id.to_uppercase(), "Nowhere", "10.0.0.1", latency_ms)
    }

    #[test]
    fn test_route_numbers_hops_from_one() {
        let route = Route::from_relays(vec![relay("a", 10), relay("b", 20), relay("c", 30)]);

        let numbers: Vec<u8> = route.hops().iter().map(|h| h.hop_number).collect();
        assert_eq!(numbers, vec![1, 2, 3]);
        assert_eq!(route.len(), 3);
        assert_eq!(route.base_latency_ms(), 60);
    }

    #[test]
    fn test_route_describe() {
        let route = Route::from_relays(vec![relay("a", 10), relay("b", 20)]);
        assert_eq!(route.describe(), "A → B");
    }

    #[test]
    fn test_route_distinct_relays() {
        let route = Route::from_relays(vec![relay("a", 10), relay("b", 20)]);
        assert!(route.has_distinct_relays());

        let repeated = Route::from_relays(vec![relay("a", 10), relay("a", 10)]);
        assert!(!repeated.has_distinct_relays());
    }

    #[test]
    fn test_empty_route() {
        let route = Route::from_relays(vec![]);
        assert!(route.is_empty());
        assert_eq!(route.describe(), "");
    }

    #[test]
    fn test_hop_numbers_do_not_wrap() {
        let relays = (0..300).map(|i| relay(&format!("r{}", i), 1)).collect();
        let route = Route::from_relays(relays);
        assert_eq!(route.hops()[254].hop_number, 255);
        assert_eq!(route.hops()[299].hop_number, 255);
    }

    #[test]
    fn test_tunnel_status_serialization() {
        assert_eq!(serde_json::to_string(&TunnelStatus::Active).unwrap(), "\"active\"");
        assert_eq!(serde_json::to_string(&TunnelStatus::Closed).unwrap(), "\"closed\"");
    }

    #[test]
    fn test_snapshot_durations_saturate() {
        let snapshot = TunnelSnapshot {
            tunnel_id: "tunnel-00".to_string(),
            user_id: "u1".to_string(),
            connection_id: "c1".to_string(),
            route: Route::from_relays(vec![relay("a", 10), relay("b", 20)]),
            virtual_ip: "172.16.0.1".to_string(),
            status: TunnelStatus::Active,
            protocol: TUNNEL_PROTOCOL.to_string(),
            bytes_transferred: 0,
            packets_transferred: 0,
            created_at_ms: 1_000,
            last_activity_ms: 2_000,
        };

        assert_eq!(snapshot.uptime_ms(5_000), 4_000);
        assert_eq!(snapshot.idle_ms(5_000), 3_000);
        // Clock behind the snapshot never underflows
        assert_eq!(snapshot.idle_ms(500), 0);
    }

    #[test]
    fn test_health_report_constructors() {
        let ok = HealthReport::healthy(10, 2);
        assert!(ok.healthy);
        assert!(ok.reason.is_none());

        let missing = HealthReport::not_found();
        assert!(!missing.healthy);
        assert_eq!(missing.reason.as_deref(), Some("Tunnel not found"));

        let idle = HealthReport::idle(400_000);
        assert!(!idle.healthy);
        assert_eq!(idle.idle_duration_ms, Some(400_000));
    }
}
