//! Tunnel registry
//!
//! Owns the user → tunnel map and the connection → user index. Both live
//! behind one `RwLock` so they can never disagree. Each tunnel sits in its
//! own mutex: encrypts for different users run in parallel, while operations
//! on the same user's tunnel are serialized.
//!
//! Lock order is always index lock, then tunnel lock, then RNG lock. The
//! index lock is never taken while a tunnel lock is held.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use rand::rngs::{OsRng, StdRng};
use rand::{Rng, RngCore, SeedableRng};
use serde::Serialize;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use hoplink_core::{
    Clock, HealthReport, HopTiming, RelayCatalog, Result, Route, SystemClock, TunnelError,
    TunnelEvent, TunnelSnapshot, TunnelStats, TunnelStatus, DEFAULT_IDLE_TIMEOUT_MS, MAX_HOPS,
    MIN_HOPS, TUNNEL_PROTOCOL,
};
use hoplink_crypto::{decrypt_layered, encrypt_layered, LayerEnvelope, MasterSecret};

use crate::path::RouteSelector;

/// Registry tuning
#[derive(Debug, Clone)]
pub struct RegistryConfig {
    pub min_hops: usize,
    pub max_hops: usize,
    /// Idle time after which a tunnel reports unhealthy
    pub idle_timeout_ms: u64,
    /// Simulated per-hop processing delay range (ms)
    pub jitter_min_ms: f64,
    pub jitter_max_ms: f64,
    /// Lifecycle event buffer per subscriber
    pub event_capacity: usize,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            min_hops: MIN_HOPS,
            max_hops: MAX_HOPS,
            idle_timeout_ms: DEFAULT_IDLE_TIMEOUT_MS,
            jitter_min_ms: 2.0,
            jitter_max_ms: 7.0,
            event_capacity: 64,
        }
    }
}

/// An encrypted packet plus the simulated path it took
#[derive(Debug, Clone, Serialize)]
pub struct RoutedPacket {
    pub tunnel_id: String,
    pub envelope: LayerEnvelope,
    pub route: Route,
    pub virtual_ip: String,
    pub hop_timings: Vec<HopTiming>,
    /// Simulated end-to-end latency (ms), advisory only
    pub total_latency_ms: f64,
    pub timestamp_ms: u64,
}

struct Tunnel {
    state: TunnelSnapshot,
    secret: MasterSecret,
}

type TunnelSlot = Arc<Mutex<Tunnel>>;

#[derive(Default)]
struct Indices {
    by_user: HashMap<String, TunnelSlot>,
    /// connection_id → user_id
    by_connection: HashMap<String, String>,
}

impl Indices {
    /// Remove the user's tunnel from both indices and mark it closed
    fn remove(&mut self, user_id: &str) -> Option<TunnelSnapshot> {
        let slot = self.by_user.remove(user_id)?;
        let mut tunnel = slot.lock();
        tunnel.state.status = TunnelStatus::Closed;
        self.unlink_connection(&tunnel.state.connection_id, user_id);
        Some(tunnel.state.clone())
    }

    /// Drop a connection entry, but only if it still points at `user_id`
    fn unlink_connection(&mut self, connection_id: &str, user_id: &str) {
        if self.by_connection.get(connection_id).map(String::as_str) == Some(user_id) {
            self.by_connection.remove(connection_id);
        }
    }
}

/// Authoritative store of live tunnels
pub struct TunnelRegistry {
    selector: RouteSelector,
    indices: RwLock<Indices>,
    rng: Mutex<Box<dyn RngCore + Send>>,
    clock: Arc<dyn Clock>,
    events: broadcast::Sender<TunnelEvent>,
    config: RegistryConfig,
}

impl TunnelRegistry {
    /// Create a registry over `catalog`.
    ///
    /// Fails if the hop range falls outside 2..=4, or if the catalog holds
    /// fewer than 4 relays regardless of the configured range.
    pub fn new(catalog: RelayCatalog, config: RegistryConfig) -> Result<Self> {
        let catalog = Arc::new(catalog);
        let selector =
            RouteSelector::with_hop_range(catalog.clone(), config.min_hops, config.max_hops)?;
        catalog.validate_for(MAX_HOPS)?;
        let (events, _) = broadcast::channel(config.event_capacity.max(1));

        info!(
            "Tunnel registry ready: {} relays, {}-{} hops",
            selector.catalog().len(),
            config.min_hops,
            config.max_hops
        );

        Ok(Self {
            selector,
            indices: RwLock::new(Indices::default()),
            rng: Mutex::new(Box::new(StdRng::from_entropy())),
            clock: Arc::new(SystemClock),
            events,
            config,
        })
    }

    /// Replace the time source
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Replace the random source used for routes, virtual IPs and jitter
    pub fn with_rng<R: RngCore + Send + 'static>(mut self, rng: R) -> Self {
        self.rng = Mutex::new(Box::new(rng));
        self
    }

    pub fn catalog(&self) -> &RelayCatalog {
        self.selector.catalog()
    }

    pub fn config(&self) -> &RegistryConfig {
        &self.config
    }

    pub fn now_ms(&self) -> u64 {
        self.clock.now_ms()
    }

    /// Subscribe to lifecycle events published from now on
    pub fn subscribe(&self) -> broadcast::Receiver<TunnelEvent> {
        self.events.subscribe()
    }

    fn publish(&self, event: TunnelEvent) {
        // No subscribers is fine
        let _ = self.events.send(event);
    }

    fn slot(&self, user_id: &str) -> Option<TunnelSlot> {
        self.indices.read().by_user.get(user_id).cloned()
    }

    /// Build a fresh tunnel: new id, secret, route and virtual IP
    fn build_tunnel(&self, user_id: &str, connection_id: &str) -> Result<Tunnel> {
        let (route, virtual_ip) = {
            let mut rng = self.rng.lock();
            let route = self.selector.select_route(&mut *rng)?;
            let virtual_ip = format!(
                "172.{}.{}.{}",
                rng.gen_range(16..=31),
                rng.gen::<u8>(),
                rng.gen::<u8>()
            );
            (route, virtual_ip)
        };

        let mut id_bytes = [0u8; 16];
        OsRng.fill_bytes(&mut id_bytes);
        let now = self.clock.now_ms();

        Ok(Tunnel {
            state: TunnelSnapshot {
                tunnel_id: format!("tunnel-{}", hex::encode(id_bytes)),
                user_id: user_id.to_string(),
                connection_id: connection_id.to_string(),
                route,
                virtual_ip,
                status: TunnelStatus::Active,
                protocol: TUNNEL_PROTOCOL.to_string(),
                bytes_transferred: 0,
                packets_transferred: 0,
                created_at_ms: now,
                last_activity_ms: now,
            },
            secret: MasterSecret::generate(),
        })
    }

    /// Create a tunnel for `user_id`, superseding any existing one
    pub fn create_tunnel(&self, user_id: &str, connection_id: &str) -> Result<TunnelSnapshot> {
        let tunnel = self.build_tunnel(user_id, connection_id)?;
        let snapshot = tunnel.state.clone();

        // Events go out under the write lock so subscribers see them in commit order
        let superseded = {
            let mut indices = self.indices.write();
            let superseded = indices.remove(user_id);
            indices
                .by_user
                .insert(user_id.to_string(), Arc::new(Mutex::new(tunnel)));
            indices
                .by_connection
                .insert(connection_id.to_string(), user_id.to_string());

            if let Some(old) = &superseded {
                self.publish(TunnelEvent::Closed {
                    user_id: user_id.to_string(),
                    tunnel_id: old.tunnel_id.clone(),
                });
            }
            self.publish(TunnelEvent::Created {
                user_id: user_id.to_string(),
                tunnel_id: snapshot.tunnel_id.clone(),
            });
            superseded
        };

        if let Some(old) = superseded {
            info!("Tunnel superseded: {} for user {}", old.tunnel_id, user_id);
        }
        info!("Tunnel created: {} for user {}", snapshot.tunnel_id, user_id);
        info!("   Route: {}", snapshot.route.describe());

        Ok(snapshot)
    }

    /// Close the user's tunnel. Returns whether one existed.
    pub fn close_tunnel(&self, user_id: &str) -> bool {
        let removed = {
            let mut indices = self.indices.write();
            let removed = indices.remove(user_id);
            if let Some(old) = &removed {
                self.publish(TunnelEvent::Closed {
                    user_id: user_id.to_string(),
                    tunnel_id: old.tunnel_id.clone(),
                });
            }
            removed
        };

        match removed {
            Some(old) => {
                info!("Tunnel closed: {}", old.tunnel_id);
                true
            }
            None => false,
        }
    }

    /// Close whichever tunnel is bound to `connection_id`
    pub fn close_by_connection(&self, connection_id: &str) -> bool {
        let removed = {
            let mut indices = self.indices.write();
            let removed = match indices.by_connection.get(connection_id).cloned() {
                Some(user_id) => indices.remove(&user_id),
                None => None,
            };
            if let Some(old) = &removed {
                self.publish(TunnelEvent::Closed {
                    user_id: old.user_id.clone(),
                    tunnel_id: old.tunnel_id.clone(),
                });
            }
            removed
        };

        match removed {
            Some(old) => {
                info!("Tunnel closed on disconnect: {}", old.tunnel_id);
                true
            }
            None => false,
        }
    }

    /// Replace the user's tunnel with a fresh route and secret on the same connection
    pub fn refresh_tunnel(&self, user_id: &str) -> Result<TunnelSnapshot> {
        if self.slot(user_id).is_none() {
            return Err(TunnelError::TunnelNotFound(user_id.to_string()));
        }

        // Connection id is filled in under the write lock
        let mut tunnel = self.build_tunnel(user_id, "")?;

        let (old, snapshot) = {
            let mut indices = self.indices.write();
            let old = indices
                .remove(user_id)
                .ok_or_else(|| TunnelError::TunnelNotFound(user_id.to_string()))?;

            tunnel.state.connection_id = old.connection_id.clone();
            let snapshot = tunnel.state.clone();
            indices
                .by_user
                .insert(user_id.to_string(), Arc::new(Mutex::new(tunnel)));
            indices
                .by_connection
                .insert(old.connection_id.clone(), user_id.to_string());
            self.publish(TunnelEvent::Refreshed {
                user_id: user_id.to_string(),
                old_tunnel_id: old.tunnel_id.clone(),
                new_tunnel_id: snapshot.tunnel_id.clone(),
            });
            (old, snapshot)
        };

        info!(
            "Tunnel refreshed: {} -> {} for user {}",
            old.tunnel_id, snapshot.tunnel_id, user_id
        );
        info!("   Route: {}", snapshot.route.describe());

        Ok(snapshot)
    }

    /// Simulate each hop's entry/exit time starting at `start_ms`
    fn schedule(&self, route: &Route, start_ms: u64) -> Vec<HopTiming> {
        let mut rng = self.rng.lock();
        let mut current = start_ms as f64;
        let (lo, hi) = (self.config.jitter_min_ms, self.config.jitter_max_ms);

        route
            .hops()
            .iter()
            .map(|hop| {
                let processing_ms = if hi > lo { rng.gen_range(lo..hi) } else { lo };
                let entry_ms = current;
                let exit_ms = entry_ms + processing_ms + hop.relay.latency_ms as f64;
                current = exit_ms;

                HopTiming {
                    hop_number: hop.hop_number,
                    relay_id: hop.relay.id.clone(),
                    name: hop.relay.name.clone(),
                    location: hop.relay.location.clone(),
                    address: hop.relay.address.clone(),
                    latency_ms: hop.relay.latency_ms,
                    processing_ms,
                    entry_ms,
                    exit_ms,
                }
            })
            .collect()
    }

    /// Run `f` on the user's live tunnel under its lock
    fn with_active<T>(&self, user_id: &str, f: impl FnOnce(&mut Tunnel) -> Result<T>) -> Result<T> {
        loop {
            let slot = self
                .slot(user_id)
                .ok_or_else(|| TunnelError::TunnelNotFound(user_id.to_string()))?;
            let mut tunnel = slot.lock();

            // Superseded between the index read and the lock: retry on the successor
            if tunnel.state.status != TunnelStatus::Active {
                continue;
            }
            return f(&mut *tunnel);
        }
    }

    /// Encrypt `payload` through the user's tunnel and account for it
    pub fn route_and_encrypt(&self, user_id: &str, payload: &[u8]) -> Result<RoutedPacket> {
        self.with_active(user_id, |tunnel| {
            let now = self.clock.now_ms();
            let hop_timings = self.schedule(&tunnel.state.route, now);
            let total_latency_ms = hop_timings
                .last()
                .map(|t| t.exit_ms - now as f64)
                .unwrap_or(0.0);

            let envelope = encrypt_layered(&tunnel.state.route, &tunnel.secret, payload)?;
            let size = envelope.serialized_len()? as u64;

            tunnel.state.bytes_transferred += size;
            tunnel.state.packets_transferred += 1;
            tunnel.state.last_activity_ms = now;

            debug!(
                "Encrypted {} bytes into {} byte envelope via {} ({} layers)",
                payload.len(),
                size,
                tunnel.state.tunnel_id,
                tunnel.state.route.len()
            );

            Ok(RoutedPacket {
                tunnel_id: tunnel.state.tunnel_id.clone(),
                envelope,
                route: tunnel.state.route.clone(),
                virtual_ip: tunnel.state.virtual_ip.clone(),
                hop_timings,
                total_latency_ms,
                timestamp_ms: now,
            })
        })
    }

    /// Peel an envelope with the user's current route and secret
    pub fn decrypt_for_user(&self, user_id: &str, envelope: &LayerEnvelope) -> Result<Vec<u8>> {
        self.with_active(user_id, |tunnel| {
            match decrypt_layered(&tunnel.state.route, &tunnel.secret, envelope) {
                Ok(plaintext) => {
                    tunnel.state.last_activity_ms = self.clock.now_ms();
                    debug!(
                        "Decrypted {} bytes via {}",
                        plaintext.len(),
                        tunnel.state.tunnel_id
                    );
                    Ok(plaintext)
                }
                Err(e) => {
                    warn!("Decryption failed on {}: {}", tunnel.state.tunnel_id, e);
                    Err(e)
                }
            }
        })
    }

    pub fn get_tunnel(&self, user_id: &str) -> Option<TunnelSnapshot> {
        self.slot(user_id).map(|slot| slot.lock().state.clone())
    }

    /// Look up a tunnel by the connection that owns it. Does not count as activity.
    pub fn get_tunnel_by_connection(&self, connection_id: &str) -> Option<TunnelSnapshot> {
        let slot = {
            let indices = self.indices.read();
            let user_id = indices.by_connection.get(connection_id)?;
            indices.by_user.get(user_id).cloned()
        }?;
        let snapshot = slot.lock().state.clone();
        Some(snapshot)
    }

    pub fn find_by_tunnel_id(&self, tunnel_id: &str) -> Option<TunnelSnapshot> {
        self.list_tunnels()
            .into_iter()
            .find(|t| t.tunnel_id == tunnel_id)
    }

    /// The user's master secret, for offline decryption in simulations and tests
    pub fn secret_for(&self, user_id: &str) -> Option<MasterSecret> {
        self.slot(user_id).map(|slot| slot.lock().secret.clone())
    }

    pub fn list_tunnels(&self) -> Vec<TunnelSnapshot> {
        let slots: Vec<TunnelSlot> = self.indices.read().by_user.values().cloned().collect();
        slots.iter().map(|slot| slot.lock().state.clone()).collect()
    }

    pub fn tunnel_count(&self) -> usize {
        self.indices.read().by_user.len()
    }

    /// Advisory health check; never closes the tunnel
    pub fn check_health(&self, user_id: &str) -> HealthReport {
        let Some(tunnel) = self.get_tunnel(user_id) else {
            return HealthReport::not_found();
        };

        let now = self.clock.now_ms();
        let idle = tunnel.idle_ms(now);

        if idle > self.config.idle_timeout_ms {
            return HealthReport::idle(idle);
        }

        HealthReport::healthy(tunnel.uptime_ms(now), idle)
    }

    pub fn aggregate_stats(&self) -> TunnelStats {
        let tunnels = self.list_tunnels();
        let now = self.clock.now_ms();

        let average_uptime_ms = if tunnels.is_empty() {
            0.0
        } else {
            tunnels.iter().map(|t| t.uptime_ms(now) as f64).sum::<f64>() / tunnels.len() as f64
        };

        TunnelStats {
            active_tunnel_count: tunnels.len(),
            total_bytes: tunnels.iter().map(|t| t.bytes_transferred).sum(),
            total_packets: tunnels.iter().map(|t| t.packets_transferred).sum(),
            average_uptime_ms,
            relay_count: self.catalog().len(),
        }
    }
}
