//! Multi-threaded registry tests
//!
//! Many threads hammer one registry; afterwards the indices and counters
//! must still add up.

use std::sync::Arc;

use tokio::sync::broadcast::error::TryRecvError;

use hoplink_core::{RelayCatalog, TunnelError, TunnelEvent};
use hoplink_tunnel::{RegistryConfig, TunnelRegistry};

fn registry() -> Arc<TunnelRegistry> {
    Arc::new(TunnelRegistry::new(RelayCatalog::default(), RegistryConfig::default()).unwrap())
}

#[test]
fn test_parallel_users_do_not_interfere() {
    let registry = registry();
    let users = 16;
    let packets = 50u64;

    std::thread::scope(|s| {
        for u in 0..users {
            let registry = registry.clone();
            s.spawn(move || {
                let user = format!("user-{}", u);
                registry.create_tunnel(&user, &format!("conn-{}", u)).unwrap();
                for p in 0..packets {
                    let payload = format!("{}:{}", user, p);
                    let packet = registry.route_and_encrypt(&user, payload.as_bytes()).unwrap();
                    let back = registry.decrypt_for_user(&user, &packet.envelope).unwrap();
                    assert_eq!(back, payload.as_bytes());
                }
            });
        }
    });

    let stats = registry.aggregate_stats();
    assert_eq!(stats.active_tunnel_count, users);
    assert_eq!(stats.total_packets, users as u64 * packets);
    for tunnel in registry.list_tunnels() {
        assert_eq!(tunnel.packets_transferred, packets);
    }
}

#[test]
fn test_concurrent_creates_for_same_user() {
    let registry = registry();

    std::thread::scope(|s| {
        for t in 0..8 {
            let registry = registry.clone();
            s.spawn(move || {
                for i in 0..20 {
                    registry.create_tunnel("shared", &format!("conn-{}-{}", t, i)).unwrap();
                }
            });
        }
    });

    assert_eq!(registry.tunnel_count(), 1);
    let tunnel = registry.get_tunnel("shared").unwrap();
    assert_eq!(
        registry
            .get_tunnel_by_connection(&tunnel.connection_id)
            .unwrap()
            .tunnel_id,
        tunnel.tunnel_id
    );

    // No stale connection still resolves
    let stale = (0..8)
        .flat_map(|t| (0..20).map(move |i| format!("conn-{}-{}", t, i)))
        .filter(|c| c != &tunnel.connection_id)
        .filter(|c| registry.get_tunnel_by_connection(c).is_some())
        .count();
    assert_eq!(stale, 0);
}

#[test]
fn test_encrypt_races_close() {
    let registry = registry();
    registry.create_tunnel("racer", "conn-r").unwrap();

    std::thread::scope(|s| {
        let sender = registry.clone();
        s.spawn(move || {
            for _ in 0..200 {
                match sender.route_and_encrypt("racer", b"payload") {
                    Ok(_) | Err(TunnelError::TunnelNotFound(_)) => {}
                    Err(e) => panic!("unexpected error: {}", e),
                }
            }
        });

        let closer = registry.clone();
        s.spawn(move || {
            for i in 0..50 {
                closer.close_tunnel("racer");
                closer.create_tunnel("racer", &format!("conn-r{}", i)).unwrap();
            }
        });
    });

    assert_eq!(registry.tunnel_count(), 1);
}

#[test]
fn test_refresh_races_encrypt() {
    let registry = registry();
    registry.create_tunnel("mover", "conn-m").unwrap();

    std::thread::scope(|s| {
        let sender = registry.clone();
        s.spawn(move || {
            for _ in 0..200 {
                sender.route_and_encrypt("mover", b"x").unwrap();
            }
        });

        let refresher = registry.clone();
        s.spawn(move || {
            for _ in 0..50 {
                refresher.refresh_tunnel("mover").unwrap();
            }
        });
    });

    // Refresh keeps the connection binding throughout
    let tunnel = registry.get_tunnel_by_connection("conn-m").unwrap();
    assert_eq!(tunnel.user_id, "mover");
}

#[test]
fn test_events_follow_commit_order_under_contention() {
    let threads = 8;
    let rounds = 25;
    let config = RegistryConfig {
        event_capacity: 4096,
        ..RegistryConfig::default()
    };
    let registry = Arc::new(TunnelRegistry::new(RelayCatalog::default(), config).unwrap());
    let mut events = registry.subscribe();

    std::thread::scope(|s| {
        for t in 0..threads {
            let registry = registry.clone();
            s.spawn(move || {
                for i in 0..rounds {
                    registry.create_tunnel("shared", &format!("conn-{}-{}", t, i)).unwrap();
                }
            });
        }
    });

    // Replaying the stream must never see two live tunnels or close a stale one
    let mut live: Option<String> = None;
    let mut created = 0;
    loop {
        match events.try_recv() {
            Ok(TunnelEvent::Created { tunnel_id, .. }) => {
                assert!(live.is_none(), "created {} while {:?} still live", tunnel_id, live);
                live = Some(tunnel_id);
                created += 1;
            }
            Ok(TunnelEvent::Closed { tunnel_id, .. }) => {
                assert_eq!(live.take().as_deref(), Some(tunnel_id.as_str()));
            }
            Ok(other) => panic!("unexpected event: {:?}", other),
            Err(TryRecvError::Empty) => break,
            Err(e) => panic!("event stream broken: {}", e),
        }
    }

    assert_eq!(created, threads * rounds);
    assert_eq!(live, Some(registry.get_tunnel("shared").unwrap().tunnel_id));
}
