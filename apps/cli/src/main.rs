//! HopLink CLI
//!
//! Command-line front end for the simulated onion tunnel service.

use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use serde_json::json;
use tokio::sync::broadcast::error::RecvError;
use tracing::{info, warn};

use hoplink_core::TunnelEvent;
use hoplink_daemon::{format_bytes, DaemonError, TunnelService};
use hoplink_settings::{default_settings_path, Settings};

/// HopLink - simulated multi-hop onion VPN tunnels
#[derive(Parser)]
#[command(name = "hoplink")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Settings file (defaults to $HOPLINK_CONFIG or ./hoplink.json)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List the relay catalog
    Relays,

    /// Create tunnels, push messages through them and report
    Simulate {
        /// Number of simulated users
        #[arg(short, long, default_value = "3")]
        users: usize,

        /// Messages sent per user
        #[arg(short, long, default_value = "5")]
        messages: usize,

        /// Seed for reproducible routes and jitter
        #[arg(short, long)]
        seed: Option<u64>,
    },

    /// Write a default settings file
    InitConfig {
        /// Target path (defaults to the settings path)
        #[arg(short, long)]
        path: Option<PathBuf>,

        /// Overwrite an existing file
        #[arg(short, long)]
        force: bool,
    },
}

#[derive(Debug, Default)]
struct EventTally {
    created: usize,
    refreshed: usize,
    closed: usize,
    dropped: u64,
}

/// Buffer enough events for a whole run: one create and one close per user plus the refresh
fn event_capacity_for(users: usize, configured: usize) -> usize {
    configured.max(users.saturating_mul(2).saturating_add(2))
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let settings = match &cli.config {
        Some(path) => Settings::load_from(path),
        None => Settings::load_or_default(),
    }
    .context("loading settings")?;

    let filter = if cli.verbose {
        "debug".to_string()
    } else {
        settings.logging.filter.clone()
    };
    hoplink_logging::init_logging(&filter);

    match cli.command {
        Commands::Relays => {
            list_relays(&settings)?;
        }
        Commands::Simulate {
            users,
            messages,
            seed,
        } => {
            simulate(&settings, users, messages, seed).await?;
        }
        Commands::InitConfig { path, force } => {
            init_config(path.or(cli.config), force)?;
        }
    }

    Ok(())
}

fn list_relays(settings: &Settings) -> Result<()> {
    let catalog = settings.catalog().context("building relay catalog")?;

    println!("HopLink Relays");
    println!("==============");
    for relay in catalog.list_relays() {
        println!(
            "{:<16} {:<14} {:<12} {:<16} {:>4} ms",
            relay.id, relay.name, relay.location, relay.address, relay.latency_ms
        );
    }
    println!("{} relays", catalog.len());

    Ok(())
}

fn init_config(path: Option<PathBuf>, force: bool) -> Result<()> {
    let path = path.unwrap_or_else(default_settings_path);
    if path.exists() && !force {
        bail!("{} already exists (use --force to overwrite)", path.display());
    }

    Settings::default()
        .save_to(&path)
        .with_context(|| format!("writing {}", path.display()))?;

    println!("Wrote default settings to {}", path.display());
    Ok(())
}

async fn simulate(settings: &Settings, users: usize, messages: usize, seed: Option<u64>) -> Result<()> {
    if users == 0 {
        bail!("--users must be at least 1");
    }

    let mut settings = settings.clone();
    settings.tunnel.event_capacity = event_capacity_for(users, settings.tunnel.event_capacity);

    let service = match seed {
        Some(seed) => TunnelService::from_settings_seeded(&settings, seed),
        None => TunnelService::from_settings(&settings),
    }
    .context("starting tunnel service")?;

    // Tally lifecycle events until the registry goes away
    let mut events = service.subscribe();
    let collector = tokio::spawn(async move {
        let mut tally = EventTally::default();
        loop {
            match events.recv().await {
                Ok(TunnelEvent::Created { .. }) => tally.created += 1,
                Ok(TunnelEvent::Refreshed { .. }) => tally.refreshed += 1,
                Ok(TunnelEvent::Closed { .. }) => tally.closed += 1,
                Err(RecvError::Lagged(skipped)) => {
                    warn!("Event listener lagged by {}", skipped);
                    tally.dropped += skipped;
                }
                Err(RecvError::Closed) => break,
            }
        }
        tally
    });

    info!("Simulating {} users x {} messages", users, messages);

    for u in 0..users {
        let user = format!("user-{}", u);
        let created = service.create_tunnel(&user, &format!("conn-{}", u))?;
        let route: Vec<String> = created.route.iter().map(|h| h.name.clone()).collect();
        println!(
            "{} -> {} via {} [{}]",
            user,
            created.tunnel_id,
            created.virtual_ip,
            route.join(" → ")
        );
    }

    let mut latency_total = 0.0;
    let mut sent = 0usize;
    let mut last_envelope = None;

    for u in 0..users {
        let user = format!("user-{}", u);
        for m in 0..messages {
            let payload = json!({ "user": user, "seq": m, "text": format!("message {} from {}", m, user) });
            let packet = service.route_and_encrypt(&user, &payload)?;
            let echoed: serde_json::Value = service.decrypt_payload(&user, &packet.envelope)?;
            if echoed != payload {
                bail!("payload mismatch for {} message {}", user, m);
            }

            latency_total += packet.total_latency_ms;
            sent += 1;
            if u == 0 {
                last_envelope = Some(packet.envelope);
            }
        }
    }

    // After a refresh the old keys are gone, so old envelopes must not open
    let refreshed = service.refresh_tunnel("user-0")?;
    println!("user-0 refreshed -> {}", refreshed.tunnel_id);
    if let Some(envelope) = last_envelope {
        match service.decrypt_payload::<serde_json::Value>("user-0", &envelope) {
            Err(DaemonError::Tunnel(e)) => println!("Old envelope rejected: {}", e),
            Err(e) => return Err(e.into()),
            Ok(_) => bail!("old envelope decrypted after refresh"),
        }
    }

    let stats = service.aggregate_stats();
    println!();
    println!("HopLink Simulation");
    println!("==================");
    println!("Active tunnels: {}", stats.active_tunnel_count);
    println!("Relays: {}", stats.relay_count);
    println!("Packets: {}", stats.total_packets);
    println!("Transferred: {}", format_bytes(stats.total_bytes));
    if sent > 0 {
        println!("Mean simulated latency: {:.1} ms", latency_total / sent as f64);
    }

    for tunnel in service.list_active_tunnels() {
        let health = service.check_health(&tunnel.user_id);
        println!(
            "  {:<8} {} {:>10} {}",
            tunnel.user_id,
            tunnel.virtual_ip,
            format_bytes(tunnel.bytes_transferred),
            if health.healthy { "healthy" } else { "unhealthy" }
        );
    }

    for u in 0..users {
        service.on_disconnect(&format!("conn-{}", u));
    }

    drop(service);
    let tally = collector.await.context("event listener")?;
    println!(
        "Events: {} created, {} refreshed, {} closed",
        tally.created, tally.refreshed, tally.closed
    );
    if tally.dropped > 0 {
        println!("  (approximate, {} events dropped)", tally.dropped);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_capacity_covers_run() {
        assert_eq!(event_capacity_for(3, 64), 64);
        assert_eq!(event_capacity_for(100, 64), 202);
        assert_eq!(event_capacity_for(0, 0), 2);
        assert_eq!(event_capacity_for(usize::MAX, 64), usize::MAX);
    }

    #[tokio::test]
    async fn test_large_run_keeps_every_event() {
        let users = 100;
        let mut settings = Settings::default();
        settings.tunnel.event_capacity = event_capacity_for(users, settings.tunnel.event_capacity);

        let service = TunnelService::from_settings_seeded(&settings, 5).unwrap();
        let mut events = service.subscribe();
        for u in 0..users {
            service.create_tunnel(&format!("user-{}", u), &format!("conn-{}", u)).unwrap();
        }
        service.refresh_tunnel("user-0").unwrap();
        for u in 0..users {
            service.on_disconnect(&format!("conn-{}", u));
        }
        drop(service);

        let mut received = 0;
        loop {
            match events.recv().await {
                Ok(_) => received += 1,
                Err(RecvError::Lagged(skipped)) => panic!("lost {} events", skipped),
                Err(RecvError::Closed) => break,
            }
        }
        assert_eq!(received, 2 * users + 1);
    }
}
