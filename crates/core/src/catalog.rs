//! Static registry of simulated relay endpoints
//!
//! Populated once at process start and read-only afterwards. Route selection
//! draws from it; the statistics report its size.

use std::collections::HashSet;

use crate::{Relay, Result, TunnelError, MAX_HOPS};

/// Read-only list of relays available for routes
#[derive(Debug, Clone)]
pub struct RelayCatalog {
    relays: Vec<Relay>,
}

impl RelayCatalog {
    /// Build a catalog from a custom relay list.
    ///
    /// Rejects an empty list and duplicate relay identities.
    pub fn new(relays: Vec<Relay>) -> Result<Self> {
        if relays.is_empty() {
            return Err(TunnelError::InvalidCatalog("no relays configured".to_string()));
        }

        let mut seen = HashSet::new();
        for relay in &relays {
            if !seen.insert(relay.id.as_str()) {
                return Err(TunnelError::InvalidCatalog(format!(
                    "duplicate relay id {}",
                    relay.id
                )));
            }
        }

        Ok(Self { relays })
    }

    /// Check that routes of up to `max_hops` can be drawn without repeats
    pub fn validate_for(&self, max_hops: usize) -> Result<()> {
        if self.relays.len() < max_hops {
            return Err(TunnelError::InsufficientRelays {
                required: max_hops,
                available: self.relays.len(),
            });
        }
        Ok(())
    }

    pub fn list_relays(&self) -> &[Relay] {
        &self.relays
    }

    pub fn get(&self, id: &str) -> Option<&Relay> {
        self.relays.iter().find(|r| r.id == id)
    }

    pub fn len(&self) -> usize {
        self.relays.len()
    }

    pub fn is_empty(&self) -> bool {
        self.relays.is_empty()
    }
}

impl Default for RelayCatalog {
    fn default() -> Self {
        Self {
            relays: default_relays(),
        }
    }
}

/// The built-in simulated relay locations
pub fn default_relays() -> Vec<Relay> {
    vec![
        Relay::new("vpn-us-east", "US East", "Virginia", "10.0.1.1", 20),
        Relay::new("vpn-us-west", "US West", "California", "10.0.2.1", 35),
        Relay::new("vpn-eu-west", "EU West", "Ireland", "10.0.3.1", 80),
        Relay::new("vpn-eu-central", "EU Central", "Frankfurt", "10.0.4.1", 90),
        Relay::new("vpn-asia-east", "Asia East", "Tokyo", "10.0.5.1", 150),
        Relay::new("vpn-asia-south", "Asia South", "Singapore", "10.0.6.1", 180),
        Relay::new("vpn-middle-east", "Middle East", "Dubai", "10.0.7.1", 120),
        Relay::new("vpn-australia", "Australia", "Sydney", "10.0.8.1", 200),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_catalog_supports_max_hops() {
        let catalog = RelayCatalog::default();
        assert_eq!(catalog.len(), 8);
        assert!(catalog.validate_for(MAX_HOPS).is_ok());
    }

    #[test]
    fn test_default_catalog_ids_are_distinct() {
        let catalog = RelayCatalog::default();
        let relays = catalog.list_relays().to_vec();
        assert!(RelayCatalog::new(relays).is_ok());
    }

    #[test]
    fn test_get_relay() {
        let catalog = RelayCatalog::default();
        let relay = catalog.get("vpn-eu-central").unwrap();
        assert_eq!(relay.location, "Frankfurt");
        assert_eq!(relay.latency_ms, 90);
        assert!(catalog.get("vpn-mars").is_none());
    }

    #[test]
    fn test_duplicate_ids_rejected() {
        let relays = vec![
            Relay::new("a", "A", "X", "10.0.0.1", 1),
            Relay::new("a", "A2", "Y", "10.0.0.2", 2),
        ];
        let result = RelayCatalog::new(relays);
        assert!(matches!(result, Err(TunnelError::InvalidCatalog(_))));
    }

    #[test]
    fn test_empty_catalog_rejected() {
        assert!(matches!(
            RelayCatalog::new(vec![]),
            Err(TunnelError::InvalidCatalog(_))
        ));
    }

    #[test]
    fn test_small_catalog_fails_validation() {
        let relays = vec![
            Relay::new("a", "A", "X", "10.0.0.1", 1),
            Relay::new("b", "B", "Y", "10.0.0.2", 2),
            Relay::new("c", "C", "Z", "10.0.0.3", 3),
        ];
        let catalog = RelayCatalog::new(relays).unwrap();

        assert!(catalog.validate_for(3).is_ok());
        assert_eq!(
            catalog.validate_for(4),
            Err(TunnelError::InsufficientRelays {
                required: 4,
                available: 3
            })
        );
    }
}
