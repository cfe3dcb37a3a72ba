//! Route selection for new tunnels
//!
//! Draws a random number of distinct relays from the catalog. The random
//! source is passed in by the caller so routes are reproducible under a
//! seeded RNG.

use std::sync::Arc;

use rand::seq::SliceRandom;
use rand::Rng;

use hoplink_core::{Relay, RelayCatalog, Result, Route, TunnelError, MAX_HOPS, MIN_HOPS};

/// Picks routes of `min_hops..=max_hops` distinct relays
#[derive(Debug, Clone)]
pub struct RouteSelector {
    catalog: Arc<RelayCatalog>,
    min_hops: usize,
    max_hops: usize,
}

impl RouteSelector {
    /// Selector drawing 2 to 4 hops
    pub fn new(catalog: Arc<RelayCatalog>) -> Self {
        Self {
            catalog,
            min_hops: MIN_HOPS,
            max_hops: MAX_HOPS,
        }
    }

    /// Selector with a custom hop range inside 2..=4
    pub fn with_hop_range(catalog: Arc<RelayCatalog>, min_hops: usize, max_hops: usize) -> Result<Self> {
        if min_hops < MIN_HOPS {
            return Err(TunnelError::InvalidRoute(min_hops));
        }
        if max_hops < min_hops || max_hops > MAX_HOPS {
            return Err(TunnelError::InvalidRoute(max_hops));
        }
        Ok(Self {
            catalog,
            min_hops,
            max_hops,
        })
    }

    pub fn catalog(&self) -> &RelayCatalog {
        &self.catalog
    }

    pub fn hop_range(&self) -> (usize, usize) {
        (self.min_hops, self.max_hops)
    }

    /// Select a route with a hop count drawn uniformly from the configured range
    pub fn select_route<R: Rng + ?Sized>(&self, rng: &mut R) -> Result<Route> {
        let hop_count = rng.gen_range(self.min_hops..=self.max_hops);
        self.select_route_with_hops(hop_count, rng)
    }

    /// Select `hop_count` distinct relays in random order
    pub fn select_route_with_hops<R: Rng + ?Sized>(&self, hop_count: usize, rng: &mut R) -> Result<Route> {
        if !(MIN_HOPS..=MAX_HOPS).contains(&hop_count) {
            return Err(TunnelError::InvalidRoute(hop_count));
        }

        let relays = self.catalog.list_relays();
        if relays.len() < hop_count {
            return Err(TunnelError::InsufficientRelays {
                required: hop_count,
                available: relays.len(),
            });
        }

        let mut candidates: Vec<&Relay> = relays.iter().collect();
        candidates.shuffle(rng);

        Ok(Route::from_relays(
            candidates.into_iter().take(hop_count).cloned().collect(),
        ))
    }
}
