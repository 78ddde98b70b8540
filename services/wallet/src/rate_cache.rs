//! Exchange-rate cache with a shared TTL
//!
//! The snapshot (rate map plus one "last refreshed" instant) is replaced as
//! a unit on refresh, so readers never see a mix of old and new entries.
//! Lookups are served only while the snapshot is within its TTL.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use rustc_hash::FxHashMap;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::money::Currency;
use crate::rates::{CurrencyPair, ExchangeRate};

#[derive(Debug, Default)]
struct Snapshot {
    rates: FxHashMap<CurrencyPair, f64>,
    refreshed_at: Option<Instant>,
}

impl Snapshot {
    fn is_fresh(&self, ttl: Duration) -> bool {
        self.refreshed_at
            .is_some_and(|at| Instant::now().saturating_duration_since(at) <= ttl)
    }
}

/// TTL-bounded snapshot of exchange rates
#[derive(Debug, Clone)]
pub struct RateCache {
    snapshot: Arc<RwLock<Arc<Snapshot>>>,
    ttl: Duration,
}

impl RateCache {
    /// Create an empty cache whose snapshots live for `ttl`
    #[must_use]
    pub fn new(ttl: Duration) -> Self {
        Self {
            snapshot: Arc::new(RwLock::new(Arc::new(Snapshot::default()))),
            ttl,
        }
    }

    /// Configured TTL
    #[must_use]
    pub const fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Replace the whole snapshot and restart its TTL
    pub fn refresh<I>(&self, rates: I)
    where
        I: IntoIterator<Item = ExchangeRate>,
    {
        let mut map = FxHashMap::default();
        for rate in rates {
            if rate.is_usable() {
                map.insert(rate.pair, rate.rate);
            } else {
                warn!("Ignoring unusable rate {} = {}", rate.pair, rate.rate);
            }
        }

        let next = Arc::new(Snapshot {
            rates: map,
            refreshed_at: Some(Instant::now()),
        });
        let count = next.rates.len();
        *self.snapshot.write() = next;
        debug!("Rate cache refreshed with {} entries", count);
    }

    fn current(&self) -> Arc<Snapshot> {
        Arc::clone(&*self.snapshot.read())
    }

    /// Rate for `from -> to`.
    ///
    /// Tries the exact pair, then the reversed pair's reciprocal. Returns
    /// `None` when the snapshot is stale, whether or not the key exists.
    #[must_use]
    pub fn get_rate(&self, from: Currency, to: Currency) -> Option<f64> {
        let snapshot = self.current();
        if !snapshot.is_fresh(self.ttl) {
            return None;
        }

        let pair = CurrencyPair::new(from, to);
        if let Some(rate) = snapshot.rates.get(&pair) {
            return Some(*rate);
        }
        snapshot.rates.get(&pair.reversed()).map(|rate| 1.0 / rate)
    }

    /// Every cached rate, sorted by pair; `None` when empty or stale
    #[must_use]
    pub fn get_all(&self) -> Option<Vec<ExchangeRate>> {
        let snapshot = self.current();
        if snapshot.rates.is_empty() || !snapshot.is_fresh(self.ttl) {
            return None;
        }

        let mut rates: Vec<ExchangeRate> = snapshot
            .rates
            .iter()
            .map(|(pair, rate)| ExchangeRate {
                pair: *pair,
                rate: *rate,
            })
            .collect();
        rates.sort_by_key(|r| r.pair);
        Some(rates)
    }

    /// Snapshot is within its TTL
    #[must_use]
    pub fn is_fresh(&self) -> bool {
        self.current().is_fresh(self.ttl)
    }
}
