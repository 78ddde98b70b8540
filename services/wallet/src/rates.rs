//! Rate source port and adapters
//!
//! The wallet consumes exchange rates from an external source. Adapters:
//! - [`StaticRateSource`]: fixed table, typically loaded from configuration
//! - [`PgRateSource`]: the `exchange_rates` table maintained by the exchanger

use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sqlx::{PgPool, Row};
use tracing::{debug, warn};

use crate::error::{WalletError, WalletResult};
use crate::money::Currency;

/// Ordered currency pair
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct CurrencyPair {
    /// Currency being sold
    pub from: Currency,
    /// Currency being bought
    pub to: Currency,
}

impl CurrencyPair {
    /// Create a pair
    #[must_use]
    pub const fn new(from: Currency, to: Currency) -> Self {
        Self { from, to }
    }

    /// Same pair, opposite direction
    #[must_use]
    pub const fn reversed(self) -> Self {
        Self {
            from: self.to,
            to: self.from,
        }
    }
}

impl fmt::Display for CurrencyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}->{}", self.from, self.to)
    }
}

/// Units of `to` per unit of `from`
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ExchangeRate {
    /// Quoted pair
    pub pair: CurrencyPair,
    /// Rate value
    pub rate: f64,
}

impl ExchangeRate {
    /// Create a rate entry
    #[must_use]
    pub const fn new(from: Currency, to: Currency, rate: f64) -> Self {
        Self {
            pair: CurrencyPair::new(from, to),
            rate,
        }
    }

    /// Usable as a cache entry: distinct currencies and a finite positive rate
    #[must_use]
    pub fn is_usable(&self) -> bool {
        self.pair.from != self.pair.to && self.rate.is_finite() && self.rate > 0.0
    }
}

/// External source of exchange rates
#[async_trait]
pub trait RateSource: Send + Sync {
    /// Rate for a single pair; `Ok(None)` when the source has no quote
    async fn get_rate(&self, from: Currency, to: Currency) -> WalletResult<Option<f64>>;

    /// Full rate table
    async fn get_all_rates(&self) -> WalletResult<Vec<ExchangeRate>>;
}

/// Rate source backed by a fixed table
#[derive(Debug, Clone, Default)]
pub struct StaticRateSource {
    rates: Vec<ExchangeRate>,
}

impl StaticRateSource {
    /// Create from a list of rates
    #[must_use]
    pub const fn new(rates: Vec<ExchangeRate>) -> Self {
        Self { rates }
    }
}

#[async_trait]
impl RateSource for StaticRateSource {
    async fn get_rate(&self, from: Currency, to: Currency) -> WalletResult<Option<f64>> {
        let pair = CurrencyPair::new(from, to);
        Ok(self.rates.iter().find(|r| r.pair == pair).map(|r| r.rate))
    }

    async fn get_all_rates(&self) -> WalletResult<Vec<ExchangeRate>> {
        Ok(self.rates.clone())
    }
}

/// Rate source reading the exchanger's `exchange_rates` table
#[derive(Debug, Clone)]
pub struct PgRateSource {
    pool: PgPool,
}

impl PgRateSource {
    /// Create over an existing pool
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn upstream(err: sqlx::Error) -> WalletError {
    WalletError::upstream(err.to_string())
}

#[async_trait]
impl RateSource for PgRateSource {
    async fn get_rate(&self, from: Currency, to: Currency) -> WalletResult<Option<f64>> {
        let row = sqlx::query(
            r"
            SELECT rate::DOUBLE PRECISION AS rate
            FROM exchange_rates
            WHERE from_currency = $1 AND to_currency = $2
            ",
        )
        .bind(from.symbol())
        .bind(to.symbol())
        .fetch_optional(&self.pool)
        .await
        .map_err(upstream)?;

        Ok(row.map(|r| r.get::<f64, _>("rate")))
    }

    async fn get_all_rates(&self) -> WalletResult<Vec<ExchangeRate>> {
        let rows = sqlx::query(
            r"
            SELECT from_currency, to_currency, rate::DOUBLE PRECISION AS rate
            FROM exchange_rates
            ORDER BY from_currency, to_currency
            ",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(upstream)?;

        let mut rates = Vec::with_capacity(rows.len());
        for row in rows {
            let from: String = row.get("from_currency");
            let to: String = row.get("to_currency");
            match (from.parse::<Currency>(), to.parse::<Currency>()) {
                (Ok(from), Ok(to)) => rates.push(ExchangeRate::new(from, to, row.get("rate"))),
                _ => warn!("Skipping rate row for unsupported pair {}->{}", from, to),
            }
        }

        debug!("Loaded {} exchange rates from upstream", rates.len());
        Ok(rates)
    }
}
