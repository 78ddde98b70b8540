//! Wallet orchestrator
//!
//! Composes the admission gate, balance store, rate cache, rate source and
//! event sink into the operations exposed to the transport layer.
//!
//! Mutating operations hold one gate permit for their whole duration. The
//! permit is released before any event is published, and on every error
//! path by drop. Read-only operations never touch the gate.

use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use crate::config::WalletConfig;
use crate::error::{WalletError, WalletResult};
use crate::events::{EventKind, EventSink, WalletEvent};
use crate::gate::AdmissionGate;
use crate::money::{self, Currency, MinorUnits};
use crate::rate_cache::RateCache;
use crate::rates::{CurrencyPair, ExchangeRate, RateSource};
use crate::store::BalanceStore;
use crate::wallet::Wallet;

/// Result of a committed exchange
#[derive(Debug, Clone, PartialEq)]
pub struct ExchangeOutcome {
    /// Wallet state after the exchange
    pub wallet: Wallet,
    /// Rate applied, units of `to` per unit of `from`
    pub rate: f64,
    /// Amount taken from the source currency
    pub debited: MinorUnits,
    /// Amount credited to the target currency
    pub credited: MinorUnits,
}

/// Wallet balance orchestrator
#[derive(Clone)]
pub struct WalletService {
    store: Arc<dyn BalanceStore>,
    rates: Arc<dyn RateSource>,
    events: Arc<dyn EventSink>,
    cache: RateCache,
    /// Serializes refreshes so concurrent misses share one source fetch
    refresh_lock: Arc<Mutex<()>>,
    gate: AdmissionGate,
    notify_threshold: f64,
}

impl std::fmt::Debug for WalletService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WalletService")
            .field("cache", &self.cache)
            .field("gate", &self.gate)
            .field("notify_threshold", &self.notify_threshold)
            .finish_non_exhaustive()
    }
}

impl WalletService {
    /// Default notification threshold in major units
    pub const DEFAULT_NOTIFY_THRESHOLD: f64 = 30_000.0;

    /// Assemble a service from its collaborators
    pub fn new(
        store: Arc<dyn BalanceStore>,
        rates: Arc<dyn RateSource>,
        events: Arc<dyn EventSink>,
        cache: RateCache,
        gate: AdmissionGate,
    ) -> Self {
        Self {
            store,
            rates,
            events,
            cache,
            refresh_lock: Arc::new(Mutex::new(())),
            gate,
            notify_threshold: Self::DEFAULT_NOTIFY_THRESHOLD,
        }
    }

    /// Assemble a service with gate, cache and threshold taken from `config`
    pub fn from_config(
        config: &WalletConfig,
        store: Arc<dyn BalanceStore>,
        rates: Arc<dyn RateSource>,
        events: Arc<dyn EventSink>,
    ) -> Self {
        Self::new(
            store,
            rates,
            events,
            config.rate_cache(),
            config.admission_gate(),
        )
        .with_notify_threshold(config.events.notify_threshold)
    }

    /// Publish events only for amounts of at least `threshold` major units
    #[must_use]
    pub const fn with_notify_threshold(mut self, threshold: f64) -> Self {
        self.notify_threshold = threshold;
        self
    }

    /// Admission gate shared by mutating operations
    #[must_use]
    pub const fn gate(&self) -> &AdmissionGate {
        &self.gate
    }

    /// Rate cache
    #[must_use]
    pub const fn rate_cache(&self) -> &RateCache {
        &self.cache
    }

    /// Create the wallet for a newly registered user, all balances zero
    #[instrument(skip(self))]
    pub async fn create_wallet(&self, user_id: Uuid) -> WalletResult<Wallet> {
        let wallet = Wallet::new(user_id);
        self.store.create_wallet(&wallet).await?;
        info!("Created wallet {} for user {}", wallet.id, user_id);
        Ok(wallet)
    }

    /// Current wallet state for a user
    #[instrument(skip(self))]
    pub async fn get_wallet(&self, user_id: Uuid) -> WalletResult<Wallet> {
        self.store.get_wallet(user_id).await
    }

    /// Credit `amount` of `currency` to the user's wallet
    #[instrument(skip(self))]
    pub async fn deposit(&self, user_id: Uuid, currency: &str, amount: f64) -> WalletResult<Wallet> {
        let units = money::to_minor_units(amount)?;
        let currency: Currency = currency.parse()?;

        let permit = self.gate.acquire().await?;
        let wallet = self.store.get_wallet(user_id).await?;
        let wallet = self
            .store
            .deposit(wallet.id, currency, units)
            .await
            .inspect_err(|e| log_mutation_failure("deposit", e))?;
        drop(permit);

        debug!("Deposited {} {} to wallet {}", units, currency, wallet.id);
        self.notify(EventKind::Deposit, &wallet, amount, currency.symbol())
            .await;
        Ok(wallet)
    }

    /// Debit `amount` of `currency` from the user's wallet
    #[instrument(skip(self))]
    pub async fn withdraw(&self, user_id: Uuid, currency: &str, amount: f64) -> WalletResult<Wallet> {
        let units = money::to_minor_units(amount)?;
        let currency: Currency = currency.parse()?;

        let permit = self.gate.acquire().await?;
        let wallet = self.store.get_wallet(user_id).await?;
        let wallet = self
            .store
            .withdraw(wallet.id, currency, units)
            .await
            .inspect_err(|e| log_mutation_failure("withdraw", e))?;
        drop(permit);

        debug!("Withdrew {} {} from wallet {}", units, currency, wallet.id);
        self.notify(EventKind::Withdraw, &wallet, amount, currency.symbol())
            .await;
        Ok(wallet)
    }

    /// Convert `amount` of `from` into `to` at the current rate
    #[instrument(skip(self))]
    pub async fn exchange(
        &self,
        user_id: Uuid,
        from: &str,
        to: &str,
        amount: f64,
    ) -> WalletResult<ExchangeOutcome> {
        let debit = money::to_minor_units(amount)?;
        let from: Currency = from.parse()?;
        let to: Currency = to.parse()?;
        if from == to {
            return Err(WalletError::SameCurrency);
        }

        let permit = self.gate.acquire().await?;

        // Fast-fail only; the locked debit below is authoritative.
        let snapshot = self.store.get_wallet(user_id).await?;
        snapshot.clone().debit(from, debit)?;

        let rate = self.resolve_rate(from, to).await?;
        let credit = money::convert(amount, rate)?;

        let wallet = self
            .store
            .exchange(snapshot.id, from, debit, to, credit)
            .await
            .inspect_err(|e| log_mutation_failure("exchange", e))?;
        drop(permit);

        let pair = CurrencyPair::new(from, to);
        debug!(
            "Exchanged {} {} into {} {} at {} on wallet {}",
            debit, from, credit, to, rate, wallet.id
        );
        self.notify(EventKind::Exchange, &wallet, amount, pair.to_string())
            .await;

        Ok(ExchangeOutcome {
            wallet,
            rate,
            debited: debit,
            credited: credit,
        })
    }

    /// Full rate table, from the cache while fresh, otherwise from the source.
    ///
    /// Both paths return the cache's view: unusable rates dropped, the last
    /// duplicate kept, sorted by pair.
    #[instrument(skip(self))]
    pub async fn get_all_rates(&self) -> WalletResult<Vec<ExchangeRate>> {
        if let Some(rates) = self.cache.get_all() {
            return Ok(rates);
        }

        let _refreshing = self.refresh_lock.lock().await;
        if let Some(rates) = self.cache.get_all() {
            return Ok(rates);
        }

        self.refresh_from_source().await?;
        let rates = self.cache.get_all().unwrap_or_default();
        debug!("Served {} rates after refresh", rates.len());
        Ok(rates)
    }

    /// Rate for one pair: cache, then one refresh and a second lookup
    #[instrument(skip(self))]
    pub async fn get_rate(&self, from: Currency, to: Currency) -> WalletResult<f64> {
        self.resolve_rate(from, to).await
    }

    async fn resolve_rate(&self, from: Currency, to: Currency) -> WalletResult<f64> {
        if let Some(rate) = self.cache.get_rate(from, to) {
            return Ok(rate);
        }

        let _refreshing = self.refresh_lock.lock().await;
        // Another caller may have refreshed while we waited
        if let Some(rate) = self.cache.get_rate(from, to) {
            return Ok(rate);
        }

        debug!("Rate {}->{} not cached, refreshing", from, to);
        self.refresh_from_source().await?;

        self.cache
            .get_rate(from, to)
            .ok_or_else(|| WalletError::RateUnavailable {
                from: from.symbol().to_string(),
                to: to.symbol().to_string(),
            })
    }

    /// Caller must hold `refresh_lock`
    async fn refresh_from_source(&self) -> WalletResult<()> {
        let rates = self.rates.get_all_rates().await?;
        self.cache.refresh(rates);
        Ok(())
    }

    async fn notify(&self, kind: EventKind, wallet: &Wallet, amount: f64, currency: impl Into<String>) {
        if amount < self.notify_threshold {
            return;
        }

        let event = WalletEvent::new(kind, wallet, amount, currency);
        if let Err(e) = self.events.publish(&event.key(), &event).await {
            warn!(
                "Failed to publish {:?} event {} for wallet {}: {}",
                kind, event.event_id, wallet.id, e
            );
        }
    }
}

fn log_mutation_failure(operation: &str, err: &WalletError) {
    if matches!(err, WalletError::Storage(_)) {
        error!("Storage failure during {}: {}", operation, err);
    }
}
