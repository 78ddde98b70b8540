//! Shared fixtures for wallet integration tests
//!
//! Wrappers around the in-memory store and static rate source that count,
//! delay or fail calls so tests can observe the orchestrator's behaviour.

#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Once};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use uuid::Uuid;

use wallet_service::{
    AdmissionGate, BalanceStore, Currency, EventSink, ExchangeRate, MemoryBalanceStore,
    MinorUnits, RateCache, RateSource, StaticRateSource, Wallet, WalletError, WalletEvent,
    WalletResult, WalletService,
};

static INIT: Once = Once::new();

/// Initialize logging for tests
pub fn init_test_logging() {
    INIT.call_once(|| {
        tracing_subscriber::registry()
            .with(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| "wallet_service=debug,warn".into()),
            )
            .with(tracing_subscriber::fmt::layer().with_test_writer())
            .init();
    });
}

/// Default rate cache TTL in tests
pub const TEST_TTL: Duration = Duration::from_secs(60);

/// Memory store that records how many mutating calls overlap
#[derive(Debug, Default)]
pub struct InstrumentedStore {
    inner: MemoryBalanceStore,
    in_flight: AtomicUsize,
    peak: AtomicUsize,
    mutations: AtomicUsize,
    delay: Duration,
}

impl InstrumentedStore {
    pub fn with_delay(delay: Duration) -> Self {
        Self {
            delay,
            ..Self::default()
        }
    }

    /// Highest number of mutating calls observed at once
    pub fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }

    pub fn mutations(&self) -> usize {
        self.mutations.load(Ordering::SeqCst)
    }

    async fn track<T, F>(&self, call: F) -> WalletResult<T>
    where
        F: std::future::Future<Output = WalletResult<T>>,
    {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        self.mutations.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        let result = call.await;
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        result
    }
}

#[async_trait]
impl BalanceStore for InstrumentedStore {
    async fn create_wallet(&self, wallet: &Wallet) -> WalletResult<()> {
        self.inner.create_wallet(wallet).await
    }

    async fn get_wallet(&self, user_id: Uuid) -> WalletResult<Wallet> {
        self.inner.get_wallet(user_id).await
    }

    async fn deposit(
        &self,
        wallet_id: Uuid,
        currency: Currency,
        amount: MinorUnits,
    ) -> WalletResult<Wallet> {
        self.track(self.inner.deposit(wallet_id, currency, amount))
            .await
    }

    async fn withdraw(
        &self,
        wallet_id: Uuid,
        currency: Currency,
        amount: MinorUnits,
    ) -> WalletResult<Wallet> {
        self.track(self.inner.withdraw(wallet_id, currency, amount))
            .await
    }

    async fn exchange(
        &self,
        wallet_id: Uuid,
        from: Currency,
        debit: MinorUnits,
        to: Currency,
        credit: MinorUnits,
    ) -> WalletResult<Wallet> {
        self.track(self.inner.exchange(wallet_id, from, debit, to, credit))
            .await
    }
}

/// Memory store whose mutations can be switched to fail
#[derive(Debug, Default)]
pub struct FaultyStore {
    inner: MemoryBalanceStore,
    fail_mutations: AtomicBool,
}

impl FaultyStore {
    pub fn fail_mutations(&self, fail: bool) {
        self.fail_mutations.store(fail, Ordering::SeqCst);
    }

    fn check(&self) -> WalletResult<()> {
        if self.fail_mutations.load(Ordering::SeqCst) {
            Err(WalletError::storage("could not serialize access"))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl BalanceStore for FaultyStore {
    async fn create_wallet(&self, wallet: &Wallet) -> WalletResult<()> {
        self.inner.create_wallet(wallet).await
    }

    async fn get_wallet(&self, user_id: Uuid) -> WalletResult<Wallet> {
        self.inner.get_wallet(user_id).await
    }

    async fn deposit(
        &self,
        wallet_id: Uuid,
        currency: Currency,
        amount: MinorUnits,
    ) -> WalletResult<Wallet> {
        self.check()?;
        self.inner.deposit(wallet_id, currency, amount).await
    }

    async fn withdraw(
        &self,
        wallet_id: Uuid,
        currency: Currency,
        amount: MinorUnits,
    ) -> WalletResult<Wallet> {
        self.check()?;
        self.inner.withdraw(wallet_id, currency, amount).await
    }

    async fn exchange(
        &self,
        wallet_id: Uuid,
        from: Currency,
        debit: MinorUnits,
        to: Currency,
        credit: MinorUnits,
    ) -> WalletResult<Wallet> {
        self.check()?;
        self.inner
            .exchange(wallet_id, from, debit, to, credit)
            .await
    }
}

/// Static rate source that counts full-table fetches
#[derive(Debug, Default)]
pub struct CountingRateSource {
    inner: StaticRateSource,
    fetches: AtomicUsize,
    unavailable: AtomicBool,
    delay: Duration,
}

impl CountingRateSource {
    pub fn new(rates: Vec<ExchangeRate>) -> Self {
        Self {
            inner: StaticRateSource::new(rates),
            ..Self::default()
        }
    }

    /// Source whose full-table fetch takes `delay`
    pub fn with_delay(rates: Vec<ExchangeRate>, delay: Duration) -> Self {
        Self {
            delay,
            ..Self::new(rates)
        }
    }

    pub fn fetches(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }

    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    fn check(&self) -> WalletResult<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            Err(WalletError::upstream("rate source unreachable"))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl RateSource for CountingRateSource {
    async fn get_rate(&self, from: Currency, to: Currency) -> WalletResult<Option<f64>> {
        self.check()?;
        self.inner.get_rate(from, to).await
    }

    async fn get_all_rates(&self) -> WalletResult<Vec<ExchangeRate>> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.check()?;
        self.inner.get_all_rates().await
    }
}

/// Sink that keeps every published event
#[derive(Debug, Default)]
pub struct RecordingSink {
    events: Mutex<Vec<(String, WalletEvent)>>,
}

impl RecordingSink {
    pub fn events(&self) -> Vec<(String, WalletEvent)> {
        self.events.lock().clone()
    }
}

#[async_trait]
impl EventSink for RecordingSink {
    async fn publish(&self, key: &str, event: &WalletEvent) -> WalletResult<()> {
        self.events.lock().push((key.to_string(), event.clone()));
        Ok(())
    }
}

/// Sink whose transport is always down
#[derive(Debug, Default)]
pub struct BrokenSink {
    attempts: AtomicUsize,
}

impl BrokenSink {
    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl EventSink for BrokenSink {
    async fn publish(&self, _key: &str, _event: &WalletEvent) -> WalletResult<()> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        Err(WalletError::upstream("broker unavailable"))
    }
}

/// USD->EUR 0.9 and USD->RUB 90
pub fn reference_rates() -> Vec<ExchangeRate> {
    vec![
        ExchangeRate::new(Currency::Usd, Currency::Eur, 0.9),
        ExchangeRate::new(Currency::Usd, Currency::Rub, 90.0),
    ]
}

/// Service over the given collaborators with gate capacity `capacity`
pub fn build_service(
    store: Arc<dyn BalanceStore>,
    rates: Arc<dyn RateSource>,
    events: Arc<dyn EventSink>,
    capacity: usize,
) -> WalletService {
    init_test_logging();
    WalletService::new(
        store,
        rates,
        events,
        RateCache::new(TEST_TTL),
        AdmissionGate::new(capacity),
    )
}

/// Create a wallet for a fresh user and fund it
pub async fn funded_wallet(service: &WalletService, currency: &str, amount: f64) -> Uuid {
    let user = Uuid::new_v4();
    service.create_wallet(user).await.unwrap();
    if amount > 0.0 {
        service.deposit(user, currency, amount).await.unwrap();
    }
    user
}
