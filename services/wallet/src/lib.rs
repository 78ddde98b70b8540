//! Wallet Service
//!
//! Per-user multi-currency balances that stay consistent under concurrent
//! deposit, withdraw and exchange requests.
//!
//! Features:
//! - Integer minor-unit money model with truncating decimal conversion
//! - Admission gate bounding concurrent balance mutations
//! - Pessimistic row-locking balance store (`PostgreSQL` or in-memory)
//! - Exchange-rate cache with a shared TTL and reciprocal lookup
//! - Best-effort event publishing above a configurable threshold

#![warn(missing_docs)]
#![forbid(unsafe_code)]

pub mod config;
pub mod error;
pub mod events;
pub mod gate;
pub mod money;
pub mod rate_cache;
pub mod rates;
pub mod service;
pub mod store;
pub mod wallet;

pub use config::WalletConfig;
pub use error::{WalletError, WalletResult};
pub use events::{ChannelEventSink, EventKind, EventSink, LogEventSink, WalletEvent};
pub use gate::{AdmissionGate, GatePermit};
pub use money::{Currency, MinorUnits};
pub use rate_cache::RateCache;
pub use rates::{CurrencyPair, ExchangeRate, PgRateSource, RateSource, StaticRateSource};
pub use service::{ExchangeOutcome, WalletService};
pub use store::{BalanceStore, MemoryBalanceStore, Mutation, PgBalanceStore};
pub use wallet::Wallet;
