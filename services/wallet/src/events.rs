//! Event sink port and adapters
//!
//! Events are a best-effort side channel: the orchestrator publishes after a
//! mutation has committed and never fails the operation on a publish error.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::info;
use uuid::Uuid;

use crate::error::{WalletError, WalletResult};
use crate::wallet::Wallet;

/// Kind of balance mutation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventKind {
    /// Funds credited
    Deposit,
    /// Funds debited
    Withdraw,
    /// Funds converted between currencies
    Exchange,
}

/// Notification record handed to the event sink
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WalletEvent {
    /// Unique event ID
    pub event_id: Uuid,
    /// Mutation kind
    pub event: EventKind,
    /// Wallet owner
    pub user_id: Uuid,
    /// Mutated wallet
    pub wallet_id: Uuid,
    /// Requested amount in major units of the source currency
    pub amount: f64,
    /// Currency symbol, or `FROM->TO` for exchanges
    pub currency: String,
    /// Publication time
    pub timestamp: DateTime<Utc>,
    /// Free-form details
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl WalletEvent {
    /// Build an event for a committed mutation on `wallet`
    #[must_use]
    pub fn new(event: EventKind, wallet: &Wallet, amount: f64, currency: impl Into<String>) -> Self {
        Self {
            event_id: Uuid::new_v4(),
            event,
            user_id: wallet.user_id,
            wallet_id: wallet.id,
            amount,
            currency: currency.into(),
            timestamp: Utc::now(),
            details: None,
        }
    }

    /// Partition key: events for one user stay ordered
    #[must_use]
    pub fn key(&self) -> String {
        self.user_id.to_string()
    }
}

/// Destination for wallet events
#[async_trait]
pub trait EventSink: Send + Sync {
    /// Publish one event under `key`
    async fn publish(&self, key: &str, event: &WalletEvent) -> WalletResult<()>;
}

/// Sink that writes each event as a structured log line
#[derive(Debug, Clone, Copy, Default)]
pub struct LogEventSink;

#[async_trait]
impl EventSink for LogEventSink {
    async fn publish(&self, key: &str, event: &WalletEvent) -> WalletResult<()> {
        let payload =
            serde_json::to_string(event).map_err(|e| WalletError::upstream(e.to_string()))?;
        info!(target: "wallet_events", key, payload = %payload, "wallet event");
        Ok(())
    }
}

/// In-process broadcast bus for wallet events
#[derive(Debug, Clone)]
pub struct ChannelEventSink {
    sender: broadcast::Sender<(String, WalletEvent)>,
}

impl ChannelEventSink {
    /// Create a bus buffering up to `capacity` events per subscriber
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Subscribe to `(key, event)` pairs published from now on
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<(String, WalletEvent)> {
        self.sender.subscribe()
    }
}

#[async_trait]
impl EventSink for ChannelEventSink {
    async fn publish(&self, key: &str, event: &WalletEvent) -> WalletResult<()> {
        self.sender
            .send((key.to_string(), event.clone()))
            .map(|_| ())
            .map_err(|_| WalletError::upstream("no event subscribers"))
    }
}
