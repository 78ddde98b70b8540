//! Admission gate
//!
//! Caps the number of balance-mutating operations that may talk to the
//! balance store at once, independent of how many requests the transport
//! layer is serving. Waiters are admitted in FIFO order.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::error::{WalletError, WalletResult};

/// Bounded-concurrency limiter for mutating operations
#[derive(Debug, Clone)]
pub struct AdmissionGate {
    semaphore: Arc<Semaphore>,
    capacity: usize,
    acquire_timeout: Option<Duration>,
}

/// One unit of gate capacity, returned to the gate on drop
#[derive(Debug)]
pub struct GatePermit {
    _permit: OwnedSemaphorePermit,
}

impl AdmissionGate {
    /// Create a gate admitting at most `capacity` concurrent operations
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let capacity = if capacity == 0 {
            warn!("Admission gate capacity 0 would block every mutation, using 1");
            1
        } else {
            capacity
        };

        Self {
            semaphore: Arc::new(Semaphore::new(capacity)),
            capacity,
            acquire_timeout: None,
        }
    }

    /// Give up waiting for a slot after `timeout`
    #[must_use]
    pub const fn with_acquire_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.acquire_timeout = timeout;
        self
    }

    /// Wait for a slot, bounded by the configured acquire timeout if any.
    ///
    /// Dropping the returned future while it waits removes the caller from
    /// the queue without consuming capacity.
    pub async fn acquire(&self) -> WalletResult<GatePermit> {
        match self.acquire_timeout {
            Some(timeout) => self.acquire_until(Instant::now() + timeout).await,
            None => self.acquire_owned().await,
        }
    }

    /// Wait for a slot until `deadline`, failing with `Cancelled` afterwards
    pub async fn acquire_until(&self, deadline: Instant) -> WalletResult<GatePermit> {
        match tokio::time::timeout_at(deadline, self.acquire_owned()).await {
            Ok(permit) => permit,
            Err(_) => {
                debug!("Admission gate deadline passed while waiting");
                Err(WalletError::Cancelled)
            }
        }
    }

    async fn acquire_owned(&self) -> WalletResult<GatePermit> {
        let permit = Arc::clone(&self.semaphore)
            .acquire_owned()
            .await
            .map_err(|_| WalletError::Cancelled)?;
        Ok(GatePermit { _permit: permit })
    }

    /// Configured capacity
    #[must_use]
    pub const fn capacity(&self) -> usize {
        self.capacity
    }

    /// Slots currently free
    #[must_use]
    pub fn available(&self) -> usize {
        self.semaphore.available_permits()
    }

    /// Slots currently held
    #[must_use]
    pub fn in_flight(&self) -> usize {
        self.capacity - self.available()
    }
}
