//! In-process balance store
//!
//! Each wallet row sits behind its own async mutex, which plays the role of
//! the exclusive row lock. A mutation computes the new row from a copy and
//! swaps it in only after validation, so a failed step writes nothing.

use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;
use rustc_hash::FxHashMap;
use tokio::sync::Mutex;
use tracing::debug;
use uuid::Uuid;

use super::{BalanceStore, Mutation};
use crate::error::{WalletError, WalletResult};
use crate::money::{Currency, MinorUnits};
use crate::wallet::Wallet;

type Row = Arc<Mutex<Wallet>>;

#[derive(Debug, Default)]
struct Tables {
    rows: FxHashMap<Uuid, Row>,
    by_user: FxHashMap<Uuid, Uuid>,
}

/// Balance store held in memory
#[derive(Debug, Default)]
pub struct MemoryBalanceStore {
    tables: RwLock<Tables>,
}

impl MemoryBalanceStore {
    /// Create an empty store
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of wallets
    #[must_use]
    pub fn len(&self) -> usize {
        self.tables.read().rows.len()
    }

    /// No wallets yet
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn row(&self, wallet_id: Uuid) -> WalletResult<Row> {
        self.tables
            .read()
            .rows
            .get(&wallet_id)
            .cloned()
            .ok_or(WalletError::WalletNotFound)
    }

    async fn mutate(&self, wallet_id: Uuid, mutation: Mutation) -> WalletResult<Wallet> {
        let row = self.row(wallet_id)?;
        let mut locked = row.lock().await;
        let next = mutation.apply_to(&locked)?;
        *locked = next.clone();
        debug!("Wallet {} committed {:?}", wallet_id, mutation);
        Ok(next)
    }
}

#[async_trait]
impl BalanceStore for MemoryBalanceStore {
    async fn create_wallet(&self, wallet: &Wallet) -> WalletResult<()> {
        let mut tables = self.tables.write();
        if tables.by_user.contains_key(&wallet.user_id) {
            return Err(WalletError::storage(format!(
                "wallet already exists for user {}",
                wallet.user_id
            )));
        }
        if tables.rows.contains_key(&wallet.id) {
            return Err(WalletError::storage(format!(
                "duplicate wallet id {}",
                wallet.id
            )));
        }
        tables.by_user.insert(wallet.user_id, wallet.id);
        tables
            .rows
            .insert(wallet.id, Arc::new(Mutex::new(wallet.clone())));
        Ok(())
    }

    async fn get_wallet(&self, user_id: Uuid) -> WalletResult<Wallet> {
        let row = {
            let tables = self.tables.read();
            let wallet_id = tables
                .by_user
                .get(&user_id)
                .ok_or(WalletError::WalletNotFound)?;
            tables
                .rows
                .get(wallet_id)
                .cloned()
                .ok_or(WalletError::WalletNotFound)?
        };
        let wallet = row.lock().await.clone();
        Ok(wallet)
    }

    async fn deposit(
        &self,
        wallet_id: Uuid,
        currency: Currency,
        amount: MinorUnits,
    ) -> WalletResult<Wallet> {
        self.mutate(wallet_id, Mutation::Deposit { currency, amount })
            .await
    }

    async fn withdraw(
        &self,
        wallet_id: Uuid,
        currency: Currency,
        amount: MinorUnits,
    ) -> WalletResult<Wallet> {
        self.mutate(wallet_id, Mutation::Withdraw { currency, amount })
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
        self.mutate(
            wallet_id,
            Mutation::Exchange {
                from,
                debit,
                to,
                credit,
            },
        )
        .await
    }
}
