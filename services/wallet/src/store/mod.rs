//! Balance store port
//!
//! Every balance mutation follows one protocol, whatever the backend:
//!
//! 1. begin a transaction
//! 2. read the whole wallet row under an exclusive row lock
//! 3. validate and compute the new row ([`Mutation::apply_to`])
//! 4. write the row and its timestamp
//! 5. commit; any failure rolls back with no partial write
//!
//! Nothing outside a [`BalanceStore`] implementation may mutate a balance.

mod memory;
mod postgres;

pub use memory::MemoryBalanceStore;
pub use postgres::{PgBalanceStore, run_migrations};

use async_trait::async_trait;
use chrono::Utc;
use uuid::Uuid;

use crate::error::{WalletError, WalletResult};
use crate::money::{Currency, MinorUnits};
use crate::wallet::Wallet;

/// Persistent wallet rows with locked read-modify-write updates
#[async_trait]
pub trait BalanceStore: Send + Sync {
    /// Insert a new wallet row; one wallet per user is enforced here
    async fn create_wallet(&self, wallet: &Wallet) -> WalletResult<()>;

    /// Committed wallet state for a user
    async fn get_wallet(&self, user_id: Uuid) -> WalletResult<Wallet>;

    /// Credit `amount` under the row lock, returning the committed row
    async fn deposit(
        &self,
        wallet_id: Uuid,
        currency: Currency,
        amount: MinorUnits,
    ) -> WalletResult<Wallet>;

    /// Debit `amount` under the row lock, failing with `InsufficientFunds`
    /// if the locked balance is too low
    async fn withdraw(
        &self,
        wallet_id: Uuid,
        currency: Currency,
        amount: MinorUnits,
    ) -> WalletResult<Wallet>;

    /// Debit `from` and credit `to` in a single locked transaction
    async fn exchange(
        &self,
        wallet_id: Uuid,
        from: Currency,
        debit: MinorUnits,
        to: Currency,
        credit: MinorUnits,
    ) -> WalletResult<Wallet>;
}

/// Balance change applied to a locked wallet row
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mutation {
    /// Credit one currency
    Deposit {
        /// Credited currency
        currency: Currency,
        /// Amount credited
        amount: MinorUnits,
    },
    /// Debit one currency
    Withdraw {
        /// Debited currency
        currency: Currency,
        /// Amount debited
        amount: MinorUnits,
    },
    /// Debit one currency and credit another
    Exchange {
        /// Debited currency
        from: Currency,
        /// Amount debited
        debit: MinorUnits,
        /// Credited currency
        to: Currency,
        /// Amount credited
        credit: MinorUnits,
    },
}

impl Mutation {
    /// Validate against the locked row and compute the row to write.
    ///
    /// `current` is left untouched so a rejected mutation writes nothing.
    pub fn apply_to(&self, current: &Wallet) -> WalletResult<Wallet> {
        let mut next = current.clone();
        match *self {
            Self::Deposit { currency, amount } => {
                next.credit(currency, amount)?;
            }
            Self::Withdraw { currency, amount } => {
                next.debit(currency, amount)?;
            }
            Self::Exchange {
                from,
                debit,
                to,
                credit,
            } => {
                if from == to {
                    return Err(WalletError::SameCurrency);
                }
                next.debit(from, debit)?;
                next.credit(to, credit)?;
            }
        }
        next.updated_at = Utc::now();
        Ok(next)
    }
}
