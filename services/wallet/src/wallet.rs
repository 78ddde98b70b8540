//! Wallet row model

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{WalletError, WalletResult};
use crate::money::{Currency, MinorUnits};

/// One wallet per user, one minor-unit balance per supported currency
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Wallet {
    /// Wallet ID
    pub id: Uuid,
    /// Owning user
    pub user_id: Uuid,
    /// USD balance
    pub usd: MinorUnits,
    /// RUB balance
    pub rub: MinorUnits,
    /// EUR balance
    pub eur: MinorUnits,
    /// Last mutation time
    pub updated_at: DateTime<Utc>,
}

impl Wallet {
    /// Create an empty wallet for a user
    #[must_use]
    pub fn new(user_id: Uuid) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id,
            usd: MinorUnits::ZERO,
            rub: MinorUnits::ZERO,
            eur: MinorUnits::ZERO,
            updated_at: Utc::now(),
        }
    }

    /// Balance for a currency
    #[must_use]
    pub const fn balance(&self, currency: Currency) -> MinorUnits {
        match currency {
            Currency::Usd => self.usd,
            Currency::Rub => self.rub,
            Currency::Eur => self.eur,
        }
    }

    fn slot_mut(&mut self, currency: Currency) -> &mut MinorUnits {
        match currency {
            Currency::Usd => &mut self.usd,
            Currency::Rub => &mut self.rub,
            Currency::Eur => &mut self.eur,
        }
    }

    /// Balance for a currency in major units
    #[must_use]
    pub fn balance_of(&self, currency: Currency) -> f64 {
        self.balance(currency).as_major()
    }

    /// All balances in major units, keyed by currency
    #[must_use]
    pub fn balances(&self) -> BTreeMap<Currency, f64> {
        Currency::ALL
            .into_iter()
            .map(|c| (c, self.balance_of(c)))
            .collect()
    }

    /// Credit `amount` to `currency` in this copy of the row
    pub fn credit(&mut self, currency: Currency, amount: MinorUnits) -> WalletResult<MinorUnits> {
        if !amount.is_positive() {
            return Err(WalletError::InvalidAmount);
        }
        let slot = self.slot_mut(currency);
        let next = slot
            .checked_add(amount)
            .ok_or_else(|| WalletError::storage(format!("{currency} balance overflow")))?;
        *slot = next;
        Ok(next)
    }

    /// Debit `amount` from `currency` in this copy of the row.
    ///
    /// On a snapshot this is only a simulation; the result is authoritative
    /// only when applied to a row held under the store's row lock.
    pub fn debit(&mut self, currency: Currency, amount: MinorUnits) -> WalletResult<MinorUnits> {
        if !amount.is_positive() {
            return Err(WalletError::InvalidAmount);
        }
        let slot = self.slot_mut(currency);
        let next = slot
            .checked_sub(amount)
            .ok_or(WalletError::InsufficientFunds)?;
        *slot = next;
        Ok(next)
    }
}
