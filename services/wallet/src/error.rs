//! Error types for the wallet service

use thiserror::Error;

/// Wallet-specific error types
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum WalletError {
    /// Amount is zero, negative, not finite, or truncates to zero minor units
    #[error("invalid amount")]
    InvalidAmount,

    /// Currency symbol outside the supported enumeration
    #[error("unsupported currency: {0}")]
    UnsupportedCurrency(String),

    /// Exchange requested between a currency and itself
    #[error("cannot exchange a currency into itself")]
    SameCurrency,

    /// Authoritative withdraw found the balance too low
    #[error("insufficient funds")]
    InsufficientFunds,

    /// No wallet row for the requested user or wallet id
    #[error("wallet not found")]
    WalletNotFound,

    /// Rate source has no data for the pair, even after a refresh
    #[error("rate from {from} to {to} not found even after refresh")]
    RateUnavailable {
        /// Source currency symbol
        from: String,
        /// Target currency symbol
        to: String,
    },

    /// Underlying persistence failure (lock, query, commit)
    #[error("storage error: {0}")]
    Storage(String),

    /// Rate source or event sink transport failure
    #[error("upstream error: {0}")]
    Upstream(String),

    /// Caller gave up before a gate slot became available
    #[error("operation cancelled before admission")]
    Cancelled,
}

impl WalletError {
    /// Create a storage error
    pub fn storage(msg: impl Into<String>) -> Self {
        Self::Storage(msg.into())
    }

    /// Create an upstream error
    pub fn upstream(msg: impl Into<String>) -> Self {
        Self::Upstream(msg.into())
    }

    /// Domain-expected outcomes that are surfaced to the caller verbatim
    #[must_use]
    pub const fn is_domain(&self) -> bool {
        matches!(
            self,
            Self::InvalidAmount
                | Self::UnsupportedCurrency(_)
                | Self::SameCurrency
                | Self::InsufficientFunds
                | Self::WalletNotFound
                | Self::RateUnavailable { .. }
        )
    }

    /// Message safe to hand to an outer transport layer.
    ///
    /// Infrastructure failures collapse into a generic message so storage
    /// and upstream details never leak to callers.
    #[must_use]
    pub fn public_message(&self) -> String {
        if self.is_domain() || matches!(self, Self::Cancelled) {
            self.to_string()
        } else {
            "internal error".to_string()
        }
    }
}

impl From<sqlx::Error> for WalletError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => Self::WalletNotFound,
            other => Self::Storage(other.to_string()),
        }
    }
}

/// Type alias for wallet results
pub type WalletResult<T> = Result<T, WalletError>;
