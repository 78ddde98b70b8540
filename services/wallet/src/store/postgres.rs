//! `PostgreSQL` balance store
//!
//! Mutations lock the wallet row with `SELECT ... FOR UPDATE` inside a
//! transaction and write the whole row back. Column names are fixed; no
//! statement text is ever built from a currency value.

use std::time::Duration;

use async_trait::async_trait;
use sqlx::postgres::{PgPoolOptions, PgRow};
use sqlx::{PgPool, Row};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::{BalanceStore, Mutation};
use crate::config::DatabaseConfig;
use crate::error::{WalletError, WalletResult};
use crate::money::{Currency, MinorUnits};
use crate::wallet::Wallet;

/// Balance store over a `PostgreSQL` pool
#[derive(Debug, Clone)]
pub struct PgBalanceStore {
    pool: PgPool,
}

impl PgBalanceStore {
    /// Create over an existing pool
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Open a pool from configuration, running migrations if enabled
    pub async fn connect(config: &DatabaseConfig) -> WalletResult<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .min_connections(config.min_connections)
            .acquire_timeout(Duration::from_secs(config.acquire_timeout_secs))
            .connect(&config.url)
            .await?;

        if config.run_migrations {
            run_migrations(&pool).await?;
        }
        Ok(Self::new(pool))
    }

    /// Underlying pool
    #[must_use]
    pub const fn pool(&self) -> &PgPool {
        &self.pool
    }

    async fn mutate(&self, wallet_id: Uuid, mutation: Mutation) -> WalletResult<Wallet> {
        let mut tx = self.pool.begin().await?;

        let row = sqlx::query(
            r"
            SELECT id, user_id, usd, rub, eur, updated_at
            FROM wallets
            WHERE id = $1
            FOR UPDATE
            ",
        )
        .bind(wallet_id)
        .fetch_optional(&mut *tx)
        .await?;

        let Some(row) = row else {
            return Err(WalletError::WalletNotFound);
        };
        let current = wallet_from_row(&row);

        let next = match mutation.apply_to(&current) {
            Ok(next) => next,
            Err(e) => {
                if let Err(rollback) = tx.rollback().await {
                    warn!("Rollback of wallet {} failed: {}", wallet_id, rollback);
                }
                return Err(e);
            }
        };

        let result = sqlx::query(
            r"
            UPDATE wallets SET
                usd = $1,
                rub = $2,
                eur = $3,
                updated_at = $4
            WHERE id = $5
            ",
        )
        .bind(next.usd.as_i64())
        .bind(next.rub.as_i64())
        .bind(next.eur.as_i64())
        .bind(next.updated_at)
        .bind(wallet_id)
        .execute(&mut *tx)
        .await;

        if let Err(e) = result {
            error!("Failed to write wallet {}: {}", wallet_id, e);
            return Err(e.into());
        }

        tx.commit().await?;
        debug!("Wallet {} committed {:?}", wallet_id, mutation);
        Ok(next)
    }
}

fn wallet_from_row(row: &PgRow) -> Wallet {
    Wallet {
        id: row.get("id"),
        user_id: row.get("user_id"),
        usd: MinorUnits::from_i64(row.get("usd")),
        rub: MinorUnits::from_i64(row.get("rub")),
        eur: MinorUnits::from_i64(row.get("eur")),
        updated_at: row.get("updated_at"),
    }
}

#[async_trait]
impl BalanceStore for PgBalanceStore {
    async fn create_wallet(&self, wallet: &Wallet) -> WalletResult<()> {
        let result = sqlx::query(
            r"
            INSERT INTO wallets (id, user_id, usd, rub, eur, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            ",
        )
        .bind(wallet.id)
        .bind(wallet.user_id)
        .bind(wallet.usd.as_i64())
        .bind(wallet.rub.as_i64())
        .bind(wallet.eur.as_i64())
        .bind(wallet.updated_at)
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => {
                debug!("Wallet {} created for user {}", wallet.id, wallet.user_id);
                Ok(())
            }
            Err(sqlx::Error::Database(db)) if db.is_unique_violation() => Err(
                WalletError::storage(format!("wallet already exists for user {}", wallet.user_id)),
            ),
            Err(e) => Err(e.into()),
        }
    }

    async fn get_wallet(&self, user_id: Uuid) -> WalletResult<Wallet> {
        let row = sqlx::query(
            r"
            SELECT id, user_id, usd, rub, eur, updated_at
            FROM wallets
            WHERE user_id = $1
            ",
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref()
            .map(wallet_from_row)
            .ok_or(WalletError::WalletNotFound)
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

/// Create the wallet schema if it does not exist
pub async fn run_migrations(pool: &PgPool) -> WalletResult<()> {
    info!("Running database migrations");

    sqlx::query(
        r"
        CREATE TABLE IF NOT EXISTS wallets (
            id UUID PRIMARY KEY,
            user_id UUID NOT NULL UNIQUE,
            usd BIGINT NOT NULL DEFAULT 0 CHECK (usd >= 0),
            rub BIGINT NOT NULL DEFAULT 0 CHECK (rub >= 0),
            eur BIGINT NOT NULL DEFAULT 0 CHECK (eur >= 0),
            updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
        )
        ",
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r"
        CREATE TABLE IF NOT EXISTS exchange_rates (
            from_currency TEXT NOT NULL,
            to_currency TEXT NOT NULL,
            rate NUMERIC(20, 10) NOT NULL CHECK (rate > 0),
            updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
            PRIMARY KEY (from_currency, to_currency)
        )
        ",
    )
    .execute(pool)
    .await?;

    info!("Database migrations completed");
    Ok(())
}
