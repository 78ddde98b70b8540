//! `PostgreSQL` balance store tests
//!
//! Require a database: set `WALLET_TEST_DATABASE_URL` and run with
//! `--ignored`.

mod common;

use std::sync::Arc;

use futures::future::join_all;
use sqlx::postgres::PgPoolOptions;
use uuid::Uuid;

use common::*;
use wallet_service::store::run_migrations;
use wallet_service::{
    BalanceStore, Currency, MinorUnits, PgBalanceStore, PgRateSource, RateSource, Wallet,
    WalletError,
};

async fn test_store() -> PgBalanceStore {
    init_test_logging();
    let url = std::env::var("WALLET_TEST_DATABASE_URL")
        .expect("WALLET_TEST_DATABASE_URL must be set for database tests");
    let pool = PgPoolOptions::new()
        .max_connections(20)
        .connect(&url)
        .await
        .expect("Failed to connect to test database");
    run_migrations(&pool).await.expect("Failed to run migrations");
    PgBalanceStore::new(pool)
}

#[tokio::test]
#[ignore = "requires PostgreSQL"]
async fn test_round_trip_and_overdraft_rollback() {
    let store = test_store().await;
    let wallet = Wallet::new(Uuid::new_v4());
    store.create_wallet(&wallet).await.unwrap();

    store
        .deposit(wallet.id, Currency::Eur, MinorUnits::from_i64(1_050))
        .await
        .unwrap();
    let result = store
        .withdraw(wallet.id, Currency::Eur, MinorUnits::from_i64(2_000))
        .await;
    assert_eq!(result, Err(WalletError::InsufficientFunds));

    let stored = store.get_wallet(wallet.user_id).await.unwrap();
    assert_eq!(stored.eur, MinorUnits::from_i64(1_050));
    assert_eq!(stored.usd, MinorUnits::ZERO);
}

#[tokio::test]
#[ignore = "requires PostgreSQL"]
async fn test_unique_wallet_per_user() {
    let store = test_store().await;
    let user = Uuid::new_v4();
    store.create_wallet(&Wallet::new(user)).await.unwrap();
    assert!(matches!(
        store.create_wallet(&Wallet::new(user)).await,
        Err(WalletError::Storage(_))
    ));
}

#[tokio::test]
#[ignore = "requires PostgreSQL"]
async fn test_exchange_is_one_transaction() {
    let store = test_store().await;
    let wallet = Wallet::new(Uuid::new_v4());
    store.create_wallet(&wallet).await.unwrap();
    store
        .deposit(wallet.id, Currency::Usd, MinorUnits::from_i64(500))
        .await
        .unwrap();

    let result = store
        .exchange(
            wallet.id,
            Currency::Usd,
            MinorUnits::from_i64(1_000),
            Currency::Rub,
            MinorUnits::from_i64(90_000),
        )
        .await;
    assert_eq!(result, Err(WalletError::InsufficientFunds));

    let stored = store.get_wallet(wallet.user_id).await.unwrap();
    assert_eq!(stored.usd, MinorUnits::from_i64(500));
    assert_eq!(stored.rub, MinorUnits::ZERO);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
#[ignore = "requires PostgreSQL"]
async fn test_row_lock_serializes_concurrent_withdrawals() {
    let store = Arc::new(test_store().await);
    let wallet = Wallet::new(Uuid::new_v4());
    store.create_wallet(&wallet).await.unwrap();
    store
        .deposit(wallet.id, Currency::Usd, MinorUnits::from_i64(1_000))
        .await
        .unwrap();

    let handles: Vec<_> = (0..200)
        .map(|_| {
            let store = Arc::clone(&store);
            tokio::spawn(async move {
                store
                    .withdraw(wallet.id, Currency::Usd, MinorUnits::from_i64(10))
                    .await
            })
        })
        .collect();

    let mut successes = 0;
    for result in join_all(handles).await {
        match result.unwrap() {
            Ok(_) => successes += 1,
            Err(WalletError::InsufficientFunds) => {}
            Err(other) => panic!("unexpected error: {other}"),
        }
    }

    assert_eq!(successes, 100);
    let stored = store.get_wallet(wallet.user_id).await.unwrap();
    assert_eq!(stored.usd, MinorUnits::ZERO);
}

#[tokio::test]
#[ignore = "requires PostgreSQL"]
async fn test_rate_table_skips_unknown_currencies() {
    let store = test_store().await;
    sqlx::query(
        r"
        INSERT INTO exchange_rates (from_currency, to_currency, rate)
        VALUES ('USD', 'EUR', 0.9), ('GBP', 'USD', 1.25)
        ON CONFLICT (from_currency, to_currency) DO UPDATE SET rate = EXCLUDED.rate
        ",
    )
    .execute(store.pool())
    .await
    .unwrap();

    let source = PgRateSource::new(store.pool().clone());
    let rates = source.get_all_rates().await.unwrap();
    assert!(rates.iter().all(|r| r.pair.from != r.pair.to));
    assert!(
        rates
            .iter()
            .any(|r| r.pair.from == Currency::Usd && r.pair.to == Currency::Eur)
    );
    assert_eq!(
        source.get_rate(Currency::Usd, Currency::Eur).await.unwrap(),
        Some(0.9)
    );
}
