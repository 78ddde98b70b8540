//! Wallet operator CLI
//!
//! Usage:
//!   wallet migrate
//!   wallet create <user>
//!   wallet balance <user>
//!   wallet deposit <user> <currency> <amount>
//!   wallet withdraw <user> <currency> <amount>
//!   wallet exchange <user> <from> <to> <amount>
//!   wallet rates

use std::sync::Arc;

use anyhow::Result;
use clap::{Parser, Subcommand};
use serde::Serialize;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use uuid::Uuid;

use wallet_service::config::{DatabaseConfig, RateSourceKind};
use wallet_service::store::run_migrations;
use wallet_service::{
    ExchangeRate, LogEventSink, PgBalanceStore, PgRateSource, RateSource, StaticRateSource,
    WalletConfig, WalletError, WalletService,
};

#[derive(Parser)]
#[command(name = "wallet")]
#[command(version, about = "Multi-currency wallet balance operations")]
struct Cli {
    /// Configuration file path
    #[arg(short, long, default_value = "wallet.toml")]
    config: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the database schema
    Migrate,
    /// Create the wallet for a user
    Create {
        /// User ID
        user: Uuid,
    },
    /// Show a user's balances
    Balance {
        /// User ID
        user: Uuid,
    },
    /// Credit an amount
    Deposit {
        /// User ID
        user: Uuid,
        /// Currency symbol (USD, RUB, EUR)
        currency: String,
        /// Amount in major units
        amount: f64,
    },
    /// Debit an amount
    Withdraw {
        /// User ID
        user: Uuid,
        /// Currency symbol (USD, RUB, EUR)
        currency: String,
        /// Amount in major units
        amount: f64,
    },
    /// Convert an amount between currencies
    Exchange {
        /// User ID
        user: Uuid,
        /// Currency sold
        from: String,
        /// Currency bought
        to: String,
        /// Amount of `from` in major units
        amount: f64,
    },
    /// List exchange rates
    Rates,
}

#[derive(Serialize)]
struct BalanceView {
    wallet_id: Uuid,
    user_id: Uuid,
    balances: std::collections::BTreeMap<wallet_service::Currency, f64>,
}

impl From<&wallet_service::Wallet> for BalanceView {
    fn from(wallet: &wallet_service::Wallet) -> Self {
        Self {
            wallet_id: wallet.id,
            user_id: wallet.user_id,
            balances: wallet.balances(),
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "wallet_service=info,wallet=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();

    let config = match WalletConfig::from_file(&cli.config) {
        Ok(config) => {
            info!("Loaded configuration from: {}", cli.config);
            config
        }
        Err(e) => {
            error!("Failed to load config from {}: {}", cli.config, e);
            info!("Using default configuration with environment overrides");
            WalletConfig::from_env()?
        }
    };

    if !needs_database(&cli.command, config.rates.source) {
        let cache = config.rate_cache();
        cache.refresh(config.rates.static_rates());
        print_rates(&cache.get_all().unwrap_or_default());
        return Ok(());
    }

    let database = database_config_for(&cli.command, &config.database);
    let store = PgBalanceStore::connect(&database).await?;

    if let Commands::Migrate = cli.command {
        run_migrations(store.pool()).await?;
        println!("Schema ready");
        return Ok(());
    }

    let rates: Arc<dyn RateSource> = match config.rates.source {
        RateSourceKind::Database => Arc::new(PgRateSource::new(store.pool().clone())),
        RateSourceKind::Static => Arc::new(StaticRateSource::new(config.rates.static_rates())),
    };
    let service = WalletService::from_config(&config, Arc::new(store), rates, Arc::new(LogEventSink));

    if let Err(e) = run(&service, cli.command).await {
        error!("Operation failed: {}", e);
        eprintln!("error: {}", e.public_message());
        std::process::exit(1);
    }
    Ok(())
}

async fn run(service: &WalletService, command: Commands) -> Result<(), WalletError> {
    match command {
        Commands::Migrate => {}
        Commands::Create { user } => {
            let wallet = service.create_wallet(user).await?;
            print_json(&BalanceView::from(&wallet));
        }
        Commands::Balance { user } => {
            let wallet = service.get_wallet(user).await?;
            print_json(&BalanceView::from(&wallet));
        }
        Commands::Deposit {
            user,
            currency,
            amount,
        } => {
            let wallet = service.deposit(user, &currency, amount).await?;
            print_json(&BalanceView::from(&wallet));
        }
        Commands::Withdraw {
            user,
            currency,
            amount,
        } => {
            let wallet = service.withdraw(user, &currency, amount).await?;
            print_json(&BalanceView::from(&wallet));
        }
        Commands::Exchange {
            user,
            from,
            to,
            amount,
        } => {
            let outcome = service.exchange(user, &from, &to, amount).await?;
            println!(
                "Exchanged {} {} into {} {} at {}",
                outcome.debited, from, outcome.credited, to, outcome.rate
            );
            print_json(&BalanceView::from(&outcome.wallet));
        }
        Commands::Rates => print_rates(&service.get_all_rates().await?),
    }
    Ok(())
}

/// Balances live in Postgres; only a static rate listing can skip it
fn needs_database(command: &Commands, source: RateSourceKind) -> bool {
    !matches!((command, source), (Commands::Rates, RateSourceKind::Static))
}

/// `migrate` creates the schema itself, so the pool must not do it first
fn database_config_for(command: &Commands, database: &DatabaseConfig) -> DatabaseConfig {
    let mut database = database.clone();
    if let Commands::Migrate = command {
        database.run_migrations = false;
    }
    database
}

fn print_rates(rates: &[ExchangeRate]) {
    for rate in rates {
        println!("{} {}", rate.pair, rate.rate);
    }
}

fn print_json<T: Serialize>(value: &T) {
    match serde_json::to_string_pretty(value) {
        Ok(json) => println!("{json}"),
        Err(e) => error!("Failed to render output: {}", e),
    }
}
