use chrono::{NaiveDate, NaiveTime, Utc};
use clap::{Parser, Subcommand};
use fulfillment::application::rotation::AccountRotation;
use fulfillment::config::EngineConfig;
use fulfillment::domain::commission::{RemittanceType, calculate_commission};
use fulfillment::domain::money::Amount;
use fulfillment::domain::payment_account::{PaymentAccount, TypeClass};
use fulfillment::domain::ports::{PaymentAccountStore, PaymentAccountStoreRef};
use fulfillment::infrastructure::clock::ManualClock;
use fulfillment::infrastructure::in_memory::InMemoryStore;
use fulfillment::interfaces::csv::quote_reader::QuoteReader;
use fulfillment::interfaces::csv::report_writer::ReportWriter;
use miette::{IntoDiagnostic, Result, miette};
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::fs::File;
use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Quote the commission for every row of a `type_id,amount` CSV file
    Quote {
        /// JSON array of remittance types
        #[arg(long)]
        types: PathBuf,

        /// Input requests CSV file
        input: PathBuf,
    },
    /// Show which payment account the rotation would pick, without
    /// registering anything
    SelectAccount {
        /// JSON array of payment accounts
        #[arg(long, required_unless_present = "db_path")]
        accounts: Option<PathBuf>,

        /// Path to a persistent database to read accounts from.
        #[arg(long)]
        db_path: Option<PathBuf>,

        /// `remittance` or `product`
        #[arg(long)]
        class: TypeClass,

        #[arg(long)]
        amount: Decimal,

        /// Evaluate counters as of this day (defaults to today)
        #[arg(long)]
        date: Option<NaiveDate>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(io::stderr)
        .init();

    let config = EngineConfig::from_env().into_diagnostic()?;

    match Cli::parse().command {
        Command::Quote { types, input } => quote(types, input),
        Command::SelectAccount {
            accounts,
            db_path,
            class,
            amount,
            date,
        } => {
            let store = open_accounts(accounts, db_path).await?;
            select_account(store, &config, class, amount, date).await
        }
    }
}

fn quote(types: PathBuf, input: PathBuf) -> Result<()> {
    let types: Vec<RemittanceType> =
        serde_json::from_reader(File::open(types).into_diagnostic()?).into_diagnostic()?;
    let types: HashMap<_, _> = types.into_iter().map(|kind| (kind.id, kind)).collect();

    let reader = QuoteReader::new(File::open(input).into_diagnostic()?);
    let stdout = io::stdout();
    let mut writer = ReportWriter::new(stdout.lock());

    for request in reader.requests() {
        let quoted = request.and_then(|request| {
            let kind = types.get(&request.type_id).ok_or_else(|| {
                fulfillment::error::FulfillmentError::not_found("remittance type", request.type_id)
            })?;
            calculate_commission(kind, request.amount).map(|breakdown| (request, breakdown))
        });
        match quoted {
            Ok((request, breakdown)) => writer.write_quote(&request, &breakdown).into_diagnostic()?,
            Err(e) => eprintln!("Error quoting row: {}", e),
        }
    }
    writer.flush().into_diagnostic()?;
    Ok(())
}

async fn open_accounts(
    accounts: Option<PathBuf>,
    db_path: Option<PathBuf>,
) -> Result<PaymentAccountStoreRef> {
    if let Some(db_path) = db_path {
        return open_database(db_path);
    }

    let path = accounts.ok_or_else(|| miette!("either --accounts or --db-path is required"))?;
    let accounts: Vec<PaymentAccount> =
        serde_json::from_reader(File::open(path).into_diagnostic()?).into_diagnostic()?;
    let store = InMemoryStore::new();
    for account in accounts {
        store.put_account(account).await.into_diagnostic()?;
    }
    Ok(Arc::new(store))
}

#[cfg(feature = "storage-rocksdb")]
fn open_database(db_path: PathBuf) -> Result<PaymentAccountStoreRef> {
    let store = fulfillment::infrastructure::rocksdb::RocksDBStore::open(db_path).into_diagnostic()?;
    Ok(Arc::new(store))
}

#[cfg(not(feature = "storage-rocksdb"))]
fn open_database(_db_path: PathBuf) -> Result<PaymentAccountStoreRef> {
    Err(miette!("--db-path needs a build with the storage-rocksdb feature"))
}

async fn select_account(
    store: PaymentAccountStoreRef,
    config: &EngineConfig,
    class: TypeClass,
    amount: Decimal,
    date: Option<NaiveDate>,
) -> Result<()> {
    let amount = Amount::new(amount).into_diagnostic()?;
    let day = date.unwrap_or_else(|| Utc::now().date_naive());
    let clock = ManualClock::new(day.and_time(NaiveTime::MIN).and_utc());
    let rotation = AccountRotation::new(store, Arc::new(clock), config);

    let account = rotation.select(class, amount).await.into_diagnostic()?;

    let stdout = io::stdout();
    let mut writer = ReportWriter::new(stdout.lock());
    writer.write_account(&account).into_diagnostic()?;
    writer.flush().into_diagnostic()?;
    Ok(())
}
