use clap::{Parser, Subcommand};
use miette::{IntoDiagnostic, Result};
use stayhub::application::seed::{SeedOptions, Seeder};
use stayhub::config::{GatewayArgs, GatewayConfig};
use stayhub::domain::ports::{BookingStore, MarketStoreRef, NotifierRef, PaymentGatewayRef};
use stayhub::infrastructure::chapa::ChapaGateway;
use stayhub::infrastructure::in_memory::InMemoryStore;
use stayhub::infrastructure::notifier::LogNotifier;
use stayhub::interfaces::api::Api;
use stayhub::interfaces::csv::ledger_writer::LedgerWriter;
use stayhub::interfaces::jsonl::{Captures, RequestReader, ResponseWriter};
use stayhub::logging;
use std::fs::File;
use std::io::{self, BufReader};
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Log filter used when RUST_LOG is not set
    #[arg(long, global = true, default_value = "warn")]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Replay API requests from a JSON Lines file, one response per line on stdout
    Replay {
        /// Input requests file (.jsonl)
        input: PathBuf,

        /// Path to persistent database (optional). If provided, uses RocksDB.
        #[arg(long)]
        db_path: Option<PathBuf>,

        /// Write the final booking ledger to this CSV file
        #[arg(long)]
        ledger: Option<PathBuf>,

        #[command(flatten)]
        gateway: GatewayArgs,
    },
    /// Populate the store with sample users, listings and bookings
    Seed {
        /// Path to persistent database (optional). If provided, uses RocksDB.
        #[arg(long)]
        db_path: Option<PathBuf>,

        #[arg(long, default_value_t = 3)]
        hosts: usize,

        #[arg(long, default_value_t = 5)]
        guests: usize,

        /// Random seed, for reproducible data
        #[arg(long, default_value_t = 42)]
        seed: u64,
    },
}

fn open_store(db_path: Option<PathBuf>) -> Result<MarketStoreRef> {
    if let Some(path) = db_path {
        #[cfg(feature = "storage-rocksdb")]
        {
            let store = stayhub::infrastructure::rocksdb::RocksDBStore::open(path).into_diagnostic()?;
            return Ok(Arc::new(store));
        }
        #[cfg(not(feature = "storage-rocksdb"))]
        {
            let _ = path;
            eprintln!(
                "WARNING: Persistent storage requested via --db-path, but 'storage-rocksdb' feature is not enabled. Falling back to In-Memory storage."
            );
        }
    }
    Ok(Arc::new(InMemoryStore::new()))
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    logging::init(&cli.log_level);

    match cli.command {
        Command::Replay {
            input,
            db_path,
            ledger,
            gateway,
        } => {
            // A missing secret key must stop startup before anything is read.
            let config = GatewayConfig::try_from(gateway).into_diagnostic()?;
            let store = open_store(db_path)?;
            let gateway: PaymentGatewayRef =
                Arc::new(ChapaGateway::new(config.clone()).into_diagnostic()?);
            let notifier: NotifierRef = Arc::new(LogNotifier);
            let api = Api::new(store.clone(), gateway, notifier, &config.currency);

            let file = File::open(input).into_diagnostic()?;
            let reader = RequestReader::new(BufReader::new(file));
            let stdout = io::stdout();
            let mut writer = ResponseWriter::new(stdout.lock());
            let mut captures = Captures::new();

            for line in reader.lines() {
                let step = match line.and_then(|raw| captures.resolve(raw)) {
                    Ok(step) => step,
                    Err(e) => {
                        eprintln!("Error reading request: {}", e);
                        continue;
                    }
                };
                let response = api.handle(step.request).await;
                if let Some(name) = &step.capture {
                    captures.record(name, &response);
                }
                writer.write(&response).into_diagnostic()?;
            }
            writer.flush().into_diagnostic()?;

            if let Some(path) = ledger {
                let bookings = store.all_bookings().await.into_diagnostic()?;
                let file = File::create(path).into_diagnostic()?;
                LedgerWriter::new(file)
                    .write_bookings(bookings)
                    .into_diagnostic()?;
            }
        }
        Command::Seed {
            db_path,
            hosts,
            guests,
            seed,
        } => {
            let store = open_store(db_path)?;
            let options = SeedOptions {
                hosts,
                guests,
                seed,
            };
            let report = Seeder::new(store, options).run().await.into_diagnostic()?;
            println!("{}", serde_json::to_string(&report).into_diagnostic()?);
        }
    }

    Ok(())
}
