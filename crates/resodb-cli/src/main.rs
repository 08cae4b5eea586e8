//! ResoDB CLI - inspect and edit store files
//!
//! Usage:
//!   resodb --path db.json create   - Create (or reset) a store
//!   resodb --path db.json read     - Print the stored document
//!   resodb --path db.json write    - Replace the stored document
//!   resodb config                  - Show the effective cache settings

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use resodb_store::{
    CacheConfig, CacheSweeper, DocumentCache, DocumentStore, StoreError, StoreOptions, WriteMode,
};
use secrecy::{ExposeSecret, SecretString};
use serde_json::Value;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "resodb")]
#[command(version)]
#[command(about = "Single-file JSON document store", long_about = None)]
struct Cli {
    /// Store file to operate on
    #[arg(long, global = true, default_value = "db.json")]
    path: PathBuf,

    /// Password for encrypted stores
    #[arg(long, global = true, env = "RESODB_PASSWORD", hide_env_values = true)]
    password: Option<String>,

    /// Bypass the in-memory cache
    #[arg(long, global = true)]
    no_cache: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the store, replacing any existing content
    Create {
        /// Initial document (JSON object)
        #[arg(long, default_value = "{}")]
        document: String,

        /// Fail instead of replacing an existing store
        #[arg(long)]
        keep: bool,
    },

    /// Print the stored document
    Read {
        /// Single-line output
        #[arg(long)]
        compact: bool,
    },

    /// Replace the stored document
    Write {
        /// New document (JSON object)
        document: String,
    },

    /// Print the effective cache configuration
    Config,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    let cache = Arc::new(DocumentCache::new(CacheConfig::from_env()));
    let sweeper = CacheSweeper::spawn(cache.clone());

    let password = cli.password.map(SecretString::new);
    let result = run(cli.command, cli.path, password, !cli.no_cache, cache);

    sweeper.shutdown().await;
    result
}

fn run(
    command: Commands,
    path: PathBuf,
    password: Option<SecretString>,
    caching: bool,
    cache: Arc<DocumentCache>,
) -> anyhow::Result<()> {
    let mut options = StoreOptions::new().caching(caching);
    if let Some(password) = &password {
        options = options.password(password.expose_secret().clone());
    }

    match command {
        Commands::Create { document, keep } => {
            let document = parse_json(&document)?;
            let mut store = DocumentStore::open(&path, options.ensure(false), cache)
                .map_err(surface)?;
            store.create(&document, !keep).map_err(surface)?;
            println!("Created {}", path.display());
        }

        Commands::Read { compact } => {
            let mut store = DocumentStore::open(&path, options.ensure(false), cache)
                .map_err(surface)?;
            let document = Value::Object(store.read().map_err(surface)?);
            let rendered = if compact {
                serde_json::to_string(&document)?
            } else {
                serde_json::to_string_pretty(&document)?
            };
            println!("{}", rendered);
        }

        // Always synchronous: a background write would race process exit
        Commands::Write { document } => {
            let document = parse_json(&document)?;
            let mut store = DocumentStore::open(&path, options, cache).map_err(surface)?;
            store.write(&document, WriteMode::Sync).map_err(surface)?;
            println!("Wrote {}", path.display());
        }

        Commands::Config => {
            println!("{}", serde_json::to_string_pretty(cache.config())?);
        }
    }

    Ok(())
}

fn parse_json(raw: &str) -> anyhow::Result<Value> {
    serde_json::from_str(raw).context("document is not valid JSON")
}

/// Log the structured error and turn it into a CLI error.
fn surface(err: StoreError) -> anyhow::Error {
    err.report();
    anyhow::Error::new(err)
}
