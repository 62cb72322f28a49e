//! cloudcache - inspect and maintain the local file cache
//!
//! Operates on the on-disk store shared by every `FileCache` using the
//! process-wide connector.

use anyhow::{anyhow, Context, Result};
use std::env;
use std::sync::Arc;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use cloudcache::clock::{Clock, SystemClock};
use cloudcache::store::{TransactionMode, FILES_TABLE};
use cloudcache::{FileCacheConfig, LocalCache, StoreConnector};

/// CLI command
#[derive(Debug)]
enum Command {
    /// Show a persisted file without evicting it
    Stat {
        collection_id: String,
        file_id: String,
        file_name: String,
    },
    /// Delete a persisted file
    Evict {
        collection_id: String,
        file_id: String,
        file_name: String,
    },
    /// Empty the store
    Clear,
    Help,
}

fn print_help() {
    eprintln!(
        r#"cloudcache - inspect and maintain the local file cache

USAGE:
    cloudcache stat <collection_id> <file_id> <file_name>
    cloudcache evict <collection_id> <file_id> <file_name>
    cloudcache clear
    cloudcache help

COMMANDS:
    stat    Show size, age and staleness of a cached file
    evict   Remove a cached file
    clear   Remove every cached file in the store
    help    Show this help message

ENVIRONMENT:
    CLOUDCACHE_DIR             Root directory of the store (default: platform cache dir)
    CLOUDCACHE_STORE           Store name (default: cloudcache)
    CLOUDCACHE_DEPRECATION_MS  Staleness window in milliseconds (default: 86400000)
    RUST_LOG                   Log level (trace, debug, info, warn, error)
"#
    );
}

fn parse_args(args: &[String]) -> Result<Command> {
    let Some(command) = args.get(1) else {
        return Ok(Command::Help);
    };

    let file_args = |usage: &str| -> Result<(String, String, String)> {
        match args {
            [_, _, collection_id, file_id, file_name] => {
                Ok((collection_id.clone(), file_id.clone(), file_name.clone()))
            }
            _ => Err(anyhow!("Usage: cloudcache {} <collection_id> <file_id> <file_name>", usage)),
        }
    };

    match command.as_str() {
        "stat" => {
            let (collection_id, file_id, file_name) = file_args("stat")?;
            Ok(Command::Stat {
                collection_id,
                file_id,
                file_name,
            })
        }
        "evict" => {
            let (collection_id, file_id, file_name) = file_args("evict")?;
            Ok(Command::Evict {
                collection_id,
                file_id,
                file_name,
            })
        }
        "clear" => Ok(Command::Clear),
        "help" | "--help" | "-h" => Ok(Command::Help),
        other => Err(anyhow!("Unknown command: {}", other)),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    let log_level = env::var("RUST_LOG")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(Level::WARN);

    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let args: Vec<String> = env::args().collect();
    let command = match parse_args(&args) {
        Ok(cmd) => cmd,
        Err(e) => {
            eprintln!("Error: {}", e);
            print_help();
            std::process::exit(1);
        }
    };

    // Only the store name and window matter here
    let config = FileCacheConfig::from_env("").context("Invalid environment")?;
    let connector = StoreConnector::global();
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let local = LocalCache::with_config(
        connector.clone(),
        config.store_name.clone(),
        config.deprecation_time(),
        clock.clone(),
    );

    match command {
        Command::Stat {
            collection_id,
            file_id,
            file_name,
        } => {
            let key = LocalCache::record_key(&collection_id, &file_id, &file_name);
            let record = connector
                .open(&config.store_name)
                .await
                .context("Failed to open local store")?
                .transaction(FILES_TABLE, TransactionMode::ReadOnly)?
                .get(&key)
                .await?;

            match record {
                Some(record) => {
                    let age_ms = clock.now_millis().saturating_sub(record.timestamp);
                    println!("key:       {}", record.id);
                    println!("size:      {} bytes", record.data.len());
                    println!("timestamp: {}", record.timestamp);
                    println!("age:       {:.1}s", age_ms as f64 / 1000.0);
                    println!("stale:     {}", local.is_stale(&record, None));
                }
                None => println!("{}: not cached", key),
            }
        }
        Command::Evict {
            collection_id,
            file_id,
            file_name,
        } => {
            let key = LocalCache::record_key(&collection_id, &file_id, &file_name);
            evict(&connector, &config.store_name, &key).await?;
            println!("Evicted {}", key);
        }
        Command::Clear => {
            clear(&connector, &config.store_name).await?;
            println!("Cleared store '{}'", config.store_name);
        }
        Command::Help => {
            print_help();
        }
    }

    Ok(())
}

/// Delete one record, failing loudly where `LocalCache` would only log
async fn evict(connector: &StoreConnector, store_name: &str, key: &str) -> Result<()> {
    connector
        .open(store_name)
        .await
        .context("Failed to open local store")?
        .transaction(FILES_TABLE, TransactionMode::ReadWrite)?
        .delete(key)
        .await
        .with_context(|| format!("Failed to evict {}", key))?;

    info!(key = %key, "Evicted");
    Ok(())
}

async fn clear(connector: &StoreConnector, store_name: &str) -> Result<()> {
    connector
        .open(store_name)
        .await
        .context("Failed to open local store")?
        .transaction(FILES_TABLE, TransactionMode::ReadWrite)?
        .clear()
        .await
        .with_context(|| format!("Failed to clear store '{}'", store_name))?;

    info!(store = %store_name, "Cleared");
    Ok(())
}
