//! xrate
//!
//! Command-line entry point: one-shot conversions, cache inspection and
//! manual seeding, or the HTTP API.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use rust_decimal::Decimal;
use tracing::info;
use xrate_common::Currency;
use xrate_fx::CacheStats;
use xrate_service::api::{self, ConvertResponse};
use xrate_service::telemetry::init_tracing;
use xrate_service::ServiceConfig;

/// xrate CLI
#[derive(Parser, Debug)]
#[command(name = "xrate")]
#[command(about = "Currency conversion over a cached rate table")]
struct Args {
    /// Path of the JSON cache file
    #[arg(long, global = true)]
    cache_file: Option<PathBuf>,

    /// Rate source endpoint root
    #[arg(long, global = true)]
    source_url: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Convert an amount between two currencies
    Convert {
        from: String,
        to: String,
        amount: String,
    },
    /// List cached rate entries
    Rates,
    /// Seed or override a single cached rate
    SetRate {
        base: String,
        currency: String,
        rate: Decimal,
    },
    /// Run the HTTP API
    Serve {
        /// Listen address, overrides XRATE_LISTEN_ADDR
        #[arg(long)]
        listen: Option<String>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let args = Args::parse();

    let mut config = ServiceConfig::from_env();
    if let Some(path) = args.cache_file {
        config.cache_file = path;
    }
    if let Some(url) = args.source_url {
        config.source_url = url;
    }
    if let Command::Serve { listen: Some(addr) } = &args.command {
        config.listen_addr = addr.clone();
    }

    config
        .validate()
        .map_err(|e| anyhow::anyhow!("Invalid configuration: {}", e))?;

    init_tracing(&config);

    let resolver = Arc::new(config.build_resolver().context("Failed to build resolver")?);

    match args.command {
        Command::Convert { from, to, amount } => {
            let result = resolver.convert_input(&from, &to, &amount).await?;
            print_json(&ConvertResponse::from(result))?;
        }
        Command::Rates => {
            let entries = resolver.cached_rates().await?;
            let stats = CacheStats::from_entries(&entries, chrono::Utc::now());
            info!(
                total = stats.total_entries,
                fresh = stats.fresh_entries,
                stale = stats.stale_entries,
                "Cache contents"
            );
            print_json(&entries)?;
        }
        Command::SetRate { base, currency, rate } => {
            let base = Currency::parse(&base)?;
            let currency = Currency::parse(&currency)?;
            let entry = resolver.set_rate(&base, &currency, rate).await?;
            print_json(&entry)?;
        }
        Command::Serve { .. } => {
            let addr: SocketAddr = config.listen_addr.parse()?;
            info!(
                cache_file = %config.cache_file.display(),
                source = %config.source_url,
                canonical_base = %config.resolver.canonical_base,
                "Starting xrate API"
            );
            api::serve(resolver, addr).await?;
        }
    }

    Ok(())
}

fn print_json<T: serde::Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
