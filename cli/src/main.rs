//! JournalFx CLI
//!
//! Inspect currencies, convert amounts and watch live rate refreshes.

use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use journalfx_common::CurrencyCode;
use journalfx_fx::{
    builtin_currencies, EngineConfig, FxEngine, RateSnapshot, StaticRateSource,
};

mod commands;

/// JournalFx rate engine CLI
#[derive(Parser, Debug)]
#[command(name = "journalfx")]
#[command(about = "Live multi-currency exchange rates for the trading journal")]
struct Args {
    /// Use built-in rates instead of fetching from the network
    #[arg(long)]
    offline: bool,

    /// Emit logs as JSON
    #[arg(long)]
    json_logs: bool,

    /// Secondary display currency
    #[arg(long)]
    secondary: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List registered currencies
    List,
    /// Convert an amount between currencies
    Convert {
        amount: String,
        from: String,
        to: String,
    },
    /// Show the unit exchange rate between two currencies
    Rate {
        from: String,
        to: String,
        /// Use the four-place fiat-to-fiat rate line
        #[arg(long)]
        fiat_line: bool,
    },
    /// Refresh periodically and print every update
    Watch {
        /// Stop after this many seconds (0 = until Ctrl+C)
        #[arg(long, default_value = "0")]
        duration: u64,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Initialize logging
    let filter = tracing_subscriber::EnvFilter::new(
        std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
    );
    if args.json_logs {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    }

    let config = EngineConfig::from_env();
    config
        .validate()
        .map_err(|e| anyhow::anyhow!("Configuration error: {}", e))?;

    let engine = if args.offline {
        info!("Running offline with built-in rates");
        let snapshot = builtin_currencies().into_iter().fold(
            RateSnapshot::new(CurrencyCode::usd()),
            |snapshot, entry| snapshot.with_rate(entry.code, entry.rate),
        );
        FxEngine::new(&config, Arc::new(StaticRateSource::new(snapshot)))?
    } else {
        FxEngine::from_config(&config)?
    };
    let engine = Arc::new(engine);

    if let Some(code) = &args.secondary {
        engine.set_secondary(Some(code.as_str()))?;
    }

    if !matches!(args.command, Command::Watch { .. }) {
        if let Err(e) = engine.refresh().await {
            warn!(error = %e, "Using built-in rates");
        }
    }

    match args.command {
        Command::List => commands::list(&engine),
        Command::Convert { amount, from, to } => commands::convert(&engine, &amount, &from, &to)?,
        Command::Rate { from, to, fiat_line } => commands::rate(&engine, &from, &to, fiat_line)?,
        Command::Watch { duration } => commands::watch(engine, duration).await?,
    }

    Ok(())
}
