//! Subcommand implementations.

use std::sync::Arc;
use std::time::Duration;

use journalfx_fx::{parse_amount, EngineEvent, FxEngine};
use tokio::sync::broadcast::error::RecvError;
use tracing::{info, warn};

/// Print every registered currency with its rate against the base.
pub fn list(engine: &FxEngine) {
    let table = engine.snapshot();
    println!("{:<6} {:<4} {:<22} {:<7} {:>20}  {}", "CODE", "SYM", "NAME", "CLASS", "RATE", "24H");
    for entry in table.entries() {
        let change = entry
            .change_24h
            .map(|c| {
                if c.is_sign_negative() {
                    format!("{:.2}%", c)
                } else {
                    format!("+{:.2}%", c)
                }
            })
            .unwrap_or_else(|| "-".to_string());
        let custom = if entry.is_custom { " (custom)" } else { "" };
        println!(
            "{:<6} {:<4} {:<22} {:<7} {:>20}  {}{}",
            entry.code.code(),
            entry.symbol,
            entry.name,
            entry.class.to_string(),
            entry.rate.normalize().to_string(),
            change,
            custom
        );
    }
    let status = engine.refresh_status();
    match status.last_updated {
        Some(at) => println!("\nbase {} · version {} · updated {}", table.base(), table.version(), at),
        None => println!("\nbase {} · version {} · built-in rates", table.base(), table.version()),
    }
}

pub fn convert(engine: &FxEngine, amount: &str, from: &str, to: &str) -> anyhow::Result<()> {
    let quote = engine.quote(parse_amount(amount), from, to)?;
    println!("{}", quote.output);
    println!("1 {} = {} {}", quote.from, quote.unit_rate, quote.output.currency);

    let shown = engine.display(quote.input, from)?;
    match shown.secondary {
        Some(secondary) => println!("display: {} / {}", shown.primary, secondary),
        None => println!("display: {}", shown.primary),
    }
    Ok(())
}

pub fn rate(engine: &FxEngine, from: &str, to: &str, fiat_line: bool) -> anyhow::Result<()> {
    let rate = if fiat_line {
        engine.fiat_rate_line(from, to)?
    } else {
        engine.rate_of(from, to)?
    };
    println!("1 {} = {} {}", from.to_uppercase(), rate, to.to_uppercase());
    Ok(())
}

/// Run the periodic refresher and report events until stopped.
pub async fn watch(engine: Arc<FxEngine>, duration: u64) -> anyhow::Result<()> {
    let mut events = engine.subscribe();
    engine.start();
    info!("Watching rates; press Ctrl+C to stop");

    let deadline = async {
        if duration > 0 {
            tokio::time::sleep(Duration::from_secs(duration)).await;
        } else {
            std::future::pending::<()>().await;
        }
    };
    tokio::pin!(deadline);

    loop {
        tokio::select! {
            event = events.recv() => match event {
                Ok(EngineEvent::RatesApplied { version, updated }) => {
                    let primary = engine.selection().primary;
                    let line = engine
                        .rate_of("BTC", primary.code())
                        .map(|r| format!("1 BTC = {} {}", r, primary))
                        .unwrap_or_default();
                    println!("v{version}: {updated} rates updated  {line}");
                }
                Ok(EngineEvent::RefreshFailed { reason }) => {
                    println!("refresh failed: {reason}");
                }
                Ok(other) => println!("{other:?}"),
                Err(RecvError::Lagged(skipped)) => warn!(skipped, "Event consumer lagged"),
                Err(RecvError::Closed) => break,
            },
            _ = tokio::signal::ctrl_c() => {
                info!("Shutdown signal received");
                break;
            }
            _ = &mut deadline => break,
        }
    }

    engine.stop();
    Ok(())
}
