//! End-to-end behaviour of the engine facade.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use journalfx_common::CurrencyCode;
use journalfx_fx::{
    EngineConfig, EngineEvent, FxEngine, FxError, FxResult, RateSnapshot, RateSource,
};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use tokio::sync::Notify;

/// Source that blocks every fetch until the gate is opened.
struct GatedSource {
    gate: Notify,
    fetches: AtomicUsize,
    snapshot: RateSnapshot,
}

impl GatedSource {
    fn new(snapshot: RateSnapshot) -> Self {
        Self {
            gate: Notify::new(),
            fetches: AtomicUsize::new(0),
            snapshot,
        }
    }
}

#[async_trait]
impl RateSource for GatedSource {
    fn name(&self) -> &str {
        "GATED"
    }

    async fn fetch_rates(&self) -> FxResult<RateSnapshot> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        self.gate.notified().await;
        Ok(self.snapshot.clone())
    }
}

struct FailingSource;

#[async_trait]
impl RateSource for FailingSource {
    fn name(&self) -> &str {
        "FAILING"
    }

    async fn fetch_rates(&self) -> FxResult<RateSnapshot> {
        Err(FxError::Source("upstream returned 503".into()))
    }
}

fn scenario_snapshot() -> RateSnapshot {
    RateSnapshot::new(CurrencyCode::usd())
        .with_rate("USD", dec!(1))
        .with_rate("EUR", dec!(0.92))
        .with_rate("BTC", Decimal::ONE / dec!(65000))
        .with_change("BTC", dec!(1.75))
}

#[tokio::test]
async fn overlapping_refreshes_issue_one_fetch() {
    let source = Arc::new(GatedSource::new(scenario_snapshot()));
    let engine = Arc::new(FxEngine::new(&EngineConfig::default(), source.clone()).unwrap());

    let waiters: Vec<_> = (0..8)
        .map(|_| {
            let engine = engine.clone();
            tokio::spawn(async move { engine.refresh().await })
        })
        .collect();

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(engine.refresh_status().is_updating);
    source.gate.notify_one();

    for waiter in waiters {
        waiter.await.unwrap().unwrap();
    }
    assert_eq!(source.fetches.load(Ordering::SeqCst), 1);
    assert!(!engine.refresh_status().is_updating);
}

#[tokio::test]
async fn scenario_after_refresh() {
    let source = Arc::new(GatedSource::new(scenario_snapshot()));
    let engine = FxEngine::new(&EngineConfig::default(), source.clone()).unwrap();
    let mut events = engine.subscribe();

    let refresh = engine.refresh();
    tokio::pin!(refresh);
    tokio::select! {
        _ = &mut refresh => panic!("refresh must wait for the gate"),
        _ = tokio::time::sleep(Duration::from_millis(20)) => {}
    }
    source.gate.notify_one();
    refresh.await.unwrap();

    assert!(matches!(
        events.recv().await.unwrap(),
        EngineEvent::RatesApplied { .. }
    ));
    assert_eq!(engine.convert(dec!(100), "USD", "EUR").unwrap(), dec!(92.00));
    assert_eq!(engine.convert(dec!(1), "BTC", "USD").unwrap(), dec!(65000.00));
    assert_eq!(
        engine.convert(dec!(65000), "USD", "BTC").unwrap().to_string(),
        "1.00000000"
    );
    assert_eq!(engine.fiat_rate_line("USD", "EUR").unwrap().to_string(), "0.9200");
    assert_eq!(engine.get("btc").unwrap().change_24h, Some(dec!(1.75)));
}

#[tokio::test]
async fn failed_refresh_is_non_fatal() {
    let engine = FxEngine::new(&EngineConfig::default(), Arc::new(FailingSource)).unwrap();
    let before = engine.list();

    let err = engine.refresh().await.unwrap_err();

    assert_eq!(err.error_code(), "REFRESH_FAILED");
    assert!(err.is_retryable());
    assert_eq!(engine.list(), before);
    assert!(engine.refresh_status().last_updated.is_none());
    assert!(!engine.refresh_status().is_updating);
    assert_eq!(engine.convert(dec!(100), "USD", "EUR").unwrap(), dec!(92.00));
}

#[test]
fn selection_rules_hold_through_the_facade() {
    let engine = FxEngine::new(&EngineConfig::default(), Arc::new(FailingSource)).unwrap();

    assert_eq!(
        engine.set_primary("nope").unwrap_err(),
        FxError::NotFound(CurrencyCode::new("NOPE"))
    );

    engine.set_secondary(Some("EUR")).unwrap();
    let sel = engine.set_primary("eur").unwrap();
    assert_eq!(sel.primary, CurrencyCode::eur());
    assert_eq!(sel.secondary, None);

    let before = engine.selection();
    assert!(matches!(
        engine.set_secondary(Some("EUR")),
        Err(FxError::SameAsPrimary(_))
    ));
    assert_eq!(engine.selection(), before);

    assert!(!engine.set_show_both(true).show_both);
}
