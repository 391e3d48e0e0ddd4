//! Main FX engine implementation.
//!
//! [`FxEngine`] owns the registry, selection and refresher for one session
//! and is meant to be shared behind an `Arc` with every consumer.

use std::sync::Arc;

use journalfx_common::{CurrencyClass, CurrencyCode, CurrencyEntry, Money};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::{info, instrument};

use crate::config::EngineConfig;
use crate::conversion::{Conversion, ConversionEngine};
use crate::error::FxResult;
use crate::events::{EngineEvent, EventBus};
use crate::provider::{HttpRateSource, RateSource};
use crate::refresher::{RateRefresher, RefreshOutcome, RefreshStatus};
use crate::registry::{CurrencyRegistry, RateTable};
use crate::selection::{Selection, SelectionState};

/// A value rendered in the selected display currencies.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DisplayValue {
    pub primary: Money,
    /// Present only when dual display is active.
    pub secondary: Option<Money>,
}

/// The rate engine for one session.
pub struct FxEngine {
    registry: Arc<CurrencyRegistry>,
    selection: SelectionState,
    refresher: RateRefresher,
    events: EventBus,
}

impl FxEngine {
    /// Create an engine with built-in currencies and the given source.
    pub fn new(config: &EngineConfig, source: Arc<dyn RateSource>) -> FxResult<Self> {
        let events = EventBus::new();
        let registry = Arc::new(CurrencyRegistry::with_builtins(
            &config.base_currency,
            events.clone(),
        )?);
        Ok(Self::with_registry(registry, events, source, config))
    }

    /// Create an engine that fetches from the configured HTTP endpoint.
    pub fn from_config(config: &EngineConfig) -> FxResult<Self> {
        let source = HttpRateSource::new(
            config.source.url.clone(),
            config.source.quote_style,
            config.base_currency.clone(),
            config.source.timeout,
        )?;
        Self::new(config, Arc::new(source))
    }

    /// Create an engine around an existing registry.
    ///
    /// `events` should be the bus the registry publishes to.
    pub fn with_registry(
        registry: Arc<CurrencyRegistry>,
        events: EventBus,
        source: Arc<dyn RateSource>,
        config: &EngineConfig,
    ) -> Self {
        let selection = SelectionState::new(config.default_primary.clone());
        selection.reconcile(&registry.snapshot());

        let refresher = RateRefresher::new(
            source,
            registry.clone(),
            events.clone(),
            config.refresh_interval,
        );

        info!(
            base = %registry.snapshot().base(),
            primary = %selection.current().primary,
            currencies = registry.snapshot().len(),
            "FX engine created"
        );

        Self {
            registry,
            selection,
            refresher,
            events,
        }
    }

    pub fn registry(&self) -> &Arc<CurrencyRegistry> {
        &self.registry
    }

    /// Pin the current rate table for a batch of consistent reads.
    pub fn snapshot(&self) -> Arc<RateTable> {
        self.registry.snapshot()
    }

    pub fn list(&self) -> Vec<CurrencyEntry> {
        self.registry.list()
    }

    pub fn get(&self, code: &str) -> FxResult<CurrencyEntry> {
        self.registry.get(&CurrencyCode::new(code))
    }

    pub fn convert(&self, amount: Decimal, from: &str, to: &str) -> FxResult<Decimal> {
        let table = self.snapshot();
        ConversionEngine::new(&table).convert(amount, &CurrencyCode::new(from), &CurrencyCode::new(to))
    }

    /// Convert raw user input; empty or non-numeric input converts as zero.
    pub fn convert_input(&self, input: &str, from: &str, to: &str) -> FxResult<Decimal> {
        let table = self.snapshot();
        ConversionEngine::new(&table).convert_input(input, &CurrencyCode::new(from), &CurrencyCode::new(to))
    }

    pub fn quote(&self, amount: Decimal, from: &str, to: &str) -> FxResult<Conversion> {
        let table = self.snapshot();
        ConversionEngine::new(&table).quote(amount, &CurrencyCode::new(from), &CurrencyCode::new(to))
    }

    /// Unit rate at the target's amount precision (`USD -> EUR` is `0.92`).
    ///
    /// Fiat-pair rate displays should use [`FxEngine::fiat_rate_line`], which
    /// renders four places (`0.9200`).
    pub fn rate_of(&self, from: &str, to: &str) -> FxResult<Decimal> {
        let table = self.snapshot();
        ConversionEngine::new(&table).rate_of(&CurrencyCode::new(from), &CurrencyCode::new(to))
    }

    /// Unit rate on the four-place fiat-to-fiat line.
    pub fn fiat_rate_line(&self, from: &str, to: &str) -> FxResult<Decimal> {
        let table = self.snapshot();
        ConversionEngine::new(&table).fiat_rate_line(&CurrencyCode::new(from), &CurrencyCode::new(to))
    }

    /// Render `amount` of `from` in the selected display currencies.
    ///
    /// Both values are computed from the same rate table.
    pub fn display(&self, amount: Decimal, from: &str) -> FxResult<DisplayValue> {
        let table = self.snapshot();
        let engine = ConversionEngine::new(&table);
        let from = CurrencyCode::new(from);
        let sel = self.reconcile_selection(&table);

        let render = |to: &CurrencyCode| -> FxResult<Money> {
            let value = engine.convert(amount, &from, to)?;
            Ok(Money::of(value, table.get(to)?))
        };

        let primary = render(&sel.primary)?;
        let secondary = match (&sel.secondary, sel.show_both) {
            (Some(code), true) => Some(render(code)?),
            _ => None,
        };
        Ok(DisplayValue { primary, secondary })
    }

    pub fn selection(&self) -> Selection {
        self.reconcile_selection(&self.snapshot())
    }

    pub fn refresh_status(&self) -> RefreshStatus {
        self.refresher.status()
    }

    /// Register a custom fiat-class currency.
    pub fn add_custom(&self, code: &str, symbol: &str, name: &str, rate: Decimal) -> FxResult<CurrencyEntry> {
        self.add_custom_as(code, symbol, name, rate, CurrencyClass::Fiat)
    }

    /// Register a custom currency with an explicit precision class.
    pub fn add_custom_as(
        &self,
        code: &str,
        symbol: &str,
        name: &str,
        rate: Decimal,
        class: CurrencyClass,
    ) -> FxResult<CurrencyEntry> {
        let entry = self.registry.add_custom(code, symbol, name, rate, class)?;
        self.reconcile_selection(&self.snapshot());
        Ok(entry)
    }

    #[instrument(skip(self))]
    pub fn set_primary(&self, code: &str) -> FxResult<Selection> {
        let table = self.snapshot();
        let changed = self.selection.set_primary(&table, &CurrencyCode::new(code))?;
        Ok(self.publish_selection(changed))
    }

    #[instrument(skip(self))]
    pub fn set_secondary(&self, code: Option<&str>) -> FxResult<Selection> {
        let table = self.snapshot();
        let code = code.map(CurrencyCode::new);
        let changed = self.selection.set_secondary(&table, code.as_ref())?;
        Ok(self.publish_selection(changed))
    }

    pub fn set_show_both(&self, show_both: bool) -> Selection {
        let changed = self.selection.set_show_both(show_both);
        self.publish_selection(changed)
    }

    /// Repair the selection against `table`, announcing any repair.
    fn reconcile_selection(&self, table: &RateTable) -> Selection {
        let repaired = self.selection.reconcile(table);
        self.publish_selection(repaired)
    }

    fn publish_selection(&self, changed: Option<Selection>) -> Selection {
        match changed {
            Some(sel) => {
                info!(
                    primary = %sel.primary,
                    secondary = ?sel.secondary.as_ref().map(|c| c.code()),
                    show_both = sel.show_both,
                    "Selection changed"
                );
                self.events.publish(EngineEvent::SelectionChanged(sel.clone()));
                sel
            }
            None => self.selection.current(),
        }
    }

    /// Fetch fresh rates, joining any refresh already in flight.
    pub async fn refresh(&self) -> FxResult<RefreshOutcome> {
        let outcome = self.refresher.refresh().await?;
        self.reconcile_selection(&self.snapshot());
        Ok(outcome)
    }

    /// Start the periodic refresh. Must run inside a tokio runtime.
    pub fn start(&self) -> bool {
        self.refresher.start()
    }

    /// Stop the periodic refresh; an in-flight fetch still completes.
    pub fn stop(&self) -> bool {
        self.refresher.stop()
    }

    pub fn is_running(&self) -> bool {
        self.refresher.is_running()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<EngineEvent> {
        self.events.subscribe()
    }
}
