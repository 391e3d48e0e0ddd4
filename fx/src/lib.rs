//! JournalFx Rate Engine
//!
//! Live multi-currency exchange-rate engine for the trading journal.
//!
//! # Features
//!
//! - Order-stable registry of fiat, crypto and user-defined currencies
//! - Atomic rate-table swaps: readers never see a half-applied refresh
//! - Coalesced refreshes with a cancellable periodic scheduler
//! - Cross-rate conversion through the base currency with per-class rounding
//! - Primary/secondary display selection with change notifications
//!
//! # Example
//!
//! ```rust,ignore
//! use journalfx_fx::{EngineConfig, FxEngine};
//! use rust_decimal_macros::dec;
//!
//! let engine = FxEngine::from_config(&EngineConfig::from_env())?;
//! engine.start();
//!
//! let eur = engine.convert(dec!(100), "USD", "EUR")?;
//! engine.set_secondary(Some("BTC"))?;
//! let shown = engine.display(dec!(250), "USD")?;
//! ```

pub mod config;
pub mod conversion;
pub mod engine;
pub mod error;
pub mod events;
pub mod provider;
pub mod refresher;
pub mod registry;
pub mod selection;

pub use config::{EngineConfig, SourceConfig};
pub use conversion::{parse_amount, Conversion, ConversionEngine, RateLine};
pub use engine::{DisplayValue, FxEngine};
pub use error::{FxError, FxResult};
pub use events::{EngineEvent, EventBus};
pub use provider::{HttpRateSource, QuoteStyle, RateSnapshot, RateSource, StaticRateSource};
pub use refresher::{RateRefresher, RefreshOutcome, RefreshStatus};
pub use registry::{builtin_currencies, CurrencyRegistry, RateTable};
pub use selection::{DisplayMode, Selection, SelectionState};

#[cfg(any(test, feature = "test-utils"))]
pub use provider::MockRateSource;
