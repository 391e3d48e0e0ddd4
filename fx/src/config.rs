//! Engine configuration.

use std::time::Duration;

use journalfx_common::constants::{FETCH_TIMEOUT, REFRESH_INTERVAL};
use journalfx_common::CurrencyCode;

use crate::provider::QuoteStyle;

/// Upstream rate source configuration.
#[derive(Debug, Clone)]
pub struct SourceConfig {
    /// JSON endpoint returning a code-keyed rate table.
    pub url: String,
    /// Per-request timeout.
    pub timeout: Duration,
    /// How the endpoint quotes its numbers.
    pub quote_style: QuoteStyle,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            url: "https://open.er-api.com/v6/latest/USD".to_string(),
            timeout: FETCH_TIMEOUT,
            quote_style: QuoteStyle::UnitsPerBase,
        }
    }
}

/// Main engine configuration.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Pivot currency for all cross-rates.
    pub base_currency: CurrencyCode,
    /// Primary display currency at session start.
    pub default_primary: CurrencyCode,
    /// Periodic refresh cadence.
    pub refresh_interval: Duration,
    /// Upstream source.
    pub source: SourceConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            base_currency: CurrencyCode::usd(),
            default_primary: CurrencyCode::usd(),
            refresh_interval: REFRESH_INTERVAL,
            source: SourceConfig::default(),
        }
    }
}

impl EngineConfig {
    /// Load configuration from environment variables.
    ///
    /// Unset or unparseable variables keep their defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration through an arbitrary key lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        if let Some(base) = lookup("JOURNALFX_BASE") {
            config.base_currency = CurrencyCode::new(base);
        }

        if let Some(primary) = lookup("JOURNALFX_PRIMARY") {
            config.default_primary = CurrencyCode::new(primary);
        }

        if let Some(secs) = lookup("JOURNALFX_REFRESH_SECS") {
            if let Ok(secs) = secs.trim().parse() {
                config.refresh_interval = Duration::from_secs(secs);
            }
        }

        if let Some(url) = lookup("JOURNALFX_RATES_URL") {
            config.source.url = url;
        }

        if let Some(secs) = lookup("JOURNALFX_TIMEOUT_SECS") {
            if let Ok(secs) = secs.trim().parse() {
                config.source.timeout = Duration::from_secs(secs);
            }
        }

        if let Some(style) = lookup("JOURNALFX_QUOTE_STYLE") {
            if let Ok(style) = style.parse() {
                config.source.quote_style = style;
            }
        }

        config
    }

    /// Validate configuration.
    pub fn validate(&self) -> Result<(), String> {
        if !self.base_currency.is_well_formed() {
            return Err(format!("Invalid base currency: {:?}", self.base_currency.code()));
        }

        if !self.default_primary.is_well_formed() {
            return Err(format!("Invalid primary currency: {:?}", self.default_primary.code()));
        }

        if self.refresh_interval.is_zero() {
            return Err("Refresh interval cannot be 0".to_string());
        }

        if self.source.timeout.is_zero() {
            return Err("Source timeout cannot be 0".to_string());
        }

        if self.source.timeout > self.refresh_interval {
            return Err("Source timeout cannot exceed refresh interval".to_string());
        }

        if !(self.source.url.starts_with("http://") || self.source.url.starts_with("https://")) {
            return Err(format!("Rates URL must be http(s): {}", self.source.url));
        }

        Ok(())
    }
}
