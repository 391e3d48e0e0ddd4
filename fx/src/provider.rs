//! Rate source trait and implementations.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use journalfx_common::{now, CurrencyCode, Timestamp};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{FxError, FxResult};
use crate::registry::rate_from_f64;

/// A full rate table as returned by an upstream source.
#[derive(Debug, Clone, PartialEq)]
pub struct RateSnapshot {
    /// Currency the rates are quoted against.
    pub base: CurrencyCode,
    /// Units of each currency per one unit of `base`.
    pub rates: HashMap<CurrencyCode, Decimal>,
    /// 24h price change in percent, where the feed provides it.
    pub changes: HashMap<CurrencyCode, Decimal>,
    /// When the snapshot was taken.
    pub fetched_at: Timestamp,
}

impl RateSnapshot {
    pub fn new(base: CurrencyCode) -> Self {
        Self {
            base,
            rates: HashMap::new(),
            changes: HashMap::new(),
            fetched_at: now(),
        }
    }

    pub fn with_rate(mut self, code: impl Into<CurrencyCode>, rate: Decimal) -> Self {
        self.rates.insert(code.into(), rate);
        self
    }

    pub fn with_change(mut self, code: impl Into<CurrencyCode>, change: Decimal) -> Self {
        self.changes.insert(code.into(), change);
        self
    }

    /// Re-express the snapshot against `target`.
    ///
    /// Requires `target` to be quoted in the snapshot unless it already is
    /// the base.
    pub fn rebase(self, target: &CurrencyCode) -> FxResult<Self> {
        if &self.base == target {
            return Ok(self);
        }

        let pivot = self.rates.get(target).copied().ok_or_else(|| {
            FxError::Source(format!(
                "payload quoted in {} does not include {}",
                self.base, target
            ))
        })?;

        let mut rates = HashMap::with_capacity(self.rates.len() + 1);
        for (code, rate) in self.rates {
            match rate.checked_div(pivot) {
                Some(rebased) => {
                    rates.insert(code, rebased);
                }
                None => warn!(code = %code, rate = %rate, pivot = %pivot, "Dropping rate that overflows on rebase"),
            }
        }
        if !rates.contains_key(&self.base) {
            match Decimal::ONE.checked_div(pivot) {
                Some(rate) => {
                    rates.insert(self.base.clone(), rate);
                }
                None => warn!(code = %self.base, pivot = %pivot, "Dropping rate that overflows on rebase"),
            }
        }
        rates.insert(target.clone(), Decimal::ONE);

        debug!(from = %self.base, to = %target, "Rebased rate snapshot");

        Ok(Self {
            base: target.clone(),
            rates,
            changes: self.changes,
            fetched_at: self.fetched_at,
        })
    }
}

/// How upstream numbers relate to the base currency.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuoteStyle {
    /// Units of the currency per base unit (forex style, `EUR: 0.92`).
    #[default]
    UnitsPerBase,
    /// Base-currency price of one unit (ticker style, `BTC: 65000`).
    PricePerUnit,
}

impl std::str::FromStr for QuoteStyle {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "units_per_base" | "rates" => Ok(QuoteStyle::UnitsPerBase),
            "price_per_unit" | "prices" => Ok(QuoteStyle::PricePerUnit),
            other => Err(format!("unknown quote style: {other}")),
        }
    }
}

/// Trait for upstream rate sources.
#[async_trait]
pub trait RateSource: Send + Sync {
    /// Source name for logs.
    fn name(&self) -> &str;

    /// Fetch a complete rate snapshot.
    async fn fetch_rates(&self) -> FxResult<RateSnapshot>;
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RatesPayload {
    Wrapped {
        #[serde(default)]
        base: Option<String>,
        rates: HashMap<String, f64>,
        #[serde(default)]
        change_24h: HashMap<String, f64>,
    },
    Flat(HashMap<String, f64>),
}

/// Parse a JSON rate document into a snapshot quoted in `base`.
///
/// Values that are not finite positive numbers are dropped.
pub fn parse_rates(body: &str, style: QuoteStyle, base: &CurrencyCode) -> FxResult<RateSnapshot> {
    let payload: RatesPayload = serde_json::from_str(body)
        .map_err(|e| FxError::Source(format!("malformed rate payload: {e}")))?;

    let (payload_base, raw_rates, raw_changes) = match payload {
        RatesPayload::Wrapped {
            base: payload_base,
            rates,
            change_24h,
        } => (
            payload_base.map(CurrencyCode::new).unwrap_or_else(|| base.clone()),
            rates,
            change_24h,
        ),
        RatesPayload::Flat(rates) => (base.clone(), rates, HashMap::new()),
    };

    let mut snapshot = RateSnapshot::new(payload_base);
    for (code, value) in raw_rates {
        let code = CurrencyCode::new(code);
        let rate = match rate_from_f64(&code, value) {
            Ok(rate) => rate,
            Err(e) => {
                warn!(code = %code, value, error = %e, "Dropping upstream rate");
                continue;
            }
        };
        let rate = match style {
            QuoteStyle::UnitsPerBase => rate,
            QuoteStyle::PricePerUnit => match Decimal::ONE.checked_div(rate) {
                Some(rate) => rate,
                None => {
                    warn!(code = %code, value, "Dropping price that cannot be inverted");
                    continue;
                }
            },
        };
        snapshot.rates.insert(code, rate);
    }
    for (code, value) in raw_changes {
        let code = CurrencyCode::new(code);
        match value.to_string().parse::<Decimal>() {
            Ok(change) if value.is_finite() => {
                snapshot.changes.insert(code, change);
            }
            _ => warn!(code = %code, value, "Dropping upstream price change"),
        }
    }

    if snapshot.rates.is_empty() {
        return Err(FxError::Source("rate payload contained no usable rates".into()));
    }

    snapshot.rebase(base)
}

/// Fetches a JSON rate table over HTTP.
pub struct HttpRateSource {
    client: reqwest::Client,
    url: String,
    style: QuoteStyle,
    base: CurrencyCode,
}

impl HttpRateSource {
    pub fn new(
        url: impl Into<String>,
        style: QuoteStyle,
        base: CurrencyCode,
        timeout: Duration,
    ) -> FxResult<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            url: url.into(),
            style,
            base,
        })
    }
}

#[async_trait]
impl RateSource for HttpRateSource {
    fn name(&self) -> &str {
        &self.url
    }

    async fn fetch_rates(&self) -> FxResult<RateSnapshot> {
        let response = self.client.get(&self.url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(FxError::Source(format!("{} returned {}", self.url, status)));
        }
        let body = response.text().await?;
        let snapshot = parse_rates(&body, self.style, &self.base)?;

        debug!(source = %self.url, rates = snapshot.rates.len(), "Fetched rate snapshot");
        Ok(snapshot)
    }
}

/// Always returns the same snapshot. Used for offline sessions.
pub struct StaticRateSource {
    snapshot: RateSnapshot,
}

impl StaticRateSource {
    pub fn new(snapshot: RateSnapshot) -> Self {
        Self { snapshot }
    }
}

#[async_trait]
impl RateSource for StaticRateSource {
    fn name(&self) -> &str {
        "STATIC"
    }

    async fn fetch_rates(&self) -> FxResult<RateSnapshot> {
        let mut snapshot = self.snapshot.clone();
        snapshot.fetched_at = now();
        Ok(snapshot)
    }
}

/// Programmable rate source for testing.
#[cfg(any(test, feature = "test-utils"))]
pub struct MockRateSource {
    base: CurrencyCode,
    rates: dashmap::DashMap<CurrencyCode, Decimal>,
    failure: parking_lot::Mutex<Option<String>>,
    latency: parking_lot::Mutex<Duration>,
    fetches: std::sync::atomic::AtomicUsize,
}

#[cfg(any(test, feature = "test-utils"))]
impl MockRateSource {
    pub fn new(base: CurrencyCode) -> Self {
        Self {
            base,
            rates: dashmap::DashMap::new(),
            failure: parking_lot::Mutex::new(None),
            latency: parking_lot::Mutex::new(Duration::ZERO),
            fetches: std::sync::atomic::AtomicUsize::new(0),
        }
    }

    pub fn set_rate(&self, code: impl Into<CurrencyCode>, rate: Decimal) {
        self.rates.insert(code.into(), rate);
    }

    /// Make every following fetch fail with `reason`, or succeed again on `None`.
    pub fn set_failure(&self, reason: Option<&str>) {
        *self.failure.lock() = reason.map(str::to_string);
    }

    pub fn set_latency(&self, latency: Duration) {
        *self.latency.lock() = latency;
    }

    /// Number of fetches issued so far.
    pub fn fetch_count(&self) -> usize {
        self.fetches.load(std::sync::atomic::Ordering::SeqCst)
    }
}

#[cfg(any(test, feature = "test-utils"))]
#[async_trait]
impl RateSource for MockRateSource {
    fn name(&self) -> &str {
        "MOCK"
    }

    async fn fetch_rates(&self) -> FxResult<RateSnapshot> {
        self.fetches.fetch_add(1, std::sync::atomic::Ordering::SeqCst);

        let latency = *self.latency.lock();
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }

        if let Some(reason) = self.failure.lock().clone() {
            return Err(FxError::Source(reason));
        }

        let mut snapshot = RateSnapshot::new(self.base.clone());
        for item in self.rates.iter() {
            snapshot.rates.insert(item.key().clone(), *item.value());
        }
        Ok(snapshot)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[tokio::test]
    async fn test_mock_source() {
        let source = MockRateSource::new(CurrencyCode::usd());
        source.set_rate("EUR", dec!(0.92));

        let snapshot = source.fetch_rates().await.unwrap();
        assert_eq!(snapshot.rates[&CurrencyCode::eur()], dec!(0.92));
        assert_eq!(source.fetch_count(), 1);

        source.set_failure(Some("offline"));
        assert!(matches!(source.fetch_rates().await, Err(FxError::Source(_))));
        assert_eq!(source.fetch_count(), 2);
    }

    #[test]
    fn test_parse_wrapped_payload() {
        let body = r#"{
            "base": "USD",
            "rates": { "eur": 0.92, "BTC": 0.0000153846, "BAD": -1, "ZERO": 0 },
            "change_24h": { "BTC": 2.5 }
        }"#;
        let snapshot = parse_rates(body, QuoteStyle::UnitsPerBase, &CurrencyCode::usd()).unwrap();

        assert_eq!(snapshot.base, CurrencyCode::usd());
        assert_eq!(snapshot.rates[&CurrencyCode::eur()], dec!(0.92));
        assert_eq!(snapshot.rates[&CurrencyCode::btc()], dec!(0.0000153846));
        assert!(!snapshot.rates.contains_key(&CurrencyCode::new("BAD")));
        assert!(!snapshot.rates.contains_key(&CurrencyCode::new("ZERO")));
        assert_eq!(snapshot.changes[&CurrencyCode::btc()], dec!(2.5));
    }

    #[test]
    fn test_parse_flat_prices() {
        let body = r#"{ "BTC": 50000, "ETH": 2500 }"#;
        let snapshot = parse_rates(body, QuoteStyle::PricePerUnit, &CurrencyCode::usd()).unwrap();

        assert_eq!(snapshot.rates[&CurrencyCode::btc()], dec!(0.00002));
        assert_eq!(snapshot.rates[&CurrencyCode::new("ETH")], dec!(0.0004));
    }

    #[test]
    fn test_parse_rebases_foreign_base() {
        let body = r#"{ "base": "EUR", "rates": { "USD": 2.0, "GBP": 1.0 } }"#;
        let snapshot = parse_rates(body, QuoteStyle::UnitsPerBase, &CurrencyCode::usd()).unwrap();

        assert_eq!(snapshot.base, CurrencyCode::usd());
        assert_eq!(snapshot.rates[&CurrencyCode::usd()], dec!(1));
        assert_eq!(snapshot.rates[&CurrencyCode::new("GBP")], dec!(0.5));
        assert_eq!(snapshot.rates[&CurrencyCode::eur()], dec!(0.5));
    }

    #[test]
    fn test_rebase_drops_overflowing_rates() {
        let body = r#"{
            "base": "EUR",
            "rates": { "USD": 0.0000000001, "GBP": 0.00000000005, "XXX": 79000000000000000000 }
        }"#;
        let snapshot = parse_rates(body, QuoteStyle::UnitsPerBase, &CurrencyCode::usd()).unwrap();

        assert_eq!(snapshot.base, CurrencyCode::usd());
        assert!(!snapshot.rates.contains_key(&CurrencyCode::new("XXX")));
        assert_eq!(snapshot.rates[&CurrencyCode::new("GBP")], dec!(0.5));
        assert_eq!(snapshot.rates[&CurrencyCode::usd()], dec!(1));
    }

    #[test]
    fn test_parse_rejects_unusable_payloads() {
        let usd = CurrencyCode::usd();
        assert!(parse_rates("not json", QuoteStyle::UnitsPerBase, &usd).is_err());
        assert!(parse_rates(r#"{"rates": {}}"#, QuoteStyle::UnitsPerBase, &usd).is_err());
        assert!(parse_rates(
            r#"{"base": "EUR", "rates": {"GBP": 0.8}}"#,
            QuoteStyle::UnitsPerBase,
            &usd
        )
        .is_err());
    }

    #[test]
    fn test_quote_style_from_str() {
        assert_eq!("prices".parse::<QuoteStyle>().unwrap(), QuoteStyle::PricePerUnit);
        assert_eq!("UNITS_PER_BASE".parse::<QuoteStyle>().unwrap(), QuoteStyle::UnitsPerBase);
        assert!("weird".parse::<QuoteStyle>().is_err());
    }

    #[tokio::test]
    async fn test_static_source() {
        let source = StaticRateSource::new(
            RateSnapshot::new(CurrencyCode::usd()).with_rate("EUR", dec!(0.9)),
        );
        let snapshot = source.fetch_rates().await.unwrap();
        assert_eq!(snapshot.rates.len(), 1);
    }
}
