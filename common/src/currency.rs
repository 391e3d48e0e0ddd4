//! Currency types for the rate engine.

use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::time::precision;

/// Currency code, compared case-insensitively.
///
/// Codes are normalized to upper case on construction so `"eur"` and `"EUR"`
/// name the same currency everywhere.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CurrencyCode(String);

impl CurrencyCode {
    /// Longest code accepted for user-registered currencies.
    pub const MAX_LEN: usize = 10;

    /// Create a new code, trimming whitespace and upper-casing.
    pub fn new(code: impl Into<String>) -> Self {
        Self(code.into().trim().to_uppercase())
    }

    /// Get the normalized code.
    pub fn code(&self) -> &str {
        &self.0
    }

    /// Non-empty, at most [`Self::MAX_LEN`] ASCII alphanumerics.
    pub fn is_well_formed(&self) -> bool {
        !self.0.is_empty()
            && self.0.len() <= Self::MAX_LEN
            && self.0.chars().all(|c| c.is_ascii_alphanumeric())
    }

    pub fn usd() -> Self {
        Self::new("USD")
    }

    pub fn eur() -> Self {
        Self::new("EUR")
    }

    pub fn btc() -> Self {
        Self::new("BTC")
    }
}

impl fmt::Display for CurrencyCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for CurrencyCode {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for CurrencyCode {
    fn from(s: String) -> Self {
        Self::new(s)
    }
}

/// Precision class of a currency, fixed at registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum CurrencyClass {
    Fiat,
    Crypto,
}

impl CurrencyClass {
    /// Decimal places for converted amounts and general rate display.
    pub fn decimal_places(&self) -> u32 {
        match self {
            CurrencyClass::Fiat => precision::FIAT_AMOUNT_DP,
            CurrencyClass::Crypto => precision::CRYPTO_AMOUNT_DP,
        }
    }

    pub fn is_crypto(&self) -> bool {
        matches!(self, CurrencyClass::Crypto)
    }
}

impl fmt::Display for CurrencyClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CurrencyClass::Fiat => write!(f, "FIAT"),
            CurrencyClass::Crypto => write!(f, "CRYPTO"),
        }
    }
}

/// Round half away from zero to exactly `dp` places.
///
/// Shorter values are padded, so `0.92` at four places renders as `0.9200`.
pub fn round_to(value: Decimal, dp: u32) -> Decimal {
    let mut rounded = value.round_dp_with_strategy(dp, RoundingStrategy::MidpointAwayFromZero);
    rounded.rescale(dp);
    rounded
}

/// A currency known to the registry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CurrencyEntry {
    /// Unique code.
    pub code: CurrencyCode,
    /// Display symbol, e.g. `€`.
    pub symbol: String,
    /// Human-readable name.
    pub name: String,
    /// Units of this currency per one unit of the base currency.
    pub rate: Decimal,
    /// Precision class.
    pub class: CurrencyClass,
    /// Registered by the user rather than built in.
    pub is_custom: bool,
    /// 24h price change in percent, when the feed supplies one.
    pub change_24h: Option<Decimal>,
}

impl CurrencyEntry {
    /// Create a built-in fiat entry.
    pub fn fiat(code: &str, symbol: &str, name: &str, rate: Decimal) -> Self {
        Self::builtin(code, symbol, name, rate, CurrencyClass::Fiat)
    }

    /// Create a built-in crypto entry.
    pub fn crypto(code: &str, symbol: &str, name: &str, rate: Decimal) -> Self {
        Self::builtin(code, symbol, name, rate, CurrencyClass::Crypto)
    }

    /// Create a user-registered entry.
    pub fn custom(
        code: CurrencyCode,
        symbol: impl Into<String>,
        name: impl Into<String>,
        rate: Decimal,
        class: CurrencyClass,
    ) -> Self {
        Self {
            code,
            symbol: symbol.into(),
            name: name.into(),
            rate,
            class,
            is_custom: true,
            change_24h: None,
        }
    }

    fn builtin(code: &str, symbol: &str, name: &str, rate: Decimal, class: CurrencyClass) -> Self {
        Self {
            code: CurrencyCode::new(code),
            symbol: symbol.to_string(),
            name: name.to_string(),
            rate,
            class,
            is_custom: false,
            change_24h: None,
        }
    }

    /// Round a value to this currency's amount precision.
    pub fn round(&self, value: Decimal) -> Decimal {
        round_to(value, self.class.decimal_places())
    }
}

/// A rounded amount ready for rendering.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Money {
    /// Amount value.
    pub value: Decimal,
    /// Currency code.
    pub currency: CurrencyCode,
    /// Symbol used when rendering.
    pub symbol: String,
    /// Precision class of the currency.
    pub class: CurrencyClass,
}

impl Money {
    /// Create an amount in the entry's currency, rounded to its precision.
    pub fn of(value: Decimal, entry: &CurrencyEntry) -> Self {
        Self {
            value: entry.round(value),
            currency: entry.code.clone(),
            symbol: entry.symbol.clone(),
            class: entry.class,
        }
    }

    pub fn is_zero(&self) -> bool {
        self.value.is_zero()
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let dp = self.class.decimal_places() as usize;
        if self.value.is_sign_negative() && !self.value.is_zero() {
            write!(f, "-{}{:.*}", self.symbol, dp, self.value.abs())
        } else {
            write!(f, "{}{:.*}", self.symbol, dp, self.value)
        }
    }
}
