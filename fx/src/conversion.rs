//! Amount conversion and cross-rate display.
//!
//! Every cross-rate goes through the base currency: an amount is first
//! divided by the source rate, then multiplied by the target rate. All
//! operations read a single [`RateTable`], so one call never mixes rates
//! from two refreshes.

use std::str::FromStr;

use journalfx_common::{precision, round_to, CurrencyCode, Money, Timestamp};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::{FxError, FxResult};
use crate::registry::RateTable;

/// Parse user input into an amount.
///
/// Empty or non-numeric input is zero. Thousands separators and surrounding
/// whitespace are ignored.
pub fn parse_amount(input: &str) -> Decimal {
    let cleaned: String = input
        .trim()
        .chars()
        .filter(|c| *c != ',' && *c != '_' && !c.is_whitespace())
        .collect();
    let cleaned = cleaned.strip_prefix('+').unwrap_or(&cleaned);

    Decimal::from_str(cleaned)
        .or_else(|_| Decimal::from_scientific(cleaned))
        .unwrap_or(Decimal::ZERO)
}

/// Which display rule a unit rate is rendered with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RateLine {
    /// General converter panel: target class precision.
    General,
    /// Dedicated fiat-to-fiat line: fixed four places.
    FiatPair,
}

impl RateLine {
    fn decimal_places(&self, target: &journalfx_common::CurrencyEntry) -> u32 {
        match self {
            RateLine::General => target.class.decimal_places(),
            RateLine::FiatPair => precision::FIAT_RATE_LINE_DP,
        }
    }
}

/// Result of a detailed conversion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Conversion {
    /// Input amount, unrounded.
    pub input: Decimal,
    /// Source currency.
    pub from: CurrencyCode,
    /// Rounded output.
    pub output: Money,
    /// Unit rate on the general display rule.
    pub unit_rate: Decimal,
    /// Version of the table the conversion read.
    pub table_version: u64,
    /// When the conversion was computed.
    pub executed_at: Timestamp,
}

/// Pure conversion functions over one rate table.
#[derive(Debug, Clone, Copy)]
pub struct ConversionEngine<'a> {
    table: &'a RateTable,
}

impl<'a> ConversionEngine<'a> {
    pub fn new(table: &'a RateTable) -> Self {
        Self { table }
    }

    /// Convert `amount` of `from` into `to`.
    ///
    /// Same-currency conversion returns `amount` untouched. Otherwise the
    /// result is rounded to the target's class precision.
    pub fn convert(&self, amount: Decimal, from: &CurrencyCode, to: &CurrencyCode) -> FxResult<Decimal> {
        let source = self.table.get(from)?;
        if from == to {
            return Ok(amount);
        }
        let target = self.table.get(to)?;

        let out_of_range = || FxError::AmountOutOfRange {
            from: from.clone(),
            to: to.clone(),
        };
        let in_base = amount.checked_div(source.rate).ok_or_else(out_of_range)?;
        let result = in_base.checked_mul(target.rate).ok_or_else(out_of_range)?;

        Ok(target.round(result))
    }

    /// Convert raw user input; unparseable input converts as zero.
    pub fn convert_input(&self, input: &str, from: &CurrencyCode, to: &CurrencyCode) -> FxResult<Decimal> {
        self.convert(parse_amount(input), from, to)
    }

    /// Units of `to` per one unit of `from`, on the general display rule.
    pub fn rate_of(&self, from: &CurrencyCode, to: &CurrencyCode) -> FxResult<Decimal> {
        self.rate_line(from, to, RateLine::General)
    }

    /// Unit rate on the fiat-to-fiat line (four places).
    pub fn fiat_rate_line(&self, from: &CurrencyCode, to: &CurrencyCode) -> FxResult<Decimal> {
        self.rate_line(from, to, RateLine::FiatPair)
    }

    /// Unit rate rendered with an explicit display rule.
    pub fn rate_line(&self, from: &CurrencyCode, to: &CurrencyCode, line: RateLine) -> FxResult<Decimal> {
        let source = self.table.get(from)?;
        let target = self.table.get(to)?;

        let raw = target
            .rate
            .checked_div(source.rate)
            .ok_or_else(|| FxError::AmountOutOfRange {
                from: from.clone(),
                to: to.clone(),
            })?;
        Ok(round_to(raw, line.decimal_places(target)))
    }

    /// Convert and package the result with its provenance.
    pub fn quote(&self, amount: Decimal, from: &CurrencyCode, to: &CurrencyCode) -> FxResult<Conversion> {
        let value = self.convert(amount, from, to)?;
        let target = self.table.get(to)?;
        let output = if from == to {
            Money {
                value,
                currency: target.code.clone(),
                symbol: target.symbol.clone(),
                class: target.class,
            }
        } else {
            Money::of(value, target)
        };

        Ok(Conversion {
            input: amount,
            from: from.clone(),
            output,
            unit_rate: self.rate_of(from, to)?,
            table_version: self.table.version(),
            executed_at: journalfx_common::now(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::EventBus;
    use crate::registry::{builtin_currencies, CurrencyRegistry};
    use journalfx_common::{CurrencyClass, CurrencyEntry};
    use proptest::prelude::*;
    use rust_decimal_macros::dec;

    fn scenario_registry() -> CurrencyRegistry {
        CurrencyRegistry::new(
            CurrencyCode::usd(),
            vec![
                CurrencyEntry::fiat("USD", "$", "US Dollar", dec!(1)),
                CurrencyEntry::fiat("EUR", "€", "Euro", dec!(0.92)),
                CurrencyEntry::crypto("BTC", "₿", "Bitcoin", Decimal::ONE / dec!(65000)),
            ],
            EventBus::new(),
        )
        .unwrap()
    }

    fn usd() -> CurrencyCode {
        CurrencyCode::usd()
    }

    fn eur() -> CurrencyCode {
        CurrencyCode::eur()
    }

    fn btc() -> CurrencyCode {
        CurrencyCode::btc()
    }

    #[test]
    fn test_scenario_conversions() {
        let reg = scenario_registry();
        let table = reg.snapshot();
        let engine = ConversionEngine::new(&table);

        assert_eq!(engine.convert(dec!(100), &usd(), &eur()).unwrap(), dec!(92.00));
        assert_eq!(engine.convert(dec!(1), &btc(), &usd()).unwrap(), dec!(65000.00));
        assert_eq!(
            engine.convert(dec!(65000), &usd(), &btc()).unwrap().to_string(),
            "1.00000000"
        );
        assert_eq!(engine.fiat_rate_line(&usd(), &eur()).unwrap().to_string(), "0.9200");
    }

    #[test]
    fn test_truncated_btc_rate_rounds_at_eight_places() {
        let reg = CurrencyRegistry::new(
            usd(),
            vec![
                CurrencyEntry::fiat("USD", "$", "US Dollar", dec!(1)),
                CurrencyEntry::crypto("BTC", "₿", "Bitcoin", dec!(0.0000153846)),
            ],
            EventBus::new(),
        )
        .unwrap();
        let table = reg.snapshot();
        let engine = ConversionEngine::new(&table);

        // 1 / 0.0000153846 = 65000.065..., so neither direction lands on a round value.
        assert_eq!(engine.convert(dec!(1), &btc(), &usd()).unwrap(), dec!(65000.07));
        assert_eq!(engine.convert(dec!(65000), &usd(), &btc()).unwrap(), dec!(0.99999900));
    }

    #[test]
    fn test_identity_bypasses_rounding() {
        let reg = scenario_registry();
        let table = reg.snapshot();
        let engine = ConversionEngine::new(&table);

        let odd = dec!(123.456789123);
        assert_eq!(engine.convert(odd, &eur(), &eur()).unwrap(), odd);
        assert_eq!(engine.convert(odd, &btc(), &CurrencyCode::new("btc")).unwrap(), odd);
    }

    #[test]
    fn test_unknown_codes() {
        let reg = scenario_registry();
        let table = reg.snapshot();
        let engine = ConversionEngine::new(&table);
        let xyz = CurrencyCode::new("XYZ");

        assert_eq!(
            engine.convert(dec!(1), &xyz, &usd()).unwrap_err(),
            FxError::NotFound(xyz.clone())
        );
        assert!(engine.convert(dec!(1), &usd(), &xyz).is_err());
        assert!(engine.convert(dec!(1), &xyz, &xyz).is_err());
        assert!(engine.rate_of(&usd(), &xyz).is_err());
    }

    #[test]
    fn test_rate_display_rules_differ() {
        let reg = scenario_registry();
        let table = reg.snapshot();
        let engine = ConversionEngine::new(&table);

        assert_eq!(engine.rate_of(&usd(), &eur()).unwrap().to_string(), "0.92");
        assert_eq!(engine.fiat_rate_line(&eur(), &usd()).unwrap(), dec!(1.0870));
        assert_eq!(engine.rate_of(&eur(), &usd()).unwrap(), dec!(1.09));
        assert_eq!(engine.rate_of(&usd(), &btc()).unwrap(), dec!(0.00001538));
        assert_eq!(engine.rate_of(&btc(), &usd()).unwrap(), dec!(65000.00));
    }

    #[test]
    fn test_parse_amount() {
        assert_eq!(parse_amount(""), Decimal::ZERO);
        assert_eq!(parse_amount("   "), Decimal::ZERO);
        assert_eq!(parse_amount("abc"), Decimal::ZERO);
        assert_eq!(parse_amount("1,234.50"), dec!(1234.50));
        assert_eq!(parse_amount(" +42 "), dec!(42));
        assert_eq!(parse_amount("-3.5"), dec!(-3.5));
        assert_eq!(parse_amount("1e3"), dec!(1000));
    }

    #[test]
    fn test_convert_input_non_numeric_is_zero() {
        let reg = scenario_registry();
        let table = reg.snapshot();
        let engine = ConversionEngine::new(&table);

        assert_eq!(engine.convert_input("n/a", &usd(), &eur()).unwrap(), Decimal::ZERO);
        assert_eq!(engine.convert_input("100", &usd(), &eur()).unwrap(), dec!(92));
    }

    #[test]
    fn test_quote_records_version() {
        let reg = scenario_registry();
        reg.add_custom("PTS", "P", "Points", dec!(10), CurrencyClass::Fiat)
            .unwrap();
        let table = reg.snapshot();
        let engine = ConversionEngine::new(&table);

        let quote = engine.quote(dec!(5), &usd(), &CurrencyCode::new("pts")).unwrap();
        assert_eq!(quote.output.value, dec!(50.00));
        assert_eq!(quote.output.to_string(), "P50.00");
        assert_eq!(quote.unit_rate, dec!(10.00));
        assert_eq!(quote.table_version, 2);
    }

    #[test]
    fn test_overflow_is_an_error() {
        let reg = scenario_registry();
        let table = reg.snapshot();
        let engine = ConversionEngine::new(&table);

        let err = engine.convert(Decimal::MAX, &btc(), &usd()).unwrap_err();
        assert_eq!(err.error_code(), "AMOUNT_OUT_OF_RANGE");
    }

    fn half_ulp(dp: u32) -> Decimal {
        Decimal::new(5, dp + 1)
    }

    proptest! {
        #[test]
        fn prop_identity_is_exact(cents in -1_000_000_000i64..1_000_000_000, idx in 0usize..15) {
            let reg = CurrencyRegistry::with_defaults(EventBus::new());
            let table = reg.snapshot();
            let engine = ConversionEngine::new(&table);
            let code = table.entries()[idx % table.len()].code.clone();
            let amount = Decimal::new(cents, 4);

            prop_assert_eq!(engine.convert(amount, &code, &code).unwrap(), amount);
        }

        #[test]
        fn prop_round_trip_within_precision(
            cents in 0i64..100_000_000,
            a in 0usize..15,
            b in 0usize..15,
        ) {
            let currencies = builtin_currencies();
            let a = &currencies[a % currencies.len()];
            let b = &currencies[b % currencies.len()];
            let reg = CurrencyRegistry::with_defaults(EventBus::new());
            let table = reg.snapshot();
            let engine = ConversionEngine::new(&table);
            let x = Decimal::new(cents, 2);

            let there = engine.convert(x, &a.code, &b.code).unwrap();
            let back = engine.convert(there, &b.code, &a.code).unwrap();

            let tolerance = half_ulp(b.class.decimal_places()) * a.rate / b.rate
                + half_ulp(a.class.decimal_places())
                + half_ulp(a.class.decimal_places());
            prop_assert!((back - x).abs() <= tolerance, "{} -> {} -> {}", x, there, back);
        }
    }
}
