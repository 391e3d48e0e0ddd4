//! Currency registry and the rate table it owns.
//!
//! The table is immutable once published. Writers build a complete successor
//! and swap the shared pointer under a write lock, so a reader holding a
//! snapshot always sees either the whole old table or the whole new one.

use std::collections::HashMap;
use std::sync::Arc;

use journalfx_common::{CurrencyClass, CurrencyCode, CurrencyEntry};
use parking_lot::RwLock;
use rust_decimal::Decimal;
use tracing::{debug, info, warn};

use crate::error::{FxError, FxResult};
use crate::events::{EngineEvent, EventBus};
use crate::provider::RateSnapshot;

/// One consistent view of every registered currency.
#[derive(Debug, Clone)]
pub struct RateTable {
    base: CurrencyCode,
    entries: Vec<CurrencyEntry>,
    index: HashMap<CurrencyCode, usize>,
    version: u64,
}

impl RateTable {
    fn new(base: CurrencyCode, entries: Vec<CurrencyEntry>) -> FxResult<Self> {
        let mut index = HashMap::with_capacity(entries.len());
        for (i, entry) in entries.iter().enumerate() {
            validate_rate(&entry.code, entry.rate)?;
            if index.insert(entry.code.clone(), i).is_some() {
                return Err(FxError::DuplicateCode(entry.code.clone()));
            }
        }
        if !index.contains_key(&base) {
            return Err(FxError::NotFound(base));
        }

        Ok(Self {
            base,
            entries,
            index,
            version: 1,
        })
    }

    /// The pivot currency all rates are quoted against.
    pub fn base(&self) -> &CurrencyCode {
        &self.base
    }

    /// Built-ins in canonical order, then customs in insertion order.
    pub fn entries(&self) -> &[CurrencyEntry] {
        &self.entries
    }

    /// Incremented on every committed change.
    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, code: &CurrencyCode) -> bool {
        self.index.contains_key(code)
    }

    pub fn get(&self, code: &CurrencyCode) -> FxResult<&CurrencyEntry> {
        self.index
            .get(code)
            .map(|&i| &self.entries[i])
            .ok_or_else(|| FxError::NotFound(code.clone()))
    }

    /// Rate of `code` in units per base unit.
    pub fn rate(&self, code: &CurrencyCode) -> FxResult<Decimal> {
        self.get(code).map(|e| e.rate)
    }

    /// First fiat entry: the base if it is fiat, otherwise canonical order.
    pub fn default_fiat(&self) -> Option<&CurrencyEntry> {
        self.get(&self.base)
            .ok()
            .filter(|e| e.class == CurrencyClass::Fiat)
            .or_else(|| self.entries.iter().find(|e| e.class == CurrencyClass::Fiat))
    }
}

fn validate_rate(code: &CurrencyCode, rate: Decimal) -> FxResult<()> {
    if rate <= Decimal::ZERO {
        return Err(FxError::InvalidRate {
            code: code.clone(),
            rate: rate.to_string(),
        });
    }
    Ok(())
}

/// Convert an upstream or user-supplied float into a rate.
///
/// Goes through the shortest decimal rendering of `value` so `0.92` stays
/// `0.92`. Rejects zero, negatives, NaN and infinities.
pub fn rate_from_f64(code: &CurrencyCode, value: f64) -> FxResult<Decimal> {
    let invalid = || FxError::InvalidRate {
        code: code.clone(),
        rate: value.to_string(),
    };
    if !value.is_finite() || value <= 0.0 {
        return Err(invalid());
    }
    let rate: Decimal = value.to_string().parse().map_err(|_| invalid())?;
    validate_rate(code, rate)?;
    Ok(rate)
}

/// Shared, order-stable set of currencies with their current rates.
///
/// Outside this crate the registry only grows through `add_custom`; rates are
/// written by the refresher alone.
///
/// ```compile_fail
/// use std::collections::HashMap;
/// use journalfx_fx::{CurrencyRegistry, EventBus};
///
/// let registry = CurrencyRegistry::with_defaults(EventBus::new());
/// registry.apply_rates(&HashMap::new());
/// ```
pub struct CurrencyRegistry {
    table: RwLock<Arc<RateTable>>,
    events: EventBus,
}

impl CurrencyRegistry {
    /// Create a registry seeded with `entries`. `base` must be among them.
    pub fn new(base: CurrencyCode, entries: Vec<CurrencyEntry>, events: EventBus) -> FxResult<Self> {
        let table = RateTable::new(base, entries)?;
        Ok(Self {
            table: RwLock::new(Arc::new(table)),
            events,
        })
    }

    /// Create a registry with the built-in currencies, quoted against USD.
    pub fn with_defaults(events: EventBus) -> Self {
        let table = RateTable::new(CurrencyCode::usd(), builtin_currencies())
            .unwrap_or_else(|e| unreachable!("built-in currency table is invalid: {e}"));
        Self {
            table: RwLock::new(Arc::new(table)),
            events,
        }
    }

    /// Create a registry with the built-in currencies re-quoted against `base`.
    pub fn with_builtins(base: &CurrencyCode, events: EventBus) -> FxResult<Self> {
        let mut entries = builtin_currencies();
        let pivot = entries
            .iter()
            .find(|e| &e.code == base)
            .map(|e| e.rate)
            .ok_or_else(|| FxError::NotFound(base.clone()))?;
        for entry in entries.iter_mut() {
            entry.rate = if &entry.code == base {
                Decimal::ONE
            } else {
                entry.rate / pivot
            };
        }
        Self::new(base.clone(), entries, events)
    }

    /// Current table. Holding the `Arc` pins one consistent view.
    pub fn snapshot(&self) -> Arc<RateTable> {
        self.table.read().clone()
    }

    pub fn list(&self) -> Vec<CurrencyEntry> {
        self.snapshot().entries().to_vec()
    }

    pub fn get(&self, code: &CurrencyCode) -> FxResult<CurrencyEntry> {
        self.snapshot().get(code).cloned()
    }

    pub fn version(&self) -> u64 {
        self.snapshot().version()
    }

    /// Register a user-defined currency at the end of the list.
    pub fn add_custom(
        &self,
        code: &str,
        symbol: &str,
        name: &str,
        rate: Decimal,
        class: CurrencyClass,
    ) -> FxResult<CurrencyEntry> {
        let code = CurrencyCode::new(code);
        if !code.is_well_formed() {
            return Err(FxError::InvalidCode(code.code().to_string()));
        }
        validate_rate(&code, rate)?;

        let symbol = match symbol.trim() {
            "" => code.code().to_string(),
            s => s.to_string(),
        };
        let name = match name.trim() {
            "" => code.code().to_string(),
            s => s.to_string(),
        };
        let entry = CurrencyEntry::custom(code.clone(), symbol, name, rate, class);

        let version = {
            let mut guard = self.table.write();
            if guard.contains(&code) {
                return Err(FxError::DuplicateCode(code));
            }
            let mut next = RateTable::clone(&guard);
            next.index.insert(code.clone(), next.entries.len());
            next.entries.push(entry.clone());
            next.version += 1;
            let version = next.version;
            *guard = Arc::new(next);
            version
        };

        info!(code = %code, rate = %rate, class = %class, version, "Registered custom currency");
        self.events.publish(EngineEvent::CurrencyAdded { code });
        Ok(entry)
    }

    /// Replace rates for codes present in both `rates` and the registry.
    ///
    /// Unknown codes and invalid values are skipped; no entry is ever created.
    /// Returns the number of entries changed.
    pub(crate) fn apply_rates(&self, rates: &HashMap<CurrencyCode, Decimal>) -> usize {
        self.apply(rates, &HashMap::new())
    }

    /// Apply rates and 24h changes from a fetched snapshot in one swap.
    pub(crate) fn apply_snapshot(&self, snapshot: &RateSnapshot) -> usize {
        self.apply(&snapshot.rates, &snapshot.changes)
    }

    fn apply(
        &self,
        rates: &HashMap<CurrencyCode, Decimal>,
        changes: &HashMap<CurrencyCode, Decimal>,
    ) -> usize {
        let (updated, version) = {
            let mut guard = self.table.write();
            let mut next = RateTable::clone(&guard);
            let mut updated = 0;

            for entry in next.entries.iter_mut() {
                let mut touched = false;

                if let Some(&rate) = rates.get(&entry.code) {
                    if validate_rate(&entry.code, rate).is_err() {
                        warn!(code = %entry.code, rate = %rate, "Ignoring non-positive rate");
                    } else if entry.rate != rate {
                        entry.rate = rate;
                        touched = true;
                    }
                }
                if let Some(&change) = changes.get(&entry.code) {
                    if entry.change_24h != Some(change) {
                        entry.change_24h = Some(change);
                        touched = true;
                    }
                }
                if touched {
                    updated += 1;
                }
            }

            let ignored = rates.keys().filter(|c| !next.contains(c)).count();
            if ignored > 0 {
                debug!(ignored, "Dropped rates for unregistered codes");
            }

            if updated == 0 {
                return 0;
            }
            next.version += 1;
            let version = next.version;
            *guard = Arc::new(next);
            (updated, version)
        };

        info!(updated, version, "Applied rate update");
        self.events.publish(EngineEvent::RatesApplied { version, updated });
        updated
    }
}

/// Built-in currencies in canonical display order.
///
/// Rates are placeholders until the first refresh lands.
pub fn builtin_currencies() -> Vec<CurrencyEntry> {
    vec![
        CurrencyEntry::fiat("USD", "$", "US Dollar", Decimal::ONE),
        CurrencyEntry::fiat("EUR", "€", "Euro", Decimal::new(92, 2)),
        CurrencyEntry::fiat("GBP", "£", "British Pound", Decimal::new(79, 2)),
        CurrencyEntry::fiat("JPY", "¥", "Japanese Yen", Decimal::new(1495, 1)),
        CurrencyEntry::fiat("CAD", "C$", "Canadian Dollar", Decimal::new(136, 2)),
        CurrencyEntry::fiat("AUD", "A$", "Australian Dollar", Decimal::new(152, 2)),
        CurrencyEntry::fiat("CHF", "Fr", "Swiss Franc", Decimal::new(88, 2)),
        CurrencyEntry::fiat("CNY", "¥", "Chinese Yuan", Decimal::new(724, 2)),
        CurrencyEntry::fiat("INR", "₹", "Indian Rupee", Decimal::new(831, 1)),
        CurrencyEntry::crypto("BTC", "₿", "Bitcoin", Decimal::new(153846, 10)),
        CurrencyEntry::crypto("ETH", "Ξ", "Ethereum", Decimal::new(285714, 9)),
        CurrencyEntry::crypto("SOL", "◎", "Solana", Decimal::new(666667, 8)),
        CurrencyEntry::crypto("BNB", "BNB", "BNB", Decimal::new(17241, 7)),
        CurrencyEntry::crypto("XRP", "XRP", "XRP", Decimal::new(192308, 5)),
        CurrencyEntry::crypto("USDT", "₮", "Tether", Decimal::ONE),
    ]
}
