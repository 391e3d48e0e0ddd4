//! Primary/secondary display currency selection.

use journalfx_common::CurrencyCode;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{FxError, FxResult};
use crate::registry::RateTable;

/// Whether values render in one currency or two.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DisplayMode {
    SingleCurrency,
    DualCurrency,
}

/// Snapshot of the display currency selection.
///
/// `secondary` never equals `primary`; `show_both` is false whenever
/// `secondary` is `None`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Selection {
    pub primary: CurrencyCode,
    pub secondary: Option<CurrencyCode>,
    pub show_both: bool,
}

impl Selection {
    pub fn new(primary: CurrencyCode) -> Self {
        Self {
            primary,
            secondary: None,
            show_both: false,
        }
    }

    pub fn mode(&self) -> DisplayMode {
        match self.secondary {
            Some(_) => DisplayMode::DualCurrency,
            None => DisplayMode::SingleCurrency,
        }
    }

    /// Whether renderers should show the secondary value alongside.
    pub fn renders_secondary(&self) -> bool {
        self.secondary.is_some() && self.show_both
    }
}

/// Mutable selection guarded for shared access.
///
/// Setters return `Some(new)` when the selection changed and `None` for a
/// no-op. Failed validation leaves the selection untouched.
pub struct SelectionState {
    inner: RwLock<Selection>,
}

impl SelectionState {
    pub fn new(primary: CurrencyCode) -> Self {
        Self {
            inner: RwLock::new(Selection::new(primary)),
        }
    }

    pub fn current(&self) -> Selection {
        self.inner.read().clone()
    }

    pub fn set_primary(&self, table: &RateTable, code: &CurrencyCode) -> FxResult<Option<Selection>> {
        let code = table.get(code)?.code.clone();
        let mut sel = self.inner.write();
        if sel.primary == code {
            return Ok(None);
        }

        if sel.secondary.as_ref() == Some(&code) {
            debug!(code = %code, "New primary was secondary; clearing secondary");
            sel.secondary = None;
            sel.show_both = false;
        }
        sel.primary = code;
        Ok(Some(sel.clone()))
    }

    /// Set or clear the secondary currency.
    ///
    /// Entering dual mode turns `show_both` on; switching between two
    /// concrete secondaries keeps the current flag.
    pub fn set_secondary(
        &self,
        table: &RateTable,
        code: Option<&CurrencyCode>,
    ) -> FxResult<Option<Selection>> {
        let mut sel = self.inner.write();

        let Some(code) = code else {
            if sel.secondary.is_none() {
                return Ok(None);
            }
            sel.secondary = None;
            sel.show_both = false;
            return Ok(Some(sel.clone()));
        };

        let code = table.get(code)?.code.clone();
        if code == sel.primary {
            return Err(FxError::SameAsPrimary(code));
        }
        if sel.secondary.as_ref() == Some(&code) {
            return Ok(None);
        }

        if sel.secondary.is_none() {
            sel.show_both = true;
        }
        sel.secondary = Some(code);
        Ok(Some(sel.clone()))
    }

    /// Toggle dual display. No-op in single-currency mode.
    pub fn set_show_both(&self, show_both: bool) -> Option<Selection> {
        let mut sel = self.inner.write();
        if sel.secondary.is_none() || sel.show_both == show_both {
            return None;
        }
        sel.show_both = show_both;
        Some(sel.clone())
    }

    /// Repair references to currencies missing from `table`.
    ///
    /// A missing primary falls back to the table's default fiat currency; a
    /// missing secondary is cleared.
    pub fn reconcile(&self, table: &RateTable) -> Option<Selection> {
        let mut sel = self.inner.write();
        let mut changed = false;

        if !table.contains(&sel.primary) {
            if let Some(fallback) = table.default_fiat() {
                warn!(missing = %sel.primary, fallback = %fallback.code, "Primary currency missing; falling back");
                sel.primary = fallback.code.clone();
                changed = true;
            }
        }

        let secondary_invalid = match &sel.secondary {
            Some(code) => !table.contains(code) || *code == sel.primary,
            None => false,
        };
        if secondary_invalid {
            warn!(secondary = ?sel.secondary, "Secondary currency no longer valid; clearing");
            sel.secondary = None;
            sel.show_both = false;
            changed = true;
        }

        changed.then(|| sel.clone())
    }
}
