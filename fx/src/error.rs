//! FX engine error types.

use journalfx_common::CurrencyCode;
use thiserror::Error;

/// Errors that can occur in the FX engine.
///
/// Validation errors never mutate state. The type is `Clone` so a single
/// refresh outcome can be handed to every coalesced waiter.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FxError {
    /// Currency code is not registered.
    #[error("Currency not found: {0}")]
    NotFound(CurrencyCode),

    /// Currency code is already registered (case-insensitive).
    #[error("Currency already registered: {0}")]
    DuplicateCode(CurrencyCode),

    /// Rate is zero, negative or not a finite number.
    #[error("Invalid rate {rate} for {code}")]
    InvalidRate { code: CurrencyCode, rate: String },

    /// Code is empty or contains unsupported characters.
    #[error("Invalid currency code: {0:?}")]
    InvalidCode(String),

    /// Secondary currency cannot equal the primary.
    #[error("Secondary currency cannot equal primary {0}")]
    SameAsPrimary(CurrencyCode),

    /// Arithmetic left the representable decimal range.
    #[error("Amount out of range converting {from} to {to}")]
    AmountOutOfRange { from: CurrencyCode, to: CurrencyCode },

    /// Rate source transport or payload error.
    #[error("Rate source error: {0}")]
    Source(String),

    /// A refresh did not complete; prior rates remain authoritative.
    #[error("Rate refresh failed: {0}")]
    RefreshFailed(String),
}

impl FxError {
    /// Stable code for consumers that branch on error kind.
    pub fn error_code(&self) -> &'static str {
        match self {
            FxError::NotFound(_) => "NOT_FOUND",
            FxError::DuplicateCode(_) => "DUPLICATE_CODE",
            FxError::InvalidRate { .. } => "INVALID_RATE",
            FxError::InvalidCode(_) => "INVALID_CODE",
            FxError::SameAsPrimary(_) => "SAME_AS_PRIMARY",
            FxError::AmountOutOfRange { .. } => "AMOUNT_OUT_OF_RANGE",
            FxError::Source(_) => "SOURCE_ERROR",
            FxError::RefreshFailed(_) => "REFRESH_FAILED",
        }
    }

    /// Whether a later refresh may succeed where this one failed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, FxError::Source(_) | FxError::RefreshFailed(_))
    }
}

impl From<reqwest::Error> for FxError {
    fn from(err: reqwest::Error) -> Self {
        FxError::Source(err.to_string())
    }
}

/// Result type for FX operations.
pub type FxResult<T> = Result<T, FxError>;
