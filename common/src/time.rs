//! Time utilities and constants for the rate engine.

use chrono::{DateTime, Duration, Utc};

/// Engine timing constants.
pub mod constants {
    use std::time::Duration;

    /// Cadence of the periodic rate refresh (60 seconds).
    pub const REFRESH_INTERVAL: Duration = Duration::from_secs(60);

    /// Upper bound on a single upstream fetch (10 seconds).
    pub const FETCH_TIMEOUT: Duration = Duration::from_secs(10);

    /// Capacity of the engine event channel.
    pub const EVENT_CHANNEL_CAPACITY: usize = 64;
}

/// Decimal places used when rounding values for display.
pub mod precision {
    /// Converted fiat amounts.
    pub const FIAT_AMOUNT_DP: u32 = 2;

    /// Converted crypto amounts.
    pub const CRYPTO_AMOUNT_DP: u32 = 8;

    /// The dedicated fiat-to-fiat unit rate line.
    pub const FIAT_RATE_LINE_DP: u32 = 4;
}

/// A UTC timestamp.
pub type Timestamp = DateTime<Utc>;

/// Get the current timestamp.
pub fn now() -> Timestamp {
    Utc::now()
}

/// Whether `timestamp` is older than `max_age`.
///
/// A missing timestamp (never refreshed) is always stale.
pub fn is_stale(timestamp: Option<Timestamp>, max_age: Duration) -> bool {
    match timestamp {
        Some(at) => now() - at > max_age,
        None => true,
    }
}

/// Age of a timestamp, clamped at zero for clock skew.
pub fn age_of(timestamp: Timestamp) -> Duration {
    let age = now() - timestamp;
    if age < Duration::zero() {
        Duration::zero()
    } else {
        age
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_stale() {
        let recent = now() - Duration::seconds(10);
        assert!(!is_stale(Some(recent), Duration::seconds(60)));

        let old = now() - Duration::minutes(10);
        assert!(is_stale(Some(old), Duration::seconds(60)));

        assert!(is_stale(None, Duration::seconds(60)));
    }

    #[test]
    fn test_age_clamped() {
        let future = now() + Duration::seconds(30);
        assert_eq!(age_of(future), Duration::zero());
    }
}
