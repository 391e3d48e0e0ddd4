//! JournalFx Common Types
//!
//! Currency vocabulary shared across the JournalFx crates: codes, precision
//! classes, registry entries, display amounts and timing constants.

pub mod currency;
pub mod time;

pub use currency::*;
pub use time::*;
