//! State types

pub mod lending_market;
pub mod reserve;

pub use lending_market::LendingMarket;
pub use reserve::{ConfigInvariant, Reserve, ReserveConfig, ReserveConfigInput, ReserveFees};

/// Scale of precision
pub const SCALE: u32 = 18;
/// Identity
pub const WAD: u64 = 1_000_000_000_000_000_000;
/// One percent expressed in WAD
pub const PERCENT_SCALER: u64 = 10_000_000_000_000_000;
/// Upper bound of every percentage field
pub const MAX_PERCENT: u8 = 100;

static_assertions::const_assert_eq!(WAD, 10u64.pow(SCALE));
static_assertions::const_assert_eq!(WAD, PERCENT_SCALER * MAX_PERCENT as u64);

/// Size of the lending market account the program expects to initialize.
pub const LENDING_MARKET_LEN: usize = 160; // 1 + 1 + 32 + 32 + 32 + 62
/// Size of the reserve account the program expects to initialize.
pub const RESERVE_LEN: usize = 602;
