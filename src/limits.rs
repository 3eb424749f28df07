//! Hard caps on input sizes. Anything past these is rejected with
//! `LedgerError::LimitExceeded` before touching the WAL.

pub const MAX_ROOMS: usize = 100_000;
pub const MAX_SERVICES: usize = 10_000;
pub const MAX_ACCOUNTS: usize = 1_000_000;
pub const MAX_BOOKINGS_PER_ROOM: usize = 100_000;

/// Longest single stay.
pub const MAX_STAY_NIGHTS: i64 = 365;
/// Widest window accepted by `free_windows`.
pub const MAX_QUERY_WINDOW_DAYS: i64 = 3 * 366;

pub const MAX_SERVICES_PER_BOOKING: usize = 64;
pub const MAX_SERVICE_QUANTITY: u32 = 1_000;

/// $1,000,000.00
pub const MAX_PRICE_CENTS: i64 = 100_000_000;
/// 100%. Keeps tax arithmetic inside `i64` at the largest stay.
pub const MAX_TAX_RATE_BPS: u32 = 10_000;

pub const MAX_NAME_LEN: usize = 256;
pub const MAX_TEXT_LEN: usize = 4096;
pub const MAX_PASSWORD_LEN: usize = 1024;
pub const MIN_PASSWORD_LEN: usize = 8;
