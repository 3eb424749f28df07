use chrono::NaiveDate;

use crate::limits::*;
use crate::model::*;

use super::LedgerError;

pub(crate) fn now_ms() -> Ms {
    chrono::Utc::now().timestamp_millis()
}

/// Validate a requested stay and turn it into a `StayRange`.
pub(crate) fn validate_range(
    check_in: NaiveDate,
    check_out: NaiveDate,
) -> Result<StayRange, LedgerError> {
    if check_in >= check_out {
        return Err(LedgerError::InvalidDateRange { check_in, check_out });
    }
    let stay = StayRange::new(check_in, check_out);
    if stay.nights() > MAX_STAY_NIGHTS {
        return Err(LedgerError::LimitExceeded("stay too long"));
    }
    Ok(stay)
}

/// Like `validate_range`, for read-only calendar windows.
pub(crate) fn validate_window(from: NaiveDate, to: NaiveDate) -> Result<StayRange, LedgerError> {
    if from >= to {
        return Err(LedgerError::InvalidDateRange {
            check_in: from,
            check_out: to,
        });
    }
    let window = StayRange::new(from, to);
    if window.nights() > MAX_QUERY_WINDOW_DAYS {
        return Err(LedgerError::LimitExceeded("query window too wide"));
    }
    Ok(window)
}

/// Fails with the first non-cancelled booking overlapping `stay`.
/// Caller must hold the room lock for the result to stay true.
pub(crate) fn check_no_conflict(rs: &RoomState, stay: &StayRange) -> Result<(), LedgerError> {
    match rs.blocking(stay).next() {
        Some(existing) => Err(LedgerError::DateConflict {
            room_id: rs.room.id,
            booking_id: existing.id,
        }),
        None => Ok(()),
    }
}

/// Maintenance overrides every date range.
pub(crate) fn check_bookable(rs: &RoomState) -> Result<(), LedgerError> {
    if rs.room.status == RoomStatus::Maintenance {
        return Err(LedgerError::RoomUnderMaintenance(rs.room.id));
    }
    Ok(())
}
