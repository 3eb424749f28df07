use chrono::NaiveDate;
use thiserror::Error;
use ulid::Ulid;

use crate::model::BookingStatus;

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("invalid date range: check-out {check_out} must be after check-in {check_in}")]
    InvalidDateRange {
        check_in: NaiveDate,
        check_out: NaiveDate,
    },
    #[error("room not found: {0}")]
    RoomNotFound(Ulid),
    #[error("room {0} is under maintenance")]
    RoomUnderMaintenance(Ulid),
    #[error("room {room_id} is already booked for overlapping dates (booking {booking_id})")]
    DateConflict { room_id: Ulid, booking_id: Ulid },
    #[error("booking not found: {0}")]
    BookingNotFound(Ulid),
    #[error("booking {0} is already cancelled")]
    AlreadyCancelled(Ulid),
    #[error("booking {id} cannot move from {from} to {to}")]
    InvalidTransition {
        id: Ulid,
        from: BookingStatus,
        to: BookingStatus,
    },
    #[error("user not found: {0}")]
    UserNotFound(Ulid),
    #[error("an account with email {0} already exists")]
    DuplicateEmail(String),
    #[error("invalid email or password")]
    InvalidCredentials,
    #[error("room number {0} is already in use")]
    DuplicateRoomNumber(String),
    #[error("room {0} is referenced by bookings")]
    RoomHasBookings(Ulid),
    #[error("service not found: {0}")]
    ServiceNotFound(Ulid),
    #[error("service {0} is unavailable")]
    ServiceUnavailable(Ulid),
    #[error("invalid quantity {quantity} for service {service_id}")]
    InvalidQuantity { service_id: Ulid, quantity: u32 },
    #[error("payment not found: {0}")]
    PaymentNotFound(Ulid),
    #[error("payment {0} is already settled")]
    PaymentAlreadySettled(Ulid),
    #[error("booking {id} cannot take payments while {status}")]
    BookingNotPayable { id: Ulid, status: BookingStatus },
    #[error("invalid input: {0}")]
    Invalid(&'static str),
    #[error("limit exceeded: {0}")]
    LimitExceeded(&'static str),
    #[error("storage error: {0}")]
    Storage(String),
}

impl LedgerError {
    /// Stable snake_case name, used for metric labels and API error codes.
    pub fn kind(&self) -> &'static str {
        match self {
            LedgerError::InvalidDateRange { .. } => "invalid_date_range",
            LedgerError::RoomNotFound(_) => "room_not_found",
            LedgerError::RoomUnderMaintenance(_) => "room_under_maintenance",
            LedgerError::DateConflict { .. } => "date_conflict",
            LedgerError::BookingNotFound(_) => "booking_not_found",
            LedgerError::AlreadyCancelled(_) => "already_cancelled",
            LedgerError::InvalidTransition { .. } => "invalid_transition",
            LedgerError::UserNotFound(_) => "user_not_found",
            LedgerError::DuplicateEmail(_) => "duplicate_email",
            LedgerError::InvalidCredentials => "invalid_credentials",
            LedgerError::DuplicateRoomNumber(_) => "duplicate_room_number",
            LedgerError::RoomHasBookings(_) => "room_has_bookings",
            LedgerError::ServiceNotFound(_) => "service_not_found",
            LedgerError::ServiceUnavailable(_) => "service_unavailable",
            LedgerError::InvalidQuantity { .. } => "invalid_quantity",
            LedgerError::PaymentNotFound(_) => "payment_not_found",
            LedgerError::PaymentAlreadySettled(_) => "payment_already_settled",
            LedgerError::BookingNotPayable { .. } => "booking_not_payable",
            LedgerError::Invalid(_) => "invalid",
            LedgerError::LimitExceeded(_) => "limit_exceeded",
            LedgerError::Storage(_) => "storage",
        }
    }
}
