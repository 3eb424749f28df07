use std::fmt;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use ulid::Ulid;

/// Unix milliseconds.
pub type Ms = i64;

/// Money in the smallest currency unit.
pub type Cents = i64;

/// Half-open date interval `[check_in, check_out)`.
///
/// The check-out day is excluded, so a stay ending on the 5th and a stay
/// starting on the 5th do not overlap.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StayRange {
    pub check_in: NaiveDate,
    pub check_out: NaiveDate,
}

impl StayRange {
    pub fn new(check_in: NaiveDate, check_out: NaiveDate) -> Self {
        debug_assert!(check_in < check_out, "StayRange check_in must be before check_out");
        Self { check_in, check_out }
    }

    pub fn nights(&self) -> i64 {
        self.check_out.signed_duration_since(self.check_in).num_days()
    }

    pub fn overlaps(&self, other: &StayRange) -> bool {
        self.check_in < other.check_out && other.check_in < self.check_out
    }
}

impl fmt::Display for StayRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {})", self.check_in, self.check_out)
    }
}

// ── Catalog ──────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Admin,
    Employee,
    Customer,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    pub id: Ulid,
    /// Stored lowercased; unique.
    pub email: String,
    pub name: String,
    pub phone: Option<String>,
    pub role: Role,
    /// Argon2 PHC string.
    pub password_hash: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoomType {
    pub name: String,
    /// Max guests.
    pub capacity: u32,
}

/// Room-level override. Date-range occupancy is derived from bookings and
/// never stored here.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoomStatus {
    Available,
    Maintenance,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Room {
    pub id: Ulid,
    pub number: String,
    pub room_type: RoomType,
    /// Nightly price.
    pub price: Cents,
    pub status: RoomStatus,
    pub description: Option<String>,
    pub image_url: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ServiceStatus {
    Available,
    Unavailable,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdditionalService {
    pub id: Ulid,
    pub name: String,
    pub price: Cents,
    pub description: Option<String>,
    pub status: ServiceStatus,
}

// ── Bookings ─────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BookingStatus {
    Pending,
    Confirmed,
    CheckedIn,
    CheckedOut,
    Cancelled,
}

impl BookingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BookingStatus::Pending => "pending",
            BookingStatus::Confirmed => "confirmed",
            BookingStatus::CheckedIn => "checked_in",
            BookingStatus::CheckedOut => "checked_out",
            BookingStatus::Cancelled => "cancelled",
        }
    }

    /// Only cancelled bookings release their date range.
    pub fn blocks_room(&self) -> bool {
        !matches!(self, BookingStatus::Cancelled)
    }

    /// `pending → confirmed → checked_in → checked_out`, plus `cancelled`
    /// from any non-terminal state.
    pub fn can_transition_to(&self, next: BookingStatus) -> bool {
        use BookingStatus::*;
        matches!(
            (self, next),
            (Pending, Confirmed)
                | (Confirmed, CheckedIn)
                | (CheckedIn, CheckedOut)
                | (Pending | Confirmed | CheckedIn, Cancelled)
        )
    }
}

impl fmt::Display for BookingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A service line on a booking. Prices are copied from the catalog at
/// reservation time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceOrdered {
    pub service_id: Ulid,
    pub name: String,
    pub unit_price: Cents,
    pub quantity: u32,
    pub line_total: Cents,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceBreakdown {
    pub nights: i64,
    pub nightly_rate: Cents,
    pub room_subtotal: Cents,
    pub services_subtotal: Cents,
    pub tax: Cents,
    pub service_fee: Cents,
    pub total: Cents,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Booking {
    pub id: Ulid,
    pub user_id: Ulid,
    pub room_id: Ulid,
    pub stay: StayRange,
    pub services: Vec<ServiceOrdered>,
    pub price: PriceBreakdown,
    pub status: BookingStatus,
    pub created_at: Ms,
}

/// Requested service and quantity, before prices are resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceRequest {
    pub service_id: Ulid,
    pub quantity: u32,
}

// ── Payments ─────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    Card,
    Cash,
    BankTransfer,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    Pending,
    Paid,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Payment {
    pub id: Ulid,
    pub booking_id: Ulid,
    pub room_id: Ulid,
    pub amount: Cents,
    pub method: PaymentMethod,
    pub status: PaymentStatus,
    pub created_at: Ms,
}

// ── Per-room state ───────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct RoomState {
    pub room: Room,
    /// Every booking ever made on this room, cancelled ones included,
    /// sorted by `stay.check_in`.
    pub bookings: Vec<Booking>,
}

impl RoomState {
    pub fn new(room: Room) -> Self {
        Self {
            room,
            bookings: Vec::new(),
        }
    }

    /// Insert booking maintaining sort order by check-in.
    pub fn insert_booking(&mut self, booking: Booking) {
        let pos = self
            .bookings
            .partition_point(|b| b.stay.check_in <= booking.stay.check_in);
        self.bookings.insert(pos, booking);
    }

    pub fn booking(&self, id: Ulid) -> Option<&Booking> {
        self.bookings.iter().find(|b| b.id == id)
    }

    pub fn booking_mut(&mut self, id: Ulid) -> Option<&mut Booking> {
        self.bookings.iter_mut().find(|b| b.id == id)
    }

    /// Bookings of any status whose stay overlaps `query`.
    /// Binary search skips everything checking in at or after `query.check_out`.
    pub fn overlapping(&self, query: &StayRange) -> impl Iterator<Item = &Booking> {
        let right_bound = self
            .bookings
            .partition_point(|b| b.stay.check_in < query.check_out);
        self.bookings[..right_bound]
            .iter()
            .filter(move |b| b.stay.check_out > query.check_in)
    }

    /// Overlapping bookings that still hold the room.
    pub fn blocking(&self, query: &StayRange) -> impl Iterator<Item = &Booking> {
        self.overlapping(query).filter(|b| b.status.blocks_room())
    }
}

/// WAL record format. One event per mutation; applying an event is
/// infallible so replay always reproduces the in-memory state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Event {
    AccountCreated {
        account: Account,
    },
    ServiceCreated {
        service: AdditionalService,
    },
    ServiceUpdated {
        service: AdditionalService,
    },
    RoomCreated {
        room: Room,
    },
    RoomUpdated {
        id: Ulid,
        number: String,
        room_type: RoomType,
        price: Cents,
        description: Option<String>,
        image_url: Option<String>,
    },
    RoomStatusChanged {
        id: Ulid,
        status: RoomStatus,
    },
    RoomDeleted {
        id: Ulid,
    },
    BookingReserved {
        booking: Booking,
    },
    BookingStatusChanged {
        id: Ulid,
        room_id: Ulid,
        status: BookingStatus,
    },
    PaymentRecorded {
        payment: Payment,
    },
    /// Settling `Paid` also confirms the booking if it is still pending.
    PaymentSettled {
        id: Ulid,
        booking_id: Ulid,
        room_id: Ulid,
        status: PaymentStatus,
    },
}

impl Event {
    pub fn name(&self) -> &'static str {
        match self {
            Event::AccountCreated { .. } => "account_created",
            Event::ServiceCreated { .. } => "service_created",
            Event::ServiceUpdated { .. } => "service_updated",
            Event::RoomCreated { .. } => "room_created",
            Event::RoomUpdated { .. } => "room_updated",
            Event::RoomStatusChanged { .. } => "room_status_changed",
            Event::RoomDeleted { .. } => "room_deleted",
            Event::BookingReserved { .. } => "booking_reserved",
            Event::BookingStatusChanged { .. } => "booking_status_changed",
            Event::PaymentRecorded { .. } => "payment_recorded",
            Event::PaymentSettled { .. } => "payment_settled",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(s: &str) -> NaiveDate {
        s.parse().unwrap()
    }

    fn stay(a: &str, b: &str) -> StayRange {
        StayRange::new(d(a), d(b))
    }

    fn room() -> Room {
        Room {
            id: Ulid::new(),
            number: "101".into(),
            room_type: RoomType {
                name: "Double".into(),
                capacity: 2,
            },
            price: 10_000,
            status: RoomStatus::Available,
            description: None,
            image_url: None,
        }
    }

    fn booking(room_id: Ulid, a: &str, b: &str, status: BookingStatus) -> Booking {
        let stay = stay(a, b);
        Booking {
            id: Ulid::new(),
            user_id: Ulid::new(),
            room_id,
            stay,
            services: vec![],
            price: PriceBreakdown {
                nights: stay.nights(),
                nightly_rate: 0,
                room_subtotal: 0,
                services_subtotal: 0,
                tax: 0,
                service_fee: 0,
                total: 0,
            },
            status,
            created_at: 0,
        }
    }

    #[test]
    fn stay_nights() {
        assert_eq!(stay("2025-01-01", "2025-01-04").nights(), 3);
        assert_eq!(stay("2024-02-28", "2024-03-01").nights(), 2); // leap year
    }

    #[test]
    fn stay_overlap_half_open() {
        let a = stay("2025-01-01", "2025-01-05");
        let b = stay("2025-01-03", "2025-01-08");
        let c = stay("2025-01-05", "2025-01-10");
        assert!(a.overlaps(&b));
        assert!(b.overlaps(&a));
        assert!(!a.overlaps(&c)); // back-to-back
    }

    #[test]
    fn bookings_kept_sorted() {
        let mut rs = RoomState::new(room());
        let rid = rs.room.id;
        rs.insert_booking(booking(rid, "2025-03-01", "2025-03-02", BookingStatus::Pending));
        rs.insert_booking(booking(rid, "2025-01-01", "2025-01-02", BookingStatus::Pending));
        rs.insert_booking(booking(rid, "2025-02-01", "2025-02-02", BookingStatus::Pending));
        let starts: Vec<_> = rs.bookings.iter().map(|b| b.stay.check_in).collect();
        assert_eq!(starts, vec![d("2025-01-01"), d("2025-02-01"), d("2025-03-01")]);
    }

    #[test]
    fn overlapping_skips_past_and_future() {
        let mut rs = RoomState::new(room());
        let rid = rs.room.id;
        rs.insert_booking(booking(rid, "2025-01-01", "2025-01-03", BookingStatus::Confirmed));
        let hit = booking(rid, "2025-01-09", "2025-01-12", BookingStatus::Confirmed);
        let hit_id = hit.id;
        rs.insert_booking(hit);
        rs.insert_booking(booking(rid, "2025-02-01", "2025-02-03", BookingStatus::Confirmed));

        let query = stay("2025-01-10", "2025-01-20");
        let hits: Vec<_> = rs.overlapping(&query).map(|b| b.id).collect();
        assert_eq!(hits, vec![hit_id]);
    }

    #[test]
    fn overlapping_adjacent_not_included() {
        let mut rs = RoomState::new(room());
        let rid = rs.room.id;
        rs.insert_booking(booking(rid, "2025-01-01", "2025-01-05", BookingStatus::Confirmed));
        let query = stay("2025-01-05", "2025-01-07");
        assert_eq!(rs.overlapping(&query).count(), 0);
    }

    #[test]
    fn blocking_ignores_cancelled() {
        let mut rs = RoomState::new(room());
        let rid = rs.room.id;
        rs.insert_booking(booking(rid, "2025-01-01", "2025-01-05", BookingStatus::Cancelled));
        let query = stay("2025-01-02", "2025-01-03");
        assert_eq!(rs.overlapping(&query).count(), 1);
        assert_eq!(rs.blocking(&query).count(), 0);
    }

    #[test]
    fn status_transitions() {
        use BookingStatus::*;
        assert!(Pending.can_transition_to(Confirmed));
        assert!(Confirmed.can_transition_to(CheckedIn));
        assert!(CheckedIn.can_transition_to(CheckedOut));
        assert!(CheckedIn.can_transition_to(Cancelled));
        assert!(!Pending.can_transition_to(CheckedIn)); // must confirm first
        assert!(!CheckedOut.can_transition_to(Cancelled));
        assert!(!Cancelled.can_transition_to(Pending));
        assert!(!Cancelled.can_transition_to(Cancelled));
    }

    #[test]
    fn event_serialization_roundtrip() {
        let r = room();
        let event = Event::BookingReserved {
            booking: booking(r.id, "2025-01-01", "2025-01-05", BookingStatus::Pending),
        };
        let bytes = bincode::serialize(&event).unwrap();
        let decoded: Event = bincode::deserialize(&bytes).unwrap();
        assert_eq!(event, decoded);
    }
}
