use chrono::NaiveDate;
use ulid::Ulid;

use crate::model::*;

use super::availability;
use super::conflict::validate_window;
use super::{Ledger, LedgerError, SharedRoomState};

impl Ledger {
    /// Snapshot of room handles so no map guard is held across an await.
    pub(super) fn room_handles(&self) -> Vec<SharedRoomState> {
        self.rooms.iter().map(|e| e.value().clone()).collect()
    }

    /// Whether `[check_in, check_out)` is free on the room. A room under
    /// maintenance is never available.
    pub async fn is_available(
        &self,
        room_id: Ulid,
        check_in: NaiveDate,
        check_out: NaiveDate,
    ) -> Result<bool, LedgerError> {
        let stay = validate_window(check_in, check_out)?;
        let rs = self
            .room_state(&room_id)
            .ok_or(LedgerError::RoomNotFound(room_id))?;
        let guard = rs.read().await;
        Ok(guard.room.status == RoomStatus::Available && guard.blocking(&stay).next().is_none())
    }

    /// Rooms bookable for the whole range, ordered by room number.
    pub async fn available_rooms(
        &self,
        check_in: NaiveDate,
        check_out: NaiveDate,
        min_capacity: Option<u32>,
    ) -> Result<Vec<Room>, LedgerError> {
        let stay = validate_window(check_in, check_out)?;
        let mut rooms = Vec::new();
        for rs in self.room_handles() {
            let guard = rs.read().await;
            if guard.room.status != RoomStatus::Available {
                continue;
            }
            if min_capacity.is_some_and(|min| guard.room.room_type.capacity < min) {
                continue;
            }
            if guard.blocking(&stay).next().is_none() {
                rooms.push(guard.room.clone());
            }
        }
        rooms.sort_by(|a, b| a.number.cmp(&b.number));
        Ok(rooms)
    }

    pub async fn free_windows(
        &self,
        room_id: Ulid,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<StayRange>, LedgerError> {
        let window = validate_window(from, to)?;
        let rs = self
            .room_state(&room_id)
            .ok_or(LedgerError::RoomNotFound(room_id))?;
        let guard = rs.read().await;
        Ok(availability::free_windows(&guard, &window))
    }

    // ── Catalog reads ────────────────────────────────────────

    pub async fn get_room(&self, room_id: Ulid) -> Result<Room, LedgerError> {
        let rs = self
            .room_state(&room_id)
            .ok_or(LedgerError::RoomNotFound(room_id))?;
        let room = rs.read().await.room.clone();
        Ok(room)
    }

    pub async fn list_rooms(&self) -> Vec<Room> {
        let mut rooms = Vec::with_capacity(self.rooms.len());
        for rs in self.room_handles() {
            rooms.push(rs.read().await.room.clone());
        }
        rooms.sort_by(|a, b| a.number.cmp(&b.number));
        rooms
    }

    pub fn get_service(&self, service_id: Ulid) -> Result<AdditionalService, LedgerError> {
        self.services
            .get(&service_id)
            .map(|s| s.value().clone())
            .ok_or(LedgerError::ServiceNotFound(service_id))
    }

    pub fn list_services(&self) -> Vec<AdditionalService> {
        let mut services: Vec<_> = self.services.iter().map(|s| s.value().clone()).collect();
        services.sort_by(|a, b| a.name.cmp(&b.name).then(a.id.cmp(&b.id)));
        services
    }

    pub fn get_account(&self, account_id: Ulid) -> Result<Account, LedgerError> {
        self.accounts
            .get(&account_id)
            .map(|a| a.value().clone())
            .ok_or(LedgerError::UserNotFound(account_id))
    }

    // ── Bookings ─────────────────────────────────────────────

    pub async fn get_booking(&self, booking_id: Ulid) -> Result<Booking, LedgerError> {
        let room_id = self
            .booking_to_room
            .get(&booking_id)
            .map(|e| *e.value())
            .ok_or(LedgerError::BookingNotFound(booking_id))?;
        let rs = self
            .room_state(&room_id)
            .ok_or(LedgerError::BookingNotFound(booking_id))?;
        let guard = rs.read().await;
        guard
            .booking(booking_id)
            .cloned()
            .ok_or(LedgerError::BookingNotFound(booking_id))
    }

    /// Every booking on the room, cancelled ones included, by check-in.
    pub async fn bookings_for_room(&self, room_id: Ulid) -> Result<Vec<Booking>, LedgerError> {
        let rs = self
            .room_state(&room_id)
            .ok_or(LedgerError::RoomNotFound(room_id))?;
        let bookings = rs.read().await.bookings.clone();
        Ok(bookings)
    }

    /// A guest's bookings across all rooms, by check-in.
    pub async fn bookings_for_user(&self, user_id: Ulid) -> Result<Vec<Booking>, LedgerError> {
        if !self.accounts.contains_key(&user_id) {
            return Err(LedgerError::UserNotFound(user_id));
        }
        let mut bookings = Vec::new();
        for rs in self.room_handles() {
            let guard = rs.read().await;
            bookings.extend(guard.bookings.iter().filter(|b| b.user_id == user_id).cloned());
        }
        bookings.sort_by_key(|b| (b.stay.check_in, b.id));
        Ok(bookings)
    }
}
