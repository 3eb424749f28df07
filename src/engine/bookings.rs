use std::collections::HashSet;

use chrono::NaiveDate;
use tokio::sync::OwnedRwLockWriteGuard;
use tracing::{debug, info};
use ulid::Ulid;

use crate::limits::*;
use crate::model::*;
use crate::observability;
use crate::pricing;

use super::conflict::{check_bookable, check_no_conflict, now_ms, validate_range};
use super::{Ledger, LedgerError};

impl Ledger {
    /// Resolve requested services against the catalog, copying current prices.
    fn resolve_services(&self, requests: &[ServiceRequest]) -> Result<Vec<ServiceOrdered>, LedgerError> {
        if requests.len() > MAX_SERVICES_PER_BOOKING {
            return Err(LedgerError::LimitExceeded("too many services on booking"));
        }
        let mut seen = HashSet::with_capacity(requests.len());
        let mut lines = Vec::with_capacity(requests.len());
        for req in requests {
            if !seen.insert(req.service_id) {
                return Err(LedgerError::Invalid("service listed more than once"));
            }
            let service = self
                .services
                .get(&req.service_id)
                .map(|s| s.value().clone())
                .ok_or(LedgerError::ServiceNotFound(req.service_id))?;
            if service.status != ServiceStatus::Available {
                return Err(LedgerError::ServiceUnavailable(service.id));
            }
            if req.quantity == 0 || req.quantity > MAX_SERVICE_QUANTITY {
                return Err(LedgerError::InvalidQuantity {
                    service_id: service.id,
                    quantity: req.quantity,
                });
            }
            lines.push(ServiceOrdered {
                service_id: service.id,
                line_total: service.price * Cents::from(req.quantity),
                name: service.name,
                unit_price: service.price,
                quantity: req.quantity,
            });
        }
        Ok(lines)
    }

    /// Price a prospective stay without reserving it. Availability is not
    /// checked.
    pub async fn quote(
        &self,
        room_id: Ulid,
        check_in: NaiveDate,
        check_out: NaiveDate,
        services: &[ServiceRequest],
    ) -> Result<PriceBreakdown, LedgerError> {
        let stay = validate_range(check_in, check_out)?;
        let rs = self
            .room_state(&room_id)
            .ok_or(LedgerError::RoomNotFound(room_id))?;
        let lines = self.resolve_services(services)?;
        let nightly_rate = rs.read().await.room.price;
        Ok(pricing::quote(nightly_rate, stay.nights(), &lines, &self.pricing))
    }

    /// Atomically check availability and create a pending booking.
    ///
    /// The room's write lock is held from the conflict check through the
    /// durable WAL append, so of any set of concurrent overlapping requests
    /// for one room exactly one succeeds.
    pub async fn reserve(
        &self,
        room_id: Ulid,
        user_id: Ulid,
        check_in: NaiveDate,
        check_out: NaiveDate,
        services: &[ServiceRequest],
    ) -> Result<Booking, LedgerError> {
        let result = self
            .try_reserve(room_id, user_id, check_in, check_out, services)
            .await;
        let outcome = match &result {
            Ok(_) => "reserved",
            Err(e) => e.kind(),
        };
        metrics::counter!(observability::RESERVATIONS_TOTAL, "outcome" => outcome).increment(1);
        result
    }

    async fn try_reserve(
        &self,
        room_id: Ulid,
        user_id: Ulid,
        check_in: NaiveDate,
        check_out: NaiveDate,
        services: &[ServiceRequest],
    ) -> Result<Booking, LedgerError> {
        let stay = validate_range(check_in, check_out)?;
        if !self.rooms.contains_key(&room_id) {
            return Err(LedgerError::RoomNotFound(room_id));
        }
        if !self.accounts.contains_key(&user_id) {
            return Err(LedgerError::UserNotFound(user_id));
        }
        let lines = self.resolve_services(services)?;

        let _gate = self.write_gate().await;
        let mut guard = self.lock_room(room_id).await?;
        check_bookable(&guard)?;
        if guard.bookings.len() >= MAX_BOOKINGS_PER_ROOM {
            return Err(LedgerError::LimitExceeded("too many bookings on room"));
        }
        check_no_conflict(&guard, &stay)?;

        let price = pricing::quote(guard.room.price, stay.nights(), &lines, &self.pricing);
        let booking = Booking {
            id: Ulid::new(),
            user_id,
            room_id,
            stay,
            services: lines,
            price,
            status: BookingStatus::Pending,
            created_at: now_ms(),
        };
        let event = Event::BookingReserved {
            booking: booking.clone(),
        };
        self.persist_and_apply(&mut guard, &event).await?;
        info!(
            booking_id = %booking.id,
            room_id = %room_id,
            stay = %stay,
            total = booking.price.total,
            "booking reserved"
        );
        Ok(booking)
    }

    /// Cancel a booking, releasing its dates.
    pub async fn cancel(&self, booking_id: Ulid) -> Result<Booking, LedgerError> {
        let _gate = self.write_gate().await;
        let mut guard = self.resolve_booking_write(&booking_id).await?;
        let from = booking_status(&guard, booking_id)?;
        if from == BookingStatus::Cancelled {
            return Err(LedgerError::AlreadyCancelled(booking_id));
        }
        let booking = self
            .transition(&mut guard, booking_id, from, BookingStatus::Cancelled)
            .await?;
        metrics::counter!(observability::BOOKINGS_CANCELLED_TOTAL).increment(1);
        Ok(booking)
    }

    pub async fn confirm(&self, booking_id: Ulid) -> Result<Booking, LedgerError> {
        self.advance(booking_id, BookingStatus::Confirmed).await
    }

    pub async fn check_in(&self, booking_id: Ulid) -> Result<Booking, LedgerError> {
        self.advance(booking_id, BookingStatus::CheckedIn).await
    }

    pub async fn check_out(&self, booking_id: Ulid) -> Result<Booking, LedgerError> {
        self.advance(booking_id, BookingStatus::CheckedOut).await
    }

    async fn advance(&self, booking_id: Ulid, to: BookingStatus) -> Result<Booking, LedgerError> {
        let _gate = self.write_gate().await;
        let mut guard = self.resolve_booking_write(&booking_id).await?;
        let from = booking_status(&guard, booking_id)?;
        self.transition(&mut guard, booking_id, from, to).await
    }

    async fn transition(
        &self,
        guard: &mut OwnedRwLockWriteGuard<RoomState>,
        booking_id: Ulid,
        from: BookingStatus,
        to: BookingStatus,
    ) -> Result<Booking, LedgerError> {
        if !from.can_transition_to(to) {
            return Err(LedgerError::InvalidTransition {
                id: booking_id,
                from,
                to,
            });
        }
        let event = Event::BookingStatusChanged {
            id: booking_id,
            room_id: guard.room.id,
            status: to,
        };
        self.persist_and_apply(guard, &event).await?;
        info!(booking_id = %booking_id, %from, %to, "booking status changed");
        guard
            .booking(booking_id)
            .cloned()
            .ok_or(LedgerError::BookingNotFound(booking_id))
    }

    // ── Pending expiry ───────────────────────────────────────

    /// Pending bookings created at or before `cutoff`. Rooms whose lock is
    /// busy are skipped; the next sweep picks them up.
    pub fn collect_stale_pending(&self, cutoff: Ms) -> Vec<Ulid> {
        let mut stale = Vec::new();
        for entry in self.rooms.iter() {
            let Ok(guard) = entry.value().try_read() else {
                continue;
            };
            stale.extend(
                guard
                    .bookings
                    .iter()
                    .filter(|b| b.status == BookingStatus::Pending && b.created_at <= cutoff)
                    .map(|b| b.id),
            );
        }
        stale
    }

    /// Cancel `booking_id` if it is still pending and older than `cutoff`.
    /// Returns whether it was expired.
    pub async fn expire_pending(&self, booking_id: Ulid, cutoff: Ms) -> Result<bool, LedgerError> {
        let _gate = self.write_gate().await;
        let mut guard = self.resolve_booking_write(&booking_id).await?;
        let Some(booking) = guard.booking(booking_id) else {
            return Err(LedgerError::BookingNotFound(booking_id));
        };
        if booking.status != BookingStatus::Pending || booking.created_at > cutoff {
            debug!(booking_id = %booking_id, status = %booking.status, "no longer stale");
            return Ok(false);
        }
        self.transition(
            &mut guard,
            booking_id,
            BookingStatus::Pending,
            BookingStatus::Cancelled,
        )
        .await?;
        metrics::counter!(observability::PENDING_EXPIRED_TOTAL).increment(1);
        Ok(true)
    }
}

fn booking_status(rs: &RoomState, booking_id: Ulid) -> Result<BookingStatus, LedgerError> {
    rs.booking(booking_id)
        .map(|b| b.status)
        .ok_or(LedgerError::BookingNotFound(booking_id))
}
