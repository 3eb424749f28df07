use tracing::info;
use ulid::Ulid;

use crate::model::*;

use super::conflict::now_ms;
use super::{Ledger, LedgerError};

impl Ledger {
    /// Record a pending payment for the booking's full total.
    pub async fn record_payment(
        &self,
        booking_id: Ulid,
        method: PaymentMethod,
    ) -> Result<Payment, LedgerError> {
        let _gate = self.write_gate().await;
        let mut guard = self.resolve_booking_write(&booking_id).await?;
        let booking = guard
            .booking(booking_id)
            .ok_or(LedgerError::BookingNotFound(booking_id))?;
        if !matches!(
            booking.status,
            BookingStatus::Pending | BookingStatus::Confirmed
        ) {
            return Err(LedgerError::BookingNotPayable {
                id: booking_id,
                status: booking.status,
            });
        }

        let payment = Payment {
            id: Ulid::new(),
            booking_id,
            room_id: booking.room_id,
            amount: booking.price.total,
            method,
            status: PaymentStatus::Pending,
            created_at: now_ms(),
        };
        self.persist_and_apply(
            &mut guard,
            &Event::PaymentRecorded {
                payment: payment.clone(),
            },
        )
        .await?;
        info!(payment_id = %payment.id, booking_id = %booking_id, amount = payment.amount, "payment recorded");
        Ok(payment)
    }

    /// Settle a pending payment. A `paid` settlement confirms the booking in
    /// the same WAL record when it is still pending.
    pub async fn settle_payment(
        &self,
        payment_id: Ulid,
        status: PaymentStatus,
    ) -> Result<Payment, LedgerError> {
        if status == PaymentStatus::Pending {
            return Err(LedgerError::Invalid("payment can only settle to paid or failed"));
        }
        let _gate = self.write_gate().await;
        let booking_id = self
            .payments
            .get(&payment_id)
            .map(|p| p.booking_id)
            .ok_or(LedgerError::PaymentNotFound(payment_id))?;
        let mut guard = self.resolve_booking_write(&booking_id).await?;

        // Re-read under the room lock; settlements on one booking serialize here.
        let current = self
            .payments
            .get(&payment_id)
            .map(|p| p.status)
            .ok_or(LedgerError::PaymentNotFound(payment_id))?;
        if current != PaymentStatus::Pending {
            return Err(LedgerError::PaymentAlreadySettled(payment_id));
        }

        let event = Event::PaymentSettled {
            id: payment_id,
            booking_id,
            room_id: guard.room.id,
            status,
        };
        self.persist_and_apply(&mut guard, &event).await?;
        info!(payment_id = %payment_id, booking_id = %booking_id, ?status, "payment settled");
        self.get_payment(payment_id)
    }

    pub fn get_payment(&self, payment_id: Ulid) -> Result<Payment, LedgerError> {
        self.payments
            .get(&payment_id)
            .map(|p| p.value().clone())
            .ok_or(LedgerError::PaymentNotFound(payment_id))
    }

    /// Payments for a booking, oldest first.
    pub fn payments_for_booking(&self, booking_id: Ulid) -> Result<Vec<Payment>, LedgerError> {
        if !self.booking_to_room.contains_key(&booking_id) {
            return Err(LedgerError::BookingNotFound(booking_id));
        }
        let mut payments: Vec<Payment> = self
            .payments
            .iter()
            .filter(|p| p.booking_id == booking_id)
            .map(|p| p.value().clone())
            .collect();
        payments.sort_by_key(|p| (p.created_at, p.id));
        Ok(payments)
    }
}
