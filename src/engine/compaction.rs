use tokio::sync::oneshot;
use tracing::info;

use crate::model::*;

use super::{Ledger, LedgerError, WalCommand};

impl Ledger {
    /// Rewrite the WAL as the minimal event list that recreates current state.
    ///
    /// Takes the compaction gate exclusively, so no mutation is in flight
    /// between the snapshot and the file swap.
    pub async fn compact_wal(&self) -> Result<(), LedgerError> {
        let _exclusive = self.compaction_gate.write().await;

        let mut events = Vec::new();

        let mut accounts: Vec<Account> = self.accounts.iter().map(|a| a.value().clone()).collect();
        accounts.sort_by_key(|a| a.id);
        events.extend(accounts.into_iter().map(|account| Event::AccountCreated { account }));

        let mut services: Vec<AdditionalService> =
            self.services.iter().map(|s| s.value().clone()).collect();
        services.sort_by_key(|s| s.id);
        events.extend(services.into_iter().map(|service| Event::ServiceCreated { service }));

        let mut snapshots = Vec::with_capacity(self.rooms.len());
        for rs in self.room_handles() {
            let guard = rs.read().await;
            snapshots.push((guard.room.clone(), guard.bookings.clone()));
        }
        snapshots.sort_by_key(|(room, _)| room.id);
        for (room, bookings) in snapshots {
            events.push(Event::RoomCreated { room });
            events.extend(bookings.into_iter().map(|booking| Event::BookingReserved { booking }));
        }

        let mut payments: Vec<Payment> = self.payments.iter().map(|p| p.value().clone()).collect();
        payments.sort_by_key(|p| p.id);
        events.extend(payments.into_iter().map(|payment| Event::PaymentRecorded { payment }));

        let count = events.len();
        let (tx, rx) = oneshot::channel();
        self.wal_tx
            .send(WalCommand::Compact {
                events,
                response: tx,
            })
            .await
            .map_err(|_| LedgerError::Storage("WAL writer shut down".into()))?;
        rx.await
            .map_err(|_| LedgerError::Storage("WAL writer dropped response".into()))?
            .map_err(|e| LedgerError::Storage(e.to_string()))?;
        info!(events = count, "WAL compacted");
        Ok(())
    }

    pub async fn wal_appends_since_compact(&self) -> u64 {
        let (tx, rx) = oneshot::channel();
        if self
            .wal_tx
            .send(WalCommand::AppendsSinceCompact { response: tx })
            .await
            .is_err()
        {
            return 0;
        }
        rx.await.unwrap_or(0)
    }
}
