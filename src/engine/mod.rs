mod availability;
mod bookings;
mod catalog;
mod compaction;
mod conflict;
mod error;
mod payments;
mod queries;

pub use availability::{free_windows, merge_overlapping, subtract_ranges};
pub use catalog::{AccountDraft, RoomDraft, ServiceDraft};
pub use error::LedgerError;

use std::collections::HashMap;
use std::io;
use std::path::PathBuf;
use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{Mutex, OwnedRwLockWriteGuard, RwLock, RwLockReadGuard, mpsc, oneshot};
use tracing::info;
use ulid::Ulid;

use crate::model::*;
use crate::notify::NotifyHub;
use crate::observability;
use crate::pricing::PricingPolicy;
use crate::wal::{LogFile, Wal};

pub type SharedRoomState = Arc<RwLock<RoomState>>;

// ── Group-commit WAL channel ─────────────────────────────

enum WalCommand {
    Append {
        event: Event,
        response: oneshot::Sender<io::Result<()>>,
    },
    Compact {
        events: Vec<Event>,
        response: oneshot::Sender<io::Result<()>>,
    },
    AppendsSinceCompact {
        response: oneshot::Sender<u64>,
    },
}

/// Owns the WAL. Takes the first queued append, drains every append already
/// waiting behind it, writes them all, fsyncs once, then answers each caller.
async fn wal_writer_loop<F: LogFile>(mut wal: Wal<F>, mut rx: mpsc::Receiver<WalCommand>) {
    while let Some(cmd) = rx.recv().await {
        let (event, response) = match cmd {
            WalCommand::Append { event, response } => (event, response),
            other => {
                handle_non_append(&mut wal, other);
                continue;
            }
        };

        let mut batch = vec![(event, response)];
        let mut deferred = None;
        while let Ok(next) = rx.try_recv() {
            match next {
                WalCommand::Append { event, response } => batch.push((event, response)),
                other => {
                    deferred = Some(other);
                    break;
                }
            }
        }

        metrics::histogram!(observability::WAL_FLUSH_BATCH_SIZE).record(batch.len() as f64);
        let flush_start = std::time::Instant::now();
        let result = flush_batch(&mut wal, &batch);
        metrics::histogram!(observability::WAL_FLUSH_DURATION_SECONDS)
            .record(flush_start.elapsed().as_secs_f64());
        if let Err(e) = &result {
            tracing::error!(error = %e, batch = batch.len(), "WAL flush failed");
        }
        respond_batch(batch, &result);

        if let Some(other) = deferred {
            handle_non_append(&mut wal, other);
        }
    }
}

fn flush_batch<F: LogFile>(
    wal: &mut Wal<F>,
    batch: &[(Event, oneshot::Sender<io::Result<()>>)],
) -> io::Result<()> {
    // No frame of a failed batch may survive on disk.
    if let Err(e) = batch
        .iter()
        .try_for_each(|(event, _)| wal.append_buffered(event))
    {
        wal.rollback();
        return Err(e);
    }
    wal.flush_sync()
}

fn respond_batch(batch: Vec<(Event, oneshot::Sender<io::Result<()>>)>, result: &io::Result<()>) {
    for (_, tx) in batch {
        let r = match result {
            Ok(()) => Ok(()),
            Err(e) => Err(io::Error::new(e.kind(), e.to_string())),
        };
        let _ = tx.send(r);
    }
}

fn handle_non_append<F: LogFile>(wal: &mut Wal<F>, cmd: WalCommand) {
    match cmd {
        WalCommand::Compact { events, response } => {
            let _ = response.send(wal.compact(&events));
        }
        WalCommand::AppendsSinceCompact { response } => {
            let _ = response.send(wal.appends_since_compact());
        }
        WalCommand::Append { .. } => unreachable!("appends are batched by the writer loop"),
    }
}

/// The availability and booking ledger.
///
/// Each room sits behind its own `RwLock`; every booking mutation holds that
/// room's write lock from the conflict check until its WAL record is durable
/// and applied, so check-then-insert is serialized per room while different
/// rooms proceed in parallel.
///
/// Lock order: `compaction_gate` → `catalog_lock` → room lock.
pub struct Ledger {
    rooms: DashMap<Ulid, SharedRoomState>,
    room_numbers: DashMap<String, Ulid>,
    services: DashMap<Ulid, AdditionalService>,
    accounts: DashMap<Ulid, Account>,
    account_emails: DashMap<String, Ulid>,
    payments: DashMap<Ulid, Payment>,
    /// Reverse lookup: booking id → room id.
    booking_to_room: DashMap<Ulid, Ulid>,
    /// Serializes uniqueness checks on room numbers and account emails.
    catalog_lock: Mutex<()>,
    /// Shared by writers, exclusive while compaction snapshots state.
    compaction_gate: RwLock<()>,
    wal_tx: mpsc::Sender<WalCommand>,
    pub notify: Arc<NotifyHub>,
    pricing: PricingPolicy,
}

impl Ledger {
    pub fn new(wal_path: PathBuf, notify: Arc<NotifyHub>) -> io::Result<Self> {
        Self::with_pricing(wal_path, notify, PricingPolicy::default())
    }

    /// Replay the WAL at `wal_path` and start its writer task.
    /// Must be called inside a tokio runtime.
    pub fn with_pricing(
        wal_path: PathBuf,
        notify: Arc<NotifyHub>,
        pricing: PricingPolicy,
    ) -> io::Result<Self> {
        let events = Wal::replay(&wal_path)?;
        let wal = Wal::open(&wal_path)?;
        Ok(Self::from_wal(wal, &events, notify, pricing))
    }

    /// Rebuild state from already replayed `events` and hand `wal` to a new
    /// writer task.
    fn from_wal<F: LogFile + Send + 'static>(
        wal: Wal<F>,
        events: &[Event],
        notify: Arc<NotifyHub>,
        pricing: PricingPolicy,
    ) -> Self {
        let wal_path = wal.path().to_path_buf();
        let (wal_tx, wal_rx) = mpsc::channel(4096);
        tokio::spawn(wal_writer_loop(wal, wal_rx));

        let ledger = Self {
            rooms: DashMap::new(),
            room_numbers: DashMap::new(),
            services: DashMap::new(),
            accounts: DashMap::new(),
            account_emails: DashMap::new(),
            payments: DashMap::new(),
            booking_to_room: DashMap::new(),
            catalog_lock: Mutex::new(()),
            compaction_gate: RwLock::new(()),
            wal_tx,
            notify,
            pricing,
        };

        // Rooms are rebuilt unlocked and only wrapped once replay is done.
        let mut rooms: HashMap<Ulid, RoomState> = HashMap::new();
        for event in events {
            match event {
                Event::RoomCreated { room } => {
                    ledger.room_numbers.insert(room.number.clone(), room.id);
                    rooms.insert(room.id, RoomState::new(room.clone()));
                }
                Event::RoomDeleted { id } => {
                    if let Some(rs) = rooms.remove(id) {
                        ledger.room_numbers.remove(&rs.room.number);
                    }
                }
                other => match event_room_id(other) {
                    Some(room_id) => {
                        if let Some(rs) = rooms.get_mut(&room_id) {
                            ledger.apply_to_room(rs, other);
                        }
                    }
                    None => ledger.apply_catalog(other),
                },
            }
        }
        for (id, rs) in rooms {
            ledger.rooms.insert(id, Arc::new(RwLock::new(rs)));
        }

        metrics::gauge!(observability::ROOMS_ACTIVE).set(ledger.rooms.len() as f64);
        info!(
            path = %wal_path.display(),
            events = events.len(),
            rooms = ledger.rooms.len(),
            "ledger replayed"
        );
        ledger
    }

    /// Write event to WAL via the background group-commit writer.
    async fn wal_append(&self, event: &Event) -> Result<(), LedgerError> {
        let (tx, rx) = oneshot::channel();
        self.wal_tx
            .send(WalCommand::Append {
                event: event.clone(),
                response: tx,
            })
            .await
            .map_err(|_| LedgerError::Storage("WAL writer shut down".into()))?;
        rx.await
            .map_err(|_| LedgerError::Storage("WAL writer dropped response".into()))?
            .map_err(|e| LedgerError::Storage(e.to_string()))
    }

    /// Held by every mutation so compaction never snapshots half a write.
    async fn write_gate(&self) -> RwLockReadGuard<'_, ()> {
        self.compaction_gate.read().await
    }

    fn room_state(&self, id: &Ulid) -> Option<SharedRoomState> {
        self.rooms.get(id).map(|e| e.value().clone())
    }

    /// Lookup booking → room, acquire the room's write lock.
    async fn resolve_booking_write(
        &self,
        booking_id: &Ulid,
    ) -> Result<OwnedRwLockWriteGuard<RoomState>, LedgerError> {
        let room_id = self
            .booking_to_room
            .get(booking_id)
            .map(|e| *e.value())
            .ok_or(LedgerError::BookingNotFound(*booking_id))?;
        let rs = self
            .room_state(&room_id)
            .ok_or(LedgerError::BookingNotFound(*booking_id))?;
        Ok(rs.write_owned().await)
    }

    /// WAL-append, apply, notify. Nothing is applied if the append fails.
    async fn persist_and_apply(&self, rs: &mut RoomState, event: &Event) -> Result<(), LedgerError> {
        self.wal_append(event).await?;
        self.apply_to_room(rs, event);
        self.notify.send(rs.room.id, event);
        Ok(())
    }

    async fn persist_catalog(&self, event: &Event) -> Result<(), LedgerError> {
        self.wal_append(event).await?;
        self.apply_catalog(event);
        Ok(())
    }

    /// Events that touch no room. Room creation/deletion is handled where the
    /// room map itself is changed.
    fn apply_catalog(&self, event: &Event) {
        match event {
            Event::AccountCreated { account } => {
                self.account_emails.insert(account.email.clone(), account.id);
                self.accounts.insert(account.id, account.clone());
            }
            Event::ServiceCreated { service } | Event::ServiceUpdated { service } => {
                self.services.insert(service.id, service.clone());
            }
            _ => {}
        }
    }

    /// Apply a room-scoped event. Caller holds the room's write lock (or owns
    /// the state outright during replay).
    fn apply_to_room(&self, rs: &mut RoomState, event: &Event) {
        match event {
            Event::RoomUpdated {
                number,
                room_type,
                price,
                description,
                image_url,
                ..
            } => {
                if rs.room.number != *number {
                    self.room_numbers.remove(&rs.room.number);
                    self.room_numbers.insert(number.clone(), rs.room.id);
                }
                rs.room.number = number.clone();
                rs.room.room_type = room_type.clone();
                rs.room.price = *price;
                rs.room.description = description.clone();
                rs.room.image_url = image_url.clone();
            }
            Event::RoomStatusChanged { status, .. } => {
                rs.room.status = *status;
            }
            Event::BookingReserved { booking } => {
                self.booking_to_room.insert(booking.id, booking.room_id);
                rs.insert_booking(booking.clone());
            }
            Event::BookingStatusChanged { id, status, .. } => {
                if let Some(booking) = rs.booking_mut(*id) {
                    booking.status = *status;
                }
            }
            Event::PaymentRecorded { payment } => {
                self.payments.insert(payment.id, payment.clone());
            }
            Event::PaymentSettled {
                id,
                booking_id,
                status,
                ..
            } => {
                if let Some(mut payment) = self.payments.get_mut(id) {
                    payment.status = *status;
                }
                if *status == PaymentStatus::Paid
                    && let Some(booking) = rs.booking_mut(*booking_id)
                    && booking.status == BookingStatus::Pending
                {
                    booking.status = BookingStatus::Confirmed;
                }
            }
            Event::AccountCreated { .. }
            | Event::ServiceCreated { .. }
            | Event::ServiceUpdated { .. }
            | Event::RoomCreated { .. }
            | Event::RoomDeleted { .. } => {}
        }
    }
}

/// Room a room-scoped event belongs to; `None` for catalog events and
/// room creation/deletion.
fn event_room_id(event: &Event) -> Option<Ulid> {
    match event {
        Event::RoomUpdated { id, .. } | Event::RoomStatusChanged { id, .. } => Some(*id),
        Event::BookingReserved { booking } => Some(booking.room_id),
        Event::BookingStatusChanged { room_id, .. } | Event::PaymentSettled { room_id, .. } => {
            Some(*room_id)
        }
        Event::PaymentRecorded { payment } => Some(payment.room_id),
        Event::AccountCreated { .. }
        | Event::ServiceCreated { .. }
        | Event::ServiceUpdated { .. }
        | Event::RoomCreated { .. }
        | Event::RoomDeleted { .. } => None,
    }
}
