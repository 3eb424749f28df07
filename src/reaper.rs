use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::engine::Ledger;

const EXPIRE_INTERVAL: Duration = Duration::from_secs(5);
const COMPACT_INTERVAL: Duration = Duration::from_secs(30);

/// Cancel bookings left `pending` for longer than `ttl`.
pub async fn run_expirer(ledger: Arc<Ledger>, ttl: Duration) {
    let mut interval = tokio::time::interval(EXPIRE_INTERVAL);
    loop {
        interval.tick().await;
        expire_once(&ledger, ttl).await;
    }
}

/// One expiry sweep. Returns how many bookings were cancelled.
pub async fn expire_once(ledger: &Ledger, ttl: Duration) -> usize {
    let ttl_ms = i64::try_from(ttl.as_millis()).unwrap_or(i64::MAX);
    let cutoff = chrono::Utc::now().timestamp_millis().saturating_sub(ttl_ms);
    let mut expired = 0;
    for booking_id in ledger.collect_stale_pending(cutoff) {
        match ledger.expire_pending(booking_id, cutoff).await {
            Ok(true) => {
                info!(booking_id = %booking_id, "expired pending booking");
                expired += 1;
            }
            Ok(false) => {}
            // Confirmed or cancelled since the scan.
            Err(e) => debug!(booking_id = %booking_id, error = %e, "expirer skip"),
        }
    }
    expired
}

/// Compact the WAL whenever `threshold` appends have accumulated.
pub async fn run_compactor(ledger: Arc<Ledger>, threshold: u64) {
    let mut interval = tokio::time::interval(COMPACT_INTERVAL);
    loop {
        interval.tick().await;
        if let Err(e) = compact_if_needed(&ledger, threshold).await {
            warn!(error = %e, "WAL compaction failed");
        }
    }
}

pub async fn compact_if_needed(
    ledger: &Ledger,
    threshold: u64,
) -> Result<bool, crate::engine::LedgerError> {
    if ledger.wal_appends_since_compact().await < threshold {
        return Ok(false);
    }
    ledger.compact_wal().await?;
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{AccountDraft, RoomDraft};
    use crate::model::*;
    use crate::notify::NotifyHub;
    use chrono::NaiveDate;
    use std::path::PathBuf;

    fn test_wal_path(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join("innledger_test_reaper");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join(name);
        let _ = std::fs::remove_file(&path);
        path
    }

    fn d(s: &str) -> NaiveDate {
        s.parse().unwrap()
    }

    async fn setup(name: &str) -> (Ledger, Room, Account) {
        let ledger = Ledger::new(test_wal_path(name), Arc::new(NotifyHub::new())).unwrap();
        let room = ledger
            .create_room(RoomDraft {
                number: "12".into(),
                room_type: RoomType {
                    name: "Twin".into(),
                    capacity: 2,
                },
                price: 8_000,
                description: None,
                image_url: None,
            })
            .await
            .unwrap();
        let guest = ledger
            .create_account(AccountDraft {
                email: "guest@example.com".into(),
                name: "Guest".into(),
                phone: None,
                role: Role::Customer,
                password: "correct horse".into(),
            })
            .await
            .unwrap();
        (ledger, room, guest)
    }

    #[tokio::test]
    async fn expirer_cancels_stale_pending() {
        let (ledger, room, guest) = setup("expire_stale.wal").await;
        let stale = ledger
            .reserve(room.id, guest.id, d("2025-05-01"), d("2025-05-03"), &[])
            .await
            .unwrap();

        // Zero TTL: everything already created counts as stale.
        assert_eq!(expire_once(&ledger, Duration::ZERO).await, 1);
        let after = ledger.get_booking(stale.id).await.unwrap();
        assert_eq!(after.status, BookingStatus::Cancelled);
        assert!(
            ledger
                .is_available(room.id, d("2025-05-01"), d("2025-05-03"))
                .await
                .unwrap()
        );
    }

    #[tokio::test]
    async fn expirer_leaves_fresh_and_confirmed() {
        let (ledger, room, guest) = setup("expire_fresh.wal").await;
        let fresh = ledger
            .reserve(room.id, guest.id, d("2025-05-01"), d("2025-05-03"), &[])
            .await
            .unwrap();
        let confirmed = ledger
            .reserve(room.id, guest.id, d("2025-06-01"), d("2025-06-03"), &[])
            .await
            .unwrap();
        ledger.confirm(confirmed.id).await.unwrap();

        assert_eq!(expire_once(&ledger, Duration::from_secs(3600)).await, 0);
        assert_eq!(expire_once(&ledger, Duration::ZERO).await, 1);
        let fresh = ledger.get_booking(fresh.id).await.unwrap();
        let confirmed = ledger.get_booking(confirmed.id).await.unwrap();
        assert_eq!(fresh.status, BookingStatus::Cancelled);
        assert_eq!(confirmed.status, BookingStatus::Confirmed);
    }

    #[tokio::test]
    async fn compactor_respects_threshold() {
        let (ledger, _room, _guest) = setup("compact_threshold.wal").await;
        // Two appends so far: room + account.
        assert!(!compact_if_needed(&ledger, 10).await.unwrap());
        assert!(compact_if_needed(&ledger, 2).await.unwrap());
        assert_eq!(ledger.wal_appends_since_compact().await, 0);
    }
}
