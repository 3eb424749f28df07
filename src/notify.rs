use dashmap::DashMap;
use tokio::sync::broadcast;
use ulid::Ulid;

use crate::model::Event;

const CHANNEL_CAPACITY: usize = 256;

/// Per-room broadcast of applied ledger events.
pub struct NotifyHub {
    channels: DashMap<Ulid, broadcast::Sender<Event>>,
}

impl Default for NotifyHub {
    fn default() -> Self {
        Self::new()
    }
}

impl NotifyHub {
    pub fn new() -> Self {
        Self {
            channels: DashMap::new(),
        }
    }

    /// Subscribe to a room's events, creating the channel on first use.
    pub fn subscribe(&self, room_id: Ulid) -> broadcast::Receiver<Event> {
        self.channels
            .entry(room_id)
            .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0)
            .subscribe()
    }

    /// No-op when nobody is subscribed.
    pub fn send(&self, room_id: Ulid, event: &Event) {
        if let Some(sender) = self.channels.get(&room_id) {
            let _ = sender.send(event.clone());
        }
    }

    /// Drop a room's channel; open receivers see the stream close.
    pub fn remove(&self, room_id: &Ulid) {
        self.channels.remove(room_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::RoomStatus;

    #[tokio::test]
    async fn subscribe_and_receive() {
        let hub = NotifyHub::new();
        let room_id = Ulid::new();
        let mut rx = hub.subscribe(room_id);

        let event = Event::RoomStatusChanged {
            id: room_id,
            status: RoomStatus::Maintenance,
        };
        hub.send(room_id, &event);
        assert_eq!(rx.recv().await.unwrap(), event);
    }

    #[tokio::test]
    async fn other_rooms_not_delivered() {
        let hub = NotifyHub::new();
        let mine = Ulid::new();
        let other = Ulid::new();
        let mut rx = hub.subscribe(mine);
        let _other_rx = hub.subscribe(other);

        hub.send(other, &Event::RoomDeleted { id: other });
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn remove_closes_stream() {
        let hub = NotifyHub::new();
        let room_id = Ulid::new();
        let mut rx = hub.subscribe(room_id);
        hub.remove(&room_id);
        assert!(matches!(
            rx.recv().await,
            Err(broadcast::error::RecvError::Closed)
        ));
    }

    #[test]
    fn send_without_subscribers_is_noop() {
        let hub = NotifyHub::new();
        let room_id = Ulid::new();
        hub.send(room_id, &Event::RoomDeleted { id: room_id });
    }
}
