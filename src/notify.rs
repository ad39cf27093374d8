use dashmap::DashMap;
use tokio::sync::broadcast;
use ulid::Ulid;

use crate::model::Event;

const CHANNEL_CAPACITY: usize = 256;

/// Broadcast hub keyed by trainer, room or class id. Every committed event
/// is published to each resource it touched.
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

    /// Subscribe to changes of one resource. Creates the channel if needed.
    pub fn subscribe(&self, resource_id: Ulid) -> broadcast::Receiver<Event> {
        let sender = self
            .channels
            .entry(resource_id)
            .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0);
        sender.subscribe()
    }

    /// Send a notification. No-op if nobody is listening.
    pub fn send(&self, resource_id: Ulid, event: &Event) {
        if let Some(sender) = self.channels.get(&resource_id) {
            let _ = sender.send(event.clone());
        }
    }

    /// Drop channels whose receivers have all gone away.
    pub fn prune_idle(&self) -> usize {
        let before = self.channels.len();
        self.channels.retain(|_, sender| sender.receiver_count() > 0);
        before - self.channels.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn subscribe_and_receive() {
        let hub = NotifyHub::new();
        let rid = Ulid::new();
        let mut rx = hub.subscribe(rid);

        let event = Event::RoomCreated {
            id: rid,
            name: None,
            capacity: 4,
        };
        hub.send(rid, &event);

        let received = rx.recv().await.unwrap();
        assert_eq!(received, event);
    }

    #[tokio::test]
    async fn send_without_subscribers_is_noop() {
        let hub = NotifyHub::new();
        let rid = Ulid::new();
        hub.send(rid, &Event::TrainerCreated { id: rid, name: None });
    }

    #[tokio::test]
    async fn prune_idle_drops_abandoned_channels() {
        let hub = NotifyHub::new();
        let kept = Ulid::new();
        let _rx = hub.subscribe(kept);
        drop(hub.subscribe(Ulid::new()));

        assert_eq!(hub.prune_idle(), 1);
        assert_eq!(hub.prune_idle(), 0);
    }
}
