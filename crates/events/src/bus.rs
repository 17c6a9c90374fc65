//! Event bus implementation using tokio broadcast channels

use tokio::sync::broadcast;

use crate::types::{Event, EventEnvelope};

/// Capacity for the broadcast channel
const DEFAULT_CAPACITY: usize = 256;

/// Broadcast bus carrying engine events to any number of observers
/// (progress printers, log forwarders, tests).
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<EventEnvelope>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publish an event to all subscribers.
    ///
    /// The event is wrapped in an envelope with a fresh id and
    /// timestamp. Returns the number of subscribers that received it;
    /// with no subscribers the event is dropped and 0 is returned.
    pub fn publish(&self, event: Event) -> usize {
        self.sender.send(EventEnvelope::new(event)).unwrap_or(0)
    }

    /// Subscribe to events published after this call.
    pub fn subscribe(&self) -> broadcast::Receiver<EventEnvelope> {
        self.sender.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("subscriber_count", &self.subscriber_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use interop_core::SessionRole;

    #[tokio::test]
    async fn test_publish_subscribe() {
        let bus = EventBus::new();
        let mut rx = bus.subscribe();

        let sent = bus.publish(Event::BarrierReached {
            role: SessionRole::Publisher,
        });
        assert_eq!(sent, 1);

        let received = rx.recv().await.unwrap();
        match received.event {
            Event::BarrierReached { role } => assert_eq!(role, SessionRole::Publisher),
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_multiple_subscribers() {
        let bus = EventBus::new();
        let mut rx1 = bus.subscribe();
        let mut rx2 = bus.subscribe();

        let sent = bus.publish(Event::Error {
            message: "boom".to_string(),
            context: None,
        });
        assert_eq!(sent, 2);

        assert_eq!(rx1.recv().await.unwrap().id, rx2.recv().await.unwrap().id);
    }

    #[tokio::test]
    async fn test_no_subscribers_drops_event() {
        let bus = EventBus::new();
        let sent = bus.publish(Event::Error {
            message: "dropped".to_string(),
            context: None,
        });
        assert_eq!(sent, 0);
    }

    #[test]
    fn test_clone_shares_channel() {
        let bus1 = EventBus::new();
        let bus2 = bus1.clone();

        let _rx = bus2.subscribe();
        assert_eq!(bus1.subscriber_count(), 1);
    }
}
