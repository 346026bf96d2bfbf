//! Per-session event fan-out.
//!
//! One broadcaster per arena. Subscribers get the full game-state snapshot
//! first, then live events; both are composed atomically inside the session
//! actor, so a subscriber can never observe an event older than its
//! snapshot.

use tokio::sync::broadcast;

use crate::session::state::{GameStateSnapshot, SessionEvent};

/// Default per-subscriber buffer. Slow subscribers that fall further behind
/// than this lose the oldest events (tokio broadcast lag semantics).
pub const DEFAULT_EVENT_BUFFER: usize = 256;

/// Fan-out handle owned by a session actor.
#[derive(Debug)]
pub struct Broadcaster {
    tx: broadcast::Sender<SessionEvent>,
}

impl Default for Broadcaster {
    fn default() -> Self {
        Self::new(DEFAULT_EVENT_BUFFER)
    }
}

impl Broadcaster {
    /// Creates a broadcaster with the given per-subscriber buffer.
    #[must_use]
    pub fn new(buffer: usize) -> Self {
        let (tx, _) = broadcast::channel(buffer);
        Self { tx }
    }

    /// Publishes one event to all current subscribers. Events published
    /// with no subscribers are dropped, not queued.
    pub fn publish(&self, event: SessionEvent) {
        let _ = self.tx.send(event);
    }

    /// Publishes a batch in order.
    pub fn publish_all(&self, events: impl IntoIterator<Item = SessionEvent>) {
        for event in events {
            self.publish(event);
        }
    }

    /// Opens a new subscription. The caller pairs this with a snapshot
    /// taken in the same actor turn.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.tx.subscribe()
    }

    /// Number of live subscribers.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

/// A snapshot plus the live tail that starts right after it.
#[derive(Debug)]
pub struct Subscription {
    /// Full state at subscription time
    pub snapshot: GameStateSnapshot,
    /// Live events from this point on
    pub events: broadcast::Receiver<SessionEvent>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arena::ParticipantId;

    fn event(name: &str) -> SessionEvent {
        SessionEvent::ParticipantJoined {
            participant: ParticipantId::new(name),
            display_name: name.to_string(),
        }
    }

    #[tokio::test]
    async fn test_subscribers_receive_in_order() {
        let broadcaster = Broadcaster::default();
        let mut rx = broadcaster.subscribe();

        broadcaster.publish(event("a"));
        broadcaster.publish(event("b"));

        assert_eq!(rx.recv().await.unwrap(), event("a"));
        assert_eq!(rx.recv().await.unwrap(), event("b"));
    }

    #[tokio::test]
    async fn test_events_before_subscribe_are_not_replayed() {
        let broadcaster = Broadcaster::default();
        broadcaster.publish(event("lost"));

        let mut rx = broadcaster.subscribe();
        broadcaster.publish(event("seen"));
        assert_eq!(rx.recv().await.unwrap(), event("seen"));
    }

    #[tokio::test]
    async fn test_publish_without_subscribers_is_harmless() {
        let broadcaster = Broadcaster::default();
        broadcaster.publish_all([event("a"), event("b")]);
        assert_eq!(broadcaster.subscriber_count(), 0);
    }
}
