//! In-process event fan-out (§4.5). Subscribers register an `mpsc` sink and
//! receive every event published after registration, in publish order.
//! Modeled on the teacher's `NodeRegistry` sink-map pattern, but fire-and-forget:
//! a slow or dropped subscriber never blocks a publisher.

use std::collections::HashMap;

use maestro_domain::events::{Event, EventEnvelope};
use parking_lot::RwLock;
use tokio::sync::mpsc;

pub type EventSink = mpsc::Sender<EventEnvelope>;

#[derive(Default)]
pub struct EventBus {
    subscribers: RwLock<HashMap<u64, EventSink>>,
    next_id: std::sync::atomic::AtomicU64,
}

/// Handle returned by `subscribe`; dropping it unsubscribes.
pub struct Subscription<'a> {
    bus: &'a EventBus,
    id: u64,
}

impl Drop for Subscription<'_> {
    fn drop(&mut self) {
        self.bus.subscribers.write().remove(&self.id);
    }
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a sink; returns a guard that unsubscribes on drop.
    pub fn subscribe(&self, sink: EventSink) -> Subscription<'_> {
        let id = self
            .next_id
            .fetch_add(1, std::sync::atomic::Ordering::Relaxed);
        self.subscribers.write().insert(id, sink);
        Subscription { bus: self, id }
    }

    /// Deliver `event` to every current subscriber in registration order.
    /// A full or closed channel is dropped silently — slow readers miss
    /// events rather than stall publishers (§4.5).
    pub fn publish(&self, event: Event) {
        let envelope = event.envelope();
        let subs: Vec<(u64, EventSink)> = self
            .subscribers
            .read()
            .iter()
            .map(|(id, s)| (*id, s.clone()))
            .collect();
        for (id, sink) in subs {
            if let Err(e) = sink.try_send(envelope.clone()) {
                tracing::debug!(subscriber = id, error = %e, "dropping event for slow subscriber");
            }
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.read().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn delivers_to_all_subscribers_in_order() {
        let bus = EventBus::new();
        let (tx1, mut rx1) = mpsc::channel(8);
        let (tx2, mut rx2) = mpsc::channel(8);
        let _s1 = bus.subscribe(tx1);
        let _s2 = bus.subscribe(tx2);

        bus.publish(Event::ProjectDeleted {
            project_id: "proj_1".into(),
        });

        let e1 = rx1.recv().await.unwrap();
        let e2 = rx2.recv().await.unwrap();
        assert_eq!(e1.event, "project:deleted");
        assert_eq!(e2.event, "project:deleted");
    }

    #[tokio::test]
    async fn dropped_subscription_stops_delivery() {
        let bus = EventBus::new();
        let (tx, mut rx) = mpsc::channel(8);
        let sub = bus.subscribe(tx);
        drop(sub);

        bus.publish(Event::ProjectDeleted {
            project_id: "proj_1".into(),
        });
        assert!(rx.try_recv().is_err());
    }
}
