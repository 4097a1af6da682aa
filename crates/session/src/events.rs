//! Event System
//!
//! Pub/sub event bus broadcasting session lifecycle and view changes so a
//! frontend can react without polling.

use crossbeam_channel::{unbounded, Receiver, Sender};
use parking_lot::RwLock;
use tracing::debug;

use heaplens_classifier::ClassGrouping;

use crate::session::SessionId;

/// Events emitted by sessions and the registry
#[derive(Debug, Clone)]
pub enum SessionEvent {
    /// A session was created for a loaded capture
    SessionCreated { session: SessionId },
    /// A session was discarded
    SessionDiscarded { session: SessionId },
    /// The selection window of a session changed
    RangeSelected {
        session: SessionId,
        min: i64,
        max: i64,
    },
    /// A heap's grouping changed
    GroupingChanged {
        session: SessionId,
        heap: u32,
        grouping: ClassGrouping,
    },
    /// A heap's filter changed
    FilterChanged {
        session: SessionId,
        heap: u32,
        text: String,
    },
}

/// Subscriber handle for receiving events
#[derive(Clone)]
pub struct EventSubscription {
    receiver: Receiver<SessionEvent>,
}

impl EventSubscription {
    /// Receive the next event (blocking)
    pub fn recv(&self) -> Result<SessionEvent, crossbeam_channel::RecvError> {
        self.receiver.recv()
    }

    /// Try to receive an event (non-blocking)
    pub fn try_recv(&self) -> Result<SessionEvent, crossbeam_channel::TryRecvError> {
        self.receiver.try_recv()
    }

    /// Get an iterator over events
    pub fn iter(&self) -> impl Iterator<Item = SessionEvent> + '_ {
        self.receiver.iter()
    }
}

/// Event bus for publish/subscribe pattern
pub struct EventBus {
    subscribers: RwLock<Vec<Sender<SessionEvent>>>,
}

impl EventBus {
    /// Create a new event bus
    pub fn new() -> Self {
        Self {
            subscribers: RwLock::new(Vec::new()),
        }
    }

    /// Subscribe to events
    pub fn subscribe(&self) -> EventSubscription {
        let (sender, receiver) = unbounded();
        self.subscribers.write().push(sender);
        EventSubscription { receiver }
    }

    /// Emit an event to all subscribers, pruning disconnected ones
    pub fn emit(&self, event: SessionEvent) -> usize {
        let mut subscribers = self.subscribers.write();
        subscribers.retain(|sender| sender.send(event.clone()).is_ok());
        let delivered = subscribers.len();
        debug!("Event {:?} delivered to {} subscribers", event, delivered);
        delivered
    }

    /// Get the number of active subscribers
    pub fn subscriber_count(&self) -> usize {
        self.subscribers.read().len()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_bus() {
        let bus = EventBus::new();
        let sub1 = bus.subscribe();
        let sub2 = bus.subscribe();

        assert_eq!(bus.subscriber_count(), 2);

        let delivered = bus.emit(SessionEvent::SessionCreated {
            session: SessionId(1),
        });
        assert_eq!(delivered, 2);

        assert!(sub1.try_recv().is_ok());
        assert!(sub2.try_recv().is_ok());
    }

    #[test]
    fn test_emit_prunes_dropped_subscribers() {
        let bus = EventBus::new();
        let kept = bus.subscribe();
        drop(bus.subscribe());

        let delivered = bus.emit(SessionEvent::SessionDiscarded {
            session: SessionId(7),
        });
        assert_eq!(delivered, 1);
        assert!(kept.try_recv().is_ok());
    }
}
