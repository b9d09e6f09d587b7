//! Typed publish/subscribe between the camera, the render pool and external
//! components.
//!
//! Delivery is synchronous: [`EventBus::publish`] calls every subscriber of
//! the message's topic, in subscription order, before returning. The
//! subscriber list is snapshotted at publish time, so callbacks may subscribe,
//! unsubscribe or publish without deadlocking; such changes take effect from
//! the next publish.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::trace;

use crate::geometry::{Point, Rect};

/// Message topics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Topic {
    Select,
    Locate,
    Settled,
}

/// Messages carried by the bus.
#[derive(Debug, Clone, PartialEq)]
pub enum BusMessage {
    /// An entity was chosen for highlighting.
    Select { id: String },
    /// The camera should travel to a world coordinate.
    Locate { coord: Point },
    /// The camera came to rest; `rect` is the expanded query rectangle.
    Settled { rect: Rect },
}

impl BusMessage {
    pub fn topic(&self) -> Topic {
        match self {
            BusMessage::Select { .. } => Topic::Select,
            BusMessage::Locate { .. } => Topic::Locate,
            BusMessage::Settled { .. } => Topic::Settled,
        }
    }
}

/// Opaque subscription identifier returned by [`EventBus::subscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionId(u64);

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sub-{}", self.0)
    }
}

type Callback = Arc<dyn Fn(&BusMessage) + Send + Sync>;

struct Subscriber {
    id: SubscriptionId,
    topic: Topic,
    callback: Callback,
}

/// Synchronous topic-based message bus.
#[derive(Default)]
pub struct EventBus {
    subscribers: Mutex<Vec<Subscriber>>,
    next_id: AtomicU64,
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBus")
            .field("subscribers", &self.subscriber_count())
            .finish()
    }
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `callback` for messages on `topic`.
    pub fn subscribe<F>(&self, topic: Topic, callback: F) -> SubscriptionId
    where
        F: Fn(&BusMessage) + Send + Sync + 'static,
    {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.subscribers.lock().push(Subscriber {
            id,
            topic,
            callback: Arc::new(callback),
        });
        trace!(%id, ?topic, "Subscribed");
        id
    }

    /// Remove a subscription. Returns whether it existed.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut subscribers = self.subscribers.lock();
        let before = subscribers.len();
        subscribers.retain(|s| s.id != id);
        before != subscribers.len()
    }

    /// Deliver `message` to every subscriber of its topic.
    ///
    /// Returns the number of subscribers invoked.
    pub fn publish(&self, message: BusMessage) -> usize {
        let topic = message.topic();
        let snapshot: Vec<Callback> = self
            .subscribers
            .lock()
            .iter()
            .filter(|s| s.topic == topic)
            .map(|s| Arc::clone(&s.callback))
            .collect();

        trace!(?topic, subscribers = snapshot.len(), "Publishing");
        for callback in &snapshot {
            callback(&message);
        }
        snapshot.len()
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.lock().len()
    }
}
