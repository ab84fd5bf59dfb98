//! Typed input events and the bus that delivers them.
//!
//! The render side forwards raw input over the bridge; the model side turns
//! it into [`InputEvent`]s and publishes them here. Topics are an enum, so a
//! misspelled topic is a compile error rather than a silent no-op.
//!
//! Delivery is synchronous: `publish` runs every subscriber before it
//! returns, so an event never outlives the tick that produced it.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::handle::ObjectHandle;
use crate::math::Vec3;

/// Topic discriminator
#[repr(u8)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventTopic {
    /// Key pressed
    KeyDown = 0,
    /// Key released
    KeyUp = 1,
    /// Pointer button pressed
    PointerDown = 2,
    /// Pointer button released
    PointerUp = 3,
    /// Pointer ray hit one or more bridged objects
    PointerHit = 4,
    /// Application-defined event
    Custom = 5,
}

/// One object hit by a pointer ray.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PointerHit {
    /// Object that was hit
    pub handle: ObjectHandle,
    /// World-space hit point
    pub point: Vec3,
    /// Interaction layers of the object
    pub layers: Vec<String>,
}

/// Input forwarded from the render side.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum InputEvent {
    /// Key pressed
    KeyDown {
        /// Engine key code, e.g. `Space`
        key: String,
    },
    /// Key released
    KeyUp {
        /// Engine key code
        key: String,
    },
    /// Pointer button pressed
    PointerDown {
        /// Button index
        button: u32,
    },
    /// Pointer button released
    PointerUp {
        /// Button index
        button: u32,
    },
    /// Pointer hit list, nearest first
    PointerHit {
        /// Hits on registered objects
        hits: Vec<PointerHit>,
    },
    /// Application-defined event
    Custom {
        /// Event name as sent by the engine
        name: String,
        /// Remaining raw arguments
        args: Vec<String>,
    },
}

impl InputEvent {
    /// Returns the topic this event is published on
    #[must_use]
    pub const fn topic(&self) -> EventTopic {
        match self {
            Self::KeyDown { .. } => EventTopic::KeyDown,
            Self::KeyUp { .. } => EventTopic::KeyUp,
            Self::PointerDown { .. } => EventTopic::PointerDown,
            Self::PointerUp { .. } => EventTopic::PointerUp,
            Self::PointerHit { .. } => EventTopic::PointerHit,
            Self::Custom { .. } => EventTopic::Custom,
        }
    }
}

/// Identifies a subscription for later removal.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

type Subscriber = Box<dyn FnMut(&InputEvent) + Send>;

/// Synchronous topic-keyed event bus.
#[derive(Default)]
pub struct EventBus {
    subscribers: HashMap<EventTopic, Vec<(SubscriptionId, Subscriber)>>,
    next_id: u64,
}

impl EventBus {
    /// Creates an empty bus.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `callback` for every event published on `topic`.
    pub fn subscribe<F>(&mut self, topic: EventTopic, callback: F) -> SubscriptionId
    where
        F: FnMut(&InputEvent) + Send + 'static,
    {
        let id = SubscriptionId(self.next_id);
        self.next_id += 1;
        self.subscribers
            .entry(topic)
            .or_default()
            .push((id, Box::new(callback)));
        id
    }

    /// Removes a subscription. Returns false if it was already gone.
    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        for subs in self.subscribers.values_mut() {
            if let Some(index) = subs.iter().position(|(sid, _)| *sid == id) {
                let _ = subs.remove(index);
                return true;
            }
        }
        false
    }

    /// Delivers `event` to every subscriber of its topic.
    ///
    /// Returns the number of subscribers that saw it.
    pub fn publish(&mut self, event: &InputEvent) -> usize {
        let Some(subs) = self.subscribers.get_mut(&event.topic()) else {
            return 0;
        };
        for (_, callback) in subs.iter_mut() {
            callback(event);
        }
        subs.len()
    }

    /// Number of live subscriptions on `topic`.
    #[must_use]
    pub fn subscriber_count(&self, topic: EventTopic) -> usize {
        self.subscribers.get(&topic).map_or(0, Vec::len)
    }
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("topics", &self.subscribers.len())
            .field("next_id", &self.next_id)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn test_event_topic() {
        let event = InputEvent::KeyDown { key: "Space".into() };
        assert_eq!(event.topic(), EventTopic::KeyDown);
        let event = InputEvent::PointerHit { hits: Vec::new() };
        assert_eq!(event.topic(), EventTopic::PointerHit);
    }

    #[test]
    fn test_publish_only_reaches_matching_topic() {
        let mut bus = EventBus::new();
        let downs = Arc::new(AtomicUsize::new(0));
        let ups = Arc::new(AtomicUsize::new(0));

        let d = Arc::clone(&downs);
        bus.subscribe(EventTopic::KeyDown, move |_| {
            d.fetch_add(1, Ordering::Relaxed);
        });
        let u = Arc::clone(&ups);
        bus.subscribe(EventTopic::KeyUp, move |_| {
            u.fetch_add(1, Ordering::Relaxed);
        });

        assert_eq!(bus.publish(&InputEvent::KeyDown { key: "W".into() }), 1);
        assert_eq!(bus.publish(&InputEvent::PointerDown { button: 0 }), 0);
        assert_eq!(downs.load(Ordering::Relaxed), 1);
        assert_eq!(ups.load(Ordering::Relaxed), 0);
    }

    #[test]
    fn test_unsubscribe() {
        let mut bus = EventBus::new();
        let id = bus.subscribe(EventTopic::Custom, |_| {});
        assert_eq!(bus.subscriber_count(EventTopic::Custom), 1);
        assert!(bus.unsubscribe(id));
        assert!(!bus.unsubscribe(id));
        assert_eq!(bus.subscriber_count(EventTopic::Custom), 0);
    }
}
