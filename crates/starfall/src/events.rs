//! # STARFALL Event System
//!
//! How the simulation talks to whoever is watching it.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐      ┌─────────────┐      ┌──────────────────┐
//! │   Session   │─────>│  EventHooks │─────>│ registered hooks │
//! │ (per tick)  │      └─────────────┘      └──────────────────┘
//! │             │      ┌─────────────┐      ┌──────────────────┐
//! │             │─────>│  EventBus   │─────>│ EventReceiver(s) │
//! └─────────────┘      └─────────────┘      └──────────────────┘
//! ```
//!
//! Hooks run synchronously at the end of the tick on the main thread.
//! The bus is a bounded channel for consumers that poll (or live on
//! another thread). A full bus drops events rather than stall the tick.

use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};
use starfall_shared::{EventType, SimEvent};
use tracing::debug;

/// Bounded event channel.
pub struct EventBus {
    sender: Sender<SimEvent>,
    receiver: Receiver<SimEvent>,
}

impl EventBus {
    /// Creates a new event bus.
    ///
    /// # Arguments
    ///
    /// * `capacity` - Maximum events in flight before new ones are dropped.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (sender, receiver) = bounded(capacity);
        Self { sender, receiver }
    }

    /// Creates a sender handle.
    #[must_use]
    pub fn sender(&self) -> EventSender {
        EventSender {
            sender: self.sender.clone(),
        }
    }

    /// Creates a receiver handle. Receivers compete: each event is
    /// delivered to exactly one of them.
    #[must_use]
    pub fn receiver(&self) -> EventReceiver {
        EventReceiver {
            receiver: self.receiver.clone(),
        }
    }
}

/// Handle for sending events.
#[derive(Clone)]
pub struct EventSender {
    sender: Sender<SimEvent>,
}

impl EventSender {
    /// Sends an event (non-blocking).
    ///
    /// Returns `false` if the channel is full and the event was dropped.
    #[inline]
    pub fn send(&self, event: SimEvent) -> bool {
        match self.sender.try_send(event) {
            Ok(()) => true,
            Err(TrySendError::Full(event)) => {
                debug!(event = ?event.event_type(), "event bus full, dropping event");
                false
            }
            Err(TrySendError::Disconnected(_)) => false,
        }
    }
}

/// Handle for receiving events.
#[derive(Clone)]
pub struct EventReceiver {
    receiver: Receiver<SimEvent>,
}

impl EventReceiver {
    /// Receives all pending events (non-blocking).
    #[inline]
    pub fn drain(&self) -> Vec<SimEvent> {
        self.receiver.try_iter().collect()
    }

    /// Receives one event (non-blocking).
    #[inline]
    pub fn try_recv(&self) -> Option<SimEvent> {
        self.receiver.try_recv().ok()
    }

    /// Returns the number of pending events.
    #[inline]
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.receiver.len()
    }

    /// Checks if there are pending events.
    #[inline]
    #[must_use]
    pub fn has_events(&self) -> bool {
        !self.receiver.is_empty()
    }
}

type Hook = Box<dyn FnMut(&SimEvent)>;

/// Typed callback registry.
///
/// Presentation code registers a handler per event type (particles on
/// `Explosion`, HUD on `ScoreAwarded`, ...). The session dispatches every
/// event it publishes.
pub struct EventHooks {
    by_type: Vec<Vec<Hook>>,
}

impl EventHooks {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self {
            by_type: (0..EventType::COUNT).map(|_| Vec::new()).collect(),
        }
    }

    /// Registers `hook` for events of `event_type`.
    pub fn on(&mut self, event_type: EventType, hook: impl FnMut(&SimEvent) + 'static) {
        if let Some(hooks) = self.by_type.get_mut(event_type.index()) {
            hooks.push(Box::new(hook));
        }
    }

    /// Runs every hook registered for this event's type.
    ///
    /// Returns how many hooks ran.
    pub fn dispatch(&mut self, event: &SimEvent) -> usize {
        let Some(hooks) = self.by_type.get_mut(event.event_type().index()) else {
            return 0;
        };
        for hook in hooks.iter_mut() {
            hook(event);
        }
        hooks.len()
    }

    /// Number of hooks registered for `event_type`.
    #[must_use]
    pub fn count(&self, event_type: EventType) -> usize {
        self.by_type.get(event_type.index()).map_or(0, Vec::len)
    }

    /// Removes every hook.
    pub fn clear(&mut self) {
        for hooks in &mut self.by_type {
            hooks.clear();
        }
    }
}

impl Default for EventHooks {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use starfall_shared::Vec3;
    use std::cell::RefCell;
    use std::rc::Rc;

    #[test]
    fn test_event_send_receive() {
        let bus = EventBus::new(100);
        let sender = bus.sender();
        let receiver = bus.receiver();

        assert!(sender.send(SimEvent::Explosion {
            position: Vec3::new(10.0, 20.0, 30.0),
            radius: 60.0,
        }));
        assert!(receiver.has_events());

        match receiver.try_recv().unwrap() {
            SimEvent::Explosion { position, .. } => assert_eq!(position, Vec3::new(10.0, 20.0, 30.0)),
            other => panic!("wrong event: {other:?}"),
        }
    }

    #[test]
    fn test_full_bus_drops() {
        let bus = EventBus::new(2);
        let sender = bus.sender();
        assert!(sender.send(SimEvent::SessionReset));
        assert!(sender.send(SimEvent::SessionReset));
        assert!(!sender.send(SimEvent::SessionReset));

        let receiver = bus.receiver();
        assert_eq!(receiver.pending_count(), 2);
        assert_eq!(receiver.drain().len(), 2);
        assert!(!receiver.has_events());
    }

    #[test]
    fn test_hooks_by_type() {
        let mut hooks = EventHooks::new();
        let points = Rc::new(RefCell::new(0u32));

        let sink = Rc::clone(&points);
        hooks.on(EventType::ScoreAwarded, move |event| {
            if let SimEvent::ScoreAwarded { points, .. } = event {
                *sink.borrow_mut() += points;
            }
        });
        assert_eq!(hooks.count(EventType::ScoreAwarded), 1);

        assert_eq!(hooks.dispatch(&SimEvent::ScoreAwarded { entity_id: 1, points: 10 }), 1);
        assert_eq!(hooks.dispatch(&SimEvent::SessionReset), 0);
        assert_eq!(hooks.dispatch(&SimEvent::ScoreAwarded { entity_id: 2, points: 25 }), 1);
        assert_eq!(*points.borrow(), 35);

        hooks.clear();
        assert_eq!(hooks.count(EventType::ScoreAwarded), 0);
    }
}
