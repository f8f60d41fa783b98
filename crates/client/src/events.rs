//! Delivery of unsolicited notifications to subscribers.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use serde_json::Value;
use tokio::sync::mpsc;

/// A notification pushed by the remote side.
#[derive(Debug, Clone, PartialEq)]
pub struct Event {
    /// Event name, e.g. a signal name.
    pub name: String,
    /// Optional event payload.
    pub payload: Option<Value>,
}

/// Receives events for one subscription.
///
/// The subscription ends (`recv` returns `None`) when the connection closes.
pub struct EventReceiver {
    rx: mpsc::UnboundedReceiver<Event>,
}

impl EventReceiver {
    fn new(rx: mpsc::UnboundedReceiver<Event>) -> Self {
        Self { rx }
    }

    /// Receive next event asynchronously
    pub async fn recv(&mut self) -> Option<Event> {
        self.rx.recv().await
    }

    /// Convert to a Stream for use with StreamExt
    pub fn into_stream(self) -> impl futures::Stream<Item = Event> {
        tokio_stream::wrappers::UnboundedReceiverStream::new(self.rx)
    }
}

#[derive(Default)]
struct Subscribers {
    by_name: HashMap<String, Vec<mpsc::UnboundedSender<Event>>>,
    all: Vec<mpsc::UnboundedSender<Event>>,
    closed: bool,
}

/// Registration table from event name to subscribers.
#[derive(Default)]
pub(crate) struct EventRegistry {
    subscribers: Mutex<Subscribers>,
}

impl EventRegistry {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Subscribers> {
        self.subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Subscribe to events called `name`.
    pub(crate) fn subscribe(&self, name: &str) -> EventReceiver {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut subscribers = self.lock();
        // Subscribing after close hands back a receiver that has already ended.
        if !subscribers.closed {
            subscribers
                .by_name
                .entry(name.to_string())
                .or_default()
                .push(tx);
        }
        EventReceiver::new(rx)
    }

    /// Subscribe to every event.
    pub(crate) fn subscribe_all(&self) -> EventReceiver {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut subscribers = self.lock();
        if !subscribers.closed {
            subscribers.all.push(tx);
        }
        EventReceiver::new(rx)
    }

    /// Deliver `event` to its subscribers. Returns how many received it.
    ///
    /// An event nobody subscribed to is dropped.
    pub(crate) fn dispatch(&self, event: Event) -> usize {
        let mut subscribers = self.lock();
        let mut delivered = 0;

        if let Some(named) = subscribers.by_name.get_mut(&event.name) {
            named.retain(|tx| {
                let sent = tx.send(event.clone()).is_ok();
                delivered += usize::from(sent);
                sent
            });
            if named.is_empty() {
                subscribers.by_name.remove(&event.name);
            }
        }

        subscribers.all.retain(|tx| {
            let sent = tx.send(event.clone()).is_ok();
            delivered += usize::from(sent);
            sent
        });

        delivered
    }

    /// End every subscription.
    pub(crate) fn close(&self) {
        let mut subscribers = self.lock();
        subscribers.closed = true;
        subscribers.by_name.clear();
        subscribers.all.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn event(name: &str) -> Event {
        Event {
            name: name.to_string(),
            payload: Some(json!({"source": "/root/Main"})),
        }
    }

    #[tokio::test]
    async fn named_subscription_only_sees_its_event() {
        let registry = EventRegistry::new();
        let mut pressed = registry.subscribe("pressed");

        assert_eq!(registry.dispatch(event("toggled")), 0);
        assert_eq!(registry.dispatch(event("pressed")), 1);

        assert_eq!(pressed.recv().await, Some(event("pressed")));
    }

    #[tokio::test]
    async fn wildcard_sees_everything() {
        let registry = EventRegistry::new();
        let mut all = registry.subscribe_all();
        let _pressed = registry.subscribe("pressed");

        assert_eq!(registry.dispatch(event("pressed")), 2);
        registry.dispatch(event("toggled"));

        assert_eq!(all.recv().await.unwrap().name, "pressed");
        assert_eq!(all.recv().await.unwrap().name, "toggled");
    }

    #[test]
    fn dropped_receivers_are_pruned() {
        let registry = EventRegistry::new();
        drop(registry.subscribe("pressed"));

        assert_eq!(registry.dispatch(event("pressed")), 0);
        assert!(registry.lock().by_name.is_empty());
    }

    #[tokio::test]
    async fn close_ends_subscriptions() {
        let registry = EventRegistry::new();
        let mut pressed = registry.subscribe("pressed");

        registry.close();

        assert_eq!(pressed.recv().await, None);
        let mut late = registry.subscribe_all();
        assert_eq!(late.recv().await, None);
    }
}
