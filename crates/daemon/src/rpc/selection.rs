// Selection subscriptions and change detection.
//
// Both producers (poll ticks and the host's native signal) feed `observe`,
// which only broadcasts when the fingerprint differs from the last one seen.

use std::collections::HashMap;

use gdslink_common::protocol::wire::Event;
use tracing::debug;

use super::outbound::{ConnectionHandle, ConnectionId};

#[derive(Debug, Default)]
pub struct SelectionPublisher {
    subscribers: HashMap<ConnectionId, ConnectionHandle>,
    /// `None` until the first observation; then the last fingerprint seen.
    last: Option<Option<String>>,
}

impl SelectionPublisher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `connection` with `current` as the selection it starts from.
    ///
    /// `current` is observed first, so subscribers that were already
    /// registered hear about a change the new subscriber only sees in its
    /// response. Subscribing twice is a no-op beyond that.
    pub fn subscribe(&mut self, connection: &ConnectionHandle, current: Option<String>) {
        self.observe(current);
        self.subscribers.insert(connection.id(), connection.clone());
    }

    /// Returns whether the connection was subscribed.
    pub fn unsubscribe(&mut self, connection: ConnectionId) -> bool {
        self.subscribers.remove(&connection).is_some()
    }

    /// Compare `current` with the snapshot and broadcast on change.
    /// Returns the number of subscribers that received the event.
    pub fn observe(&mut self, current: Option<String>) -> usize {
        if self.last.as_ref() == Some(&current) {
            return 0;
        }

        let event = Event::selection(current.clone());
        self.last = Some(current);

        let mut delivered = 0;
        self.subscribers.retain(|id, handle| {
            if handle.send(&event) {
                delivered += 1;
                true
            } else {
                debug!(connection = id, "pruning closed selection subscriber");
                false
            }
        });
        delivered
    }

    pub fn clear(&mut self) {
        self.subscribers.clear();
    }

    pub fn is_empty(&self) -> bool {
        self.subscribers.is_empty()
    }

    pub fn len(&self) -> usize {
        self.subscribers.len()
    }

    pub fn contains(&self, connection: ConnectionId) -> bool {
        self.subscribers.contains_key(&connection)
    }

    /// The last observed fingerprint, if anything has been observed yet.
    pub fn snapshot(&self) -> Option<&Option<String>> {
        self.last.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use gdslink_common::protocol::wire::ServerMessage;
    use tokio::sync::mpsc::UnboundedReceiver;

    use super::*;
    use crate::rpc::outbound::OutboundFrame;

    const FP: &str = "1/0@0_0_10_0_10_10";

    fn drain(rx: &mut UnboundedReceiver<OutboundFrame>) -> Vec<Event> {
        let mut events = Vec::new();
        while let Ok(frame) = rx.try_recv() {
            match serde_json::from_str(frame.line.trim_end()).unwrap() {
                ServerMessage::Event(event) => events.push(event),
                ServerMessage::Response(response) => panic!("unexpected response {response:?}"),
            }
        }
        events
    }

    #[test]
    fn unchanged_selection_produces_no_events() {
        let (handle, mut rx) = ConnectionHandle::channel(1);
        let mut publisher = SelectionPublisher::new();
        publisher.subscribe(&handle, Some(FP.into()));

        for _ in 0..5 {
            assert_eq!(publisher.observe(Some(FP.into())), 0);
        }
        assert!(drain(&mut rx).is_empty());
    }

    #[test]
    fn change_to_null_produces_one_null_event() {
        let (handle, mut rx) = ConnectionHandle::channel(1);
        let mut publisher = SelectionPublisher::new();
        publisher.subscribe(&handle, Some(FP.into()));

        assert_eq!(publisher.observe(None), 1);
        assert_eq!(publisher.observe(None), 0);
        assert_eq!(drain(&mut rx), vec![Event::selection(None)]);
    }

    #[test]
    fn subscribing_twice_keeps_one_entry() {
        let (handle, _rx) = ConnectionHandle::channel(1);
        let mut publisher = SelectionPublisher::new();
        publisher.subscribe(&handle, None);
        publisher.subscribe(&handle, None);
        assert_eq!(publisher.len(), 1);

        assert!(publisher.unsubscribe(1));
        assert!(publisher.is_empty());
        assert!(!publisher.unsubscribe(1));
    }

    #[test]
    fn new_subscriber_does_not_hide_change_from_existing_ones() {
        let (first, mut first_rx) = ConnectionHandle::channel(1);
        let (second, mut second_rx) = ConnectionHandle::channel(2);
        let mut publisher = SelectionPublisher::new();

        publisher.subscribe(&first, None);
        publisher.subscribe(&second, Some(FP.into()));

        assert_eq!(drain(&mut first_rx), vec![Event::selection(Some(FP.into()))]);
        assert!(drain(&mut second_rx).is_empty());
        assert_eq!(publisher.snapshot(), Some(&Some(FP.to_string())));
    }

    #[test]
    fn closed_subscribers_are_pruned_on_broadcast() {
        let (alive, mut alive_rx) = ConnectionHandle::channel(1);
        let (dead, dead_rx) = ConnectionHandle::channel(2);
        let mut publisher = SelectionPublisher::new();
        publisher.subscribe(&alive, None);
        publisher.subscribe(&dead, None);
        drop(dead_rx);

        assert_eq!(publisher.observe(Some(FP.into())), 1);
        assert!(publisher.contains(1));
        assert!(!publisher.contains(2));
        assert_eq!(drain(&mut alive_rx).len(), 1);
    }
}
