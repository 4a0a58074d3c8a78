//! Event system for inbound bytes and channel lifecycle.
//!
//! Each channel owns an [`EventDispatcher`]. The receive loops dispatch an
//! independent copy of every payload; consumers hold a [`Subscription`].
//! Per-channel ordering is preserved.

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use tokio::sync::broadcast;

/// Event types that can be dispatched.
#[derive(Debug, Clone)]
pub enum Event {
    /// Connection established.
    Connected,
    /// Connection closed locally.
    Disconnected,
    /// Connection attempt failed; the channel stays disconnected.
    ConnectFailed { reason: String },
    /// Bytes received from the peer (one read or one datagram).
    Data(Bytes),
}

/// Discriminant of an [`Event`], used for filtering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    Connected,
    Disconnected,
    ConnectFailed,
    Data,
}

impl Event {
    /// Returns the kind of this event.
    #[must_use]
    pub const fn kind(&self) -> EventKind {
        match self {
            Self::Connected => EventKind::Connected,
            Self::Disconnected => EventKind::Disconnected,
            Self::ConnectFailed { .. } => EventKind::ConnectFailed,
            Self::Data(_) => EventKind::Data,
        }
    }
}

/// A subscription to events.
pub struct Subscription {
    receiver: broadcast::Receiver<Event>,
}

impl Subscription {
    /// Receives the next event.
    ///
    /// Returns `None` once the dispatcher is gone.
    pub async fn recv(&mut self) -> Option<Event> {
        loop {
            match self.receiver.recv().await {
                Ok(event) => return Some(event),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "event subscriber lagged, events dropped");
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }
}

/// Subscription filter for specific event kinds.
#[derive(Debug, Clone, Default)]
pub struct EventFilter {
    /// Accepted kinds; `None` accepts everything.
    pub kinds: Option<Vec<EventKind>>,
}

impl EventFilter {
    /// Creates a filter for specific kinds.
    #[must_use]
    pub const fn kinds(kinds: Vec<EventKind>) -> Self {
        Self { kinds: Some(kinds) }
    }

    /// Checks if an event matches this filter.
    #[must_use]
    pub fn matches(&self, event: &Event) -> bool {
        self.kinds
            .as_ref()
            .is_none_or(|kinds| kinds.contains(&event.kind()))
    }
}

struct EventDispatcherInner {
    sender: broadcast::Sender<Event>,
}

/// Dispatches events to subscribers.
#[derive(Clone)]
pub struct EventDispatcher {
    inner: Arc<EventDispatcherInner>,
}

impl EventDispatcher {
    /// Creates a new event dispatcher.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self {
            inner: Arc::new(EventDispatcherInner { sender }),
        }
    }

    /// Dispatches an event to all subscribers.
    pub fn dispatch(&self, event: Event) {
        // No receivers is fine
        let _ = self.inner.sender.send(event);
    }

    /// Subscribes to all future events.
    #[must_use]
    pub fn subscribe(&self) -> Subscription {
        Subscription {
            receiver: self.inner.sender.subscribe(),
        }
    }

    /// Returns the number of live subscriptions.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.inner.sender.receiver_count()
    }

    /// Waits for an event matching the filter with timeout.
    ///
    /// Returns `None` if the timeout expires or the channel is closed.
    pub async fn wait_for(&self, filter: EventFilter, timeout: Duration) -> Option<Event> {
        let mut subscription = self.subscribe();

        tokio::select! {
            biased;
            result = async {
                loop {
                    if let Some(event) = subscription.recv().await {
                        if filter.matches(&event) {
                            return Some(event);
                        }
                    } else {
                        return None;
                    }
                }
            } => result,
            () = tokio::time::sleep(timeout) => None,
        }
    }
}

impl std::fmt::Debug for EventDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventDispatcher")
            .field("subscribers", &self.subscriber_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_event_dispatch() {
        let dispatcher = EventDispatcher::new(16);
        let mut sub = dispatcher.subscribe();

        dispatcher.dispatch(Event::Connected);

        let event = tokio::time::timeout(Duration::from_millis(100), sub.recv())
            .await
            .unwrap();

        assert!(matches!(event, Some(Event::Connected)));
    }

    #[tokio::test]
    async fn test_data_order_preserved() {
        let dispatcher = EventDispatcher::new(16);
        let mut sub = dispatcher.subscribe();

        for i in 0..5u8 {
            dispatcher.dispatch(Event::Data(Bytes::from(vec![i])));
        }

        for i in 0..5u8 {
            match sub.recv().await {
                Some(Event::Data(bytes)) => assert_eq!(&bytes[..], &[i]),
                other => panic!("unexpected event: {other:?}"),
            }
        }
    }

    #[tokio::test]
    async fn test_closed_dispatcher_ends_subscription() {
        let dispatcher = EventDispatcher::new(4);
        let mut sub = dispatcher.subscribe();
        drop(dispatcher);

        assert!(sub.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_wait_for_skips_other_kinds() {
        let dispatcher = EventDispatcher::new(16);
        let waiter = {
            let dispatcher = dispatcher.clone();
            tokio::spawn(async move {
                dispatcher
                    .wait_for(
                        EventFilter::kinds(vec![EventKind::Data]),
                        Duration::from_secs(1),
                    )
                    .await
            })
        };

        while dispatcher.subscriber_count() == 0 {
            tokio::task::yield_now().await;
        }
        dispatcher.dispatch(Event::Connected);
        dispatcher.dispatch(Event::Data(Bytes::from_static(b"iq")));

        let event = waiter.await.unwrap();
        assert!(matches!(event, Some(Event::Data(ref b)) if &b[..] == b"iq"));
    }

    #[test]
    fn test_event_filter() {
        let filter = EventFilter::kinds(vec![EventKind::Connected, EventKind::ConnectFailed]);

        assert!(filter.matches(&Event::Connected));
        assert!(filter.matches(&Event::ConnectFailed {
            reason: "refused".into()
        }));
        assert!(!filter.matches(&Event::Data(Bytes::new())));
        assert!(EventFilter::default().matches(&Event::Disconnected));
    }
}
