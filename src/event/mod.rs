//! Event system for progress reporting.
//!
//! Long running operations report what they are doing through events, so a
//! front end can show progress without being involved in the protocol.

use std::sync::Arc;

use tokio::sync::broadcast;

/// Event types that can be dispatched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    /// Session opened.
    Connected,
    /// Session closed.
    Disconnected,
    /// A request was sent, carries its first 7 characters (`PROY102`).
    Request { command: String },
    /// A request attempt failed and is being retried.
    Retry { attempt: usize, reason: String },
    /// Bulk transfer progress in percent.
    Progress { percent: u8 },
    /// Progress line reported by the device while erasing.
    EraseReport(String),
}

/// Discriminant of an [`Event`], used for filtering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    /// [`Event::Connected`]
    Connected,
    /// [`Event::Disconnected`]
    Disconnected,
    /// [`Event::Request`]
    Request,
    /// [`Event::Retry`]
    Retry,
    /// [`Event::Progress`]
    Progress,
    /// [`Event::EraseReport`]
    EraseReport,
}

impl Event {
    /// Returns the kind of this event.
    #[must_use]
    pub const fn kind(&self) -> EventKind {
        match self {
            Self::Connected => EventKind::Connected,
            Self::Disconnected => EventKind::Disconnected,
            Self::Request { .. } => EventKind::Request,
            Self::Retry { .. } => EventKind::Retry,
            Self::Progress { .. } => EventKind::Progress,
            Self::EraseReport(_) => EventKind::EraseReport,
        }
    }
}

/// Subscription filter for specific event kinds.
#[derive(Debug, Clone, Default)]
pub struct EventFilter {
    /// Kinds to let through, `None` lets everything through.
    pub kinds: Option<Vec<EventKind>>,
}

impl EventFilter {
    /// Creates a filter for specific event kinds.
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

/// A subscription to events.
pub struct Subscription {
    receiver: broadcast::Receiver<Event>,
    filter: EventFilter,
}

impl Subscription {
    /// Receives the next matching event, `None` once the dispatcher is gone.
    pub async fn recv(&mut self) -> Option<Event> {
        loop {
            match self.receiver.recv().await {
                Ok(event) if self.filter.matches(&event) => return Some(event),
                Ok(_) => {}
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    tracing::debug!("subscription lagged, {} events dropped", n);
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    /// Returns the next matching event if one is already queued.
    pub fn try_recv(&mut self) -> Option<Event> {
        loop {
            match self.receiver.try_recv() {
                Ok(event) if self.filter.matches(&event) => return Some(event),
                Ok(_) | Err(broadcast::error::TryRecvError::Lagged(_)) => {}
                Err(_) => return None,
            }
        }
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
        // no receivers is fine
        let _ = self.inner.sender.send(event);
    }

    /// Subscribes to events with an optional filter.
    #[must_use]
    pub fn subscribe(&self, filter: Option<EventFilter>) -> Subscription {
        Subscription {
            receiver: self.inner.sender.subscribe(),
            filter: filter.unwrap_or_default(),
        }
    }

    /// Waits for an event matching the filter with timeout.
    ///
    /// Returns `None` if the timeout expires or the channel is closed.
    pub async fn wait_for(
        &self,
        filter: EventFilter,
        timeout: std::time::Duration,
    ) -> Option<Event> {
        let mut subscription = self.subscribe(Some(filter));
        tokio::time::timeout(timeout, subscription.recv())
            .await
            .ok()
            .flatten()
    }
}

impl std::fmt::Debug for EventDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventDispatcher")
            .field("subscribers", &self.inner.sender.receiver_count())
            .finish()
    }
}
