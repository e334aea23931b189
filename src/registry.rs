//! The set of live subscribers.

use std::{
    collections::HashMap,
    fmt::Display,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};

use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, trace};
use uuid::Uuid;

/// The text put on the wire for subscribers.
/// Shared, since every subscriber gets the same text.
pub type WireMessage = Arc<str>;

/// Identifies a subscriber for its whole lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriberId(Uuid);

impl SubscriberId {
    fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Display for SubscriberId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A subscriber could not be delivered to.
#[derive(Debug, Error, PartialEq, Eq)]
#[error("Subscriber {0} is gone")]
pub struct SendError(pub SubscriberId);

/// A handle for delivering messages to one connected client.
///
/// Delivery does not wait for the client; the message is queued for the
/// connection's writer. It fails once that writer is gone.
///
/// The queue is unbounded: a client which keeps its connection open but never
/// reads makes it grow for as long as it stays connected.
#[derive(Debug, Clone)]
pub struct Subscriber {
    id: SubscriberId,
    peer: Arc<str>,
    outbox: mpsc::UnboundedSender<WireMessage>,
}

impl Subscriber {
    /// Create a subscriber for the given peer (only used for logging).
    ///
    /// Whatever is sent to the subscriber ends up in the returned receiver.
    pub fn new(peer: &str) -> (Self, mpsc::UnboundedReceiver<WireMessage>) {
        let (outbox, messages) = mpsc::unbounded_channel();

        (
            Self {
                id: SubscriberId::new(),
                peer: peer.into(),
                outbox,
            },
            messages,
        )
    }

    /// The id of this subscriber.
    pub fn id(&self) -> SubscriberId {
        self.id
    }

    /// Deliver a message.
    pub fn send(&self, message: WireMessage) -> Result<(), SendError> {
        self.outbox.send(message).map_err(|_| SendError(self.id))
    }
}

impl Display for Subscriber {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}@{}", self.id, self.peer)
    }
}

/// The subscribers currently believed to be alive.
///
/// Cloning gives another handle to the same set.
/// Every operation takes the same lock, so a broadcast never observes a
/// half-applied registration or removal.
#[derive(Debug, Clone, Default)]
pub struct SubscriberRegistry {
    subscribers: Arc<Mutex<HashMap<SubscriberId, Subscriber>>>,
}

impl SubscriberRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    // Nothing panics while holding the lock, so the map is intact even if poisoned.
    fn lock(&self) -> MutexGuard<'_, HashMap<SubscriberId, Subscriber>> {
        self.subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Add a subscriber. The next broadcast includes it.
    pub fn register(&self, subscriber: Subscriber) {
        debug!(%subscriber, "Registering");
        self.lock().insert(subscriber.id(), subscriber);
    }

    /// Remove a subscriber if present.
    /// Returns whether it was present.
    pub fn unregister(&self, id: SubscriberId) -> bool {
        let removed = self.lock().remove(&id);

        match &removed {
            Some(subscriber) => debug!(%subscriber, "Unregistered"),
            None => trace!(%id, "Not registered"),
        }

        removed.is_some()
    }

    /// The subscribers to deliver the next broadcast to.
    pub fn snapshot_for_broadcast(&self) -> Vec<Subscriber> {
        self.lock().values().cloned().collect()
    }

    /// How many subscribers are registered.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// True if there are no subscribers.
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}
