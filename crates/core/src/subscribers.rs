//! Frame subscriber registry shared between the caller and the worker.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::RwLock;

use crate::media::Frame;

/// Handle identifying one registered subscriber.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionId(u64);

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sub-{}", self.0)
    }
}

type Callback = Arc<dyn Fn(&Frame) + Send + Sync>;

/// Registered frame callbacks.
///
/// Cloning yields another handle to the same registry. Callbacks run on the
/// worker thread, in registration order, outside the registry lock, so a
/// callback may itself subscribe or unsubscribe.
#[derive(Clone, Default)]
pub struct Subscribers {
    entries: Arc<RwLock<Vec<(SubscriptionId, Callback)>>>,
    next_id: Arc<AtomicU64>,
}

impl Subscribers {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&Frame) + Send + Sync + 'static,
    {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let callback: Callback = Arc::new(callback);
        self.entries.write().push((id, callback));
        tracing::debug!(subscription = %id, "subscriber added");
        Subscription {
            id,
            subscribers: self.clone(),
        }
    }

    /// Remove a subscriber. Returns `false` if it was not registered.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut entries = self.entries.write();
        let before = entries.len();
        entries.retain(|(entry, _)| *entry != id);
        let removed = entries.len() != before;
        if removed {
            tracing::debug!(subscription = %id, "subscriber removed");
        }
        removed
    }

    /// Hand `frame` to every subscriber. Returns how many were called.
    pub fn publish(&self, frame: &Frame) -> usize {
        let snapshot: Vec<Callback> = self
            .entries
            .read()
            .iter()
            .map(|(_, callback)| Arc::clone(callback))
            .collect();
        for callback in &snapshot {
            callback(frame);
        }
        snapshot.len()
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

impl fmt::Debug for Subscribers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscribers")
            .field("len", &self.len())
            .finish()
    }
}

/// A registered subscriber. Dropping it does not unsubscribe; call
/// [`unsubscribe`](Self::unsubscribe) or
/// [`StreamSource::unsubscribe`](crate::StreamSource::unsubscribe).
#[derive(Debug, Clone)]
pub struct Subscription {
    id: SubscriptionId,
    subscribers: Subscribers,
}

impl Subscription {
    pub fn id(&self) -> SubscriptionId {
        self.id
    }

    pub fn unsubscribe(self) -> bool {
        self.subscribers.unsubscribe(self.id)
    }
}
