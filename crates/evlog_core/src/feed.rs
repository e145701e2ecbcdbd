//! Change-feed plumbing shared by the journal and server storage.
//!
//! A [`ChangeFeed`] is a minimal publish/subscribe bus: subscribers get an
//! ordinary [`mpsc::Receiver`] and the committer emits after its transaction
//! commits, so no subscriber ever observes an uncommitted item. Durable
//! history lives in the database; catch-up reads go there, not here.

use parking_lot::RwLock;
use std::sync::mpsc::{self, Receiver, Sender};

/// A publish/subscribe bus for committed items.
///
/// Items are emitted in commit order and fan out to every live subscriber.
/// A subscriber that drops its receiver is pruned on the next emit, so
/// cancelling a subscription never affects other subscribers or writers.
pub struct ChangeFeed<T> {
    subscribers: RwLock<Vec<Sender<T>>>,
}

impl<T: Clone> ChangeFeed<T> {
    /// Creates an empty feed.
    #[must_use]
    pub fn new() -> Self {
        Self {
            subscribers: RwLock::new(Vec::new()),
        }
    }

    /// Subscribes to all items emitted after this call.
    pub fn subscribe(&self) -> Receiver<T> {
        let (tx, rx) = mpsc::channel();
        self.subscribers.write().push(tx);
        rx
    }

    /// Emits one item to all subscribers, pruning disconnected ones.
    pub fn emit(&self, item: T) {
        let mut subscribers = self.subscribers.write();
        subscribers.retain(|tx| tx.send(item.clone()).is_ok());
    }

    /// Emits a batch in order.
    pub fn emit_batch(&self, items: &[T]) {
        if items.is_empty() {
            return;
        }
        let mut subscribers = self.subscribers.write();
        subscribers.retain(|tx| items.iter().all(|item| tx.send(item.clone()).is_ok()));
    }

    /// Returns the number of registered subscribers.
    ///
    /// Disconnected subscribers are only pruned on emit, so this may briefly
    /// overcount.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.subscribers.read().len()
    }
}

impl<T: Clone> Default for ChangeFeed<T> {
    fn default() -> Self {
        Self::new()
    }
}
