//! Observer lists used by components to publish state changes.

use crate::ids::ListenerId;

type Callback<T> = Box<dyn FnMut(&T) + Send>;

/// Ordered list of subscribers keyed by [`ListenerId`].
///
/// Subscribing twice with the same id keeps the first callback, and
/// unsubscribing an unknown id does nothing.
pub struct Observers<T> {
    listeners: Vec<(ListenerId, Callback<T>)>,
}

impl<T> Observers<T> {
    pub fn new() -> Self {
        Self {
            listeners: Vec::new(),
        }
    }

    /// Registers `callback` under `id`. Returns false if `id` was already subscribed.
    pub fn subscribe(&mut self, id: ListenerId, callback: impl FnMut(&T) + Send + 'static) -> bool {
        if self.contains(id) {
            return false;
        }
        self.listeners.push((id, Box::new(callback)));
        true
    }

    /// Removes the subscription for `id`. Returns false if there was none.
    pub fn unsubscribe(&mut self, id: ListenerId) -> bool {
        let before = self.listeners.len();
        self.listeners.retain(|(listener, _)| *listener != id);
        self.listeners.len() != before
    }

    pub fn contains(&self, id: ListenerId) -> bool {
        self.listeners.iter().any(|(listener, _)| *listener == id)
    }

    /// Invokes every subscriber in subscription order.
    pub fn notify(&mut self, value: &T) {
        for (_, callback) in self.listeners.iter_mut() {
            callback(value);
        }
    }

    pub fn len(&self) -> usize {
        self.listeners.len()
    }

    pub fn is_empty(&self) -> bool {
        self.listeners.is_empty()
    }
}

impl<T> Default for Observers<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> core::fmt::Debug for Observers<T> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_list()
            .entries(self.listeners.iter().map(|(id, _)| id))
            .finish()
    }
}
