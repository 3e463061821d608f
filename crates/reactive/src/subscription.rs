//! Subscription handles and observer registries.
//!
//! A `Subscription` owns the teardown logic of one subscription path.
//! Dropping it (or calling `dispose`) unsubscribes; disposal is idempotent.

use crate::observable::SharedObserver;
use std::collections::BTreeMap;
use std::rc::Rc;

/// Unique identifier for a registered observer.
pub type SubscriptionId = u64;

type Teardown = Box<dyn FnOnce()>;

/// A disposable handle for an active subscription.
#[must_use = "dropping a Subscription unsubscribes immediately"]
#[derive(Default)]
pub struct Subscription {
    teardowns: Vec<Teardown>,
    disposed: bool,
}

impl Subscription {
    /// Creates a subscription that runs `teardown` on disposal.
    pub fn new<F>(teardown: F) -> Self
    where
        F: FnOnce() + 'static,
    {
        Self {
            teardowns: vec![Box::new(teardown)],
            disposed: false,
        }
    }

    /// Creates a subscription with nothing to tear down.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Attaches another subscription; it is disposed together with this one.
    ///
    /// Adding to an already disposed subscription disposes `other` at once.
    pub fn add(&mut self, mut other: Subscription) {
        if self.disposed {
            other.dispose();
            return;
        }
        let teardowns = core::mem::take(&mut other.teardowns);
        other.disposed = true;
        self.teardowns.extend(teardowns);
    }

    /// Runs every teardown once, in the order they were attached.
    pub fn dispose(&mut self) {
        if self.disposed {
            return;
        }
        self.disposed = true;
        for teardown in core::mem::take(&mut self.teardowns) {
            teardown();
        }
    }

    #[inline]
    pub fn is_disposed(&self) -> bool {
        self.disposed
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.dispose();
    }
}

impl FromIterator<Subscription> for Subscription {
    fn from_iter<I: IntoIterator<Item = Subscription>>(iter: I) -> Self {
        let mut composite = Subscription::empty();
        for subscription in iter {
            composite.add(subscription);
        }
        composite
    }
}

impl core::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Subscription")
            .field("teardowns", &self.teardowns.len())
            .field("disposed", &self.disposed)
            .finish()
    }
}

/// Registry of observers, notified in subscription order.
pub struct SubscriptionManager<T> {
    /// Registered observers
    observers: BTreeMap<SubscriptionId, SharedObserver<T>>,
    /// Next subscription ID to assign
    next_id: SubscriptionId,
}

impl<T> Default for SubscriptionManager<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> SubscriptionManager<T> {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self {
            observers: BTreeMap::new(),
            next_id: 1,
        }
    }

    /// Registers an observer and returns its ID.
    pub fn subscribe(&mut self, observer: SharedObserver<T>) -> SubscriptionId {
        let id = self.next_id;
        self.next_id += 1;
        self.observers.insert(id, observer);
        id
    }

    /// Unregisters by ID.
    ///
    /// Returns the observer if it was registered.
    pub fn unsubscribe(&mut self, id: SubscriptionId) -> Option<SharedObserver<T>> {
        self.observers.remove(&id)
    }

    /// Returns the observer registered under `id`.
    pub fn get(&self, id: SubscriptionId) -> Option<SharedObserver<T>> {
        self.observers.get(&id).map(Rc::clone)
    }

    /// Returns all subscription IDs in subscription order.
    pub fn subscription_ids(&self) -> Vec<SubscriptionId> {
        self.observers.keys().copied().collect()
    }

    /// Removes and returns every observer, in subscription order.
    pub fn drain(&mut self) -> Vec<SharedObserver<T>> {
        core::mem::take(&mut self.observers).into_values().collect()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.observers.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.observers.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::observable::{FnObserver, Observer};
    use core::cell::{Cell, RefCell};

    #[test]
    fn test_subscription_runs_teardown_once() {
        let count = Rc::new(Cell::new(0));
        let c = count.clone();
        let mut sub = Subscription::new(move || c.set(c.get() + 1));

        sub.dispose();
        sub.dispose();
        drop(sub);

        assert_eq!(count.get(), 1);
    }

    #[test]
    fn test_subscription_drop_disposes() {
        let count = Rc::new(Cell::new(0));
        let c = count.clone();
        {
            let _sub = Subscription::new(move || c.set(c.get() + 1));
        }
        assert_eq!(count.get(), 1);
    }

    #[test]
    fn test_composite_order() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let l1 = log.clone();
        let l2 = log.clone();

        let composite: Subscription = vec![
            Subscription::new(move || l1.borrow_mut().push(1)),
            Subscription::new(move || l2.borrow_mut().push(2)),
        ]
        .into_iter()
        .collect();
        drop(composite);

        assert_eq!(*log.borrow(), vec![1, 2]);
    }

    #[test]
    fn test_add_to_disposed_disposes_other() {
        let count = Rc::new(Cell::new(0));
        let c = count.clone();
        let mut sub = Subscription::empty();
        sub.dispose();
        sub.add(Subscription::new(move || c.set(c.get() + 1)));
        assert_eq!(count.get(), 1);
    }

    #[test]
    fn test_manager_ordered_ids() {
        let mut manager: SubscriptionManager<i32> = SubscriptionManager::new();
        let id1 = manager.subscribe(FnObserver::new(|_: &i32| {}).shared());
        let id2 = manager.subscribe(FnObserver::new(|_: &i32| {}).shared());
        let id3 = manager.subscribe(FnObserver::new(|_: &i32| {}).shared());

        assert_eq!(manager.subscription_ids(), vec![id1, id2, id3]);
        assert!(manager.unsubscribe(id2).is_some());
        assert!(manager.unsubscribe(id2).is_none());
        assert_eq!(manager.subscription_ids(), vec![id1, id3]);
    }

    #[test]
    fn test_manager_drain() {
        let hits = Rc::new(Cell::new(0));
        let h = hits.clone();
        let mut manager = SubscriptionManager::new();
        manager.subscribe(FnObserver::new(move |v: &i32| h.set(h.get() + v)).shared());

        for observer in manager.drain() {
            observer.on_next(&5);
        }
        assert!(manager.is_empty());
        assert_eq!(hits.get(), 5);
    }
}
