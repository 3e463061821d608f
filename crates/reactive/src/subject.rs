//! Multicast subject.
//!
//! A `Subject` is both the push side and the observable side of a hot
//! stream. Observers are notified synchronously in subscription order. An
//! observer unsubscribed during a notification receives nothing further,
//! not even the rest of the current notification.

use crate::observable::{Observable, Observer, SharedObserver};
use crate::subscription::{Subscription, SubscriptionManager};
use core::cell::RefCell;
use ripple_core::Error;
use std::rc::{Rc, Weak};

struct SubjectState<T> {
    subscriptions: SubscriptionManager<T>,
    completed: bool,
}

/// A hot, multicast stream.
pub struct Subject<T> {
    state: Rc<RefCell<SubjectState<T>>>,
}

impl<T> Clone for Subject<T> {
    fn clone(&self) -> Self {
        Self {
            state: Rc::clone(&self.state),
        }
    }
}

impl<T: 'static> Default for Subject<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: 'static> Subject<T> {
    pub fn new() -> Self {
        Self {
            state: Rc::new(RefCell::new(SubjectState {
                subscriptions: SubscriptionManager::new(),
                completed: false,
            })),
        }
    }

    /// Registers an observer. Subscribing to a completed subject completes
    /// the observer at once.
    pub fn subscribe_observer(&self, observer: SharedObserver<T>) -> Subscription {
        let id = {
            let mut state = self.state.borrow_mut();
            if state.completed {
                None
            } else {
                Some(state.subscriptions.subscribe(Rc::clone(&observer)))
            }
        };
        let Some(id) = id else {
            observer.on_completed();
            return Subscription::empty();
        };

        let weak: Weak<RefCell<SubjectState<T>>> = Rc::downgrade(&self.state);
        Subscription::new(move || {
            if let Some(state) = weak.upgrade() {
                // Unregister first, drop the observer outside the borrow.
                let removed = state.borrow_mut().subscriptions.unsubscribe(id);
                drop(removed);
            }
        })
    }

    /// Returns this subject as an observable.
    pub fn as_observable(&self) -> Observable<T> {
        let subject = self.clone();
        Observable::create(move |observer| subject.subscribe_observer(observer))
    }

    /// Pushes a value to every observer.
    pub fn next(&self, value: &T) {
        self.for_each_observer(|observer| observer.on_next(value));
    }

    /// Pushes a resumable error to every observer.
    pub fn error(&self, error: &Error) {
        self.for_each_observer(|observer| observer.on_error(error));
    }

    /// Completes every observer and rejects further subscriptions.
    pub fn complete(&self) {
        let observers = {
            let mut state = self.state.borrow_mut();
            if state.completed {
                return;
            }
            state.completed = true;
            state.subscriptions.drain()
        };
        for observer in observers {
            observer.on_completed();
        }
    }

    #[inline]
    pub fn is_completed(&self) -> bool {
        self.state.borrow().completed
    }

    #[inline]
    pub fn observer_count(&self) -> usize {
        self.state.borrow().subscriptions.len()
    }

    fn for_each_observer(&self, mut f: impl FnMut(&dyn Observer<T>)) {
        let ids = self.state.borrow().subscriptions.subscription_ids();
        for id in ids {
            let observer = self.state.borrow().subscriptions.get(id);
            if let Some(observer) = observer {
                f(observer.as_ref());
            }
        }
    }
}
