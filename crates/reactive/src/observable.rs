//! Push-based observable streams.
//!
//! An `Observable` is a cheap, clonable handle around a subscribe function.
//! Subscribing runs that function for the new observer, which typically
//! subscribes upstream and returns the `Subscription` that tears it all down.
//!
//! Propagation is synchronous: a value pushed by a source reaches every
//! downstream observer before the push returns. Errors are delivered
//! out-of-band through `on_error` and do not end the stream; only
//! `on_completed` does.

use crate::subscription::Subscription;
use core::cell::{Cell, RefCell};
use ripple_core::Error;
use std::rc::Rc;

/// Receives values, errors and completion from an `Observable`.
pub trait Observer<T> {
    /// Called for every value.
    fn on_next(&self, value: &T);

    /// Called for resumable errors. The stream continues afterwards.
    fn on_error(&self, error: &Error) {
        let _ = error;
    }

    /// Called once when the stream ends.
    fn on_completed(&self) {}
}

/// Shared, type-erased observer.
pub type SharedObserver<T> = Rc<dyn Observer<T>>;

type NextFn<T> = Box<dyn Fn(&T)>;
type ErrorFn = Box<dyn Fn(&Error)>;
type CompletedFn = Box<dyn Fn()>;

/// An observer assembled from closures.
pub struct FnObserver<T> {
    next: NextFn<T>,
    error: Option<ErrorFn>,
    completed: Option<CompletedFn>,
}

impl<T> FnObserver<T> {
    /// Creates an observer with the given `on_next` handler.
    pub fn new<F>(next: F) -> Self
    where
        F: Fn(&T) + 'static,
    {
        Self {
            next: Box::new(next),
            error: None,
            completed: None,
        }
    }

    /// Sets the error handler.
    pub fn on_error<F>(mut self, f: F) -> Self
    where
        F: Fn(&Error) + 'static,
    {
        self.error = Some(Box::new(f));
        self
    }

    /// Sets the completion handler.
    pub fn on_completed<F>(mut self, f: F) -> Self
    where
        F: Fn() + 'static,
    {
        self.completed = Some(Box::new(f));
        self
    }
}

impl<T: 'static> FnObserver<T> {
    /// Wraps the observer for subscription.
    pub fn shared(self) -> SharedObserver<T> {
        Rc::new(self)
    }
}

impl<T> Observer<T> for FnObserver<T> {
    fn on_next(&self, value: &T) {
        (self.next)(value);
    }

    fn on_error(&self, error: &Error) {
        if let Some(f) = &self.error {
            f(error);
        }
    }

    fn on_completed(&self) {
        if let Some(f) = &self.completed {
            f();
        }
    }
}

type RelayNext<T, U> = Box<dyn Fn(&T, &dyn Observer<U>)>;
type RelayCompleted<U> = Box<dyn Fn(&dyn Observer<U>)>;

/// An upstream observer that forwards errors and completion downstream.
///
/// Operators supply only the `on_next` logic; errors pass through untouched
/// and completion is forwarded unless a custom completion handler is set.
pub struct Relay<T, U> {
    downstream: SharedObserver<U>,
    next: RelayNext<T, U>,
    completed: Option<RelayCompleted<U>>,
}

impl<T, U: 'static> Relay<T, U> {
    pub fn new<F>(downstream: SharedObserver<U>, next: F) -> Self
    where
        F: Fn(&T, &dyn Observer<U>) + 'static,
    {
        Self {
            downstream,
            next: Box::new(next),
            completed: None,
        }
    }

    /// Replaces the default completion forwarding.
    pub fn with_completed<F>(mut self, f: F) -> Self
    where
        F: Fn(&dyn Observer<U>) + 'static,
    {
        self.completed = Some(Box::new(f));
        self
    }
}

impl<T: 'static, U: 'static> Relay<T, U> {
    pub fn shared(self) -> SharedObserver<T> {
        Rc::new(self)
    }
}

impl<T, U> Observer<T> for Relay<T, U> {
    fn on_next(&self, value: &T) {
        (self.next)(value, self.downstream.as_ref());
    }

    fn on_error(&self, error: &Error) {
        self.downstream.on_error(error);
    }

    fn on_completed(&self) {
        match &self.completed {
            Some(f) => f(self.downstream.as_ref()),
            None => self.downstream.on_completed(),
        }
    }
}

type SubscribeFn<T> = dyn Fn(SharedObserver<T>) -> Subscription;

/// A cold, push-based stream of `T`.
pub struct Observable<T> {
    subscribe_fn: Rc<SubscribeFn<T>>,
}

impl<T> Clone for Observable<T> {
    fn clone(&self) -> Self {
        Self {
            subscribe_fn: Rc::clone(&self.subscribe_fn),
        }
    }
}

impl<T: 'static> Observable<T> {
    /// Creates an observable from a subscribe function.
    pub fn create<F>(subscribe: F) -> Self
    where
        F: Fn(SharedObserver<T>) -> Subscription + 'static,
    {
        Self {
            subscribe_fn: Rc::new(subscribe),
        }
    }

    /// Subscribes a shared observer.
    pub fn subscribe_observer(&self, observer: SharedObserver<T>) -> Subscription {
        (self.subscribe_fn)(observer)
    }

    /// Subscribes with an `on_next` callback.
    pub fn subscribe<F>(&self, on_next: F) -> Subscription
    where
        F: Fn(&T) + 'static,
    {
        self.subscribe_observer(FnObserver::new(on_next).shared())
    }

    /// A stream that completes immediately.
    pub fn empty() -> Self {
        Self::create(|observer| {
            observer.on_completed();
            Subscription::empty()
        })
    }

    /// A stream that never emits nor completes.
    pub fn never() -> Self {
        Self::create(|_| Subscription::empty())
    }

    /// A stream that delivers one error and then stays silent.
    pub fn error(error: Error) -> Self {
        Self::create(move |observer| {
            observer.on_error(&error);
            Subscription::empty()
        })
    }

    /// Projects every value.
    pub fn map<U, F>(&self, f: F) -> Observable<U>
    where
        U: 'static,
        F: Fn(&T) -> U + 'static,
    {
        let source = self.clone();
        let f = Rc::new(f);
        Observable::create(move |observer| {
            let f = Rc::clone(&f);
            source.subscribe_observer(
                Relay::new(observer, move |value: &T, downstream: &dyn Observer<U>| {
                    downstream.on_next(&f(value));
                })
                .shared(),
            )
        })
    }

    /// Forwards only values matching `predicate`.
    pub fn filter_values<F>(&self, predicate: F) -> Observable<T>
    where
        F: Fn(&T) -> bool + 'static,
    {
        let source = self.clone();
        let predicate = Rc::new(predicate);
        Observable::create(move |observer| {
            let predicate = Rc::clone(&predicate);
            source.subscribe_observer(
                Relay::new(observer, move |value: &T, downstream: &dyn Observer<T>| {
                    if predicate(value) {
                        downstream.on_next(value);
                    }
                })
                .shared(),
            )
        })
    }

    /// Merges several streams; completes once every stream has completed.
    pub fn merge(sources: Vec<Observable<T>>) -> Observable<T> {
        Observable::create(move |observer| {
            if sources.is_empty() {
                observer.on_completed();
                return Subscription::empty();
            }
            let remaining = Rc::new(Cell::new(sources.len()));
            let mut subscription = Subscription::empty();
            for source in &sources {
                let remaining = Rc::clone(&remaining);
                subscription.add(source.subscribe_observer(
                    Relay::new(observer.clone(), |value: &T, downstream: &dyn Observer<T>| {
                        downstream.on_next(value);
                    })
                    .with_completed(move |downstream| {
                        remaining.set(remaining.get() - 1);
                        if remaining.get() == 0 {
                            downstream.on_completed();
                        }
                    })
                    .shared(),
                ));
            }
            subscription
        })
    }

    /// Drops the first `count` values.
    pub fn skip(&self, count: usize) -> Observable<T> {
        let source = self.clone();
        Observable::create(move |observer| {
            let seen = Cell::new(0usize);
            source.subscribe_observer(
                Relay::new(observer, move |value: &T, downstream: &dyn Observer<T>| {
                    if seen.get() < count {
                        seen.set(seen.get() + 1);
                    } else {
                        downstream.on_next(value);
                    }
                })
                .shared(),
            )
        })
    }
}

impl<T: Clone + 'static> Observable<T> {
    /// A stream that emits `value` and completes.
    pub fn just(value: T) -> Self {
        Self::from_values(vec![value])
    }

    /// A stream that emits every value in order and completes.
    pub fn from_values(values: Vec<T>) -> Self {
        Self::create(move |observer| {
            for value in &values {
                observer.on_next(value);
            }
            observer.on_completed();
            Subscription::empty()
        })
    }
}

impl<T: PartialEq + Clone + 'static> Observable<T> {
    /// Suppresses values equal to the previously emitted one.
    pub fn distinct_until_changed(&self) -> Observable<T> {
        let source = self.clone();
        Observable::create(move |observer| {
            let last: RefCell<Option<T>> = RefCell::new(None);
            source.subscribe_observer(
                Relay::new(observer, move |value: &T, downstream: &dyn Observer<T>| {
                    if last.borrow().as_ref() == Some(value) {
                        return;
                    }
                    *last.borrow_mut() = Some(value.clone());
                    downstream.on_next(value);
                })
                .shared(),
            )
        })
    }
}
