//! Asynchronous per-key projection.
//!
//! Every key has at most one transformation in flight. Starting a new one
//! for a key cancels the previous one, and removing a key cancels whatever
//! is running for it. A transformation commits only if it is still the
//! newest for its key when it resolves; superseded results are dropped
//! without a trace downstream, successful or not.
//!
//! Work runs on a host-provided `LocalSpawn` and completes back into the
//! synchronous propagation path.

use core::cell::{Cell, RefCell};
use core::fmt::Display;
use core::future::Future;
use core::hash::Hash;
use futures::future::{abortable, AbortHandle};
use futures::task::{LocalSpawn, LocalSpawnExt};
use hashbrown::HashMap;
use ripple_core::{Change, ChangeReason, ChangeSet, Error};
use ripple_reactive::{Observable, Observer, Relay, SharedObserver, Subscription};
use std::rc::{Rc, Weak};
use tracing::{trace, warn};

/// Cooperative cancellation signal handed to every transformation.
///
/// Long-running work may poll `is_cancelled` to stop early. The operator
/// also drops the future of a cancelled transformation, so checking is an
/// optimisation, never a requirement.
#[derive(Clone, Debug, Default)]
pub struct CancellationToken {
    cancelled: Rc<Cell<bool>>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.set(true);
    }

    #[inline]
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.get()
    }
}

/// Options of `transform_async`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TransformAsyncOptions {
    /// Re-run the transformation when a key is refreshed instead of
    /// forwarding a refresh of the last result.
    pub transform_on_refresh: bool,
}

impl TransformAsyncOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_transform_on_refresh(mut self, enabled: bool) -> Self {
        self.transform_on_refresh = enabled;
        self
    }
}

struct InFlight {
    generation: u64,
    token: CancellationToken,
    abort: AbortHandle,
}

impl InFlight {
    fn cancel(self) {
        self.token.cancel();
        self.abort.abort();
    }
}

struct AsyncState<K, U> {
    emitted: HashMap<K, U>,
    in_flight: HashMap<K, InFlight>,
    next_generation: u64,
    upstream_completed: bool,
    completed: bool,
    disposed: bool,
}

impl<K: Eq + Hash, U> AsyncState<K, U> {
    fn new() -> Self {
        Self {
            emitted: HashMap::new(),
            in_flight: HashMap::new(),
            next_generation: 0,
            upstream_completed: false,
            completed: false,
            disposed: false,
        }
    }

    /// Marks the output completed once upstream is done and nothing is
    /// left in flight. Returns true exactly once.
    fn take_completion(&mut self) -> bool {
        if self.upstream_completed && self.in_flight.is_empty() && !self.completed && !self.disposed {
            self.completed = true;
            return true;
        }
        false
    }
}

type Factory<V, Fut> = Rc<dyn Fn(V, CancellationToken) -> Fut>;

struct Runner<K, V, U, Fut, S> {
    state: Rc<RefCell<AsyncState<K, U>>>,
    observer: SharedObserver<ChangeSet<K, U>>,
    spawner: S,
    factory: Factory<V, Fut>,
}

impl<K, V, U, E, Fut, S> Runner<K, V, U, Fut, S>
where
    K: Eq + Hash + Clone + 'static,
    U: Clone + 'static,
    E: Display + 'static,
    Fut: Future<Output = core::result::Result<U, E>> + 'static,
    S: LocalSpawn,
{
    /// Starts a transformation for `key`, cancelling the one in flight.
    fn start(&self, key: K, value: V) -> Option<Error> {
        let token = CancellationToken::new();
        let (future, abort) = abortable((self.factory)(value, token.clone()));

        let generation = {
            let mut state = self.state.borrow_mut();
            state.next_generation += 1;
            let generation = state.next_generation;
            let superseded = state.in_flight.insert(
                key.clone(),
                InFlight {
                    generation,
                    token,
                    abort,
                },
            );
            if let Some(superseded) = superseded {
                trace!("cancelling superseded transform");
                superseded.cancel();
            }
            generation
        };

        let state = Rc::downgrade(&self.state);
        let observer = Rc::clone(&self.observer);
        let spawn_key = key.clone();
        let task = async move {
            if let Ok(result) = future.await {
                commit(&state, &observer, spawn_key, generation, result);
            }
        };
        match self.spawner.spawn_local(task) {
            Ok(()) => None,
            Err(err) => {
                if let Some(in_flight) = self.state.borrow_mut().in_flight.remove(&key) {
                    in_flight.cancel();
                }
                Some(Error::transform_failure(err))
            }
        }
    }

    fn cancel(&self, key: &K) {
        let in_flight = self.state.borrow_mut().in_flight.remove(key);
        if let Some(in_flight) = in_flight {
            trace!("cancelling transform of removed key");
            in_flight.cancel();
        }
    }
}

/// The single commit point: emits a result only if it is still current.
fn commit<K, U, E>(
    state: &Weak<RefCell<AsyncState<K, U>>>,
    observer: &SharedObserver<ChangeSet<K, U>>,
    key: K,
    generation: u64,
    result: core::result::Result<U, E>,
) where
    K: Eq + Hash + Clone,
    U: Clone,
    E: Display,
{
    let Some(state) = state.upgrade() else {
        return;
    };
    let (outcome, complete) = {
        let mut state = state.borrow_mut();
        if state.disposed {
            return;
        }
        let current = state
            .in_flight
            .get(&key)
            .is_some_and(|f| f.generation == generation && !f.token.is_cancelled());
        if !current {
            trace!("discarding superseded transform result");
            return;
        }
        state.in_flight.remove(&key);
        let outcome = match result {
            Ok(value) => Ok(match state.emitted.insert(key.clone(), value.clone()) {
                Some(previous) => Change::update(key, value, previous),
                None => Change::add(key, value),
            }),
            Err(err) => Err(Error::transform_failure(err)),
        };
        (outcome, state.take_completion())
    };

    match outcome {
        Ok(change) => observer.on_next(&ChangeSet::from(vec![change])),
        Err(err) => {
            warn!(error = %err, "async transform failed");
            observer.on_error(&err);
        }
    }
    if complete {
        observer.on_completed();
    }
}

/// Builds the asynchronous transform operator.
pub(crate) fn transform_async<K, V, U, E, F, Fut, S>(
    source: &Observable<ChangeSet<K, V>>,
    spawner: S,
    factory: F,
    options: TransformAsyncOptions,
) -> Observable<ChangeSet<K, U>>
where
    K: Eq + Hash + Clone + 'static,
    V: Clone + 'static,
    U: Clone + 'static,
    E: Display + 'static,
    F: Fn(V, CancellationToken) -> Fut + 'static,
    Fut: Future<Output = core::result::Result<U, E>> + 'static,
    S: LocalSpawn + Clone + 'static,
{
    let source = source.clone();
    let factory: Factory<V, Fut> = Rc::new(factory);
    Observable::create(move |observer| {
        let state = Rc::new(RefCell::new(AsyncState::new()));
        let runner = Runner {
            state: Rc::clone(&state),
            observer: observer.clone(),
            spawner: spawner.clone(),
            factory: Rc::clone(&factory),
        };
        let completion_state = Rc::clone(&state);

        let mut subscription = source.subscribe_observer(
            Relay::new(observer, move |changes: &ChangeSet<K, V>, downstream: &dyn Observer<ChangeSet<K, U>>| {
                let mut out = ChangeSet::new();
                let mut errors = Vec::new();
                for change in changes {
                    let key = change.key();
                    match change.reason() {
                        ChangeReason::Add | ChangeReason::Update => {
                            errors.extend(runner.start(key.clone(), change.current().clone()));
                        }
                        ChangeReason::Refresh if options.transform_on_refresh => {
                            errors.extend(runner.start(key.clone(), change.current().clone()));
                        }
                        ChangeReason::Refresh => {
                            let current = runner.state.borrow().emitted.get(key).cloned();
                            if let Some(current) = current {
                                out.push(Change::refresh(key.clone(), current));
                            }
                        }
                        ChangeReason::Remove => {
                            runner.cancel(key);
                            let removed = runner.state.borrow_mut().emitted.remove(key);
                            if let Some(removed) = removed {
                                out.push(Change::remove(key.clone(), removed));
                            }
                        }
                    }
                }
                crate::stream::emit(downstream, out, errors);
            })
            .with_completed(move |downstream| {
                let complete = {
                    let mut state = completion_state.borrow_mut();
                    state.upstream_completed = true;
                    state.take_completion()
                };
                if complete {
                    downstream.on_completed();
                }
            })
            .shared(),
        );

        subscription.add(Subscription::new(move || {
            let cancelled: Vec<InFlight> = {
                let mut state = state.borrow_mut();
                state.disposed = true;
                state.in_flight.drain().map(|(_, f)| f).collect()
            };
            if !cancelled.is_empty() {
                trace!(cancelled = cancelled.len(), "disposing async transform");
            }
            for in_flight in cancelled {
                in_flight.cancel();
            }
        }));
        subscription
    })
}
