//! Shared container plumbing for sources and materialized views.

use crate::observable::{Observable, Observer, Relay};
use crate::subject::Subject;
use crate::subscription::Subscription;
use core::cell::{Cell, RefCell};
use core::hash::Hash;
use ripple_core::{ChangeAwareCache, ChangeAwareList, ChangeSet, Error, ListChangeSet, Result};
use std::collections::VecDeque;
use std::rc::Rc;
use tracing::{debug, trace};

/// A change-aware collection that a `Store` can publish.
pub(crate) trait Recorder: 'static {
    type Changes: 'static;

    /// The change set rebuilding the current state from empty.
    fn initial(&self) -> Self::Changes;

    /// Takes the uncaptured changes.
    fn capture(&mut self) -> Self::Changes;

    /// Undoes the uncaptured changes.
    fn undo(&mut self);

    fn change_count(changes: &Self::Changes) -> usize;
}

impl<T: Clone + 'static> Recorder for ChangeAwareList<T> {
    type Changes = ListChangeSet<T>;

    fn initial(&self) -> Self::Changes {
        ListChangeSet::initial(self.as_slice().to_vec())
    }

    fn capture(&mut self) -> Self::Changes {
        self.capture_changes()
    }

    fn undo(&mut self) {
        self.rollback();
    }

    fn change_count(changes: &Self::Changes) -> usize {
        changes.total_changes()
    }
}

impl<K, V> Recorder for ChangeAwareCache<K, V>
where
    K: Eq + Hash + Clone + 'static,
    V: Clone + 'static,
{
    type Changes = ChangeSet<K, V>;

    fn initial(&self) -> Self::Changes {
        ChangeSet::initial(self.to_entries())
    }

    fn capture(&mut self) -> Self::Changes {
        self.capture_changes()
    }

    fn undo(&mut self) {
        self.rollback();
    }

    fn change_count(changes: &Self::Changes) -> usize {
        changes.len()
    }
}

/// A notification waiting for the current fan-out to finish.
enum Pending<T> {
    Next(u64, T),
    Error(Error),
    Completed,
}

/// State, change publication and lifecycle of one container.
///
/// Notifications raised while observers are being notified (an observer
/// mutating the container it listens to) are queued and delivered once the
/// current one has reached every observer, so all observers see change sets
/// in the order they were produced.
pub(crate) struct Store<C: Recorder> {
    name: &'static str,
    state: RefCell<C>,
    subject: Subject<C::Changes>,
    disposed: Cell<bool>,
    pending: RefCell<VecDeque<Pending<C::Changes>>>,
    draining: Cell<bool>,
    // Sequence numbers of the last queued and the in-flight change set.
    queued: Cell<u64>,
    delivering: Rc<Cell<u64>>,
}

impl<C: Recorder> Store<C> {
    pub(crate) fn new(name: &'static str, state: C) -> Rc<Self> {
        debug!(container = name, "created");
        Rc::new(Self {
            name,
            state: RefCell::new(state),
            subject: Subject::new(),
            disposed: Cell::new(false),
            pending: RefCell::new(VecDeque::new()),
            draining: Cell::new(false),
            queued: Cell::new(0),
            delivering: Rc::new(Cell::new(0)),
        })
    }

    /// Read access to the current state.
    pub(crate) fn read<R>(&self, f: impl FnOnce(&C) -> R) -> R {
        f(&self.state.borrow())
    }

    #[inline]
    pub(crate) fn is_disposed(&self) -> bool {
        self.disposed.get()
    }

    /// Runs `f` against the state and publishes the captured changes.
    ///
    /// An error from `f` undoes everything it did and publishes nothing.
    pub(crate) fn edit<R>(&self, f: impl FnOnce(&mut C) -> Result<R>) -> Result<R> {
        if self.disposed.get() {
            return Err(Error::Disposed(self.name));
        }
        let (result, changes) = {
            let mut state = self.state.borrow_mut();
            match f(&mut state) {
                Ok(result) => (result, state.capture()),
                Err(err) => {
                    state.undo();
                    return Err(err);
                }
            }
        };
        self.publish(changes);
        Ok(result)
    }

    fn publish(&self, changes: C::Changes) {
        let count = C::change_count(&changes);
        if count == 0 {
            return;
        }
        let seq = self.queued.get() + 1;
        self.queued.set(seq);
        trace!(container = self.name, changes = count, seq, "publishing change set");
        self.enqueue(Pending::Next(seq, changes));
    }

    /// Forwards a resumable error to connected observers.
    pub(crate) fn publish_error(&self, error: &Error) {
        self.enqueue(Pending::Error(error.clone()));
    }

    /// Completes connected observers; the state stays readable.
    pub(crate) fn complete(&self) {
        self.enqueue(Pending::Completed);
    }

    /// Completes connected observers and rejects further mutation and
    /// connection.
    pub(crate) fn dispose(&self) {
        if self.disposed.replace(true) {
            return;
        }
        debug!(container = self.name, "disposed");
        self.enqueue(Pending::Completed);
    }

    fn enqueue(&self, notification: Pending<C::Changes>) {
        self.pending.borrow_mut().push_back(notification);
        if self.draining.replace(true) {
            trace!(container = self.name, "queued behind an in-flight notification");
            return;
        }
        loop {
            let next = self.pending.borrow_mut().pop_front();
            match next {
                Some(Pending::Next(seq, changes)) => {
                    self.delivering.set(seq);
                    self.subject.next(&changes);
                }
                Some(Pending::Error(error)) => self.subject.error(&error),
                Some(Pending::Completed) => self.subject.complete(),
                None => break,
            }
        }
        self.draining.set(false);
    }

    /// The live change stream, starting with the current state.
    pub(crate) fn connect(self: &Rc<Self>) -> Result<Observable<C::Changes>> {
        if self.disposed.get() {
            return Err(Error::Disposed(self.name));
        }
        let store = Rc::clone(self);
        Ok(Observable::create(move |observer| {
            let initial = store.state.borrow().initial();
            let has_initial = C::change_count(&initial) > 0;
            if store.subject.is_completed() {
                if has_initial {
                    observer.on_next(&initial);
                }
                observer.on_completed();
                return Subscription::empty();
            }
            // Connected mid fan-out: change sets already queued are part of
            // the snapshot below.
            let live = if store.draining.get() {
                let since = store.queued.get();
                let delivering = Rc::clone(&store.delivering);
                Relay::new(observer.clone(), move |changes: &C::Changes, downstream: &dyn Observer<C::Changes>| {
                    if delivering.get() > since {
                        downstream.on_next(changes);
                    }
                })
                .shared()
            } else {
                observer.clone()
            };
            let subscription = store.subject.subscribe_observer(live);
            if has_initial {
                observer.on_next(&initial);
            }
            subscription
        }))
    }
}
