//! Per-item resources bound to item presence.
//!
//! Each operator keeps one resource per upstream slot (list position or
//! cache key): the item itself for `dispose_many`, a `Subscription` for
//! `subscribe_many`, an inner subscription for `merge_many`. A resource is
//! acquired when its item arrives and released exactly once when the item
//! is removed, replaced, cleared, or when the stream completes or is torn
//! down. Releases happen after the change set has been forwarded.

use core::cell::RefCell;
use core::hash::Hash;
use hashbrown::{HashMap, HashSet};
use ripple_core::{check_index, check_insert_index, check_range, ChangeReason, ChangeSet, Error, ListChange, ListChangeSet, Result};
use ripple_reactive::{Observable, Observer, Relay, SharedObserver, Subscription};
use std::rc::{Rc, Weak};
use tracing::trace;

/// A value that owns something to release.
pub trait Disposable {
    fn dispose(&self);
}

impl<T: Disposable + ?Sized> Disposable for Rc<T> {
    fn dispose(&self) {
        (**self).dispose();
    }
}

/// Resources tracked per upstream slot.
trait Slots<I> {
    type Resource;

    /// Mirrors `changes`, collecting the resources that left.
    fn apply(&mut self, changes: &I, retired: &mut Vec<Self::Resource>, errors: &mut Vec<Error>);

    /// Takes every remaining resource.
    fn drain(&mut self) -> Vec<Self::Resource>;
}

type Acquire<T, R> = Box<dyn Fn(&T) -> R>;

struct ListSlots<T, R> {
    slots: Vec<R>,
    acquire: Acquire<T, R>,
}

impl<T, R> ListSlots<T, R> {
    fn new(acquire: Acquire<T, R>) -> Self {
        Self {
            slots: Vec::new(),
            acquire,
        }
    }

    fn apply_one(&mut self, change: &ListChange<T>, retired: &mut Vec<R>) -> Result<()> {
        match change {
            ListChange::Add { item, index } => {
                check_insert_index(*index, self.slots.len())?;
                self.slots.insert(*index, (self.acquire)(item));
            }
            ListChange::AddRange { items, index } => {
                check_insert_index(*index, self.slots.len())?;
                let acquired: Vec<R> = items.iter().map(|item| (self.acquire)(item)).collect();
                self.slots.splice(*index..*index, acquired);
            }
            ListChange::Replace { current, index, .. } => {
                check_index(*index, self.slots.len())?;
                let fresh = (self.acquire)(current);
                retired.push(core::mem::replace(&mut self.slots[*index], fresh));
            }
            ListChange::Remove { index, .. } => {
                check_index(*index, self.slots.len())?;
                retired.push(self.slots.remove(*index));
            }
            ListChange::RemoveRange { items, index } => {
                check_range(*index, items.len(), self.slots.len())?;
                retired.extend(self.slots.drain(*index..*index + items.len()));
            }
            ListChange::Moved {
                current_index,
                previous_index,
                ..
            } => {
                check_index(*previous_index, self.slots.len())?;
                check_index(*current_index, self.slots.len())?;
                let slot = self.slots.remove(*previous_index);
                self.slots.insert(*current_index, slot);
            }
            ListChange::Refresh { index, .. } => check_index(*index, self.slots.len())?,
            ListChange::Clear { .. } => retired.append(&mut self.slots),
        }
        Ok(())
    }
}

impl<T, R> Slots<ListChangeSet<T>> for ListSlots<T, R> {
    type Resource = R;

    fn apply(&mut self, changes: &ListChangeSet<T>, retired: &mut Vec<R>, errors: &mut Vec<Error>) {
        for change in changes {
            if let Err(err) = self.apply_one(change, retired) {
                errors.push(err);
            }
        }
    }

    fn drain(&mut self) -> Vec<R> {
        core::mem::take(&mut self.slots)
    }
}

struct CacheSlots<K, V, R> {
    slots: HashMap<K, R>,
    acquire: Acquire<V, R>,
}

impl<K: Eq + Hash, V, R> CacheSlots<K, V, R> {
    fn new(acquire: Acquire<V, R>) -> Self {
        Self {
            slots: HashMap::new(),
            acquire,
        }
    }
}

impl<K: Eq + Hash + Clone, V, R> Slots<ChangeSet<K, V>> for CacheSlots<K, V, R> {
    type Resource = R;

    fn apply(&mut self, changes: &ChangeSet<K, V>, retired: &mut Vec<R>, _errors: &mut Vec<Error>) {
        for change in changes {
            match change.reason() {
                ChangeReason::Add | ChangeReason::Update => {
                    let fresh = (self.acquire)(change.current());
                    if let Some(previous) = self.slots.insert(change.key().clone(), fresh) {
                        retired.push(previous);
                    }
                }
                ChangeReason::Remove => {
                    if let Some(previous) = self.slots.remove(change.key()) {
                        retired.push(previous);
                    }
                }
                ChangeReason::Refresh => {}
            }
        }
    }

    fn drain(&mut self) -> Vec<R> {
        self.slots.drain().map(|(_, resource)| resource).collect()
    }
}

/// Forwards every change set unchanged while tracking one resource per
/// slot; `release` runs once for every resource that leaves.
fn track<I, S, N, F>(source: &Observable<I>, init: N, release: F) -> Observable<I>
where
    I: 'static,
    S: Slots<I> + 'static,
    N: Fn() -> S + 'static,
    F: Fn(S::Resource) + 'static,
{
    let source = source.clone();
    let release = Rc::new(release);
    Observable::create(move |observer| {
        let state = Rc::new(RefCell::new(init()));

        let next_state = Rc::clone(&state);
        let next_release = Rc::clone(&release);
        let completed_state = Rc::clone(&state);
        let completed_release = Rc::clone(&release);
        let mut subscription = source.subscribe_observer(
            Relay::new(observer, move |changes: &I, downstream: &dyn Observer<I>| {
                let mut retired = Vec::new();
                let mut errors = Vec::new();
                next_state.borrow_mut().apply(changes, &mut retired, &mut errors);
                downstream.on_next(changes);
                for error in &errors {
                    downstream.on_error(error);
                }
                for resource in retired {
                    next_release(resource);
                }
            })
            .with_completed(move |downstream| {
                downstream.on_completed();
                let remaining = completed_state.borrow_mut().drain();
                for resource in remaining {
                    completed_release(resource);
                }
            })
            .shared(),
        );

        let release = Rc::clone(&release);
        subscription.add(Subscription::new(move || {
            let remaining = state.borrow_mut().drain();
            trace!(remaining = remaining.len(), "releasing per-item resources");
            for resource in remaining {
                release(resource);
            }
        }));
        subscription
    })
}

#[derive(Default)]
struct MergeState {
    active: HashSet<u64>,
    next_id: u64,
    source_completed: bool,
    closed: bool,
}

/// Shared sink of every inner stream of one `merge_many` subscription.
struct Merger<U> {
    downstream: SharedObserver<U>,
    state: RefCell<MergeState>,
}

/// One live inner subscription.
struct Inner<U> {
    id: u64,
    subscription: Subscription,
    merger: Weak<Merger<U>>,
}

impl<U: 'static> Inner<U> {
    fn release(mut self) {
        self.subscription.dispose();
        if let Some(merger) = self.merger.upgrade() {
            merger.finish(self.id);
        }
    }
}

impl<U: 'static> Merger<U> {
    fn new(downstream: SharedObserver<U>) -> Rc<Self> {
        Rc::new(Self {
            downstream,
            state: RefCell::new(MergeState::default()),
        })
    }

    fn attach(self: &Rc<Self>, inner: &Observable<U>) -> Inner<U> {
        let id = {
            let mut state = self.state.borrow_mut();
            let id = state.next_id;
            state.next_id += 1;
            state.active.insert(id);
            id
        };
        let weak = Rc::downgrade(self);
        let subscription = inner.subscribe_observer(
            Relay::new(Rc::clone(&self.downstream), |value: &U, downstream: &dyn Observer<U>| {
                downstream.on_next(value);
            })
            .with_completed(move |_| {
                if let Some(merger) = weak.upgrade() {
                    merger.finish(id);
                }
            })
            .shared(),
        );
        Inner {
            id,
            subscription,
            merger: Rc::downgrade(self),
        }
    }

    /// Marks inner `id` as done (completed or unsubscribed).
    fn finish(&self, id: u64) {
        let done = {
            let mut state = self.state.borrow_mut();
            state.active.remove(&id);
            self.try_close(&mut state)
        };
        if done {
            self.downstream.on_completed();
        }
    }

    fn complete_source(&self) {
        let done = {
            let mut state = self.state.borrow_mut();
            state.source_completed = true;
            self.try_close(&mut state)
        };
        if done {
            self.downstream.on_completed();
        }
    }

    fn try_close(&self, state: &mut MergeState) -> bool {
        if state.closed || !state.source_completed || !state.active.is_empty() {
            return false;
        }
        state.closed = true;
        true
    }

    fn close(&self) {
        self.state.borrow_mut().closed = true;
    }
}

/// Merges the inner streams acquired per slot.
///
/// The output completes once the source has completed and every inner
/// stream still attached has completed.
fn merge<I, U, S, N>(source: &Observable<I>, init: N) -> Observable<U>
where
    I: 'static,
    U: 'static,
    S: Slots<I, Resource = Inner<U>> + 'static,
    N: Fn(Rc<Merger<U>>) -> S + 'static,
{
    let source = source.clone();
    Observable::create(move |observer| {
        let merger = Merger::new(observer.clone());
        let state = Rc::new(RefCell::new(init(Rc::clone(&merger))));

        let next_state = Rc::clone(&state);
        let completed = Rc::clone(&merger);
        let mut subscription = source.subscribe_observer(
            Relay::new(observer, move |changes: &I, downstream: &dyn Observer<U>| {
                let mut retired = Vec::new();
                let mut errors = Vec::new();
                next_state.borrow_mut().apply(changes, &mut retired, &mut errors);
                for error in &errors {
                    downstream.on_error(error);
                }
                for inner in retired {
                    inner.release();
                }
            })
            .with_completed(move |_| completed.complete_source())
            .shared(),
        );

        subscription.add(Subscription::new(move || {
            merger.close();
            let remaining = state.borrow_mut().drain();
            trace!(remaining = remaining.len(), "releasing inner subscriptions");
            for inner in remaining {
                inner.release();
            }
        }));
        subscription
    })
}

pub(crate) fn dispose_many_list<T>(source: &Observable<ListChangeSet<T>>, disposer: Rc<dyn Fn(&T)>) -> Observable<ListChangeSet<T>>
where
    T: Clone + 'static,
{
    track(
        source,
        || ListSlots::<T, T>::new(Box::new(|item: &T| item.clone())),
        move |item: T| disposer(&item),
    )
}

pub(crate) fn dispose_many_cache<K, V>(source: &Observable<ChangeSet<K, V>>, disposer: Rc<dyn Fn(&V)>) -> Observable<ChangeSet<K, V>>
where
    K: Eq + Hash + Clone + 'static,
    V: Clone + 'static,
{
    track(
        source,
        || CacheSlots::<K, V, V>::new(Box::new(|value: &V| value.clone())),
        move |value: V| disposer(&value),
    )
}

pub(crate) fn subscribe_many_list<T>(
    source: &Observable<ListChangeSet<T>>,
    factory: Rc<dyn Fn(&T) -> Subscription>,
) -> Observable<ListChangeSet<T>>
where
    T: 'static,
{
    track(
        source,
        move || {
            let factory = Rc::clone(&factory);
            ListSlots::<T, Subscription>::new(Box::new(move |item: &T| factory(item)))
        },
        |subscription: Subscription| drop(subscription),
    )
}

pub(crate) fn subscribe_many_cache<K, V>(
    source: &Observable<ChangeSet<K, V>>,
    factory: Rc<dyn Fn(&V) -> Subscription>,
) -> Observable<ChangeSet<K, V>>
where
    K: Eq + Hash + Clone + 'static,
    V: 'static,
{
    track(
        source,
        move || {
            let factory = Rc::clone(&factory);
            CacheSlots::<K, V, Subscription>::new(Box::new(move |value: &V| factory(value)))
        },
        |subscription: Subscription| drop(subscription),
    )
}

pub(crate) fn merge_many_list<T, U>(
    source: &Observable<ListChangeSet<T>>,
    selector: Rc<dyn Fn(&T) -> Observable<U>>,
) -> Observable<U>
where
    T: 'static,
    U: 'static,
{
    merge(source, move |merger: Rc<Merger<U>>| {
        let selector = Rc::clone(&selector);
        ListSlots::<T, Inner<U>>::new(Box::new(move |item: &T| merger.attach(&selector(item))))
    })
}

pub(crate) fn merge_many_cache<K, V, U>(
    source: &Observable<ChangeSet<K, V>>,
    selector: Rc<dyn Fn(&V) -> Observable<U>>,
) -> Observable<U>
where
    K: Eq + Hash + Clone + 'static,
    V: 'static,
    U: 'static,
{
    merge(source, move |merger: Rc<Merger<U>>| {
        let selector = Rc::clone(&selector);
        CacheSlots::<K, V, Inner<U>>::new(Box::new(move |value: &V| merger.attach(&selector(value))))
    })
}
