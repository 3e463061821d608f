//! Read-only materialized views.
//!
//! A view subscribes to a change-set stream and replays every change set
//! onto its own collection. Views are themselves connectable, so a derived
//! stream can be shared by many consumers without re-running the operator
//! chain for each.
//!
//! A change set that cannot be replayed (say, an out-of-range index) is
//! rejected as a whole: the view keeps its last known-good state and records
//! the failure. Upstream errors are recorded and forwarded; they never touch
//! the state.

use crate::observable::{FnObserver, Observable};
use crate::store::Store;
use crate::subscription::Subscription;
use core::cell::RefCell;
use core::hash::Hash;
use ripple_core::{ChangeAwareCache, ChangeAwareList, ChangeSet, Error, ListChangeSet, Result};
use std::rc::Rc;
use tracing::warn;

struct ViewInner<C: crate::store::Recorder> {
    store: Rc<Store<C>>,
    last_error: Rc<RefCell<Option<Error>>>,
    upstream: RefCell<Subscription>,
}

impl<C: crate::store::Recorder> ViewInner<C> {
    fn bind<F>(store: Rc<Store<C>>, source: &Observable<C::Changes>, apply: F) -> Rc<Self>
    where
        F: Fn(&mut C, &C::Changes) -> Result<()> + 'static,
    {
        let last_error = Rc::new(RefCell::new(None));

        let on_next_store = Rc::clone(&store);
        let on_next_error = Rc::clone(&last_error);
        let on_error_store = Rc::clone(&store);
        let on_error_error = Rc::clone(&last_error);
        let on_completed_store = Rc::clone(&store);

        let observer = FnObserver::new(move |changes: &C::Changes| {
            if let Err(err) = on_next_store.edit(|state| apply(state, changes)) {
                warn!(error = %err, "rejected change set; keeping last known-good state");
                *on_next_error.borrow_mut() = Some(err);
            }
        })
        .on_error(move |err| {
            *on_error_error.borrow_mut() = Some(err.clone());
            on_error_store.publish_error(err);
        })
        .on_completed(move || on_completed_store.complete());

        let upstream = source.subscribe_observer(observer.shared());
        Rc::new(Self {
            store,
            last_error,
            upstream: RefCell::new(upstream),
        })
    }
}

impl<C: crate::store::Recorder> Drop for ViewInner<C> {
    fn drop(&mut self) {
        self.upstream.borrow_mut().dispose();
        self.store.dispose();
    }
}

/// A read-only list materialized from a list change-set stream.
///
/// Cloning shares the same view; the subscription to the source is released
/// when the last clone is dropped.
pub struct ObservableList<T: Clone + 'static> {
    inner: Rc<ViewInner<ChangeAwareList<T>>>,
}

impl<T: Clone + 'static> Clone for ObservableList<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<T: Clone + 'static> ObservableList<T> {
    /// Subscribes to `source` and starts materializing.
    pub fn new(source: &Observable<ListChangeSet<T>>) -> Self {
        let store = Store::new("ObservableList", ChangeAwareList::new());
        let inner = ViewInner::bind(store, source, |list, changes| list.apply_changes(changes));
        Self { inner }
    }

    /// The live change stream of the view, starting with its current items.
    pub fn connect(&self) -> Result<Observable<ListChangeSet<T>>> {
        self.inner.store.connect()
    }

    pub fn items(&self) -> Vec<T> {
        self.inner.store.read(|list| list.as_slice().to_vec())
    }

    pub fn get(&self, index: usize) -> Option<T> {
        self.inner.store.read(|list| list.get(index).cloned())
    }

    pub fn len(&self) -> usize {
        self.inner.store.read(|list| list.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The most recent upstream or replay failure, if any.
    pub fn last_error(&self) -> Option<Error> {
        self.inner.last_error.borrow().clone()
    }
}

/// A read-only cache materialized from a keyed change-set stream.
///
/// Cloning shares the same view; the subscription to the source is released
/// when the last clone is dropped.
pub struct ObservableCache<K, V>
where
    K: Eq + Hash + Clone + 'static,
    V: Clone + 'static,
{
    inner: Rc<ViewInner<ChangeAwareCache<K, V>>>,
}

impl<K, V> Clone for ObservableCache<K, V>
where
    K: Eq + Hash + Clone + 'static,
    V: Clone + 'static,
{
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<K, V> ObservableCache<K, V>
where
    K: Eq + Hash + Clone + 'static,
    V: Clone + 'static,
{
    /// Subscribes to `source` and starts materializing.
    pub fn new(source: &Observable<ChangeSet<K, V>>) -> Self {
        let store = Store::new("ObservableCache", ChangeAwareCache::new());
        let inner = ViewInner::bind(store, source, |cache, changes| {
            cache.apply_changes(changes);
            Ok(())
        });
        Self { inner }
    }

    /// The live change stream of the view, starting with its current entries.
    pub fn connect(&self) -> Result<Observable<ChangeSet<K, V>>> {
        self.inner.store.connect()
    }

    pub fn lookup(&self, key: &K) -> Option<V> {
        self.inner.store.read(|cache| cache.lookup(key).cloned())
    }

    pub fn keys(&self) -> Vec<K> {
        self.inner.store.read(|cache| cache.keys().cloned().collect())
    }

    pub fn items(&self) -> Vec<V> {
        self.inner.store.read(|cache| cache.values().cloned().collect())
    }

    pub fn len(&self) -> usize {
        self.inner.store.read(|cache| cache.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The most recent upstream failure, if any.
    pub fn last_error(&self) -> Option<Error> {
        self.inner.last_error.borrow().clone()
    }
}

impl<K, V> core::fmt::Debug for ObservableCache<K, V>
where
    K: Eq + Hash + Clone + core::fmt::Debug + 'static,
    V: Clone + 'static,
{
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("ObservableCache")
            .field("keys", &self.keys())
            .finish()
    }
}

impl<T: Clone + core::fmt::Debug + 'static> core::fmt::Debug for ObservableList<T> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("ObservableList")
            .field("items", &self.items())
            .finish()
    }
}
