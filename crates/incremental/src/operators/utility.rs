//! Small stream utilities.

use crate::stream::ChangeSetLike;
use core::cell::RefCell;
use core::hash::Hash;
use hashbrown::HashMap;
use ripple_core::{Change, ChangeSet, ListChangeSet};
use ripple_reactive::{Observable, Observer, Relay};

/// Drops empty change sets.
pub(crate) fn not_empty<C: ChangeSetLike + 'static>(source: &Observable<C>) -> Observable<C> {
    source.filter_values(|changes: &C| !changes.is_empty())
}

/// Drops the first change set, usually the initial snapshot.
pub(crate) fn skip_initial<C: 'static>(source: &Observable<C>) -> Observable<C> {
    source.skip(1)
}

/// Emits a snapshot of the whole list after every change set.
///
/// A change that cannot be replayed is forwarded as an error and skipped.
pub(crate) fn list_snapshots<T: Clone + 'static>(source: &Observable<ListChangeSet<T>>) -> Observable<Vec<T>> {
    let source = source.clone();
    Observable::create(move |observer| {
        let items = RefCell::new(Vec::new());
        source.subscribe_observer(
            Relay::new(observer, move |changes: &ListChangeSet<T>, downstream: &dyn Observer<Vec<T>>| {
                let mut errors = Vec::new();
                let snapshot = {
                    let mut items = items.borrow_mut();
                    for change in changes {
                        if let Err(err) = change.apply_to(&mut items) {
                            errors.push(err);
                        }
                    }
                    items.clone()
                };
                downstream.on_next(&snapshot);
                for error in &errors {
                    downstream.on_error(error);
                }
            })
            .shared(),
        )
    })
}

/// Emits every value of the cache after every change set, in no
/// particular order.
pub(crate) fn cache_snapshots<K, V>(source: &Observable<ChangeSet<K, V>>) -> Observable<Vec<V>>
where
    K: Eq + Hash + Clone + 'static,
    V: Clone + 'static,
{
    let source = source.clone();
    Observable::create(move |observer| {
        let entries = RefCell::new(HashMap::new());
        source.subscribe_observer(
            Relay::new(observer, move |changes: &ChangeSet<K, V>, downstream: &dyn Observer<Vec<V>>| {
                let snapshot: Vec<V> = {
                    let mut entries = entries.borrow_mut();
                    changes.apply_to(&mut entries);
                    entries.values().cloned().collect()
                };
                downstream.on_next(&snapshot);
            })
            .shared(),
        )
    })
}

/// Emits the changes that touch `key`, one at a time.
pub(crate) fn watch_key<K, V>(source: &Observable<ChangeSet<K, V>>, key: K) -> Observable<Change<K, V>>
where
    K: Eq + Clone + 'static,
    V: Clone + 'static,
{
    let source = source.clone();
    Observable::create(move |observer| {
        let key = key.clone();
        source.subscribe_observer(
            Relay::new(observer, move |changes: &ChangeSet<K, V>, downstream: &dyn Observer<Change<K, V>>| {
                for change in changes.iter().filter(|change| *change.key() == key) {
                    downstream.on_next(change);
                }
            })
            .shared(),
        )
    })
}
