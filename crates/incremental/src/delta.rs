//! Weighted contributions feeding the aggregates.
//!
//! Every change set reduces to a list of deltas: `+1` for each value that
//! entered the collection and `-1` for each value that left it. Moves and
//! refreshes contribute nothing.

use ripple_core::{ChangeReason, ChangeSet, ListChange, ListChangeSet};

/// One value entering (`diff > 0`) or leaving (`diff < 0`) a collection.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Delta<T> {
    pub data: T,
    pub diff: i32,
}

impl<T> Delta<T> {
    #[inline]
    pub fn new(data: T, diff: i32) -> Self {
        Self { data, diff }
    }

    #[inline]
    pub fn insert(data: T) -> Self {
        Self { data, diff: 1 }
    }

    #[inline]
    pub fn delete(data: T) -> Self {
        Self { data, diff: -1 }
    }

    #[inline]
    pub fn is_insert(&self) -> bool {
        self.diff > 0
    }

    #[inline]
    pub fn is_delete(&self) -> bool {
        self.diff < 0
    }

    #[inline]
    pub fn map<U, F>(self, f: F) -> Delta<U>
    where
        F: FnOnce(T) -> U,
    {
        Delta {
            data: f(self.data),
            diff: self.diff,
        }
    }
}

/// A change set that can be read as aggregate contributions.
pub trait AggregateSource {
    type Item;

    fn deltas(&self) -> Vec<Delta<&Self::Item>>;
}

impl<T> AggregateSource for ListChangeSet<T> {
    type Item = T;

    fn deltas(&self) -> Vec<Delta<&T>> {
        let mut deltas = Vec::with_capacity(self.total_changes());
        for change in self {
            match change {
                ListChange::Add { item, .. } => deltas.push(Delta::insert(item)),
                ListChange::AddRange { items, .. } => deltas.extend(items.iter().map(Delta::insert)),
                ListChange::Replace { current, previous, .. } => {
                    deltas.push(Delta::delete(previous));
                    deltas.push(Delta::insert(current));
                }
                ListChange::Remove { item, .. } => deltas.push(Delta::delete(item)),
                ListChange::RemoveRange { items, .. } | ListChange::Clear { items } => {
                    deltas.extend(items.iter().map(Delta::delete));
                }
                ListChange::Moved { .. } | ListChange::Refresh { .. } => {}
            }
        }
        deltas
    }
}

impl<K, V> AggregateSource for ChangeSet<K, V> {
    type Item = V;

    fn deltas(&self) -> Vec<Delta<&V>> {
        let mut deltas = Vec::with_capacity(self.len());
        for change in self {
            match change.reason() {
                ChangeReason::Add => deltas.push(Delta::insert(change.current())),
                ChangeReason::Update => {
                    if let Some(previous) = change.previous() {
                        deltas.push(Delta::delete(previous));
                    }
                    deltas.push(Delta::insert(change.current()));
                }
                ChangeReason::Remove => deltas.push(Delta::delete(change.current())),
                ChangeReason::Refresh => {}
            }
        }
        deltas
    }
}
