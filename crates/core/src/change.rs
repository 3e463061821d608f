//! Keyed change model.
//!
//! A `Change` describes what happened to one key of a cache. For a given key
//! at most one current value exists; `Update` always carries the value it
//! replaced.

use core::hash::Hash;
use core::slice;
use hashbrown::HashMap;
use std::vec;

/// Reason of a keyed change.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ChangeReason {
    Add,
    Update,
    Remove,
    Refresh,
}

/// A change to one key of a cache.
///
/// For `Remove` the `current` value is the value that left the cache.
#[derive(Clone, Debug, PartialEq)]
pub struct Change<K, V> {
    reason: ChangeReason,
    key: K,
    current: V,
    previous: Option<V>,
}

impl<K, V> Change<K, V> {
    /// A key entered the cache.
    pub fn add(key: K, current: V) -> Self {
        Self {
            reason: ChangeReason::Add,
            key,
            current,
            previous: None,
        }
    }

    /// A present key received a new value.
    pub fn update(key: K, current: V, previous: V) -> Self {
        Self {
            reason: ChangeReason::Update,
            key,
            current,
            previous: Some(previous),
        }
    }

    /// A key left the cache; `value` is what it held.
    pub fn remove(key: K, value: V) -> Self {
        Self {
            reason: ChangeReason::Remove,
            key,
            current: value,
            previous: None,
        }
    }

    /// Consumers should re-evaluate the value of a present key.
    pub fn refresh(key: K, current: V) -> Self {
        Self {
            reason: ChangeReason::Refresh,
            key,
            current,
            previous: None,
        }
    }

    #[inline]
    pub fn reason(&self) -> ChangeReason {
        self.reason
    }

    #[inline]
    pub fn key(&self) -> &K {
        &self.key
    }

    #[inline]
    pub fn current(&self) -> &V {
        &self.current
    }

    /// The replaced value; only `Update` carries one.
    #[inline]
    pub fn previous(&self) -> Option<&V> {
        self.previous.as_ref()
    }

    /// Splits the change into `(reason, key, current, previous)`.
    pub fn into_parts(self) -> (ChangeReason, K, V, Option<V>) {
        (self.reason, self.key, self.current, self.previous)
    }
}

impl<K: Clone, V> Change<K, V> {
    /// Projects current and previous values, keeping key and reason.
    pub fn map_value<U, F>(&self, mut f: F) -> Change<K, U>
    where
        F: FnMut(&V) -> U,
    {
        Change {
            reason: self.reason,
            key: self.key.clone(),
            previous: self.previous.as_ref().map(&mut f),
            current: f(&self.current),
        }
    }
}

/// An ordered batch of keyed changes produced by one upstream event.
#[derive(Clone, Debug, PartialEq)]
pub struct ChangeSet<K, V> {
    changes: Vec<Change<K, V>>,
}

impl<K, V> Default for ChangeSet<K, V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K, V> ChangeSet<K, V> {
    /// Creates an empty change set.
    #[inline]
    pub fn new() -> Self {
        Self {
            changes: Vec::new(),
        }
    }

    /// Creates an empty change set with room for `capacity` changes.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            changes: Vec::with_capacity(capacity),
        }
    }

    /// Creates the change set that rebuilds the given entries from empty.
    pub fn initial(entries: impl IntoIterator<Item = (K, V)>) -> Self {
        entries
            .into_iter()
            .map(|(key, value)| Change::add(key, value))
            .collect()
    }

    #[inline]
    pub fn push(&mut self, change: Change<K, V>) {
        self.changes.push(change);
    }

    /// Appends every change of `other`.
    pub fn extend(&mut self, other: ChangeSet<K, V>) {
        self.changes.extend(other.changes);
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.changes.len()
    }

    #[inline]
    pub fn iter(&self) -> slice::Iter<'_, Change<K, V>> {
        self.changes.iter()
    }

    #[inline]
    pub fn as_slice(&self) -> &[Change<K, V>] {
        &self.changes
    }

    fn count_of(&self, reason: ChangeReason) -> usize {
        self.changes.iter().filter(|c| c.reason == reason).count()
    }

    pub fn adds(&self) -> usize {
        self.count_of(ChangeReason::Add)
    }

    pub fn updates(&self) -> usize {
        self.count_of(ChangeReason::Update)
    }

    pub fn removes(&self) -> usize {
        self.count_of(ChangeReason::Remove)
    }

    pub fn refreshes(&self) -> usize {
        self.count_of(ChangeReason::Refresh)
    }
}

impl<K: Clone, V> ChangeSet<K, V> {
    /// Projects every value, keeping keys and reasons.
    pub fn map_values<U, F>(&self, mut f: F) -> ChangeSet<K, U>
    where
        F: FnMut(&V) -> U,
    {
        ChangeSet {
            changes: self.changes.iter().map(|c| c.map_value(&mut f)).collect(),
        }
    }
}

impl<K: Eq + Hash + Clone, V: Clone> ChangeSet<K, V> {
    /// Replays every change onto `target`.
    ///
    /// `Add` and `Update` both upsert, removing an absent key is a no-op and
    /// `Refresh` leaves the value untouched. Keyed replay cannot fail.
    pub fn apply_to(&self, target: &mut HashMap<K, V>) {
        for change in &self.changes {
            match change.reason {
                ChangeReason::Add | ChangeReason::Update => {
                    target.insert(change.key.clone(), change.current.clone());
                }
                ChangeReason::Remove => {
                    target.remove(&change.key);
                }
                ChangeReason::Refresh => {}
            }
        }
    }
}

impl<K, V> From<Vec<Change<K, V>>> for ChangeSet<K, V> {
    fn from(changes: Vec<Change<K, V>>) -> Self {
        Self { changes }
    }
}

impl<K, V> FromIterator<Change<K, V>> for ChangeSet<K, V> {
    fn from_iter<I: IntoIterator<Item = Change<K, V>>>(iter: I) -> Self {
        Self {
            changes: iter.into_iter().collect(),
        }
    }
}

impl<K, V> IntoIterator for ChangeSet<K, V> {
    type Item = Change<K, V>;
    type IntoIter = vec::IntoIter<Change<K, V>>;

    fn into_iter(self) -> Self::IntoIter {
        self.changes.into_iter()
    }
}

impl<'a, K, V> IntoIterator for &'a ChangeSet<K, V> {
    type Item = &'a Change<K, V>;
    type IntoIter = slice::Iter<'a, Change<K, V>>;

    fn into_iter(self) -> Self::IntoIter {
        self.changes.iter()
    }
}
