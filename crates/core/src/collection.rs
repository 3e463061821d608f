//! Change-aware collections.
//!
//! These collections keep both the current state and the changes that have
//! not been captured yet. Every mutator validates its arguments before
//! touching state, and `rollback` undoes uncaptured changes in reverse order,
//! which is how batched edits stay all-or-nothing.

use crate::change::{Change, ChangeReason, ChangeSet};
use crate::error::{check_index, check_insert_index, check_range, Error, Result};
use crate::list_change::{ListChange, ListChangeSet};
use core::hash::Hash;
use hashbrown::HashMap;

/// An ordered collection that records a `ListChange` for every mutation.
#[derive(Clone, Debug)]
pub struct ChangeAwareList<T> {
    items: Vec<T>,
    pending: Vec<ListChange<T>>,
}

impl<T> Default for ChangeAwareList<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> ChangeAwareList<T> {
    /// Creates an empty list.
    pub fn new() -> Self {
        Self {
            items: Vec::new(),
            pending: Vec::new(),
        }
    }

    #[inline]
    pub fn as_slice(&self) -> &[T] {
        &self.items
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    #[inline]
    pub fn get(&self, index: usize) -> Option<&T> {
        self.items.get(index)
    }

    #[inline]
    pub fn iter(&self) -> core::slice::Iter<'_, T> {
        self.items.iter()
    }

    /// Returns true if there are uncaptured changes.
    #[inline]
    pub fn has_pending(&self) -> bool {
        !self.pending.is_empty()
    }

    /// Takes the uncaptured changes as one change set.
    pub fn capture_changes(&mut self) -> ListChangeSet<T> {
        core::mem::take(&mut self.pending).into()
    }
}

impl<T: Clone> ChangeAwareList<T> {
    /// Creates a list holding `items` with nothing pending.
    pub fn from_vec(items: Vec<T>) -> Self {
        Self {
            items,
            pending: Vec::new(),
        }
    }

    /// Appends an item.
    pub fn add(&mut self, item: T) {
        let index = self.items.len();
        self.items.push(item.clone());
        self.pending.push(ListChange::Add { item, index });
    }

    /// Appends items as a single `AddRange`.
    pub fn add_range(&mut self, items: Vec<T>) {
        let index = self.items.len();
        self.insert_range_unchecked(index, items);
    }

    /// Inserts an item at `index`.
    pub fn insert(&mut self, index: usize, item: T) -> Result<()> {
        check_insert_index(index, self.items.len())?;
        self.items.insert(index, item.clone());
        self.pending.push(ListChange::Add { item, index });
        Ok(())
    }

    /// Inserts items at `index` as a single `AddRange`.
    pub fn insert_range(&mut self, index: usize, items: Vec<T>) -> Result<()> {
        check_insert_index(index, self.items.len())?;
        self.insert_range_unchecked(index, items);
        Ok(())
    }

    fn insert_range_unchecked(&mut self, index: usize, items: Vec<T>) {
        if items.is_empty() {
            return;
        }
        self.items.splice(index..index, items.iter().cloned());
        self.pending.push(ListChange::AddRange { items, index });
    }

    /// Removes and returns the item at `index`.
    pub fn remove_at(&mut self, index: usize) -> Result<T> {
        check_index(index, self.items.len())?;
        let item = self.items.remove(index);
        self.pending.push(ListChange::Remove {
            item: item.clone(),
            index,
        });
        Ok(item)
    }

    /// Removes `count` items starting at `index` as a single `RemoveRange`.
    pub fn remove_range(&mut self, index: usize, count: usize) -> Result<()> {
        if count == 0 {
            return Ok(());
        }
        check_range(index, count, self.items.len())?;
        let items: Vec<T> = self.items.drain(index..index + count).collect();
        self.pending.push(ListChange::RemoveRange { items, index });
        Ok(())
    }

    /// Replaces the item at `index`, returning the previous one.
    pub fn replace_at(&mut self, index: usize, item: T) -> Result<T> {
        check_index(index, self.items.len())?;
        let previous = core::mem::replace(&mut self.items[index], item.clone());
        self.pending.push(ListChange::Replace {
            current: item,
            previous: previous.clone(),
            index,
        });
        Ok(previous)
    }

    /// Moves the item at `from` so that it ends up at `to`.
    pub fn move_item(&mut self, from: usize, to: usize) -> Result<()> {
        check_index(from, self.items.len())?;
        check_index(to, self.items.len())?;
        if from == to {
            return Ok(());
        }
        let item = self.items.remove(from);
        self.items.insert(to, item.clone());
        self.pending.push(ListChange::Moved {
            item,
            current_index: to,
            previous_index: from,
        });
        Ok(())
    }

    /// Records a `Refresh` for the item at `index`.
    pub fn refresh_at(&mut self, index: usize) -> Result<()> {
        check_index(index, self.items.len())?;
        self.pending.push(ListChange::Refresh {
            item: self.items[index].clone(),
            index,
        });
        Ok(())
    }

    /// Removes everything as a single `Clear`.
    pub fn clear(&mut self) {
        if self.items.is_empty() {
            return;
        }
        let items = core::mem::take(&mut self.items);
        self.pending.push(ListChange::Clear { items });
    }

    /// Replays a foreign change set, recording it as pending.
    ///
    /// All-or-nothing: on the first invalid change everything applied by this
    /// call is undone and the error is returned.
    pub fn apply_changes(&mut self, changes: &ListChangeSet<T>) -> Result<()> {
        let mark = self.pending.len();
        for change in changes {
            if let Err(err) = self.apply_change(change) {
                self.rollback_to(mark);
                return Err(err);
            }
        }
        Ok(())
    }

    fn apply_change(&mut self, change: &ListChange<T>) -> Result<()> {
        match change {
            ListChange::Add { item, index } => self.insert(*index, item.clone()),
            ListChange::AddRange { items, index } => self.insert_range(*index, items.clone()),
            ListChange::Replace { current, index, .. } => {
                self.replace_at(*index, current.clone()).map(|_| ())
            }
            ListChange::Remove { index, .. } => self.remove_at(*index).map(|_| ()),
            ListChange::RemoveRange { items, index } => self.remove_range(*index, items.len()),
            ListChange::Moved {
                current_index,
                previous_index,
                ..
            } => self.move_item(*previous_index, *current_index),
            ListChange::Refresh { index, .. } => self.refresh_at(*index),
            ListChange::Clear { .. } => {
                self.clear();
                Ok(())
            }
        }
    }

    /// Undoes every uncaptured change.
    pub fn rollback(&mut self) {
        self.rollback_to(0);
    }

    fn rollback_to(&mut self, mark: usize) {
        while self.pending.len() > mark {
            let Some(change) = self.pending.pop() else {
                break;
            };
            match change {
                ListChange::Add { index, .. } => {
                    self.items.remove(index);
                }
                ListChange::AddRange { items, index } => {
                    self.items.drain(index..index + items.len());
                }
                ListChange::Replace {
                    previous, index, ..
                } => {
                    self.items[index] = previous;
                }
                ListChange::Remove { item, index } => self.items.insert(index, item),
                ListChange::RemoveRange { items, index } => {
                    self.items.splice(index..index, items);
                }
                ListChange::Moved {
                    current_index,
                    previous_index,
                    ..
                } => {
                    let item = self.items.remove(current_index);
                    self.items.insert(previous_index, item);
                }
                ListChange::Refresh { .. } => {}
                ListChange::Clear { items } => self.items = items,
            }
        }
    }
}

impl<T: Clone + PartialEq> ChangeAwareList<T> {
    /// Position of the first item equal to `item`.
    pub fn index_of(&self, item: &T) -> Option<usize> {
        self.items.iter().position(|x| x == item)
    }

    /// Removes the first item equal to `item`. Returns false when absent.
    pub fn remove(&mut self, item: &T) -> bool {
        match self.index_of(item) {
            Some(index) => self.remove_at(index).is_ok(),
            None => false,
        }
    }

    /// Replaces the first item equal to `original`.
    pub fn replace(&mut self, original: &T, replacement: T) -> Result<()> {
        let index = self
            .index_of(original)
            .ok_or_else(|| Error::argument("cannot find the item to replace"))?;
        self.replace_at(index, replacement).map(|_| ())
    }
}

/// A keyed collection that records a `Change` for every mutation.
#[derive(Clone, Debug)]
pub struct ChangeAwareCache<K, V> {
    data: HashMap<K, V>,
    pending: Vec<Change<K, V>>,
}

impl<K: Eq + Hash, V> Default for ChangeAwareCache<K, V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K: Eq + Hash, V> ChangeAwareCache<K, V> {
    /// Creates an empty cache.
    pub fn new() -> Self {
        Self {
            data: HashMap::new(),
            pending: Vec::new(),
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    #[inline]
    pub fn lookup(&self, key: &K) -> Option<&V> {
        self.data.get(key)
    }

    #[inline]
    pub fn contains_key(&self, key: &K) -> bool {
        self.data.contains_key(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &K> {
        self.data.keys()
    }

    pub fn values(&self) -> impl Iterator<Item = &V> {
        self.data.values()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&K, &V)> {
        self.data.iter()
    }

    /// Returns true if there are uncaptured changes.
    #[inline]
    pub fn has_pending(&self) -> bool {
        !self.pending.is_empty()
    }

    /// Takes the uncaptured changes as one change set.
    pub fn capture_changes(&mut self) -> ChangeSet<K, V> {
        core::mem::take(&mut self.pending).into()
    }
}

impl<K: Eq + Hash + Clone, V: Clone> ChangeAwareCache<K, V> {
    /// Inserts or replaces the value for `key`.
    ///
    /// Records `Add` for a new key and `Update` (with the previous value)
    /// otherwise.
    pub fn add_or_update(&mut self, key: K, value: V) -> ChangeReason {
        match self.data.insert(key.clone(), value.clone()) {
            Some(previous) => {
                self.pending.push(Change::update(key, value, previous));
                ChangeReason::Update
            }
            None => {
                self.pending.push(Change::add(key, value));
                ChangeReason::Add
            }
        }
    }

    /// Removes `key`. Removing an absent key records nothing.
    pub fn remove(&mut self, key: &K) -> Option<V> {
        let value = self.data.remove(key)?;
        self.pending.push(Change::remove(key.clone(), value.clone()));
        Some(value)
    }

    /// Records a `Refresh` for a present key.
    pub fn refresh(&mut self, key: &K) -> bool {
        match self.data.get(key) {
            Some(value) => {
                self.pending.push(Change::refresh(key.clone(), value.clone()));
                true
            }
            None => false,
        }
    }

    /// Removes every entry, recording one `Remove` per key.
    pub fn clear(&mut self) {
        for (key, value) in self.data.drain() {
            self.pending.push(Change::remove(key, value));
        }
    }

    /// Replays a foreign change set, recording it as pending.
    pub fn apply_changes(&mut self, changes: &ChangeSet<K, V>) {
        for change in changes {
            match change.reason() {
                ChangeReason::Add | ChangeReason::Update => {
                    self.add_or_update(change.key().clone(), change.current().clone());
                }
                ChangeReason::Remove => {
                    self.remove(change.key());
                }
                ChangeReason::Refresh => {
                    self.refresh(change.key());
                }
            }
        }
    }

    /// Undoes every uncaptured change.
    pub fn rollback(&mut self) {
        while let Some(change) = self.pending.pop() {
            let (reason, key, current, previous) = change.into_parts();
            match (reason, previous) {
                (ChangeReason::Add, _) => {
                    self.data.remove(&key);
                }
                (ChangeReason::Update, Some(previous)) => {
                    self.data.insert(key, previous);
                }
                (ChangeReason::Remove, _) => {
                    self.data.insert(key, current);
                }
                _ => {}
            }
        }
    }

    /// Clones the current entries.
    pub fn to_entries(&self) -> Vec<(K, V)> {
        self.data
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }
}
