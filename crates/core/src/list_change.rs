//! Positional change model.
//!
//! A `ListChange` describes one edit of an ordered collection. Range reasons
//! (`AddRange`, `RemoveRange`, `Clear`) carry every item they touch so that a
//! consumer can rebuild state without asking the producer.

use crate::error::{check_index, check_insert_index, check_range, Result};
use core::slice;
use std::vec;

/// Reason of a positional change.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ListChangeReason {
    Add,
    AddRange,
    Replace,
    Remove,
    RemoveRange,
    Moved,
    Refresh,
    Clear,
}

/// A single edit of an ordered collection.
///
/// Indices are always those observed at the moment the change is replayed,
/// i.e. after every earlier change of the same set has been applied.
#[derive(Clone, Debug, PartialEq)]
pub enum ListChange<T> {
    Add { item: T, index: usize },
    AddRange { items: Vec<T>, index: usize },
    Replace { current: T, previous: T, index: usize },
    Remove { item: T, index: usize },
    RemoveRange { items: Vec<T>, index: usize },
    Moved { item: T, current_index: usize, previous_index: usize },
    Refresh { item: T, index: usize },
    Clear { items: Vec<T> },
}

impl<T> ListChange<T> {
    /// Returns the reason of this change.
    pub fn reason(&self) -> ListChangeReason {
        match self {
            ListChange::Add { .. } => ListChangeReason::Add,
            ListChange::AddRange { .. } => ListChangeReason::AddRange,
            ListChange::Replace { .. } => ListChangeReason::Replace,
            ListChange::Remove { .. } => ListChangeReason::Remove,
            ListChange::RemoveRange { .. } => ListChangeReason::RemoveRange,
            ListChange::Moved { .. } => ListChangeReason::Moved,
            ListChange::Refresh { .. } => ListChangeReason::Refresh,
            ListChange::Clear { .. } => ListChangeReason::Clear,
        }
    }

    /// Number of items this change touches.
    pub fn item_count(&self) -> usize {
        match self {
            ListChange::AddRange { items, .. }
            | ListChange::RemoveRange { items, .. }
            | ListChange::Clear { items } => items.len(),
            _ => 1,
        }
    }

    /// Projects every item, keeping reasons and indices.
    pub fn map<U, F>(&self, mut f: F) -> ListChange<U>
    where
        F: FnMut(&T) -> U,
    {
        match self {
            ListChange::Add { item, index } => ListChange::Add {
                item: f(item),
                index: *index,
            },
            ListChange::AddRange { items, index } => ListChange::AddRange {
                items: items.iter().map(&mut f).collect(),
                index: *index,
            },
            ListChange::Replace {
                current,
                previous,
                index,
            } => {
                let previous = f(previous);
                ListChange::Replace {
                    current: f(current),
                    previous,
                    index: *index,
                }
            }
            ListChange::Remove { item, index } => ListChange::Remove {
                item: f(item),
                index: *index,
            },
            ListChange::RemoveRange { items, index } => ListChange::RemoveRange {
                items: items.iter().map(&mut f).collect(),
                index: *index,
            },
            ListChange::Moved {
                item,
                current_index,
                previous_index,
            } => ListChange::Moved {
                item: f(item),
                current_index: *current_index,
                previous_index: *previous_index,
            },
            ListChange::Refresh { item, index } => ListChange::Refresh {
                item: f(item),
                index: *index,
            },
            ListChange::Clear { items } => ListChange::Clear {
                items: items.iter().map(&mut f).collect(),
            },
        }
    }
}

impl<T: Clone> ListChange<T> {
    /// Replays this change onto `target`.
    ///
    /// Bounds are checked before anything is touched, so a failing change
    /// leaves `target` unchanged.
    pub fn apply_to(&self, target: &mut Vec<T>) -> Result<()> {
        match self {
            ListChange::Add { item, index } => {
                check_insert_index(*index, target.len())?;
                target.insert(*index, item.clone());
            }
            ListChange::AddRange { items, index } => {
                check_insert_index(*index, target.len())?;
                target.splice(*index..*index, items.iter().cloned());
            }
            ListChange::Replace { current, index, .. } => {
                check_index(*index, target.len())?;
                target[*index] = current.clone();
            }
            ListChange::Remove { index, .. } => {
                check_index(*index, target.len())?;
                target.remove(*index);
            }
            ListChange::RemoveRange { items, index } => {
                if items.is_empty() {
                    return Ok(());
                }
                check_range(*index, items.len(), target.len())?;
                target.drain(*index..*index + items.len());
            }
            ListChange::Moved {
                current_index,
                previous_index,
                ..
            } => {
                check_index(*previous_index, target.len())?;
                check_index(*current_index, target.len())?;
                let item = target.remove(*previous_index);
                target.insert(*current_index, item);
            }
            ListChange::Refresh { index, .. } => {
                check_index(*index, target.len())?;
            }
            ListChange::Clear { .. } => target.clear(),
        }
        Ok(())
    }
}

/// One item-level step of a flattened change set.
///
/// Range changes expand into their per-item equivalents: `AddRange` at `i`
/// becomes `Add` at `i`, `i + 1`, ...; `RemoveRange` at `i` becomes repeated
/// `Remove` at `i`. `Clear` stays whole since consumers usually reset.
#[derive(Debug, PartialEq)]
pub enum ItemChange<'a, T> {
    Add { item: &'a T, index: usize },
    Replace { current: &'a T, previous: &'a T, index: usize },
    Remove { item: &'a T, index: usize },
    Moved { item: &'a T, current_index: usize, previous_index: usize },
    Refresh { item: &'a T, index: usize },
    Clear { items: &'a [T] },
}

/// An ordered batch of positional changes produced by one upstream event.
#[derive(Clone, Debug, PartialEq)]
pub struct ListChangeSet<T> {
    changes: Vec<ListChange<T>>,
}

impl<T> Default for ListChangeSet<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> ListChangeSet<T> {
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

    /// Creates the change set that rebuilds `items` from an empty list.
    pub fn initial(items: Vec<T>) -> Self {
        let mut changes = Self::new();
        if !items.is_empty() {
            changes.push(ListChange::AddRange { items, index: 0 });
        }
        changes
    }

    /// Appends a change.
    #[inline]
    pub fn push(&mut self, change: ListChange<T>) {
        self.changes.push(change);
    }

    /// Appends every change of `other`.
    pub fn extend(&mut self, other: ListChangeSet<T>) {
        self.changes.extend(other.changes);
    }

    /// Returns true if there are no changes.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }

    /// Number of change records.
    #[inline]
    pub fn len(&self) -> usize {
        self.changes.len()
    }

    /// Number of items touched, counting each item of a range change.
    pub fn total_changes(&self) -> usize {
        self.changes.iter().map(ListChange::item_count).sum()
    }

    /// Number of changes with the given reason.
    pub fn count_of(&self, reason: ListChangeReason) -> usize {
        self.changes.iter().filter(|c| c.reason() == reason).count()
    }

    /// Iterates the changes in order.
    #[inline]
    pub fn iter(&self) -> slice::Iter<'_, ListChange<T>> {
        self.changes.iter()
    }

    /// Returns the changes as a slice.
    #[inline]
    pub fn as_slice(&self) -> &[ListChange<T>] {
        &self.changes
    }

    /// Projects every item, keeping reasons and indices.
    pub fn map<U, F>(&self, mut f: F) -> ListChangeSet<U>
    where
        F: FnMut(&T) -> U,
    {
        ListChangeSet {
            changes: self.changes.iter().map(|c| c.map(&mut f)).collect(),
        }
    }

    /// Expands range changes into item-level steps.
    pub fn flatten(&self) -> Vec<ItemChange<'_, T>> {
        let mut out = Vec::with_capacity(self.changes.len());
        for change in &self.changes {
            match change {
                ListChange::Add { item, index } => out.push(ItemChange::Add {
                    item,
                    index: *index,
                }),
                ListChange::AddRange { items, index } => {
                    for (offset, item) in items.iter().enumerate() {
                        out.push(ItemChange::Add {
                            item,
                            index: index + offset,
                        });
                    }
                }
                ListChange::Replace {
                    current,
                    previous,
                    index,
                } => out.push(ItemChange::Replace {
                    current,
                    previous,
                    index: *index,
                }),
                ListChange::Remove { item, index } => out.push(ItemChange::Remove {
                    item,
                    index: *index,
                }),
                ListChange::RemoveRange { items, index } => {
                    for item in items {
                        out.push(ItemChange::Remove {
                            item,
                            index: *index,
                        });
                    }
                }
                ListChange::Moved {
                    item,
                    current_index,
                    previous_index,
                } => out.push(ItemChange::Moved {
                    item,
                    current_index: *current_index,
                    previous_index: *previous_index,
                }),
                ListChange::Refresh { item, index } => out.push(ItemChange::Refresh {
                    item,
                    index: *index,
                }),
                ListChange::Clear { items } => out.push(ItemChange::Clear { items }),
            }
        }
        out
    }
}

impl<T: Clone> ListChangeSet<T> {
    /// Replays every change onto `target`, in order.
    ///
    /// Stops at the first invalid change; earlier changes stay applied. Use
    /// `ChangeAwareList::apply_changes` when all-or-nothing replay is needed.
    pub fn apply_to(&self, target: &mut Vec<T>) -> Result<()> {
        for change in &self.changes {
            change.apply_to(target)?;
        }
        Ok(())
    }
}

impl<T> From<Vec<ListChange<T>>> for ListChangeSet<T> {
    fn from(changes: Vec<ListChange<T>>) -> Self {
        Self { changes }
    }
}

impl<T> FromIterator<ListChange<T>> for ListChangeSet<T> {
    fn from_iter<I: IntoIterator<Item = ListChange<T>>>(iter: I) -> Self {
        Self {
            changes: iter.into_iter().collect(),
        }
    }
}

impl<T> IntoIterator for ListChangeSet<T> {
    type Item = ListChange<T>;
    type IntoIter = vec::IntoIter<ListChange<T>>;

    fn into_iter(self) -> Self::IntoIter {
        self.changes.into_iter()
    }
}

impl<'a, T> IntoIterator for &'a ListChangeSet<T> {
    type Item = &'a ListChange<T>;
    type IntoIter = slice::Iter<'a, ListChange<T>>;

    fn into_iter(self) -> Self::IntoIter {
        self.changes.iter()
    }
}
