//! Synchronous per-item projection.
//!
//! The transformers remember what they emitted so that removals and
//! replacements carry the projected value downstream without projecting the
//! departing item again. A fallible projection that fails reports a
//! `TransformFailure` and skips the change; the downstream collection keeps
//! whatever it held before.

use core::fmt::Display;
use core::hash::Hash;
use hashbrown::HashMap;
use ripple_core::{check_index, check_insert_index, check_range, Change, ChangeReason, ChangeSet, Error, ListChange, ListChangeSet, Result};
use std::rc::Rc;
use tracing::warn;

/// A projection that may fail.
pub type Projection<T, U> = Rc<dyn Fn(&T) -> Result<U>>;

/// Wraps an infallible projection.
pub(crate) fn infallible<T, U, F>(f: F) -> Projection<T, U>
where
    F: Fn(&T) -> U + 'static,
{
    Rc::new(move |item: &T| Ok(f(item)))
}

/// Wraps a fallible projection, converting its error into a
/// `TransformFailure`.
pub(crate) fn fallible<T, U, E, F>(f: F) -> Projection<T, U>
where
    E: Display,
    F: Fn(&T) -> core::result::Result<U, E> + 'static,
{
    Rc::new(move |item: &T| f(item).map_err(|err| Error::transform_failure(err)))
}

fn project<T, U>(projection: &Projection<T, U>, item: &T, errors: &mut Vec<Error>) -> Option<U> {
    match projection(item) {
        Ok(value) => Some(value),
        Err(err) => {
            warn!(error = %err, "transform failed; change skipped");
            errors.push(err);
            None
        }
    }
}

/// Transform state for list streams.
///
/// An upstream item whose projection failed occupies an empty slot so that
/// upstream indices keep lining up with the mirror.
pub struct ListTransformer<T, U> {
    projection: Projection<T, U>,
    items: Vec<Option<U>>,
    holes: usize,
}

impl<T, U: Clone> ListTransformer<T, U> {
    pub fn new(projection: Projection<T, U>) -> Self {
        Self {
            projection,
            items: Vec::new(),
            holes: 0,
        }
    }

    fn downstream_index(&self, index: usize) -> usize {
        if self.holes == 0 {
            index
        } else {
            self.items[..index].iter().filter(|slot| slot.is_some()).count()
        }
    }

    pub fn process(&mut self, changes: &ListChangeSet<T>, errors: &mut Vec<Error>) -> ListChangeSet<U> {
        let mut out = ListChangeSet::with_capacity(changes.len());
        for change in changes {
            if let Err(err) = self.apply(change, &mut out, errors) {
                errors.push(err);
            }
        }
        out
    }

    fn insert(&mut self, index: usize, slot: Option<U>) {
        if slot.is_none() {
            self.holes += 1;
        }
        self.items.insert(index, slot);
    }

    fn take(&mut self, index: usize) -> Option<U> {
        let slot = self.items.remove(index);
        if slot.is_none() {
            self.holes -= 1;
        }
        slot
    }

    fn apply(&mut self, change: &ListChange<T>, out: &mut ListChangeSet<U>, errors: &mut Vec<Error>) -> Result<()> {
        match change {
            ListChange::Add { item, index } => {
                check_insert_index(*index, self.items.len())?;
                let slot = project(&self.projection, item, errors);
                if let Some(value) = &slot {
                    out.push(ListChange::Add {
                        item: value.clone(),
                        index: self.downstream_index(*index),
                    });
                }
                self.insert(*index, slot);
            }
            ListChange::AddRange { items, index } => {
                check_insert_index(*index, self.items.len())?;
                let at = self.downstream_index(*index);
                let mut added = Vec::with_capacity(items.len());
                for (offset, item) in items.iter().enumerate() {
                    let slot = project(&self.projection, item, errors);
                    if let Some(value) = &slot {
                        added.push(value.clone());
                    }
                    self.insert(*index + offset, slot);
                }
                if !added.is_empty() {
                    out.push(ListChange::AddRange { items: added, index: at });
                }
            }
            ListChange::Replace { current, index, .. } => {
                check_index(*index, self.items.len())?;
                let Some(value) = project(&self.projection, current, errors) else {
                    return Ok(());
                };
                let at = self.downstream_index(*index);
                match self.items[*index].replace(value.clone()) {
                    Some(previous) => out.push(ListChange::Replace {
                        current: value,
                        previous,
                        index: at,
                    }),
                    None => {
                        self.holes -= 1;
                        out.push(ListChange::Add { item: value, index: at });
                    }
                }
            }
            ListChange::Remove { index, .. } => {
                check_index(*index, self.items.len())?;
                let at = self.downstream_index(*index);
                if let Some(item) = self.take(*index) {
                    out.push(ListChange::Remove { item, index: at });
                }
            }
            ListChange::RemoveRange { items, index } => {
                check_range(*index, items.len(), self.items.len())?;
                let at = self.downstream_index(*index);
                let removed: Vec<U> = (0..items.len()).filter_map(|_| self.take(*index)).collect();
                if !removed.is_empty() {
                    out.push(ListChange::RemoveRange { items: removed, index: at });
                }
            }
            ListChange::Moved {
                current_index,
                previous_index,
                ..
            } => {
                check_index(*previous_index, self.items.len())?;
                check_index(*current_index, self.items.len())?;
                let from = self.downstream_index(*previous_index);
                let slot = self.items.remove(*previous_index);
                self.items.insert(*current_index, slot);
                if let Some(item) = &self.items[*current_index] {
                    let item = item.clone();
                    let to = self.downstream_index(*current_index);
                    if from != to {
                        out.push(ListChange::Moved {
                            item,
                            current_index: to,
                            previous_index: from,
                        });
                    }
                }
            }
            ListChange::Refresh { index, .. } => {
                check_index(*index, self.items.len())?;
                if let Some(item) = &self.items[*index] {
                    out.push(ListChange::Refresh {
                        item: item.clone(),
                        index: self.downstream_index(*index),
                    });
                }
            }
            ListChange::Clear { .. } => {
                let items: Vec<U> = self.items.drain(..).flatten().collect();
                self.holes = 0;
                if !items.is_empty() {
                    out.push(ListChange::Clear { items });
                }
            }
        }
        Ok(())
    }
}

/// Transform state for keyed streams.
pub struct CacheTransformer<K, V, U> {
    projection: Projection<V, U>,
    transformed: HashMap<K, U>,
}

impl<K, V, U> CacheTransformer<K, V, U>
where
    K: Eq + Hash + Clone,
    U: Clone,
{
    pub fn new(projection: Projection<V, U>) -> Self {
        Self {
            projection,
            transformed: HashMap::new(),
        }
    }

    pub fn process(&mut self, changes: &ChangeSet<K, V>, errors: &mut Vec<Error>) -> ChangeSet<K, U> {
        let mut out = ChangeSet::with_capacity(changes.len());
        for change in changes {
            let key = change.key();
            match change.reason() {
                ChangeReason::Add | ChangeReason::Update => {
                    let Some(value) = project(&self.projection, change.current(), errors) else {
                        continue;
                    };
                    match self.transformed.insert(key.clone(), value.clone()) {
                        Some(previous) => out.push(Change::update(key.clone(), value, previous)),
                        None => out.push(Change::add(key.clone(), value)),
                    }
                }
                ChangeReason::Remove => {
                    if let Some(value) = self.transformed.remove(key) {
                        out.push(Change::remove(key.clone(), value));
                    }
                }
                ChangeReason::Refresh => {
                    if let Some(value) = self.transformed.get(key) {
                        out.push(Change::refresh(key.clone(), value.clone()));
                    }
                }
            }
        }
        out
    }
}

/// Drops keys, turning a keyed stream into an unordered list stream.
///
/// Items appear in the order their keys were first added.
pub struct KeyRemover<K> {
    keys: Vec<K>,
}

impl<K: Eq + Hash + Clone> Default for KeyRemover<K> {
    fn default() -> Self {
        Self { keys: Vec::new() }
    }
}

impl<K: Eq + Hash + Clone> KeyRemover<K> {
    pub fn process<V: Clone>(&mut self, changes: &ChangeSet<K, V>) -> ListChangeSet<V> {
        let mut out = ListChangeSet::with_capacity(changes.len());
        for change in changes {
            let position = self.keys.iter().position(|k| k == change.key());
            match (change.reason(), position) {
                (ChangeReason::Add | ChangeReason::Update, None) => {
                    self.keys.push(change.key().clone());
                    out.push(ListChange::Add {
                        item: change.current().clone(),
                        index: self.keys.len() - 1,
                    });
                }
                (ChangeReason::Add | ChangeReason::Update, Some(index)) => {
                    if let Some(previous) = change.previous() {
                        out.push(ListChange::Replace {
                            current: change.current().clone(),
                            previous: previous.clone(),
                            index,
                        });
                    }
                }
                (ChangeReason::Remove, Some(index)) => {
                    self.keys.remove(index);
                    out.push(ListChange::Remove {
                        item: change.current().clone(),
                        index,
                    });
                }
                (ChangeReason::Refresh, Some(index)) => out.push(ListChange::Refresh {
                    item: change.current().clone(),
                    index,
                }),
                (ChangeReason::Remove | ChangeReason::Refresh, None) => {}
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doubled() -> ListTransformer<i32, i32> {
        ListTransformer::new(infallible(|v: &i32| v * 2))
    }

    fn non_negative() -> Projection<i32, u32> {
        fallible(|v: &i32| u32::try_from(*v).map_err(|_| format!("{v} is negative")))
    }

    #[test]
    fn test_list_transform_preserves_reasons() {
        let mut transformer = doubled();
        let mut errors = Vec::new();
        transformer.process(&ListChangeSet::initial(vec![1, 2, 3]), &mut errors);

        let changes: ListChangeSet<i32> = vec![
            ListChange::Replace {
                current: 5,
                previous: 2,
                index: 1,
            },
            ListChange::Moved {
                item: 3,
                current_index: 0,
                previous_index: 2,
            },
            ListChange::Remove { item: 1, index: 1 },
        ]
        .into();
        let out = transformer.process(&changes, &mut errors);
        assert_eq!(
            out.as_slice(),
            &[
                ListChange::Replace {
                    current: 10,
                    previous: 4,
                    index: 1
                },
                ListChange::Moved {
                    item: 6,
                    current_index: 0,
                    previous_index: 2
                },
                ListChange::Remove { item: 2, index: 1 },
            ]
        );
        assert!(errors.is_empty());
    }

    #[test]
    fn test_list_try_transform_skips_failures() {
        let mut transformer = ListTransformer::new(non_negative());
        let mut errors = Vec::new();
        let out = transformer.process(&ListChangeSet::initial(vec![1, -2, 3]), &mut errors);
        assert_eq!(out.as_slice(), &[ListChange::AddRange { items: vec![1, 3], index: 0 }]);
        assert_eq!(errors, vec![Error::TransformFailure("-2 is negative".into())]);

        // The failed slot still occupies upstream index 1.
        let mut errors = Vec::new();
        let remove: ListChangeSet<i32> = vec![ListChange::Remove { item: 3, index: 2 }].into();
        let out = transformer.process(&remove, &mut errors);
        assert_eq!(out.as_slice(), &[ListChange::Remove { item: 3, index: 1 }]);

        // Replacing the failed item fills the hole.
        let replace: ListChangeSet<i32> = vec![ListChange::Replace {
            current: 2,
            previous: -2,
            index: 1,
        }]
        .into();
        let out = transformer.process(&replace, &mut errors);
        assert_eq!(out.as_slice(), &[ListChange::Add { item: 2, index: 1 }]);
        assert!(errors.is_empty());
    }

    #[test]
    fn test_cache_transform_projects_previous_from_memory() {
        let mut transformer = CacheTransformer::new(infallible(|v: &i32| v.to_string()));
        let mut errors = Vec::new();
        transformer.process(&ChangeSet::initial(vec![(1, 10)]), &mut errors);

        let out = transformer.process(
            &vec![Change::update(1, 11, 10), Change::refresh(1, 11), Change::remove(1, 11)].into(),
            &mut errors,
        );
        assert_eq!(
            out.as_slice(),
            &[
                Change::update(1, "11".to_string(), "10".to_string()),
                Change::refresh(1, "11".to_string()),
                Change::remove(1, "11".to_string()),
            ]
        );
    }

    #[test]
    fn test_cache_try_transform_keeps_old_value_on_failure() {
        let mut transformer = CacheTransformer::new(non_negative());
        let mut errors = Vec::new();
        transformer.process(&ChangeSet::initial(vec![("a", 1)]), &mut errors);
        let out = transformer.process(&vec![Change::update("a", -1, 1)].into(), &mut errors);
        assert!(out.is_empty());
        assert_eq!(errors.len(), 1);

        let out = transformer.process(&vec![Change::remove("a", -1)].into(), &mut errors);
        assert_eq!(out.as_slice(), &[Change::remove("a", 1)]);
    }

    #[test]
    fn test_remove_key_tracks_positions() {
        let mut remover = KeyRemover::default();
        remover.process(&ChangeSet::initial(vec![(1, "a"), (2, "b"), (3, "c")]));
        let out = remover.process(&vec![Change::remove(1, "a"), Change::update(3, "cc", "c")].into());
        assert_eq!(
            out.as_slice(),
            &[
                ListChange::Remove { item: "a", index: 0 },
                ListChange::Replace {
                    current: "cc",
                    previous: "c",
                    index: 1
                },
            ]
        );
    }
}
