//! Incremental filter operators.
//!
//! Both filters keep a mirror of every upstream item together with its last
//! predicate verdict, so a change only ever produces the transition it
//! implies: not-passing to passing is an add, passing to not-passing is a
//! remove, passing to passing is passed through, and anything else is
//! suppressed. A new predicate re-evaluates the mirror and emits exactly the
//! membership flips.

use crate::stream::Predicate;
use core::hash::Hash;
use hashbrown::HashMap;
use ripple_core::{check_index, check_insert_index, check_range, Change, ChangeReason, ChangeSet, Error, ListChange, ListChangeSet, Result};

/// Filter state for list streams.
pub struct ListFilter<T> {
    predicate: Option<Predicate<T>>,
    entries: Vec<(T, bool)>,
}

impl<T: Clone> ListFilter<T> {
    /// Creates a filter. Without a predicate nothing passes.
    pub fn new(predicate: Option<Predicate<T>>) -> Self {
        Self {
            predicate,
            entries: Vec::new(),
        }
    }

    fn passes(&self, item: &T) -> bool {
        self.predicate.as_ref().is_some_and(|p| p(item))
    }

    /// Position downstream of the upstream slot `index`.
    fn downstream_index(&self, index: usize) -> usize {
        self.entries[..index].iter().filter(|(_, passed)| *passed).count()
    }

    /// Number of items currently passing.
    pub fn len(&self) -> usize {
        self.entries.iter().filter(|(_, passed)| *passed).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn process(&mut self, changes: &ListChangeSet<T>, errors: &mut Vec<Error>) -> ListChangeSet<T> {
        let mut out = ListChangeSet::new();
        for change in changes {
            if let Err(err) = self.apply(change, &mut out) {
                errors.push(err);
            }
        }
        out
    }

    fn apply(&mut self, change: &ListChange<T>, out: &mut ListChangeSet<T>) -> Result<()> {
        match change {
            ListChange::Add { item, index } => {
                check_insert_index(*index, self.entries.len())?;
                let passed = self.passes(item);
                if passed {
                    out.push(ListChange::Add {
                        item: item.clone(),
                        index: self.downstream_index(*index),
                    });
                }
                self.entries.insert(*index, (item.clone(), passed));
            }
            ListChange::AddRange { items, index } => {
                check_insert_index(*index, self.entries.len())?;
                let at = self.downstream_index(*index);
                let verdicts: Vec<(T, bool)> = items
                    .iter()
                    .map(|item| (item.clone(), self.passes(item)))
                    .collect();
                let passing: Vec<T> = verdicts
                    .iter()
                    .filter(|(_, passed)| *passed)
                    .map(|(item, _)| item.clone())
                    .collect();
                self.entries.splice(*index..*index, verdicts);
                push_added(out, passing, at);
            }
            ListChange::Replace {
                current,
                previous,
                index,
            } => {
                check_index(*index, self.entries.len())?;
                let at = self.downstream_index(*index);
                let was = self.entries[*index].1;
                let now = self.passes(current);
                match (was, now) {
                    (true, true) => out.push(ListChange::Replace {
                        current: current.clone(),
                        previous: previous.clone(),
                        index: at,
                    }),
                    (false, true) => out.push(ListChange::Add {
                        item: current.clone(),
                        index: at,
                    }),
                    (true, false) => out.push(ListChange::Remove {
                        item: previous.clone(),
                        index: at,
                    }),
                    (false, false) => {}
                }
                self.entries[*index] = (current.clone(), now);
            }
            ListChange::Remove { index, .. } => {
                check_index(*index, self.entries.len())?;
                let at = self.downstream_index(*index);
                let (item, passed) = self.entries.remove(*index);
                if passed {
                    out.push(ListChange::Remove { item, index: at });
                }
            }
            ListChange::RemoveRange { items, index } => {
                check_range(*index, items.len(), self.entries.len())?;
                let at = self.downstream_index(*index);
                let passing: Vec<T> = self
                    .entries
                    .drain(*index..*index + items.len())
                    .filter(|(_, passed)| *passed)
                    .map(|(item, _)| item)
                    .collect();
                match passing.len() {
                    0 => {}
                    1 => out.push(ListChange::Remove {
                        item: passing[0].clone(),
                        index: at,
                    }),
                    _ => out.push(ListChange::RemoveRange {
                        items: passing,
                        index: at,
                    }),
                }
            }
            ListChange::Moved {
                item,
                current_index,
                previous_index,
            } => {
                check_index(*previous_index, self.entries.len())?;
                check_index(*current_index, self.entries.len())?;
                let from = self.downstream_index(*previous_index);
                let (_, passed) = self.entries.remove(*previous_index);
                self.entries.insert(*current_index, (item.clone(), passed));
                if passed {
                    let to = self.downstream_index(*current_index);
                    if from != to {
                        out.push(ListChange::Moved {
                            item: item.clone(),
                            current_index: to,
                            previous_index: from,
                        });
                    }
                }
            }
            ListChange::Refresh { item, index } => {
                check_index(*index, self.entries.len())?;
                let at = self.downstream_index(*index);
                let was = self.entries[*index].1;
                let now = self.passes(item);
                match (was, now) {
                    (true, true) => out.push(ListChange::Refresh {
                        item: item.clone(),
                        index: at,
                    }),
                    (false, true) => out.push(ListChange::Add {
                        item: item.clone(),
                        index: at,
                    }),
                    (true, false) => out.push(ListChange::Remove {
                        item: self.entries[*index].0.clone(),
                        index: at,
                    }),
                    (false, false) => {}
                }
                self.entries[*index] = (item.clone(), now);
            }
            ListChange::Clear { .. } => {
                let passing: Vec<T> = self
                    .entries
                    .drain(..)
                    .filter(|(_, passed)| *passed)
                    .map(|(item, _)| item)
                    .collect();
                if !passing.is_empty() {
                    out.push(ListChange::Clear { items: passing });
                }
            }
        }
        Ok(())
    }

    /// Installs a new predicate and emits the membership flips it causes.
    ///
    /// The flips are replayed in upstream order, so every index is valid at
    /// the moment its change is applied.
    pub fn set_predicate(&mut self, predicate: Predicate<T>) -> ListChangeSet<T> {
        let mut out = ListChangeSet::new();
        let mut at = 0;
        for (item, passed) in self.entries.iter_mut() {
            let now = predicate(item);
            match (*passed, now) {
                (true, true) => at += 1,
                (true, false) => out.push(ListChange::Remove {
                    item: item.clone(),
                    index: at,
                }),
                (false, true) => {
                    out.push(ListChange::Add {
                        item: item.clone(),
                        index: at,
                    });
                    at += 1;
                }
                (false, false) => {}
            }
            *passed = now;
        }
        self.predicate = Some(predicate);
        out
    }
}

fn push_added<T: Clone>(out: &mut ListChangeSet<T>, mut items: Vec<T>, index: usize) {
    match items.len() {
        0 => {}
        1 => {
            if let Some(item) = items.pop() {
                out.push(ListChange::Add { item, index });
            }
        }
        _ => out.push(ListChange::AddRange { items, index }),
    }
}

/// Filter state for keyed streams.
pub struct CacheFilter<K, V> {
    predicate: Option<Predicate<V>>,
    entries: HashMap<K, (V, bool)>,
}

impl<K, V> CacheFilter<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    /// Creates a filter. Without a predicate nothing passes.
    pub fn new(predicate: Option<Predicate<V>>) -> Self {
        Self {
            predicate,
            entries: HashMap::new(),
        }
    }

    fn passes(&self, value: &V) -> bool {
        self.predicate.as_ref().is_some_and(|p| p(value))
    }

    /// Number of entries currently passing.
    pub fn len(&self) -> usize {
        self.entries.values().filter(|(_, passed)| *passed).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn process(&mut self, changes: &ChangeSet<K, V>) -> ChangeSet<K, V> {
        let mut out = ChangeSet::new();
        for change in changes {
            let key = change.key();
            match change.reason() {
                ChangeReason::Add | ChangeReason::Update | ChangeReason::Refresh => {
                    let now = self.passes(change.current());
                    let before = self
                        .entries
                        .insert(key.clone(), (change.current().clone(), now));
                    match (before, now) {
                        (Some((old, true)), true) => {
                            if change.reason() == ChangeReason::Refresh {
                                out.push(Change::refresh(key.clone(), change.current().clone()));
                            } else {
                                let previous = change.previous().cloned().unwrap_or(old);
                                out.push(Change::update(key.clone(), change.current().clone(), previous));
                            }
                        }
                        (Some((old, true)), false) => out.push(Change::remove(key.clone(), old)),
                        (None | Some((_, false)), true) => {
                            out.push(Change::add(key.clone(), change.current().clone()))
                        }
                        (None | Some((_, false)), false) => {}
                    }
                }
                ChangeReason::Remove => {
                    if let Some((old, true)) = self.entries.remove(key) {
                        out.push(Change::remove(key.clone(), old));
                    }
                }
            }
        }
        out
    }

    /// Installs a new predicate and emits the membership flips it causes.
    pub fn set_predicate(&mut self, predicate: Predicate<V>) -> ChangeSet<K, V> {
        let mut out = ChangeSet::new();
        for (key, (value, passed)) in self.entries.iter_mut() {
            let now = predicate(value);
            match (*passed, now) {
                (true, false) => out.push(Change::remove(key.clone(), value.clone())),
                (false, true) => out.push(Change::add(key.clone(), value.clone())),
                _ => {}
            }
            *passed = now;
        }
        self.predicate = Some(predicate);
        out
    }
}
