//! Distinct values with reference counting.
//!
//! A distinct value is emitted when its first occurrence arrives and
//! removed when its last occurrence leaves.

use core::hash::Hash;
use hashbrown::HashMap;
use ripple_core::{check_index, check_insert_index, check_range, Change, ChangeReason, ChangeSet, Error, ListChange, ListChangeSet, Result};
use std::rc::Rc;

/// Occurrence counts of distinct values.
struct Counts<D> {
    counts: HashMap<D, usize>,
}

impl<D: Eq + Hash + Clone> Counts<D> {
    fn new() -> Self {
        Self {
            counts: HashMap::new(),
        }
    }

    /// Returns true if this is the first occurrence.
    fn increment(&mut self, value: &D) -> bool {
        let count = self.counts.entry(value.clone()).or_insert(0);
        *count += 1;
        *count == 1
    }

    /// Returns true if this was the last occurrence.
    fn decrement(&mut self, value: &D) -> bool {
        match self.counts.get_mut(value) {
            Some(count) if *count > 1 => {
                *count -= 1;
                false
            }
            Some(_) => {
                self.counts.remove(value);
                true
            }
            None => false,
        }
    }
}

/// Distinct state for keyed streams; the output is keyed by the value.
pub struct CacheDistinct<K, V, D> {
    selector: Rc<dyn Fn(&V) -> D>,
    values: HashMap<K, D>,
    counts: Counts<D>,
}

impl<K, V, D> CacheDistinct<K, V, D>
where
    K: Eq + Hash + Clone,
    D: Eq + Hash + Clone,
{
    pub fn new(selector: Rc<dyn Fn(&V) -> D>) -> Self {
        Self {
            selector,
            values: HashMap::new(),
            counts: Counts::new(),
        }
    }

    fn leave(&mut self, value: D, out: &mut ChangeSet<D, D>) {
        if self.counts.decrement(&value) {
            out.push(Change::remove(value.clone(), value));
        }
    }

    fn enter(&mut self, value: D, out: &mut ChangeSet<D, D>) {
        if self.counts.increment(&value) {
            out.push(Change::add(value.clone(), value));
        }
    }

    pub fn process(&mut self, changes: &ChangeSet<K, V>) -> ChangeSet<D, D> {
        let mut out = ChangeSet::new();
        for change in changes {
            let key = change.key();
            match change.reason() {
                ChangeReason::Add | ChangeReason::Update | ChangeReason::Refresh => {
                    let value = (self.selector)(change.current());
                    match self.values.insert(key.clone(), value.clone()) {
                        Some(previous) if previous == value => {}
                        Some(previous) => {
                            self.leave(previous, &mut out);
                            self.enter(value, &mut out);
                        }
                        None => self.enter(value, &mut out),
                    }
                }
                ChangeReason::Remove => {
                    if let Some(previous) = self.values.remove(key) {
                        self.leave(previous, &mut out);
                    }
                }
            }
        }
        out
    }
}

/// Distinct state for list streams.
///
/// Distinct values appear in the order of their first occurrence.
pub struct ListDistinct<T, D> {
    selector: Rc<dyn Fn(&T) -> D>,
    upstream: Vec<D>,
    counts: Counts<D>,
    distinct: Vec<D>,
}

impl<T, D> ListDistinct<T, D>
where
    D: Eq + Hash + Clone,
{
    pub fn new(selector: Rc<dyn Fn(&T) -> D>) -> Self {
        Self {
            selector,
            upstream: Vec::new(),
            counts: Counts::new(),
            distinct: Vec::new(),
        }
    }

    fn enter(&mut self, value: D, out: &mut ListChangeSet<D>) {
        if self.counts.increment(&value) {
            self.distinct.push(value.clone());
            out.push(ListChange::Add {
                item: value,
                index: self.distinct.len() - 1,
            });
        }
    }

    fn leave(&mut self, value: D, out: &mut ListChangeSet<D>) {
        if self.counts.decrement(&value) {
            if let Some(index) = self.distinct.iter().position(|d| *d == value) {
                self.distinct.remove(index);
                out.push(ListChange::Remove { item: value, index });
            }
        }
    }

    pub fn process(&mut self, changes: &ListChangeSet<T>, errors: &mut Vec<Error>) -> ListChangeSet<D> {
        let mut out = ListChangeSet::new();
        for change in changes {
            if let Err(err) = self.apply(change, &mut out) {
                errors.push(err);
            }
        }
        out
    }

    fn apply(&mut self, change: &ListChange<T>, out: &mut ListChangeSet<D>) -> Result<()> {
        match change {
            ListChange::Add { item, index } => {
                check_insert_index(*index, self.upstream.len())?;
                let value = (self.selector)(item);
                self.upstream.insert(*index, value.clone());
                self.enter(value, out);
            }
            ListChange::AddRange { items, index } => {
                check_insert_index(*index, self.upstream.len())?;
                for (offset, item) in items.iter().enumerate() {
                    let value = (self.selector)(item);
                    self.upstream.insert(*index + offset, value.clone());
                    self.enter(value, out);
                }
            }
            ListChange::Replace { current, index, .. } | ListChange::Refresh { item: current, index } => {
                check_index(*index, self.upstream.len())?;
                let value = (self.selector)(current);
                let previous = core::mem::replace(&mut self.upstream[*index], value.clone());
                if previous != value {
                    self.leave(previous, out);
                    self.enter(value, out);
                }
            }
            ListChange::Remove { index, .. } => {
                check_index(*index, self.upstream.len())?;
                let previous = self.upstream.remove(*index);
                self.leave(previous, out);
            }
            ListChange::RemoveRange { items, index } => {
                check_range(*index, items.len(), self.upstream.len())?;
                let removed: Vec<D> = self.upstream.drain(*index..*index + items.len()).collect();
                for previous in removed {
                    self.leave(previous, out);
                }
            }
            ListChange::Moved {
                current_index,
                previous_index,
                ..
            } => {
                check_index(*previous_index, self.upstream.len())?;
                check_index(*current_index, self.upstream.len())?;
                let value = self.upstream.remove(*previous_index);
                self.upstream.insert(*current_index, value);
            }
            ListChange::Clear { .. } => {
                self.upstream.clear();
                self.counts = Counts::new();
                let items = core::mem::take(&mut self.distinct);
                if !items.is_empty() {
                    out.push(ListChange::Clear { items });
                }
            }
        }
        Ok(())
    }
}
