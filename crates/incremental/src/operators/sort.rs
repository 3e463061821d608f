//! Incremental sort.
//!
//! The sorted state orders entries by the comparator first and by arrival
//! sequence second, so equal items keep their insertion order. Each upstream
//! item is tagged with its sequence number on arrival; that tag is how an
//! item is found again on removal, whatever its value looks like by then.

use crate::stream::Comparator;
use core::cmp::Ordering;
use core::hash::Hash;
use hashbrown::HashMap;
use ripple_core::{check_index, check_insert_index, check_range, ChangeReason, ChangeSet, Error, ListChange, ListChangeSet, Result};
use tracing::trace;

/// Options of the sort operators.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SortOptions {
    /// Locate positions by binary search. Only valid when the comparator is
    /// consistent with the stored values.
    pub binary_search: bool,
    /// Upstream batches touching more items than this are answered with a
    /// single reset (`Clear` followed by `AddRange`).
    pub reset_threshold: usize,
}

impl Default for SortOptions {
    fn default() -> Self {
        Self {
            binary_search: false,
            reset_threshold: 100,
        }
    }
}

impl SortOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_binary_search(mut self, enabled: bool) -> Self {
        self.binary_search = enabled;
        self
    }

    pub fn with_reset_threshold(mut self, threshold: usize) -> Self {
        self.reset_threshold = threshold;
        self
    }
}

/// Entries in sorted order, tagged with their arrival sequence.
struct Sorted<T> {
    entries: Vec<(T, u64)>,
    comparator: Option<Comparator<T>>,
    binary_search: bool,
}

impl<T: Clone> Sorted<T> {
    fn new(comparator: Option<Comparator<T>>, binary_search: bool) -> Self {
        Self {
            entries: Vec::new(),
            comparator,
            binary_search,
        }
    }

    fn order(&self, entry: &(T, u64), item: &T, seq: u64) -> Ordering {
        match &self.comparator {
            Some(cmp) => cmp(&entry.0, item).then(entry.1.cmp(&seq)),
            None => entry.1.cmp(&seq),
        }
    }

    fn insertion_point(&self, item: &T, seq: u64) -> usize {
        if self.binary_search {
            self.entries
                .partition_point(|entry| self.order(entry, item, seq) == Ordering::Less)
        } else {
            self.entries
                .iter()
                .position(|entry| self.order(entry, item, seq) == Ordering::Greater)
                .unwrap_or(self.entries.len())
        }
    }

    /// Finds the entry of `seq`; `item` is its last known value.
    fn position(&self, item: &T, seq: u64) -> Result<usize> {
        if self.binary_search {
            if let Ok(index) = self
                .entries
                .binary_search_by(|entry| self.order(entry, item, seq))
            {
                return Ok(index);
            }
        }
        self.entries
            .iter()
            .position(|(_, s)| *s == seq)
            .ok_or_else(|| Error::argument("sorted entry is missing"))
    }

    fn insert(&mut self, item: T, seq: u64) -> usize {
        let index = self.insertion_point(&item, seq);
        self.entries.insert(index, (item, seq));
        index
    }

    fn remove(&mut self, item: &T, seq: u64) -> Result<(usize, T)> {
        let index = self.position(item, seq)?;
        Ok((index, self.entries.remove(index).0))
    }

    /// Swaps in a new value for `seq` and reports how the order changed.
    fn replace(&mut self, current: T, previous: &T, seq: u64, out: &mut ListChangeSet<T>) -> Result<()> {
        let (from, stored) = self.remove(previous, seq)?;
        let to = self.insert(current.clone(), seq);
        if from == to {
            out.push(ListChange::Replace {
                current,
                previous: stored,
                index: to,
            });
        } else {
            out.push(ListChange::Remove {
                item: stored,
                index: from,
            });
            out.push(ListChange::Add { item: current, index: to });
        }
        Ok(())
    }

    /// Re-evaluates the position of `seq` after its value changed in place.
    fn refresh(&mut self, item: T, seq: u64, out: &mut ListChangeSet<T>) -> Result<()> {
        let from = self
            .entries
            .iter()
            .position(|(_, s)| *s == seq)
            .ok_or_else(|| Error::argument("sorted entry is missing"))?;
        self.entries.remove(from);
        let to = self.insert(item.clone(), seq);
        if from == to {
            out.push(ListChange::Refresh { item, index: to });
        } else {
            out.push(ListChange::Moved {
                item,
                current_index: to,
                previous_index: from,
            });
        }
        Ok(())
    }

    fn items(&self) -> Vec<T> {
        self.entries.iter().map(|(item, _)| item.clone()).collect()
    }

    fn resort(&mut self, comparator: Comparator<T>) {
        self.entries
            .sort_by(|a, b| comparator(&a.0, &b.0).then(a.1.cmp(&b.1)));
        self.comparator = Some(comparator);
    }

    fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Whether this batch is answered with a reset instead of item changes.
fn wants_reset(was_empty: bool, touched: usize, threshold: usize) -> bool {
    was_empty || touched > threshold
}

fn reset<T: Clone>(previous: Vec<T>, current: Vec<T>) -> ListChangeSet<T> {
    let mut out = ListChangeSet::new();
    if !previous.is_empty() {
        out.push(ListChange::Clear { items: previous });
    }
    out.extend(ListChangeSet::initial(current));
    out
}

/// Sort state for list streams.
pub struct ListSorter<T> {
    sorted: Sorted<T>,
    upstream: Vec<u64>,
    next_seq: u64,
    reset_threshold: usize,
}

impl<T: Clone> ListSorter<T> {
    /// Creates a sorter. Without a comparator nothing is emitted until one
    /// is set.
    pub fn new(comparator: Option<Comparator<T>>, options: SortOptions) -> Self {
        Self {
            sorted: Sorted::new(comparator, options.binary_search),
            upstream: Vec::new(),
            next_seq: 0,
            reset_threshold: options.reset_threshold,
        }
    }

    fn next_seq(&mut self) -> u64 {
        self.next_seq += 1;
        self.next_seq
    }

    /// Current items in sorted order.
    pub fn items(&self) -> Vec<T> {
        self.sorted.items()
    }

    pub fn process(&mut self, changes: &ListChangeSet<T>, errors: &mut Vec<Error>) -> ListChangeSet<T> {
        let active = self.sorted.comparator.is_some();
        let was_empty = self.sorted.is_empty();
        if !active || wants_reset(was_empty, changes.total_changes(), self.reset_threshold) {
            let before = if active { self.sorted.items() } else { Vec::new() };
            let mut scratch = ListChangeSet::new();
            for change in changes {
                if let Err(err) = self.apply(change, &mut scratch) {
                    errors.push(err);
                }
            }
            if !active {
                return ListChangeSet::new();
            }
            if !was_empty {
                trace!(changes = changes.total_changes(), "sort reset");
            }
            return reset(before, self.sorted.items());
        }

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
                check_insert_index(*index, self.upstream.len())?;
                let seq = self.next_seq();
                self.upstream.insert(*index, seq);
                let at = self.sorted.insert(item.clone(), seq);
                out.push(ListChange::Add {
                    item: item.clone(),
                    index: at,
                });
            }
            ListChange::AddRange { items, index } => {
                check_insert_index(*index, self.upstream.len())?;
                for (offset, item) in items.iter().enumerate() {
                    let seq = self.next_seq();
                    self.upstream.insert(*index + offset, seq);
                    let at = self.sorted.insert(item.clone(), seq);
                    out.push(ListChange::Add {
                        item: item.clone(),
                        index: at,
                    });
                }
            }
            ListChange::Replace {
                current,
                previous,
                index,
            } => {
                check_index(*index, self.upstream.len())?;
                let seq = self.upstream[*index];
                self.sorted.replace(current.clone(), previous, seq, out)?;
            }
            ListChange::Remove { item, index } => {
                check_index(*index, self.upstream.len())?;
                let seq = self.upstream.remove(*index);
                let (at, stored) = self.sorted.remove(item, seq)?;
                out.push(ListChange::Remove { item: stored, index: at });
            }
            ListChange::RemoveRange { items, index } => {
                check_range(*index, items.len(), self.upstream.len())?;
                let seqs: Vec<u64> = self.upstream.drain(*index..*index + items.len()).collect();
                for (item, seq) in items.iter().zip(seqs) {
                    let (at, stored) = self.sorted.remove(item, seq)?;
                    out.push(ListChange::Remove { item: stored, index: at });
                }
            }
            ListChange::Moved {
                current_index,
                previous_index,
                ..
            } => {
                check_index(*previous_index, self.upstream.len())?;
                check_index(*current_index, self.upstream.len())?;
                let seq = self.upstream.remove(*previous_index);
                self.upstream.insert(*current_index, seq);
            }
            ListChange::Refresh { item, index } => {
                check_index(*index, self.upstream.len())?;
                let seq = self.upstream[*index];
                self.sorted.refresh(item.clone(), seq, out)?;
            }
            ListChange::Clear { .. } => {
                self.upstream.clear();
                let items = self.sorted.items();
                self.sorted.entries.clear();
                if !items.is_empty() {
                    out.push(ListChange::Clear { items });
                }
            }
        }
        Ok(())
    }

    /// Installs a new comparator and re-emits everything in the new order.
    pub fn set_comparator(&mut self, comparator: Comparator<T>) -> ListChangeSet<T> {
        let before = if self.sorted.comparator.is_some() {
            self.sorted.items()
        } else {
            Vec::new()
        };
        self.sorted.resort(comparator);
        reset(before, self.sorted.items())
    }
}

/// Sort state for keyed streams; the output is an ordered list.
pub struct CacheSorter<K, V> {
    sorted: Sorted<V>,
    seqs: HashMap<K, u64>,
    next_seq: u64,
    reset_threshold: usize,
}

impl<K, V> CacheSorter<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    pub fn new(comparator: Option<Comparator<V>>, options: SortOptions) -> Self {
        Self {
            sorted: Sorted::new(comparator, options.binary_search),
            seqs: HashMap::new(),
            next_seq: 0,
            reset_threshold: options.reset_threshold,
        }
    }

    pub fn items(&self) -> Vec<V> {
        self.sorted.items()
    }

    pub fn process(&mut self, changes: &ChangeSet<K, V>, errors: &mut Vec<Error>) -> ListChangeSet<V> {
        let active = self.sorted.comparator.is_some();
        let was_empty = self.sorted.is_empty();
        let resetting = !active || wants_reset(was_empty, changes.len(), self.reset_threshold);
        let before = if active && resetting {
            self.sorted.items()
        } else {
            Vec::new()
        };

        let mut out = ListChangeSet::new();
        for change in changes {
            let key = change.key();
            let outcome = match (change.reason(), self.seqs.get(key).copied()) {
                (ChangeReason::Add | ChangeReason::Update, None) => {
                    self.next_seq += 1;
                    let seq = self.next_seq;
                    self.seqs.insert(key.clone(), seq);
                    let at = self.sorted.insert(change.current().clone(), seq);
                    out.push(ListChange::Add {
                        item: change.current().clone(),
                        index: at,
                    });
                    Ok(())
                }
                (ChangeReason::Add | ChangeReason::Update, Some(seq)) => {
                    let previous = change.previous().unwrap_or(change.current());
                    self.sorted.replace(change.current().clone(), previous, seq, &mut out)
                }
                (ChangeReason::Remove, Some(seq)) => {
                    self.seqs.remove(key);
                    self.sorted.remove(change.current(), seq).map(|(at, stored)| {
                        out.push(ListChange::Remove { item: stored, index: at });
                    })
                }
                (ChangeReason::Refresh, Some(seq)) => self.sorted.refresh(change.current().clone(), seq, &mut out),
                (ChangeReason::Remove | ChangeReason::Refresh, None) => Ok(()),
            };
            if let Err(err) = outcome {
                errors.push(err);
            }
        }

        if !active {
            return ListChangeSet::new();
        }
        if resetting {
            return reset(before, self.sorted.items());
        }
        out
    }

    pub fn set_comparator(&mut self, comparator: Comparator<V>) -> ListChangeSet<V> {
        let before = if self.sorted.comparator.is_some() {
            self.sorted.items()
        } else {
            Vec::new()
        };
        self.sorted.resort(comparator);
        reset(before, self.sorted.items())
    }
}
