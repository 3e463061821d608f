//! Incremental aggregates.
//!
//! Each aggregate folds the deltas of one change set into running state and
//! emits its new value only when it differs from the last one emitted. The
//! first change set always produces a value.

use crate::delta::{AggregateSource, Delta};
use core::cell::RefCell;
use core::cmp::Ordering;
use ripple_reactive::{Observable, Observer, Relay};
use std::collections::BTreeMap;
use std::rc::Rc;

/// Running item count.
#[derive(Clone, Debug, Default)]
pub struct IncrementalCount {
    count: i64,
}

impl IncrementalCount {
    pub fn new() -> Self {
        Self { count: 0 }
    }

    pub fn apply<T>(&mut self, deltas: &[Delta<T>]) {
        for d in deltas {
            self.count += d.diff as i64;
        }
    }

    #[inline]
    pub fn get(&self) -> usize {
        self.count.max(0) as usize
    }
}

/// Running sum.
#[derive(Clone, Debug, Default)]
pub struct IncrementalSum {
    sum: f64,
}

impl IncrementalSum {
    pub fn new() -> Self {
        Self { sum: 0.0 }
    }

    pub fn apply(&mut self, deltas: &[Delta<f64>]) {
        for d in deltas {
            self.sum += d.data * d.diff as f64;
        }
    }

    #[inline]
    pub fn get(&self) -> f64 {
        self.sum
    }
}

/// Running mean from sum and count.
#[derive(Clone, Debug, Default)]
pub struct IncrementalAvg {
    sum: f64,
    count: i64,
}

impl IncrementalAvg {
    pub fn new() -> Self {
        Self { sum: 0.0, count: 0 }
    }

    pub fn apply(&mut self, deltas: &[Delta<f64>]) {
        for d in deltas {
            self.sum += d.data * d.diff as f64;
            self.count += d.diff as i64;
        }
    }

    /// `None` while empty.
    pub fn get(&self) -> Option<f64> {
        if self.count <= 0 {
            None
        } else {
            Some(self.sum / self.count as f64)
        }
    }

    #[inline]
    pub fn count(&self) -> i64 {
        self.count
    }
}

/// Population standard deviation, maintained with Welford's update and its
/// inverse for removals.
#[derive(Clone, Debug, Default)]
pub struct IncrementalStdDev {
    count: i64,
    mean: f64,
    m2: f64,
}

impl IncrementalStdDev {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn apply(&mut self, deltas: &[Delta<f64>]) {
        for d in deltas {
            let step = if d.is_insert() { 1 } else { -1 };
            for _ in 0..d.diff.unsigned_abs() {
                if step > 0 {
                    self.push(d.data);
                } else {
                    self.pop(d.data);
                }
            }
        }
    }

    fn push(&mut self, x: f64) {
        self.count += 1;
        let delta = x - self.mean;
        self.mean += delta / self.count as f64;
        self.m2 += delta * (x - self.mean);
    }

    fn pop(&mut self, x: f64) {
        if self.count <= 1 {
            *self = Self::default();
            return;
        }
        let previous_mean = self.mean;
        self.count -= 1;
        self.mean = (previous_mean * (self.count + 1) as f64 - x) / self.count as f64;
        self.m2 = (self.m2 - (x - previous_mean) * (x - self.mean)).max(0.0);
    }

    /// `None` while empty.
    pub fn get(&self) -> Option<f64> {
        if self.count <= 0 {
            None
        } else {
            Some((self.m2 / self.count as f64).sqrt())
        }
    }
}

/// Minimum or maximum over a counted multiset of values.
///
/// Duplicates are counted, so removing one copy of the extreme keeps it
/// while others remain. Every delta costs `O(log n)`.
#[derive(Clone, Debug)]
pub struct IncrementalExtreme<R> {
    counts: BTreeMap<R, usize>,
    wins: Ordering,
}

impl<R: Ord + Clone> IncrementalExtreme<R> {
    pub fn min() -> Self {
        Self::new(Ordering::Less)
    }

    pub fn max() -> Self {
        Self::new(Ordering::Greater)
    }

    fn new(wins: Ordering) -> Self {
        Self {
            counts: BTreeMap::new(),
            wins,
        }
    }

    pub fn apply(&mut self, deltas: &[Delta<R>]) {
        for d in deltas {
            let copies = d.diff.unsigned_abs() as usize;
            if d.is_insert() {
                *self.counts.entry(d.data.clone()).or_insert(0) += copies;
            } else if d.is_delete() {
                // Removing a value that was never added is ignored.
                if let Some(count) = self.counts.get_mut(&d.data) {
                    *count = count.saturating_sub(copies);
                    if *count == 0 {
                        self.counts.remove(&d.data);
                    }
                }
            }
        }
    }

    /// Number of values held, duplicates included.
    pub fn len(&self) -> usize {
        self.counts.values().sum()
    }

    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }

    pub fn get(&self) -> Option<R> {
        let entry = if self.wins == Ordering::Less {
            self.counts.first_key_value()
        } else {
            self.counts.last_key_value()
        };
        entry.map(|(value, _)| value.clone())
    }
}

/// Runs `step` for every change set and emits its result when it changed.
fn aggregate<C, A, S, N, P>(source: &Observable<C>, init: N, step: P) -> Observable<A>
where
    C: 'static,
    A: PartialEq + Clone + 'static,
    S: 'static,
    N: Fn() -> S + 'static,
    P: Fn(&mut S, &C) -> A + 'static,
{
    let source = source.clone();
    let step = Rc::new(step);
    Observable::create(move |observer| {
        let state = RefCell::new((init(), None::<A>));
        let step = Rc::clone(&step);
        source.subscribe_observer(
            Relay::new(observer, move |changes: &C, downstream: &dyn Observer<A>| {
                let changed = {
                    let mut state = state.borrow_mut();
                    let (running, last) = &mut *state;
                    let value = step(running, changes);
                    if last.as_ref() == Some(&value) {
                        None
                    } else {
                        *last = Some(value.clone());
                        Some(value)
                    }
                };
                if let Some(value) = changed {
                    downstream.on_next(&value);
                }
            })
            .shared(),
        )
    })
}

fn numeric<C: AggregateSource>(changes: &C, selector: &dyn Fn(&C::Item) -> f64) -> Vec<Delta<f64>> {
    changes
        .deltas()
        .into_iter()
        .map(|d| d.map(|item| selector(item)))
        .collect()
}

pub(crate) fn count<C>(source: &Observable<C>) -> Observable<usize>
where
    C: AggregateSource + 'static,
{
    aggregate(source, IncrementalCount::new, |count, changes: &C| {
        count.apply(&changes.deltas());
        count.get()
    })
}

pub(crate) fn sum<C>(source: &Observable<C>, selector: Rc<dyn Fn(&C::Item) -> f64>) -> Observable<f64>
where
    C: AggregateSource + 'static,
{
    aggregate(source, IncrementalSum::new, move |sum, changes: &C| {
        sum.apply(&numeric(changes, selector.as_ref()));
        sum.get()
    })
}

pub(crate) fn avg<C>(source: &Observable<C>, selector: Rc<dyn Fn(&C::Item) -> f64>) -> Observable<Option<f64>>
where
    C: AggregateSource + 'static,
{
    aggregate(source, IncrementalAvg::new, move |avg, changes: &C| {
        avg.apply(&numeric(changes, selector.as_ref()));
        avg.get()
    })
}

pub(crate) fn std_dev<C>(source: &Observable<C>, selector: Rc<dyn Fn(&C::Item) -> f64>) -> Observable<Option<f64>>
where
    C: AggregateSource + 'static,
{
    aggregate(source, IncrementalStdDev::new, move |std_dev, changes: &C| {
        std_dev.apply(&numeric(changes, selector.as_ref()));
        std_dev.get()
    })
}

pub(crate) fn extreme<C, R>(
    source: &Observable<C>,
    selector: Rc<dyn Fn(&C::Item) -> R>,
    init: fn() -> IncrementalExtreme<R>,
) -> Observable<Option<R>>
where
    C: AggregateSource + 'static,
    R: Ord + Clone + 'static,
{
    aggregate(source, init, move |extreme, changes: &C| {
        let deltas: Vec<Delta<R>> = changes.deltas().into_iter().map(|d| d.map(|item| selector(item))).collect();
        extreme.apply(&deltas);
        extreme.get()
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use ripple_core::{Change, ChangeSet, ListChange, ListChangeSet};
    use ripple_reactive::Subject;

    #[test]
    fn test_incremental_count() {
        let mut count = IncrementalCount::new();
        count.apply(&[Delta::insert(1), Delta::insert(2)]);
        assert_eq!(count.get(), 2);

        count.apply(&[Delta::delete(1)]);
        assert_eq!(count.get(), 1);
    }

    #[test]
    fn test_incremental_avg() {
        let mut avg = IncrementalAvg::new();
        assert_eq!(avg.get(), None);

        avg.apply(&[Delta::insert(10.0), Delta::insert(20.0), Delta::insert(30.0)]);
        assert_eq!(avg.get(), Some(20.0));

        avg.apply(&[Delta::delete(30.0)]);
        assert_eq!(avg.get(), Some(15.0));
        assert_eq!(avg.count(), 2);
    }

    #[test]
    fn test_incremental_std_dev_population() {
        let mut std_dev = IncrementalStdDev::new();
        let values = [2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0];
        let deltas: Vec<Delta<f64>> = values.iter().copied().map(Delta::insert).collect();
        std_dev.apply(&deltas);
        assert!((std_dev.get().unwrap() - 2.0).abs() < 1e-9);

        // Back to {4, 5}: population deviation 0.5
        std_dev.apply(&[
            Delta::delete(2.0),
            Delta::delete(4.0),
            Delta::delete(4.0),
            Delta::delete(5.0),
            Delta::delete(7.0),
            Delta::delete(9.0),
        ]);
        assert!((std_dev.get().unwrap() - 0.5).abs() < 1e-9);

        std_dev.apply(&[Delta::delete(4.0), Delta::delete(5.0)]);
        assert_eq!(std_dev.get(), None);
    }

    #[test]
    fn test_incremental_min_falls_back_on_removal() {
        let mut min = IncrementalExtreme::min();
        min.apply(&[Delta::insert(30), Delta::insert(10), Delta::insert(20)]);
        assert_eq!(min.get(), Some(10));

        min.apply(&[Delta::delete(30)]);
        assert_eq!(min.get(), Some(10));

        min.apply(&[Delta::delete(10)]);
        assert_eq!(min.get(), Some(20));
        assert_eq!(min.len(), 1);
    }

    #[test]
    fn test_incremental_max_same_batch_remove_and_add() {
        let mut max = IncrementalExtreme::max();
        max.apply(&[Delta::insert(10), Delta::insert(30)]);
        max.apply(&[Delta::delete(30), Delta::insert(25)]);
        assert_eq!(max.get(), Some(25));

        max.apply(&[Delta::delete(25), Delta::delete(10)]);
        assert_eq!(max.get(), None);
    }

    #[test]
    fn test_incremental_extreme_counts_duplicates() {
        let mut min = IncrementalExtreme::min();
        min.apply(&[Delta::insert(5), Delta::insert(5), Delta::insert(9)]);
        min.apply(&[Delta::delete(5)]);
        assert_eq!(min.get(), Some(5));
        min.apply(&[Delta::delete(5)]);
        assert_eq!(min.get(), Some(9));

        min.apply(&[Delta::delete(42), Delta::new(3, 2)]);
        assert_eq!(min.len(), 3);
        min.apply(&[Delta::new(3, -2), Delta::delete(9)]);
        assert_eq!(min.get(), None);
        assert!(min.is_empty());
    }

    #[test]
    fn test_incremental_max_over_many_values() {
        let mut max = IncrementalExtreme::max();
        let inserts: Vec<Delta<i32>> = (0..10_000).map(Delta::insert).collect();
        max.apply(&inserts);
        for top in (5_000..10_000).rev() {
            assert_eq!(max.get(), Some(top));
            max.apply(&[Delta::delete(top)]);
        }
        assert_eq!(max.get(), Some(4_999));
        assert_eq!(max.len(), 5_000);
    }

    #[test]
    fn test_sum_emits_only_on_change() {
        let subject: Subject<ChangeSet<u32, f64>> = Subject::new();
        let seen = Rc::new(RefCell::new(Vec::new()));
        let s = seen.clone();
        let _sub = sum(&subject.as_observable(), Rc::new(|v: &f64| *v)).subscribe(move |v: &f64| s.borrow_mut().push(*v));

        subject.next(&ChangeSet::initial(vec![(1, 1.5), (2, 2.5)]));
        subject.next(&vec![Change::refresh(1, 1.5)].into());
        subject.next(&vec![Change::update(2, 4.5, 2.5)].into());

        assert_eq!(*seen.borrow(), vec![4.0, 6.0]);
    }

    #[test]
    fn test_count_first_set_always_emits() {
        let subject: Subject<ListChangeSet<i32>> = Subject::new();
        let seen = Rc::new(RefCell::new(Vec::new()));
        let s = seen.clone();
        let _sub = count(&subject.as_observable()).subscribe(move |v: &usize| s.borrow_mut().push(*v));

        subject.next(&vec![ListChange::Refresh { item: 1, index: 0 }].into());
        subject.next(&ListChangeSet::initial(vec![1, 2]));
        subject.next(&vec![ListChange::Moved {
            item: 1,
            current_index: 1,
            previous_index: 0,
        }]
        .into());

        assert_eq!(*seen.borrow(), vec![0, 2]);
    }

    #[test]
    fn test_extreme_over_list_stream() {
        let subject: Subject<ListChangeSet<(u32, i64)>> = Subject::new();
        let seen = Rc::new(RefCell::new(Vec::new()));
        let s = seen.clone();
        let _sub = extreme(&subject.as_observable(), Rc::new(|v: &(u32, i64)| v.1), IncrementalExtreme::max)
            .subscribe(move |v: &Option<i64>| s.borrow_mut().push(*v));

        subject.next(&ListChangeSet::initial(vec![(1, 5), (2, 9)]));
        subject.next(&vec![ListChange::Remove { item: (2, 9), index: 1 }].into());
        subject.next(&vec![ListChange::Clear { items: vec![(1, 5)] }].into());

        assert_eq!(*seen.borrow(), vec![Some(9), Some(5), None]);
    }
}
