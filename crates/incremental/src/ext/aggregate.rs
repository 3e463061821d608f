//! Running aggregates over list or keyed streams.

use crate::delta::AggregateSource;
use crate::operators::{avg, count, extreme, std_dev, sum, IncrementalExtreme};
use ripple_reactive::Observable;
use std::rc::Rc;

/// Aggregates available on any change-set stream.
///
/// Every aggregate emits its first value with the first change set and
/// afterwards only when the value changes.
pub trait ObservableAggregateExt<C: AggregateSource + 'static> {
    /// Number of items.
    fn count(&self) -> Observable<usize>;

    fn sum<F>(&self, selector: F) -> Observable<f64>
    where
        F: Fn(&C::Item) -> f64 + 'static;

    /// Mean of the selected values; `None` while empty.
    fn avg<F>(&self, selector: F) -> Observable<Option<f64>>
    where
        F: Fn(&C::Item) -> f64 + 'static;

    /// Population standard deviation; `None` while empty.
    fn std_dev<F>(&self, selector: F) -> Observable<Option<f64>>
    where
        F: Fn(&C::Item) -> f64 + 'static;

    fn min<R, F>(&self, selector: F) -> Observable<Option<R>>
    where
        R: Ord + Clone + 'static,
        F: Fn(&C::Item) -> R + 'static;

    fn max<R, F>(&self, selector: F) -> Observable<Option<R>>
    where
        R: Ord + Clone + 'static,
        F: Fn(&C::Item) -> R + 'static;
}

impl<C: AggregateSource + 'static> ObservableAggregateExt<C> for Observable<C> {
    fn count(&self) -> Observable<usize> {
        count(self)
    }

    fn sum<F>(&self, selector: F) -> Observable<f64>
    where
        F: Fn(&C::Item) -> f64 + 'static,
    {
        sum(self, Rc::new(selector))
    }

    fn avg<F>(&self, selector: F) -> Observable<Option<f64>>
    where
        F: Fn(&C::Item) -> f64 + 'static,
    {
        avg(self, Rc::new(selector))
    }

    fn std_dev<F>(&self, selector: F) -> Observable<Option<f64>>
    where
        F: Fn(&C::Item) -> f64 + 'static,
    {
        std_dev(self, Rc::new(selector))
    }

    fn min<R, F>(&self, selector: F) -> Observable<Option<R>>
    where
        R: Ord + Clone + 'static,
        F: Fn(&C::Item) -> R + 'static,
    {
        extreme(self, Rc::new(selector), IncrementalExtreme::min)
    }

    fn max<R, F>(&self, selector: F) -> Observable<Option<R>>
    where
        R: Ord + Clone + 'static,
        F: Fn(&C::Item) -> R + 'static,
    {
        extreme(self, Rc::new(selector), IncrementalExtreme::max)
    }
}
