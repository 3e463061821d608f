//! Operators over keyed change-set streams.

use crate::operators::{
    cache_snapshots, combine_streams, dispose_many_cache, fallible, group_cache, infallible, merge_many_cache,
    subscribe_many_cache, transform_async, watch_key, CacheDistinct, CacheFilter, CacheSorter, CacheTransformer,
    CancellationToken, CombineOperator, CombineRule, Disposable, Group, KeyRemover, SortOptions,
    TransformAsyncOptions,
};
use crate::stream::{lift, lift_with, Comparator, Predicate};
use core::cmp::Ordering;
use core::fmt::Display;
use core::future::Future;
use core::hash::Hash;
use futures::task::LocalSpawn;
use ripple_core::{Change, ChangeSet, Error, ListChangeSet};
use ripple_reactive::{Observable, ObservableCache, Subscription};
use std::rc::Rc;

/// Operators available on `Observable<ChangeSet<K, V>>`.
pub trait ObservableCacheExt<K, V>
where
    K: Eq + Hash + Clone + 'static,
    V: Clone + 'static,
{
    /// Keeps the entries whose value matches `predicate`.
    fn filter<F>(&self, predicate: F) -> Observable<ChangeSet<K, V>>
    where
        F: Fn(&V) -> bool + 'static;

    /// Filters with the latest predicate from `predicates`; nothing is
    /// emitted before the first one arrives.
    fn filter_dynamic(&self, predicates: &Observable<Predicate<V>>) -> Observable<ChangeSet<K, V>>;

    /// Projects every value, keeping keys and reasons.
    fn transform<U, F>(&self, f: F) -> Observable<ChangeSet<K, U>>
    where
        U: Clone + 'static,
        F: Fn(&V) -> U + 'static;

    /// Projects every value with a fallible projection. Failures are
    /// forwarded as `TransformFailure` and the key is left out.
    fn try_transform<U, E, F>(&self, f: F) -> Observable<ChangeSet<K, U>>
    where
        U: Clone + 'static,
        E: Display,
        F: Fn(&V) -> core::result::Result<U, E> + 'static;

    /// Stateless projection that maps every change in place.
    fn cast<U, F>(&self, f: F) -> Observable<ChangeSet<K, U>>
    where
        U: 'static,
        F: Fn(&V) -> U + 'static;

    /// Projects every value asynchronously on `spawner`.
    ///
    /// A key has at most one transformation in flight. Removing or
    /// rewriting a key cancels its pending transformation and its result is
    /// never emitted.
    fn transform_async<U, E, F, Fut, S>(
        &self,
        spawner: S,
        factory: F,
        options: TransformAsyncOptions,
    ) -> Observable<ChangeSet<K, U>>
    where
        U: Clone + 'static,
        E: Display + 'static,
        F: Fn(V, CancellationToken) -> Fut + 'static,
        Fut: Future<Output = core::result::Result<U, E>> + 'static,
        S: LocalSpawn + Clone + 'static;

    /// Orders the values by `comparator` into a list stream.
    fn sort<F>(&self, comparator: F, options: SortOptions) -> Observable<ListChangeSet<V>>
    where
        F: Fn(&V, &V) -> Ordering + 'static;

    /// Orders the values by the latest comparator from `comparators`.
    fn sort_dynamic(&self, comparators: &Observable<Comparator<V>>, options: SortOptions) -> Observable<ListChangeSet<V>>;

    /// Distinct values picked by `selector`, keyed by the value itself.
    fn distinct_values<D, F>(&self, selector: F) -> Observable<ChangeSet<D, D>>
    where
        D: Eq + Hash + Clone + 'static,
        F: Fn(&V) -> D + 'static;

    /// Drops the keys, producing an unordered list stream.
    fn remove_key(&self) -> Observable<ListChangeSet<V>>;

    /// Keys present in this stream and in every one of `others`.
    fn and(&self, others: &[Observable<ChangeSet<K, V>>]) -> Observable<ChangeSet<K, V>> {
        self.combine_with(others, CombineOperator::And)
    }

    /// Keys present in this stream or in any of `others`.
    fn or(&self, others: &[Observable<ChangeSet<K, V>>]) -> Observable<ChangeSet<K, V>> {
        self.combine_with(others, CombineOperator::Or)
    }

    /// Keys present in exactly one stream.
    fn xor(&self, others: &[Observable<ChangeSet<K, V>>]) -> Observable<ChangeSet<K, V>> {
        self.combine_with(others, CombineOperator::Xor)
    }

    /// Keys present in this stream and absent from all of `others`.
    fn except(&self, others: &[Observable<ChangeSet<K, V>>]) -> Observable<ChangeSet<K, V>> {
        self.combine_with(others, CombineOperator::Except)
    }

    /// Combines this stream, as the first source, with `others` under a set
    /// operation. The value shown for a key is the one of the
    /// lowest-index stream holding it.
    fn combine_with(&self, others: &[Observable<ChangeSet<K, V>>], operator: CombineOperator) -> Observable<ChangeSet<K, V>>;

    /// Union where a key shows the value of the highest-index stream
    /// holding it.
    fn combine(&self, others: &[Observable<ChangeSet<K, V>>]) -> Observable<ChangeSet<K, V>>;

    /// Union where a key shows the most recently written value. When the
    /// stream that wrote it drops the key, the highest-index stream still
    /// holding it takes over.
    fn merge_change_sets(&self, others: &[Observable<ChangeSet<K, V>>]) -> Observable<ChangeSet<K, V>>;

    /// Groups entries by `selector`.
    fn group<G, F>(&self, selector: F) -> Observable<ChangeSet<G, Group<K, V, G>>>
    where
        G: Eq + Hash + Clone + 'static,
        F: Fn(&V) -> G + 'static;

    /// Disposes every value once it is removed, replaced, or still present
    /// when the stream ends.
    fn dispose_many(&self) -> Observable<ChangeSet<K, V>>
    where
        V: Disposable,
    {
        self.dispose_many_with(|value: &V| value.dispose())
    }

    fn dispose_many_with<F>(&self, disposer: F) -> Observable<ChangeSet<K, V>>
    where
        F: Fn(&V) + 'static;

    /// Holds one subscription per present key.
    fn subscribe_many<F>(&self, factory: F) -> Observable<ChangeSet<K, V>>
    where
        F: Fn(&V) -> Subscription + 'static;

    /// Merges the streams selected for every present key.
    fn merge_many<U, F>(&self, selector: F) -> Observable<U>
    where
        U: 'static,
        F: Fn(&V) -> Observable<U> + 'static;

    /// Materializes the stream into a read-only cache.
    fn as_observable_cache(&self) -> ObservableCache<K, V>;

    /// Emits every value after every change set, in no particular order.
    fn to_collection(&self) -> Observable<Vec<V>>;

    /// Emits the changes of one key.
    fn watch(&self, key: K) -> Observable<Change<K, V>>;
}

impl<K, V> ObservableCacheExt<K, V> for Observable<ChangeSet<K, V>>
where
    K: Eq + Hash + Clone + 'static,
    V: Clone + 'static,
{
    fn filter<F>(&self, predicate: F) -> Observable<ChangeSet<K, V>>
    where
        F: Fn(&V) -> bool + 'static,
    {
        let predicate: Predicate<V> = Rc::new(predicate);
        lift(
            self,
            move || CacheFilter::new(Some(Rc::clone(&predicate))),
            |filter: &mut CacheFilter<K, V>, changes: &ChangeSet<K, V>, _errors: &mut Vec<Error>| filter.process(changes),
        )
    }

    fn filter_dynamic(&self, predicates: &Observable<Predicate<V>>) -> Observable<ChangeSet<K, V>> {
        lift_with(
            self,
            predicates,
            || CacheFilter::new(None),
            |filter: &mut CacheFilter<K, V>, changes: &ChangeSet<K, V>, _errors: &mut Vec<Error>| filter.process(changes),
            |filter: &mut CacheFilter<K, V>, predicate: &Predicate<V>, _errors: &mut Vec<Error>| {
                filter.set_predicate(Rc::clone(predicate))
            },
        )
    }

    fn transform<U, F>(&self, f: F) -> Observable<ChangeSet<K, U>>
    where
        U: Clone + 'static,
        F: Fn(&V) -> U + 'static,
    {
        let projection = infallible(f);
        lift(
            self,
            move || CacheTransformer::new(Rc::clone(&projection)),
            |transformer: &mut CacheTransformer<K, V, U>, changes: &ChangeSet<K, V>, errors: &mut Vec<Error>| {
                transformer.process(changes, errors)
            },
        )
    }

    fn try_transform<U, E, F>(&self, f: F) -> Observable<ChangeSet<K, U>>
    where
        U: Clone + 'static,
        E: Display,
        F: Fn(&V) -> core::result::Result<U, E> + 'static,
    {
        let projection = fallible(f);
        lift(
            self,
            move || CacheTransformer::new(Rc::clone(&projection)),
            |transformer: &mut CacheTransformer<K, V, U>, changes: &ChangeSet<K, V>, errors: &mut Vec<Error>| {
                transformer.process(changes, errors)
            },
        )
    }

    fn cast<U, F>(&self, f: F) -> Observable<ChangeSet<K, U>>
    where
        U: 'static,
        F: Fn(&V) -> U + 'static,
    {
        self.map(move |changes: &ChangeSet<K, V>| changes.map_values(&f))
    }

    fn transform_async<U, E, F, Fut, S>(
        &self,
        spawner: S,
        factory: F,
        options: TransformAsyncOptions,
    ) -> Observable<ChangeSet<K, U>>
    where
        U: Clone + 'static,
        E: Display + 'static,
        F: Fn(V, CancellationToken) -> Fut + 'static,
        Fut: Future<Output = core::result::Result<U, E>> + 'static,
        S: LocalSpawn + Clone + 'static,
    {
        transform_async(self, spawner, factory, options)
    }

    fn sort<F>(&self, comparator: F, options: SortOptions) -> Observable<ListChangeSet<V>>
    where
        F: Fn(&V, &V) -> Ordering + 'static,
    {
        let comparator: Comparator<V> = Rc::new(comparator);
        lift(
            self,
            move || CacheSorter::new(Some(Rc::clone(&comparator)), options),
            |sorter: &mut CacheSorter<K, V>, changes: &ChangeSet<K, V>, errors: &mut Vec<Error>| sorter.process(changes, errors),
        )
    }

    fn sort_dynamic(&self, comparators: &Observable<Comparator<V>>, options: SortOptions) -> Observable<ListChangeSet<V>> {
        lift_with(
            self,
            comparators,
            move || CacheSorter::new(None, options),
            |sorter: &mut CacheSorter<K, V>, changes: &ChangeSet<K, V>, errors: &mut Vec<Error>| sorter.process(changes, errors),
            |sorter: &mut CacheSorter<K, V>, comparator: &Comparator<V>, _errors: &mut Vec<Error>| {
                sorter.set_comparator(Rc::clone(comparator))
            },
        )
    }

    fn distinct_values<D, F>(&self, selector: F) -> Observable<ChangeSet<D, D>>
    where
        D: Eq + Hash + Clone + 'static,
        F: Fn(&V) -> D + 'static,
    {
        let selector: Rc<dyn Fn(&V) -> D> = Rc::new(selector);
        lift(
            self,
            move || CacheDistinct::new(Rc::clone(&selector)),
            |distinct: &mut CacheDistinct<K, V, D>, changes: &ChangeSet<K, V>, _errors: &mut Vec<Error>| {
                distinct.process(changes)
            },
        )
    }

    fn remove_key(&self) -> Observable<ListChangeSet<V>> {
        lift(
            self,
            KeyRemover::default,
            |remover: &mut KeyRemover<K>, changes: &ChangeSet<K, V>, _errors: &mut Vec<Error>| remover.process(changes),
        )
    }

    fn combine_with(&self, others: &[Observable<ChangeSet<K, V>>], operator: CombineOperator) -> Observable<ChangeSet<K, V>> {
        combine_streams(with_others(self, others), CombineRule::Set(operator))
    }

    fn combine(&self, others: &[Observable<ChangeSet<K, V>>]) -> Observable<ChangeSet<K, V>> {
        combine_streams(with_others(self, others), CombineRule::Priority)
    }

    fn merge_change_sets(&self, others: &[Observable<ChangeSet<K, V>>]) -> Observable<ChangeSet<K, V>> {
        combine_streams(with_others(self, others), CombineRule::MostRecent)
    }

    fn group<G, F>(&self, selector: F) -> Observable<ChangeSet<G, Group<K, V, G>>>
    where
        G: Eq + Hash + Clone + 'static,
        F: Fn(&V) -> G + 'static,
    {
        group_cache(self, Rc::new(selector))
    }

    fn dispose_many_with<F>(&self, disposer: F) -> Observable<ChangeSet<K, V>>
    where
        F: Fn(&V) + 'static,
    {
        dispose_many_cache(self, Rc::new(disposer))
    }

    fn subscribe_many<F>(&self, factory: F) -> Observable<ChangeSet<K, V>>
    where
        F: Fn(&V) -> Subscription + 'static,
    {
        subscribe_many_cache(self, Rc::new(factory))
    }

    fn merge_many<U, F>(&self, selector: F) -> Observable<U>
    where
        U: 'static,
        F: Fn(&V) -> Observable<U> + 'static,
    {
        merge_many_cache(self, Rc::new(selector))
    }

    fn as_observable_cache(&self) -> ObservableCache<K, V> {
        ObservableCache::new(self)
    }

    fn to_collection(&self) -> Observable<Vec<V>> {
        cache_snapshots(self)
    }

    fn watch(&self, key: K) -> Observable<Change<K, V>> {
        watch_key(self, key)
    }
}

fn with_others<T: 'static>(first: &Observable<T>, others: &[Observable<T>]) -> Vec<Observable<T>> {
    let mut sources = Vec::with_capacity(others.len() + 1);
    sources.push(first.clone());
    sources.extend(others.iter().cloned());
    sources
}
