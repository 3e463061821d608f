//! Operators over list change-set streams.

use crate::operators::{
    dispose_many_list, fallible, group_list, infallible, list_snapshots, merge_many_list, subscribe_many_list,
    Disposable, ListDistinct, ListFilter, ListGroup, ListSorter, ListTransformer, PageRequest, SortOptions,
    VirtualRequest, Window,
};
use crate::stream::{lift, lift_with, Comparator, Predicate};
use core::cmp::Ordering;
use core::fmt::Display;
use core::hash::Hash;
use ripple_core::{Error, ListChangeSet, Result};
use ripple_reactive::{Observable, ObservableList, Subscription};
use std::rc::Rc;

/// Operators available on `Observable<ListChangeSet<T>>`.
pub trait ObservableListExt<T: Clone + 'static> {
    /// Keeps the items matching `predicate`.
    fn filter<F>(&self, predicate: F) -> Observable<ListChangeSet<T>>
    where
        F: Fn(&T) -> bool + 'static;

    /// Filters with the latest predicate from `predicates`.
    ///
    /// Nothing is emitted before the first predicate arrives. Every new
    /// predicate re-evaluates all items and emits only the membership flips.
    fn filter_dynamic(&self, predicates: &Observable<Predicate<T>>) -> Observable<ListChangeSet<T>>;

    /// Projects every item, keeping reasons and positions.
    fn transform<U, F>(&self, f: F) -> Observable<ListChangeSet<U>>
    where
        U: Clone + 'static,
        F: Fn(&T) -> U + 'static;

    /// Projects every item with a fallible projection.
    ///
    /// An item whose projection fails is not emitted; the failure travels as
    /// a `TransformFailure` error and the stream carries on.
    fn try_transform<U, E, F>(&self, f: F) -> Observable<ListChangeSet<U>>
    where
        U: Clone + 'static,
        E: Display,
        F: Fn(&T) -> core::result::Result<U, E> + 'static;

    /// Stateless projection that maps every change in place.
    fn cast<U, F>(&self, f: F) -> Observable<ListChangeSet<U>>
    where
        U: 'static,
        F: Fn(&T) -> U + 'static;

    /// Sorts by `comparator`, equal items keeping their arrival order.
    fn sort<F>(&self, comparator: F) -> Observable<ListChangeSet<T>>
    where
        F: Fn(&T, &T) -> Ordering + 'static,
    {
        self.sort_with_options(comparator, SortOptions::default())
    }

    fn sort_with_options<F>(&self, comparator: F, options: SortOptions) -> Observable<ListChangeSet<T>>
    where
        F: Fn(&T, &T) -> Ordering + 'static;

    /// Sorts by the latest comparator from `comparators`; a new comparator
    /// resets the output.
    fn sort_dynamic(&self, comparators: &Observable<Comparator<T>>, options: SortOptions) -> Observable<ListChangeSet<T>>;

    /// Distinct values picked by `selector`, in order of first appearance.
    fn distinct_values<D, F>(&self, selector: F) -> Observable<ListChangeSet<D>>
    where
        D: Eq + Hash + Clone + 'static,
        F: Fn(&T) -> D + 'static;

    /// The window requested by the latest value of `requests`.
    fn virtualize(&self, requests: &Observable<VirtualRequest>) -> Observable<ListChangeSet<T>>
    where
        T: PartialEq;

    /// The page requested by the latest value of `requests`.
    fn page(&self, requests: &Observable<PageRequest>) -> Observable<ListChangeSet<T>>
    where
        T: PartialEq;

    /// Groups items by `selector`; groups are listed in creation order.
    fn group_on<G, F>(&self, selector: F) -> Observable<ListChangeSet<ListGroup<T, G>>>
    where
        G: Eq + Clone + 'static,
        F: Fn(&T) -> G + 'static;

    /// Disposes every item once it leaves the list or the stream ends.
    fn dispose_many(&self) -> Observable<ListChangeSet<T>>
    where
        T: Disposable,
    {
        self.dispose_many_with(|item: &T| item.dispose())
    }

    /// Runs `disposer` once for every item that leaves the list or is
    /// still present when the stream ends.
    fn dispose_many_with<F>(&self, disposer: F) -> Observable<ListChangeSet<T>>
    where
        F: Fn(&T) + 'static;

    /// Holds one subscription per present item.
    fn subscribe_many<F>(&self, factory: F) -> Observable<ListChangeSet<T>>
    where
        F: Fn(&T) -> Subscription + 'static;

    /// Merges the streams selected for every present item.
    ///
    /// Completes once the source has completed and every inner stream still
    /// attached has completed.
    fn merge_many<U, F>(&self, selector: F) -> Observable<U>
    where
        U: 'static,
        F: Fn(&T) -> Observable<U> + 'static;

    /// Materializes the stream into a read-only list.
    fn as_observable_list(&self) -> ObservableList<T>;

    /// Emits the whole list after every change set.
    fn to_collection(&self) -> Observable<Vec<T>>;
}

impl<T: Clone + 'static> ObservableListExt<T> for Observable<ListChangeSet<T>> {
    fn filter<F>(&self, predicate: F) -> Observable<ListChangeSet<T>>
    where
        F: Fn(&T) -> bool + 'static,
    {
        let predicate: Predicate<T> = Rc::new(predicate);
        lift(
            self,
            move || ListFilter::new(Some(Rc::clone(&predicate))),
            |filter: &mut ListFilter<T>, changes: &ListChangeSet<T>, errors: &mut Vec<Error>| filter.process(changes, errors),
        )
    }

    fn filter_dynamic(&self, predicates: &Observable<Predicate<T>>) -> Observable<ListChangeSet<T>> {
        lift_with(
            self,
            predicates,
            || ListFilter::new(None),
            |filter: &mut ListFilter<T>, changes: &ListChangeSet<T>, errors: &mut Vec<Error>| filter.process(changes, errors),
            |filter: &mut ListFilter<T>, predicate: &Predicate<T>, _errors: &mut Vec<Error>| {
                filter.set_predicate(Rc::clone(predicate))
            },
        )
    }

    fn transform<U, F>(&self, f: F) -> Observable<ListChangeSet<U>>
    where
        U: Clone + 'static,
        F: Fn(&T) -> U + 'static,
    {
        let projection = infallible(f);
        lift(
            self,
            move || ListTransformer::new(Rc::clone(&projection)),
            |transformer: &mut ListTransformer<T, U>, changes: &ListChangeSet<T>, errors: &mut Vec<Error>| {
                transformer.process(changes, errors)
            },
        )
    }

    fn try_transform<U, E, F>(&self, f: F) -> Observable<ListChangeSet<U>>
    where
        U: Clone + 'static,
        E: Display,
        F: Fn(&T) -> core::result::Result<U, E> + 'static,
    {
        let projection = fallible(f);
        lift(
            self,
            move || ListTransformer::new(Rc::clone(&projection)),
            |transformer: &mut ListTransformer<T, U>, changes: &ListChangeSet<T>, errors: &mut Vec<Error>| {
                transformer.process(changes, errors)
            },
        )
    }

    fn cast<U, F>(&self, f: F) -> Observable<ListChangeSet<U>>
    where
        U: 'static,
        F: Fn(&T) -> U + 'static,
    {
        self.map(move |changes: &ListChangeSet<T>| changes.map(&f))
    }

    fn sort_with_options<F>(&self, comparator: F, options: SortOptions) -> Observable<ListChangeSet<T>>
    where
        F: Fn(&T, &T) -> Ordering + 'static,
    {
        let comparator: Comparator<T> = Rc::new(comparator);
        lift(
            self,
            move || ListSorter::new(Some(Rc::clone(&comparator)), options),
            |sorter: &mut ListSorter<T>, changes: &ListChangeSet<T>, errors: &mut Vec<Error>| sorter.process(changes, errors),
        )
    }

    fn sort_dynamic(&self, comparators: &Observable<Comparator<T>>, options: SortOptions) -> Observable<ListChangeSet<T>> {
        lift_with(
            self,
            comparators,
            move || ListSorter::new(None, options),
            |sorter: &mut ListSorter<T>, changes: &ListChangeSet<T>, errors: &mut Vec<Error>| sorter.process(changes, errors),
            |sorter: &mut ListSorter<T>, comparator: &Comparator<T>, _errors: &mut Vec<Error>| {
                sorter.set_comparator(Rc::clone(comparator))
            },
        )
    }

    fn distinct_values<D, F>(&self, selector: F) -> Observable<ListChangeSet<D>>
    where
        D: Eq + Hash + Clone + 'static,
        F: Fn(&T) -> D + 'static,
    {
        let selector: Rc<dyn Fn(&T) -> D> = Rc::new(selector);
        lift(
            self,
            move || ListDistinct::new(Rc::clone(&selector)),
            |distinct: &mut ListDistinct<T, D>, changes: &ListChangeSet<T>, errors: &mut Vec<Error>| {
                distinct.process(changes, errors)
            },
        )
    }

    fn virtualize(&self, requests: &Observable<VirtualRequest>) -> Observable<ListChangeSet<T>>
    where
        T: PartialEq,
    {
        lift_with(
            self,
            requests,
            Window::new,
            |window: &mut Window<T>, changes: &ListChangeSet<T>, errors: &mut Vec<Error>| window.process(changes, errors),
            |window: &mut Window<T>, request: &VirtualRequest, _errors: &mut Vec<Error>| window.set_request(*request),
        )
    }

    fn page(&self, requests: &Observable<PageRequest>) -> Observable<ListChangeSet<T>>
    where
        T: PartialEq,
    {
        lift_with(
            self,
            requests,
            Window::new,
            |window: &mut Window<T>, changes: &ListChangeSet<T>, errors: &mut Vec<Error>| window.process(changes, errors),
            |window: &mut Window<T>, request: &PageRequest, _errors: &mut Vec<Error>| window.set_request(request.window()),
        )
    }

    fn group_on<G, F>(&self, selector: F) -> Observable<ListChangeSet<ListGroup<T, G>>>
    where
        G: Eq + Clone + 'static,
        F: Fn(&T) -> G + 'static,
    {
        group_list(self, Rc::new(selector))
    }

    fn dispose_many_with<F>(&self, disposer: F) -> Observable<ListChangeSet<T>>
    where
        F: Fn(&T) + 'static,
    {
        dispose_many_list(self, Rc::new(disposer))
    }

    fn subscribe_many<F>(&self, factory: F) -> Observable<ListChangeSet<T>>
    where
        F: Fn(&T) -> Subscription + 'static,
    {
        subscribe_many_list(self, Rc::new(factory))
    }

    fn merge_many<U, F>(&self, selector: F) -> Observable<U>
    where
        U: 'static,
        F: Fn(&T) -> Observable<U> + 'static,
    {
        merge_many_list(self, Rc::new(selector))
    }

    fn as_observable_list(&self) -> ObservableList<T> {
        ObservableList::new(self)
    }

    fn to_collection(&self) -> Observable<Vec<T>> {
        list_snapshots(self)
    }
}

/// Builds a page request stream from page numbers, rejecting page 0 and a
/// zero page size up front.
pub fn pages(size: usize, pages: impl IntoIterator<Item = usize>) -> Result<Observable<PageRequest>> {
    let requests = pages
        .into_iter()
        .map(|page| PageRequest::new(page, size))
        .collect::<Result<Vec<_>>>()?;
    Ok(Observable::from_values(requests))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stream::comparing;
    use core::cell::RefCell;
    use ripple_core::ListChange;
    use ripple_reactive::{SourceList, Subject};

    fn sink<T: Clone + 'static>(source: &Observable<ListChangeSet<T>>) -> (Rc<RefCell<Vec<ListChangeSet<T>>>>, Subscription) {
        let seen = Rc::new(RefCell::new(Vec::new()));
        let s = seen.clone();
        let subscription = source.subscribe(move |cs: &ListChangeSet<T>| s.borrow_mut().push(cs.clone()));
        (seen, subscription)
    }

    #[test]
    fn test_filter_then_sort_materializes() {
        let source = SourceList::new();
        source.add_range(vec![5, 2, 8, 1, 9]).unwrap();

        let view = source
            .connect()
            .unwrap()
            .filter(|v: &i32| *v > 1)
            .sort(|a: &i32, b: &i32| a.cmp(b))
            .as_observable_list();
        assert_eq!(view.items(), vec![2, 5, 8, 9]);

        source.add(3).unwrap();
        source.remove(&8).unwrap();
        source.replace_at(0, 0).unwrap();
        assert_eq!(view.items(), vec![2, 3, 9]);
    }

    #[test]
    fn test_filter_dynamic_waits_for_predicate() {
        let source = SourceList::new();
        source.add_range(vec![1, 2, 3, 4]).unwrap();
        let predicates: Subject<Predicate<i32>> = Subject::new();

        let (seen, _sub) = sink(&source.connect().unwrap().filter_dynamic(&predicates.as_observable()));
        assert!(seen.borrow().is_empty());

        predicates.next(&(Rc::new(|v: &i32| v % 2 == 0) as Predicate<i32>));
        predicates.next(&(Rc::new(|v: &i32| *v >= 2) as Predicate<i32>));

        let seen = seen.borrow();
        assert_eq!(seen.len(), 2);
        let mut items = Vec::new();
        for changes in seen.iter() {
            changes.apply_to(&mut items).unwrap();
        }
        assert_eq!(items.len(), 3);
        assert_eq!(seen[1].total_changes(), 1);
    }

    #[test]
    fn test_try_transform_forwards_failures() {
        let source = SourceList::new();
        let errors = Rc::new(RefCell::new(Vec::new()));
        let e = errors.clone();
        let view = source.connect().unwrap().try_transform(|v: &i32| {
            if *v < 0 {
                Err(format!("negative: {v}"))
            } else {
                Ok(v * 10)
            }
        });
        let values = Rc::new(RefCell::new(Vec::new()));
        let v = values.clone();
        let _sub = view.subscribe_observer(
            ripple_reactive::FnObserver::new(move |cs: &ListChangeSet<i32>| cs.apply_to(&mut v.borrow_mut()).unwrap())
                .on_error(move |err| e.borrow_mut().push(err.clone()))
                .shared(),
        );

        source.add_range(vec![1, -2, 3]).unwrap();
        assert_eq!(*values.borrow(), vec![10, 30]);
        assert_eq!(*errors.borrow(), vec![Error::transform_failure("negative: -2")]);
    }

    #[test]
    fn test_cast_keeps_positions() {
        let source = SourceList::new();
        source.add_range(vec![1, 2]).unwrap();
        let (seen, _sub) = sink(&source.connect().unwrap().cast(|v: &i32| v.to_string()));
        source.move_item(0, 1).unwrap();

        assert_eq!(
            seen.borrow()[1].as_slice(),
            &[ListChange::Moved {
                item: "1".to_string(),
                current_index: 1,
                previous_index: 0,
            }]
        );
    }

    #[test]
    fn test_sort_dynamic_resorts_everything() {
        let source = SourceList::new();
        source.add_range(vec!["ccc", "a", "bb"]).unwrap();
        let comparators: Subject<Comparator<&'static str>> = Subject::new();
        let view = source
            .connect()
            .unwrap()
            .sort_dynamic(&comparators.as_observable(), SortOptions::default())
            .as_observable_list();
        assert!(view.is_empty());

        comparators.next(&comparing(|s: &&str| s.len()));
        assert_eq!(view.items(), vec!["a", "bb", "ccc"]);

        comparators.next(&comparing(|s: &&str| core::cmp::Reverse(s.len())));
        assert_eq!(view.items(), vec!["ccc", "bb", "a"]);
    }

    #[test]
    fn test_page_follows_requests() {
        let source = SourceList::new();
        source.add_range((1..=10).collect()).unwrap();
        let requests: Subject<PageRequest> = Subject::new();
        let view = source.connect().unwrap().page(&requests.as_observable()).as_observable_list();

        requests.next(&PageRequest::new(2, 3).unwrap());
        assert_eq!(view.items(), vec![4, 5, 6]);

        source.remove_at(0).unwrap();
        assert_eq!(view.items(), vec![5, 6, 7]);

        requests.next(&PageRequest::new(3, 3).unwrap());
        assert_eq!(view.items(), vec![8, 9, 10]);
    }

    #[test]
    fn test_virtualize_past_the_end_is_empty() {
        let source = SourceList::new();
        source.add_range(vec![1, 2, 3]).unwrap();
        let view = source
            .connect()
            .unwrap()
            .virtualize(&Observable::just(VirtualRequest::new(5, 2).unwrap()))
            .as_observable_list();
        assert!(view.is_empty());

        source.add_range(vec![4, 5, 6, 7]).unwrap();
        assert_eq!(view.items(), vec![6, 7]);
    }

    #[test]
    fn test_pages_rejects_page_zero() {
        assert!(pages(10, vec![1, 2]).is_ok());
        assert!(matches!(pages(10, vec![0]), Err(Error::Argument(_))));
        assert!(matches!(pages(0, vec![1]), Err(Error::Argument(_))));
    }

    #[test]
    fn test_distinct_values_and_snapshots() {
        let source = SourceList::new();
        source.add_range(vec![1, 11, 2, 21]).unwrap();
        let snapshots = Rc::new(RefCell::new(Vec::new()));
        let s = snapshots.clone();
        let _sub = source
            .connect()
            .unwrap()
            .distinct_values(|v: &i32| v % 10)
            .to_collection()
            .subscribe(move |items: &Vec<i32>| s.borrow_mut().push(items.clone()));

        source.remove_at(0).unwrap();
        source.remove_at(0).unwrap();
        assert_eq!(*snapshots.borrow(), vec![vec![1, 2], vec![2]]);
    }
}
