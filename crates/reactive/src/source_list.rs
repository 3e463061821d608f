//! Mutable, observable list.

use crate::observable::Observable;
use crate::store::Store;
use ripple_core::{ChangeAwareList, ListChangeSet, Result};
use std::rc::Rc;

/// The owner of an ordered collection and the only way to mutate it.
///
/// Every mutating call computes the change set it implies and publishes it
/// to all connected observers before returning. Failed calls change nothing.
/// Dropping the list disposes it.
///
/// # Example
///
/// ```rust
/// use ripple_reactive::SourceList;
///
/// let list = SourceList::new();
/// list.add_range(vec![3, 1, 4]).unwrap();
/// list.move_item(0, 2).unwrap();
/// assert_eq!(list.items(), vec![1, 4, 3]);
/// ```
pub struct SourceList<T: Clone + 'static> {
    store: Rc<Store<ChangeAwareList<T>>>,
}

impl<T: Clone + 'static> Default for SourceList<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Clone + 'static> SourceList<T> {
    /// Creates an empty list.
    pub fn new() -> Self {
        Self {
            store: Store::new("SourceList", ChangeAwareList::new()),
        }
    }

    /// The live change stream: the current items first, then one change set
    /// per mutation.
    pub fn connect(&self) -> Result<Observable<ListChangeSet<T>>> {
        self.store.connect()
    }

    /// Applies several mutations as one change set.
    ///
    /// If `f` fails, every mutation it made is undone and nothing is published.
    pub fn edit<R>(&self, f: impl FnOnce(&mut ChangeAwareList<T>) -> Result<R>) -> Result<R> {
        self.store.edit(f)
    }

    pub fn add(&self, item: T) -> Result<()> {
        self.edit(|list| {
            list.add(item);
            Ok(())
        })
    }

    /// Appends items as a single `AddRange`.
    pub fn add_range(&self, items: Vec<T>) -> Result<()> {
        self.edit(|list| {
            list.add_range(items);
            Ok(())
        })
    }

    pub fn insert(&self, index: usize, item: T) -> Result<()> {
        self.edit(|list| list.insert(index, item))
    }

    pub fn insert_range(&self, index: usize, items: Vec<T>) -> Result<()> {
        self.edit(|list| list.insert_range(index, items))
    }

    pub fn remove_at(&self, index: usize) -> Result<T> {
        self.edit(|list| list.remove_at(index))
    }

    /// Removes `count` items starting at `index` as a single `RemoveRange`.
    pub fn remove_range(&self, index: usize, count: usize) -> Result<()> {
        self.edit(|list| list.remove_range(index, count))
    }

    pub fn replace_at(&self, index: usize, item: T) -> Result<T> {
        self.edit(|list| list.replace_at(index, item))
    }

    /// Moves the item at `from` so that it ends up at `to`.
    pub fn move_item(&self, from: usize, to: usize) -> Result<()> {
        self.edit(|list| list.move_item(from, to))
    }

    /// Publishes a `Refresh` for the item at `index`.
    pub fn refresh_at(&self, index: usize) -> Result<()> {
        self.edit(|list| list.refresh_at(index))
    }

    /// Removes everything as a single `Clear`.
    pub fn clear(&self) -> Result<()> {
        self.edit(|list| {
            list.clear();
            Ok(())
        })
    }

    /// Snapshot of the current items.
    pub fn items(&self) -> Vec<T> {
        self.store.read(|list| list.as_slice().to_vec())
    }

    pub fn get(&self, index: usize) -> Option<T> {
        self.store.read(|list| list.get(index).cloned())
    }

    pub fn len(&self) -> usize {
        self.store.read(|list| list.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Completes every connected observer. Later mutations and connections
    /// fail with `Error::Disposed`.
    pub fn dispose(&self) {
        self.store.dispose();
    }

    pub fn is_disposed(&self) -> bool {
        self.store.is_disposed()
    }
}

impl<T: Clone + PartialEq + 'static> SourceList<T> {
    /// Removes the first item equal to `item`. Returns false when absent.
    pub fn remove(&self, item: &T) -> Result<bool> {
        self.edit(|list| Ok(list.remove(item)))
    }

    /// Removes the first occurrence of each item, in one change set.
    pub fn remove_many(&self, items: &[T]) -> Result<usize> {
        self.edit(|list| Ok(items.iter().filter(|item| list.remove(item)).count()))
    }

    /// Replaces the first item equal to `original`.
    pub fn replace(&self, original: &T, replacement: T) -> Result<()> {
        self.edit(|list| list.replace(original, replacement))
    }

    pub fn index_of(&self, item: &T) -> Option<usize> {
        self.store.read(|list| list.index_of(item))
    }
}

impl<T: Clone + 'static> Drop for SourceList<T> {
    fn drop(&mut self) {
        self.store.dispose();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::observable::FnObserver;
    use core::cell::{Cell, RefCell};
    use ripple_core::{Error, ListChange, ListChangeReason};

    fn record<T: Clone + 'static>(
        list: &SourceList<T>,
    ) -> (Rc<RefCell<Vec<ListChangeSet<T>>>>, crate::Subscription) {
        let received = Rc::new(RefCell::new(Vec::new()));
        let sink = received.clone();
        let sub = list
            .connect()
            .unwrap()
            .subscribe(move |cs: &ListChangeSet<T>| sink.borrow_mut().push(cs.clone()));
        (received, sub)
    }

    #[test]
    fn test_connect_emits_initial_state() {
        let list = SourceList::new();
        list.add_range(vec![1, 2, 3]).unwrap();

        let (received, _sub) = record(&list);
        assert_eq!(received.borrow().len(), 1);
        assert_eq!(
            received.borrow()[0].as_slice(),
            &[ListChange::AddRange {
                items: vec![1, 2, 3],
                index: 0
            }]
        );
    }

    #[test]
    fn test_empty_list_emits_nothing_on_connect() {
        let list: SourceList<i32> = SourceList::new();
        let (received, _sub) = record(&list);
        assert!(received.borrow().is_empty());
    }

    #[test]
    fn test_each_mutation_publishes_one_change_set() {
        let list = SourceList::new();
        let (received, _sub) = record(&list);

        list.add(1).unwrap();
        list.add_range(vec![2, 3]).unwrap();
        list.move_item(0, 2).unwrap();
        list.replace_at(0, 20).unwrap();
        list.remove_at(1).unwrap();
        list.clear().unwrap();

        let received = received.borrow();
        let reasons: Vec<_> = received.iter().map(|cs| cs.as_slice()[0].reason()).collect();
        assert_eq!(
            reasons,
            vec![
                ListChangeReason::Add,
                ListChangeReason::AddRange,
                ListChangeReason::Moved,
                ListChangeReason::Replace,
                ListChangeReason::Remove,
                ListChangeReason::Clear,
            ]
        );
        assert_eq!(
            received[2].as_slice()[0],
            ListChange::Moved {
                item: 1,
                current_index: 2,
                previous_index: 0
            }
        );
    }

    #[test]
    fn test_index_error_is_atomic() {
        let list = SourceList::new();
        list.add_range(vec![1, 2]).unwrap();
        let (received, _sub) = record(&list);

        assert_eq!(list.insert(5, 9), Err(Error::index_out_of_range(5, 2)));
        assert!(list.remove_at(2).is_err());
        assert_eq!(list.items(), vec![1, 2]);
        assert_eq!(received.borrow().len(), 1);
    }

    #[test]
    fn test_edit_batches_and_rolls_back() {
        let list = SourceList::new();
        let (received, _sub) = record(&list);

        list.edit(|l| {
            l.add(1);
            l.add(2);
            l.move_item(1, 0)
        })
        .unwrap();
        assert_eq!(received.borrow().len(), 1);
        assert_eq!(received.borrow()[0].len(), 3);

        let result = list.edit(|l| {
            l.add(3);
            l.remove_at(10).map(|_| ())
        });
        assert!(result.is_err());
        assert_eq!(list.items(), vec![2, 1]);
        assert_eq!(received.borrow().len(), 1);
    }

    #[test]
    fn test_remove_by_value() {
        let list = SourceList::new();
        list.add_range(vec!["a", "b", "a"]).unwrap();
        assert!(list.remove(&"a").unwrap());
        assert_eq!(list.items(), vec!["b", "a"]);
        assert_eq!(list.remove_many(&["a", "zz"]).unwrap(), 1);
        assert_eq!(list.items(), vec!["b"]);
    }

    #[test]
    fn test_dispose_completes_and_rejects() {
        let list = SourceList::new();
        list.add(1).unwrap();
        let completed = Rc::new(Cell::new(false));
        let flag = completed.clone();
        let _sub = list.connect().unwrap().subscribe_observer(
            FnObserver::new(|_: &ListChangeSet<i32>| {})
                .on_completed(move || flag.set(true))
                .shared(),
        );

        list.dispose();
        assert!(completed.get());
        assert_eq!(list.add(2), Err(Error::Disposed("SourceList")));
        assert!(matches!(list.connect(), Err(Error::Disposed(_))));
        assert_eq!(list.items(), vec![1]);
    }

    #[test]
    fn test_subscriber_may_mutate_during_notification() {
        let list = Rc::new(SourceList::new());
        let inner = list.clone();
        let _sub = list
            .connect()
            .unwrap()
            .subscribe(move |cs: &ListChangeSet<i32>| {
                if let Some(ListChange::Add { item, .. }) = cs.as_slice().first() {
                    if *item < 3 {
                        inner.add(item + 1).unwrap();
                    }
                }
            });

        list.add(1).unwrap();
        assert_eq!(list.items(), vec![1, 2, 3]);
    }

    #[test]
    fn test_nested_mutation_reaches_later_subscribers_in_order() {
        let list = Rc::new(SourceList::new());
        let inner = list.clone();
        let _writer = list
            .connect()
            .unwrap()
            .subscribe(move |cs: &ListChangeSet<i32>| {
                if let Some(ListChange::Add { item: 1, .. }) = cs.as_slice().first() {
                    inner.add(2).unwrap();
                }
            });

        let replay = Rc::new(RefCell::new(Vec::new()));
        let errors = Rc::new(RefCell::new(Vec::new()));
        let sink = replay.clone();
        let failed = errors.clone();
        let _reader = list
            .connect()
            .unwrap()
            .subscribe(move |cs: &ListChangeSet<i32>| {
                if let Err(err) = cs.apply_to(&mut sink.borrow_mut()) {
                    failed.borrow_mut().push(err);
                }
            });

        list.add(1).unwrap();
        assert!(errors.borrow().is_empty());
        assert_eq!(*replay.borrow(), list.items());
        assert_eq!(list.items(), vec![1, 2]);
    }

    #[test]
    fn test_connect_during_notification_skips_queued_changes() {
        let list = Rc::new(SourceList::new());
        let inner = list.clone();
        let replay = Rc::new(RefCell::new(Vec::new()));
        let late = Rc::new(RefCell::new(None));
        let sink = replay.clone();
        let keep = late.clone();
        let _writer = list
            .connect()
            .unwrap()
            .subscribe(move |cs: &ListChangeSet<i32>| {
                if let Some(ListChange::Add { item: 1, .. }) = cs.as_slice().first() {
                    inner.add(2).unwrap();
                    let sink = sink.clone();
                    let sub = inner
                        .connect()
                        .unwrap()
                        .subscribe(move |cs: &ListChangeSet<i32>| cs.apply_to(&mut sink.borrow_mut()).unwrap());
                    *keep.borrow_mut() = Some(sub);
                }
            });

        list.add(1).unwrap();
        assert_eq!(*replay.borrow(), vec![1, 2]);
        list.add(3).unwrap();
        assert_eq!(*replay.borrow(), list.items());
        assert!(late.borrow().is_some());
    }

    #[test]
    fn test_dispose_during_notification_completes_after_pending_changes() {
        let list = Rc::new(SourceList::new());
        let inner = list.clone();
        let _writer = list
            .connect()
            .unwrap()
            .subscribe(move |cs: &ListChangeSet<i32>| {
                if let Some(ListChange::Add { item: 1, .. }) = cs.as_slice().first() {
                    inner.add(2).unwrap();
                    inner.dispose();
                }
            });

        let events = Rc::new(RefCell::new(Vec::new()));
        let on_next = events.clone();
        let on_completed = events.clone();
        let _reader = list.connect().unwrap().subscribe_observer(
            FnObserver::new(move |cs: &ListChangeSet<i32>| on_next.borrow_mut().push(format!("{}", cs.total_changes())))
                .on_completed(move || on_completed.borrow_mut().push("completed".to_string()))
                .shared(),
        );

        list.add(1).unwrap();
        assert_eq!(*events.borrow(), vec!["1", "1", "completed"]);
        assert!(list.is_disposed());
    }
}
