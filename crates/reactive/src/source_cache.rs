//! Mutable, observable keyed cache.

use crate::observable::{Observable, Observer, Relay};
use crate::store::Store;
use core::hash::Hash;
use ripple_core::{Change, ChangeAwareCache, ChangeSet, Result};
use std::rc::Rc;

/// Key selector shared by a cache and its updaters.
pub type KeySelector<K, V> = Rc<dyn Fn(&V) -> K>;

/// Batch mutation handle passed to `SourceCache::edit`.
pub struct CacheUpdater<'a, K, V> {
    cache: &'a mut ChangeAwareCache<K, V>,
    key_fn: &'a dyn Fn(&V) -> K,
}

impl<K, V> CacheUpdater<'_, K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    /// Adds the item, or updates it if its key is present.
    pub fn add_or_update(&mut self, item: V) {
        let key = (self.key_fn)(&item);
        self.cache.add_or_update(key, item);
    }

    pub fn add_or_update_many(&mut self, items: impl IntoIterator<Item = V>) {
        for item in items {
            self.add_or_update(item);
        }
    }

    /// Removes `key`; absent keys are ignored.
    pub fn remove(&mut self, key: &K) -> Option<V> {
        self.cache.remove(key)
    }

    /// Removes the entry holding `item`'s key.
    pub fn remove_item(&mut self, item: &V) -> Option<V> {
        let key = (self.key_fn)(item);
        self.cache.remove(&key)
    }

    pub fn remove_many<'k>(&mut self, keys: impl IntoIterator<Item = &'k K>)
    where
        K: 'k,
    {
        for key in keys {
            self.cache.remove(key);
        }
    }

    /// Removes every entry matching `predicate`; returns how many went.
    pub fn remove_where(&mut self, predicate: impl Fn(&K, &V) -> bool) -> usize {
        let doomed: Vec<K> = self
            .cache
            .iter()
            .filter(|(k, v)| predicate(k, v))
            .map(|(k, _)| k.clone())
            .collect();
        for key in &doomed {
            self.cache.remove(key);
        }
        doomed.len()
    }

    pub fn refresh(&mut self, key: &K) -> bool {
        self.cache.refresh(key)
    }

    pub fn clear(&mut self) {
        self.cache.clear();
    }

    pub fn lookup(&self, key: &K) -> Option<&V> {
        self.cache.lookup(key)
    }

    pub fn len(&self) -> usize {
        self.cache.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cache.is_empty()
    }
}

/// The owner of a keyed collection and the only way to mutate it.
///
/// Keys come from the selector given at construction. Adding an item whose
/// key is present publishes an `Update` carrying the replaced value; removing
/// an absent key publishes nothing. Dropping the cache disposes it.
pub struct SourceCache<K, V>
where
    K: Eq + Hash + Clone + 'static,
    V: Clone + 'static,
{
    store: Rc<Store<ChangeAwareCache<K, V>>>,
    key_fn: KeySelector<K, V>,
}

impl<K, V> SourceCache<K, V>
where
    K: Eq + Hash + Clone + 'static,
    V: Clone + 'static,
{
    /// Creates an empty cache keyed by `key_fn`.
    pub fn new<F>(key_fn: F) -> Self
    where
        F: Fn(&V) -> K + 'static,
    {
        Self {
            store: Store::new("SourceCache", ChangeAwareCache::new()),
            key_fn: Rc::new(key_fn),
        }
    }

    /// The live change stream: an `Add` per present key first, then one
    /// change set per mutation.
    pub fn connect(&self) -> Result<Observable<ChangeSet<K, V>>> {
        self.store.connect()
    }

    /// Applies several mutations as one change set.
    ///
    /// If `f` fails, every mutation it made is undone and nothing is published.
    pub fn edit<R>(&self, f: impl FnOnce(&mut CacheUpdater<'_, K, V>) -> Result<R>) -> Result<R> {
        let key_fn = Rc::clone(&self.key_fn);
        self.store.edit(move |cache| {
            let mut updater = CacheUpdater {
                cache,
                key_fn: key_fn.as_ref(),
            };
            f(&mut updater)
        })
    }

    pub fn add_or_update(&self, item: V) -> Result<()> {
        self.edit(|updater| {
            updater.add_or_update(item);
            Ok(())
        })
    }

    pub fn add_or_update_many(&self, items: impl IntoIterator<Item = V>) -> Result<()> {
        self.edit(|updater| {
            updater.add_or_update_many(items);
            Ok(())
        })
    }

    /// Removes `key`. Unknown keys are a no-op.
    pub fn remove(&self, key: &K) -> Result<Option<V>> {
        self.edit(|updater| Ok(updater.remove(key)))
    }

    pub fn remove_many(&self, keys: &[K]) -> Result<()> {
        self.edit(|updater| {
            updater.remove_many(keys);
            Ok(())
        })
    }

    /// Removes every entry matching `predicate`.
    pub fn remove_where(&self, predicate: impl Fn(&K, &V) -> bool) -> Result<usize> {
        self.edit(|updater| Ok(updater.remove_where(predicate)))
    }

    /// Publishes a `Refresh` for a present key.
    pub fn refresh(&self, key: &K) -> Result<bool> {
        self.edit(|updater| Ok(updater.refresh(key)))
    }

    pub fn clear(&self) -> Result<()> {
        self.edit(|updater| {
            updater.clear();
            Ok(())
        })
    }

    pub fn lookup(&self, key: &K) -> Option<V> {
        self.store.read(|cache| cache.lookup(key).cloned())
    }

    pub fn keys(&self) -> Vec<K> {
        self.store.read(|cache| cache.keys().cloned().collect())
    }

    pub fn items(&self) -> Vec<V> {
        self.store.read(|cache| cache.values().cloned().collect())
    }

    pub fn len(&self) -> usize {
        self.store.read(|cache| cache.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Changes of a single key, starting with its current value if present.
    pub fn watch(&self, key: K) -> Result<Observable<Change<K, V>>> {
        let source = self.connect()?;
        let key = Rc::new(key);
        Ok(Observable::create(move |observer| {
            let key = Rc::clone(&key);
            source.subscribe_observer(
                Relay::new(
                    observer,
                    move |changes: &ChangeSet<K, V>, downstream: &dyn Observer<Change<K, V>>| {
                        for change in changes.iter().filter(|c| c.key() == key.as_ref()) {
                            downstream.on_next(change);
                        }
                    },
                )
                .shared(),
            )
        }))
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

impl<K, V> Drop for SourceCache<K, V>
where
    K: Eq + Hash + Clone + 'static,
    V: Clone + 'static,
{
    fn drop(&mut self) {
        self.store.dispose();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core::cell::RefCell;
    use hashbrown::HashMap;
    use ripple_core::{ChangeReason, Error};

    #[derive(Clone, Debug, PartialEq)]
    struct Person {
        id: u32,
        name: &'static str,
    }

    fn person(id: u32, name: &'static str) -> Person {
        Person { id, name }
    }

    fn people() -> SourceCache<u32, Person> {
        SourceCache::new(|p: &Person| p.id)
    }

    fn record(
        cache: &SourceCache<u32, Person>,
    ) -> (Rc<RefCell<Vec<ChangeSet<u32, Person>>>>, crate::Subscription) {
        let received = Rc::new(RefCell::new(Vec::new()));
        let sink = received.clone();
        let sub = cache
            .connect()
            .unwrap()
            .subscribe(move |cs: &ChangeSet<u32, Person>| sink.borrow_mut().push(cs.clone()));
        (received, sub)
    }

    #[test]
    fn test_add_then_update_carries_previous() {
        let cache = people();
        let (received, _sub) = record(&cache);

        cache.add_or_update(person(1, "Ann")).unwrap();
        cache.add_or_update(person(1, "Anne")).unwrap();

        let received = received.borrow();
        assert_eq!(received.len(), 2);
        assert_eq!(received[0].as_slice()[0].reason(), ChangeReason::Add);
        let update = &received[1].as_slice()[0];
        assert_eq!(update.reason(), ChangeReason::Update);
        assert_eq!(update.previous(), Some(&person(1, "Ann")));
        assert_eq!(update.current(), &person(1, "Anne"));
    }

    #[test]
    fn test_remove_unknown_key_is_noop() {
        let cache = people();
        let (received, _sub) = record(&cache);
        assert_eq!(cache.remove(&42).unwrap(), None);
        assert!(received.borrow().is_empty());
    }

    #[test]
    fn test_remove_where_and_clear() {
        let cache = people();
        cache
            .add_or_update_many(vec![person(1, "a"), person(2, "b"), person(3, "c")])
            .unwrap();
        let (received, _sub) = record(&cache);

        assert_eq!(cache.remove_where(|k, _| k % 2 == 1).unwrap(), 2);
        assert_eq!(cache.keys(), vec![2]);
        cache.clear().unwrap();
        assert!(cache.is_empty());

        let received = received.borrow();
        assert_eq!(received.len(), 3);
        assert_eq!(received[1].removes(), 2);
        assert_eq!(received[2].removes(), 1);
    }

    #[test]
    fn test_replay_reproduces_state() {
        let cache = people();
        let replica = Rc::new(RefCell::new(HashMap::new()));
        let target = replica.clone();
        let _sub = cache
            .connect()
            .unwrap()
            .subscribe(move |cs: &ChangeSet<u32, Person>| cs.apply_to(&mut target.borrow_mut()));

        cache.add_or_update_many(vec![person(1, "a"), person(2, "b")]).unwrap();
        cache.add_or_update(person(2, "bb")).unwrap();
        cache.remove(&1).unwrap();
        cache.add_or_update(person(3, "c")).unwrap();

        let replica = replica.borrow();
        assert_eq!(replica.len(), cache.len());
        for key in cache.keys() {
            assert_eq!(replica.get(&key), cache.lookup(&key).as_ref());
        }
    }

    #[test]
    fn test_edit_rolls_back_on_error() {
        let cache = people();
        cache.add_or_update(person(1, "a")).unwrap();

        let result: Result<()> = cache.edit(|updater| {
            updater.add_or_update(person(1, "changed"));
            updater.add_or_update(person(2, "b"));
            Err(Error::argument("abort"))
        });

        assert!(result.is_err());
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.lookup(&1), Some(person(1, "a")));
    }

    #[test]
    fn test_watch_single_key() {
        let cache = people();
        cache.add_or_update(person(1, "a")).unwrap();
        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = seen.clone();
        let _sub = cache
            .watch(1)
            .unwrap()
            .subscribe(move |c: &Change<u32, Person>| sink.borrow_mut().push(c.reason()));

        cache.add_or_update(person(2, "b")).unwrap();
        cache.add_or_update(person(1, "aa")).unwrap();
        cache.remove(&1).unwrap();

        assert_eq!(
            *seen.borrow(),
            vec![ChangeReason::Add, ChangeReason::Update, ChangeReason::Remove]
        );
    }

    #[test]
    fn test_disposed_cache_rejects_connect() {
        let cache = people();
        cache.dispose();
        assert!(matches!(cache.connect(), Err(Error::Disposed("SourceCache"))));
        assert!(cache.add_or_update(person(1, "a")).is_err());
    }
}
