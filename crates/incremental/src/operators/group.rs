//! Dynamic grouping.
//!
//! Each group owns a `Subject` feeding a read-only nested view. A group is
//! created with its first member and destroyed with its last; destroyed
//! groups have their subject completed after the group-level `Remove` has
//! been delivered.
//!
//! Delivery order for one upstream change set:
//! 1. member change sets, one per touched group
//! 2. the group-level change set
//! 3. completion of destroyed groups

use crate::stream::{emit, ChangeSetLike};
use core::cell::RefCell;
use core::fmt;
use core::hash::Hash;
use hashbrown::HashMap;
use ripple_core::{check_index, check_insert_index, check_range, Change, ChangeReason, ChangeSet, Error, ListChange, ListChangeSet, Result};
use ripple_reactive::{Observable, ObservableCache, ObservableList, Observer, Relay, Subject};
use std::rc::Rc;
use tracing::trace;

/// A group of list items sharing a key.
pub struct ListGroup<T: Clone + 'static, G> {
    key: G,
    list: ObservableList<T>,
}

impl<T: Clone + 'static, G> ListGroup<T, G> {
    #[inline]
    pub fn key(&self) -> &G {
        &self.key
    }

    /// The members, in upstream order.
    #[inline]
    pub fn list(&self) -> &ObservableList<T> {
        &self.list
    }
}

impl<T: Clone + 'static, G: Clone> Clone for ListGroup<T, G> {
    fn clone(&self) -> Self {
        Self {
            key: self.key.clone(),
            list: self.list.clone(),
        }
    }
}

impl<T: Clone + fmt::Debug + 'static, G: fmt::Debug> fmt::Debug for ListGroup<T, G> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ListGroup")
            .field("key", &self.key)
            .field("list", &self.list)
            .finish()
    }
}

/// A group of cache entries sharing a key.
pub struct Group<K, V, G>
where
    K: Eq + Hash + Clone + 'static,
    V: Clone + 'static,
{
    key: G,
    cache: ObservableCache<K, V>,
}

impl<K, V, G> Group<K, V, G>
where
    K: Eq + Hash + Clone + 'static,
    V: Clone + 'static,
{
    #[inline]
    pub fn key(&self) -> &G {
        &self.key
    }

    #[inline]
    pub fn cache(&self) -> &ObservableCache<K, V> {
        &self.cache
    }
}

impl<K, V, G> Clone for Group<K, V, G>
where
    K: Eq + Hash + Clone + 'static,
    V: Clone + 'static,
    G: Clone,
{
    fn clone(&self) -> Self {
        Self {
            key: self.key.clone(),
            cache: self.cache.clone(),
        }
    }
}

impl<K, V, G> fmt::Debug for Group<K, V, G>
where
    K: Eq + Hash + Clone + fmt::Debug + 'static,
    V: Clone + 'static,
    G: fmt::Debug,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Group")
            .field("key", &self.key)
            .field("cache", &self.cache)
            .finish()
    }
}

/// Side effects of one processing step, delivered after the state borrow
/// is released.
struct Outcome<C, O> {
    members: Vec<(u64, Subject<C>, C)>,
    groups: O,
    retired: Vec<Subject<C>>,
    errors: Vec<Error>,
}

impl<C, O> Outcome<C, O>
where
    C: Default + ChangeSetLike + 'static,
    O: Default + ChangeSetLike,
{
    fn new() -> Self {
        Self {
            members: Vec::new(),
            groups: O::default(),
            retired: Vec::new(),
            errors: Vec::new(),
        }
    }

    /// The pending member change set of group `id`.
    fn members_of(&mut self, id: u64, subject: &Subject<C>) -> &mut C {
        let at = match self.members.iter().position(|(group, _, _)| *group == id) {
            Some(at) => at,
            None => {
                self.members.push((id, subject.clone(), C::default()));
                self.members.len() - 1
            }
        };
        &mut self.members[at].2
    }

    fn deliver(self, downstream: &dyn Observer<O>) {
        for (_, subject, changes) in &self.members {
            if !changes.is_empty() {
                subject.next(changes);
            }
        }
        emit(downstream, self.groups, self.errors);
        for subject in self.retired {
            subject.complete();
        }
    }
}

trait Grouper {
    type Input;
    type Members: Default + ChangeSetLike + 'static;
    type Groups: Default + ChangeSetLike + 'static;

    fn process(&mut self, changes: &Self::Input) -> Outcome<Self::Members, Self::Groups>;

    /// Hands back every live group's subject, leaving no groups behind.
    fn retire(&mut self) -> Vec<Subject<Self::Members>>;
}

fn drive<S, N>(source: &Observable<S::Input>, init: N) -> Observable<S::Groups>
where
    S: Grouper + 'static,
    S::Input: 'static,
    N: Fn() -> S + 'static,
{
    let source = source.clone();
    Observable::create(move |observer| {
        let state = Rc::new(RefCell::new(init()));
        let on_complete = Rc::clone(&state);
        source.subscribe_observer(
            Relay::new(observer, move |changes: &S::Input, downstream: &dyn Observer<S::Groups>| {
                let outcome = state.borrow_mut().process(changes);
                outcome.deliver(downstream);
            })
            .with_completed(move |downstream| {
                let retired = on_complete.borrow_mut().retire();
                trace!(groups = retired.len(), "completing groups");
                for subject in retired {
                    subject.complete();
                }
                downstream.on_completed();
            })
            .shared(),
        )
    })
}

struct ListSlot<T: Clone + 'static, G> {
    id: u64,
    subject: Subject<ListChangeSet<T>>,
    group: ListGroup<T, G>,
    len: usize,
}

/// Group state for list streams. Groups are ordered by creation.
struct ListGrouper<T: Clone + 'static, G> {
    selector: Rc<dyn Fn(&T) -> G>,
    upstream: Vec<(G, T)>,
    groups: Vec<ListSlot<T, G>>,
    next_id: u64,
}

type ListOutcome<T, G> = Outcome<ListChangeSet<T>, ListChangeSet<ListGroup<T, G>>>;

impl<T, G> ListGrouper<T, G>
where
    T: Clone + 'static,
    G: Eq + Clone + 'static,
{
    fn new(selector: Rc<dyn Fn(&T) -> G>) -> Self {
        Self {
            selector,
            upstream: Vec::new(),
            groups: Vec::new(),
            next_id: 0,
        }
    }

    /// Position inside group `key` of the upstream item at `index`.
    fn member_index(&self, index: usize, key: &G) -> usize {
        self.upstream[..index].iter().filter(|(g, _)| g == key).count()
    }

    fn join(&mut self, key: G, item: T, index: usize, out: &mut ListOutcome<T, G>) {
        let at = match self.groups.iter().position(|slot| slot.group.key == key) {
            Some(at) => at,
            None => {
                let subject = Subject::new();
                let group = ListGroup {
                    key,
                    list: ObservableList::new(&subject.as_observable()),
                };
                out.groups.push(ListChange::Add {
                    item: group.clone(),
                    index: self.groups.len(),
                });
                self.groups.push(ListSlot {
                    id: self.next_id,
                    subject,
                    group,
                    len: 0,
                });
                self.next_id += 1;
                self.groups.len() - 1
            }
        };
        let slot = &mut self.groups[at];
        slot.len += 1;
        out.members_of(slot.id, &slot.subject).push(ListChange::Add { item, index });
    }

    fn leave(&mut self, key: &G, item: T, index: usize, out: &mut ListOutcome<T, G>) {
        let Some(at) = self.groups.iter().position(|slot| slot.group.key == *key) else {
            return;
        };
        let slot = &mut self.groups[at];
        slot.len -= 1;
        out.members_of(slot.id, &slot.subject).push(ListChange::Remove { item, index });
        if slot.len == 0 {
            let slot = self.groups.remove(at);
            out.groups.push(ListChange::Remove {
                item: slot.group,
                index: at,
            });
            out.retired.push(slot.subject);
        }
    }

    /// Puts `item` at upstream `index`, moving it between groups if its key
    /// changed. `replaced` distinguishes a value replacement from a refresh.
    fn rekey(&mut self, item: &T, index: usize, replaced: bool, out: &mut ListOutcome<T, G>) -> Result<()> {
        check_index(index, self.upstream.len())?;
        let key = (self.selector)(item);
        let (old_key, old_item) = core::mem::replace(&mut self.upstream[index], (key.clone(), item.clone()));
        if old_key == key {
            let member = self.member_index(index, &key);
            let change = if replaced {
                ListChange::Replace {
                    current: item.clone(),
                    previous: old_item,
                    index: member,
                }
            } else {
                ListChange::Refresh {
                    item: item.clone(),
                    index: member,
                }
            };
            if let Some(slot) = self.groups.iter().find(|slot| slot.group.key == key) {
                out.members_of(slot.id, &slot.subject).push(change);
            }
        } else {
            let member = self.member_index(index, &old_key);
            self.leave(&old_key, old_item, member, out);
            let member = self.member_index(index, &key);
            self.join(key, item.clone(), member, out);
        }
        Ok(())
    }

    fn remove_at(&mut self, index: usize, out: &mut ListOutcome<T, G>) {
        let (key, item) = self.upstream.remove(index);
        let member = self.member_index(index, &key);
        self.leave(&key, item, member, out);
    }

    fn apply(&mut self, change: &ListChange<T>, out: &mut ListOutcome<T, G>) -> Result<()> {
        match change {
            ListChange::Add { item, index } => {
                check_insert_index(*index, self.upstream.len())?;
                self.insert_at(item, *index, out);
            }
            ListChange::AddRange { items, index } => {
                check_insert_index(*index, self.upstream.len())?;
                for (offset, item) in items.iter().enumerate() {
                    self.insert_at(item, *index + offset, out);
                }
            }
            ListChange::Replace { current, index, .. } => self.rekey(current, *index, true, out)?,
            ListChange::Refresh { item, index } => self.rekey(item, *index, false, out)?,
            ListChange::Remove { index, .. } => {
                check_index(*index, self.upstream.len())?;
                self.remove_at(*index, out);
            }
            ListChange::RemoveRange { items, index } => {
                check_range(*index, items.len(), self.upstream.len())?;
                for _ in 0..items.len() {
                    self.remove_at(*index, out);
                }
            }
            ListChange::Moved {
                current_index,
                previous_index,
                ..
            } => {
                check_index(*previous_index, self.upstream.len())?;
                check_index(*current_index, self.upstream.len())?;
                let (key, item) = self.upstream.remove(*previous_index);
                let before = self.member_index(*previous_index, &key);
                self.upstream.insert(*current_index, (key.clone(), item.clone()));
                let after = self.member_index(*current_index, &key);
                if before != after {
                    if let Some(slot) = self.groups.iter().find(|slot| slot.group.key == key) {
                        out.members_of(slot.id, &slot.subject).push(ListChange::Moved {
                            item,
                            current_index: after,
                            previous_index: before,
                        });
                    }
                }
            }
            ListChange::Clear { .. } => {
                let upstream = core::mem::take(&mut self.upstream);
                let slots = core::mem::take(&mut self.groups);
                if slots.is_empty() {
                    return Ok(());
                }
                for slot in &slots {
                    let items = upstream
                        .iter()
                        .filter(|(g, _)| *g == slot.group.key)
                        .map(|(_, item)| item.clone())
                        .collect();
                    out.members_of(slot.id, &slot.subject).push(ListChange::Clear { items });
                }
                let mut groups = Vec::with_capacity(slots.len());
                for slot in slots {
                    groups.push(slot.group);
                    out.retired.push(slot.subject);
                }
                out.groups.push(ListChange::Clear { items: groups });
            }
        }
        Ok(())
    }

    fn insert_at(&mut self, item: &T, index: usize, out: &mut ListOutcome<T, G>) {
        let key = (self.selector)(item);
        let member = self.member_index(index, &key);
        self.upstream.insert(index, (key.clone(), item.clone()));
        self.join(key, item.clone(), member, out);
    }
}

impl<T, G> Grouper for ListGrouper<T, G>
where
    T: Clone + 'static,
    G: Eq + Clone + 'static,
{
    type Input = ListChangeSet<T>;
    type Members = ListChangeSet<T>;
    type Groups = ListChangeSet<ListGroup<T, G>>;

    fn process(&mut self, changes: &ListChangeSet<T>) -> ListOutcome<T, G> {
        let mut out = Outcome::new();
        for change in changes {
            if let Err(err) = self.apply(change, &mut out) {
                out.errors.push(err);
            }
        }
        out
    }

    fn retire(&mut self) -> Vec<Subject<ListChangeSet<T>>> {
        self.upstream.clear();
        self.groups.drain(..).map(|slot| slot.subject).collect()
    }
}

struct CacheSlot<K, V, G>
where
    K: Eq + Hash + Clone + 'static,
    V: Clone + 'static,
{
    id: u64,
    subject: Subject<ChangeSet<K, V>>,
    group: Group<K, V, G>,
    len: usize,
}

/// Group state for keyed streams.
struct CacheGrouper<K, V, G>
where
    K: Eq + Hash + Clone + 'static,
    V: Clone + 'static,
{
    selector: Rc<dyn Fn(&V) -> G>,
    keys: HashMap<K, G>,
    groups: HashMap<G, CacheSlot<K, V, G>>,
    next_id: u64,
}

type CacheOutcome<K, V, G> = Outcome<ChangeSet<K, V>, ChangeSet<G, Group<K, V, G>>>;

impl<K, V, G> CacheGrouper<K, V, G>
where
    K: Eq + Hash + Clone + 'static,
    V: Clone + 'static,
    G: Eq + Hash + Clone + 'static,
{
    fn new(selector: Rc<dyn Fn(&V) -> G>) -> Self {
        Self {
            selector,
            keys: HashMap::new(),
            groups: HashMap::new(),
            next_id: 0,
        }
    }

    fn join(&mut self, group_key: G, change: Change<K, V>, out: &mut CacheOutcome<K, V, G>) {
        let next_id = &mut self.next_id;
        let slot = self.groups.entry(group_key.clone()).or_insert_with(|| {
            let subject = Subject::new();
            let group = Group {
                key: group_key.clone(),
                cache: ObservableCache::new(&subject.as_observable()),
            };
            out.groups.push(Change::add(group_key.clone(), group.clone()));
            let id = *next_id;
            *next_id += 1;
            CacheSlot {
                id,
                subject,
                group,
                len: 0,
            }
        });
        slot.len += 1;
        out.members_of(slot.id, &slot.subject).push(change);
    }

    fn leave(&mut self, group_key: &G, change: Change<K, V>, out: &mut CacheOutcome<K, V, G>) {
        let Some(slot) = self.groups.get_mut(group_key) else {
            return;
        };
        slot.len -= 1;
        out.members_of(slot.id, &slot.subject).push(change);
        if slot.len == 0 {
            if let Some(slot) = self.groups.remove(group_key) {
                out.groups.push(Change::remove(group_key.clone(), slot.group));
                out.retired.push(slot.subject);
            }
        }
    }

    fn forward(&mut self, group_key: &G, change: Change<K, V>, out: &mut CacheOutcome<K, V, G>) {
        if let Some(slot) = self.groups.get(group_key) {
            out.members_of(slot.id, &slot.subject).push(change);
        }
    }
}

impl<K, V, G> Grouper for CacheGrouper<K, V, G>
where
    K: Eq + Hash + Clone + 'static,
    V: Clone + 'static,
    G: Eq + Hash + Clone + 'static,
{
    type Input = ChangeSet<K, V>;
    type Members = ChangeSet<K, V>;
    type Groups = ChangeSet<G, Group<K, V, G>>;

    fn process(&mut self, changes: &ChangeSet<K, V>) -> CacheOutcome<K, V, G> {
        let mut out = Outcome::new();
        for change in changes {
            let key = change.key().clone();
            let current = change.current().clone();
            match change.reason() {
                ChangeReason::Add | ChangeReason::Update | ChangeReason::Refresh => {
                    let group_key = (self.selector)(&current);
                    let refresh = change.reason() == ChangeReason::Refresh;
                    match self.keys.insert(key.clone(), group_key.clone()) {
                        None if refresh => {
                            self.keys.remove(&key);
                        }
                        None => self.join(group_key, Change::add(key, current), &mut out),
                        Some(previous_key) if previous_key == group_key => {
                            let member = if refresh {
                                Change::refresh(key, current)
                            } else {
                                let previous = change.previous().cloned().unwrap_or_else(|| current.clone());
                                Change::update(key, current, previous)
                            };
                            self.forward(&group_key, member, &mut out);
                        }
                        Some(previous_key) => {
                            let previous = change.previous().cloned().unwrap_or_else(|| current.clone());
                            self.leave(&previous_key, Change::remove(key.clone(), previous), &mut out);
                            self.join(group_key, Change::add(key, current), &mut out);
                        }
                    }
                }
                ChangeReason::Remove => {
                    if let Some(group_key) = self.keys.remove(&key) {
                        self.leave(&group_key, Change::remove(key, current), &mut out);
                    }
                }
            }
        }
        out
    }

    fn retire(&mut self) -> Vec<Subject<ChangeSet<K, V>>> {
        self.keys.clear();
        self.groups.drain().map(|(_, slot)| slot.subject).collect()
    }
}

/// Groups list items by `selector`.
pub(crate) fn group_list<T, G>(
    source: &Observable<ListChangeSet<T>>,
    selector: Rc<dyn Fn(&T) -> G>,
) -> Observable<ListChangeSet<ListGroup<T, G>>>
where
    T: Clone + 'static,
    G: Eq + Clone + 'static,
{
    drive(source, move || ListGrouper::new(Rc::clone(&selector)))
}

/// Groups cache entries by `selector`.
pub(crate) fn group_cache<K, V, G>(
    source: &Observable<ChangeSet<K, V>>,
    selector: Rc<dyn Fn(&V) -> G>,
) -> Observable<ChangeSet<G, Group<K, V, G>>>
where
    K: Eq + Hash + Clone + 'static,
    V: Clone + 'static,
    G: Eq + Hash + Clone + 'static,
{
    drive(source, move || CacheGrouper::new(Rc::clone(&selector)))
}
