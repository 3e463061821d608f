//! N-ary combination of keyed streams.
//!
//! Every source keeps its own mirror of the keys it currently holds. A
//! change from source `i` touches one key, so only that key's membership
//! and visible value are re-evaluated.
//!
//! The output tracks `(value, owner)` per visible key, where the owner is
//! the index of the source whose value is shown. Downstream `Update`s are
//! emitted when the owner changes or when the owner itself updates the key.

use crate::stream::emit;
use core::cell::{Cell, RefCell};
use core::hash::Hash;
use hashbrown::HashMap;
use ripple_core::{Change, ChangeReason, ChangeSet};
use ripple_reactive::{Observable, Observer, Relay, Subscription};
use std::rc::Rc;
use tracing::trace;

/// Set operation applied to key membership.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CombineOperator {
    /// Present in every source.
    And,
    /// Present in at least one source.
    Or,
    /// Present in exactly one source.
    Xor,
    /// Present in the first source and absent from all others.
    Except,
}

/// How the visible owner of a key is chosen.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum CombineRule {
    /// Membership by set operation; the lowest-index holder is shown.
    Set(CombineOperator),
    /// The highest-index holder is shown.
    Priority,
    /// The most recent writer is shown; when it drops the key, the
    /// highest-index remaining holder takes over.
    MostRecent,
}

pub(crate) struct Combiner<K, V> {
    rule: CombineRule,
    sources: Vec<HashMap<K, V>>,
    emitted: HashMap<K, (V, usize)>,
}

impl<K, V> Combiner<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    pub fn new(rule: CombineRule, sources: usize) -> Self {
        Self {
            rule,
            sources: (0..sources).map(|_| HashMap::new()).collect(),
            emitted: HashMap::new(),
        }
    }

    fn holders<'a>(&'a self, key: &'a K) -> impl DoubleEndedIterator<Item = usize> + 'a {
        self.sources
            .iter()
            .enumerate()
            .filter(move |(_, source)| source.contains_key(key))
            .map(|(index, _)| index)
    }

    fn is_member(&self, operator: CombineOperator, key: &K) -> bool {
        match operator {
            CombineOperator::And => self.sources.iter().all(|s| s.contains_key(key)),
            CombineOperator::Or => self.sources.iter().any(|s| s.contains_key(key)),
            CombineOperator::Xor => self.holders(key).count() == 1,
            CombineOperator::Except => {
                self.sources.first().is_some_and(|s| s.contains_key(key))
                    && !self.sources.iter().skip(1).any(|s| s.contains_key(key))
            }
        }
    }

    /// The owner of `key` after `source` applied a change of `reason`.
    fn owner(&self, key: &K, source: usize, reason: ChangeReason) -> Option<usize> {
        match self.rule {
            CombineRule::Set(operator) => {
                if self.is_member(operator, key) {
                    self.holders(key).next()
                } else {
                    None
                }
            }
            CombineRule::Priority => self.holders(key).next_back(),
            CombineRule::MostRecent => {
                let writes = matches!(reason, ChangeReason::Add | ChangeReason::Update);
                if writes && self.sources[source].contains_key(key) {
                    return Some(source);
                }
                match self.emitted.get(key) {
                    Some((_, owner)) if self.sources[*owner].contains_key(key) => Some(*owner),
                    _ => self.holders(key).next_back(),
                }
            }
        }
    }

    pub fn process(&mut self, source: usize, changes: &ChangeSet<K, V>) -> ChangeSet<K, V> {
        let mut out = ChangeSet::new();
        for change in changes {
            let key = change.key();
            let reason = change.reason();
            match reason {
                ChangeReason::Add | ChangeReason::Update => {
                    self.sources[source].insert(key.clone(), change.current().clone());
                }
                ChangeReason::Remove => {
                    self.sources[source].remove(key);
                }
                ChangeReason::Refresh => {}
            }

            let owner = self.owner(key, source, reason);
            let previous = self.emitted.get(key).map(|(_, owner)| *owner);
            match (previous, owner) {
                (None, None) => {}
                (None, Some(owner)) => {
                    if let Some(value) = self.sources[owner].get(key) {
                        out.push(Change::add(key.clone(), value.clone()));
                        self.emitted.insert(key.clone(), (value.clone(), owner));
                    }
                }
                (Some(_), None) => {
                    if let Some((value, _)) = self.emitted.remove(key) {
                        out.push(Change::remove(key.clone(), value));
                    }
                }
                (Some(previous), Some(owner)) => {
                    let Some(current) = self.sources[owner].get(key).cloned() else {
                        continue;
                    };
                    let rewritten = owner == source && reason != ChangeReason::Refresh;
                    if previous != owner || rewritten {
                        if let Some((shown, _)) = self.emitted.insert(key.clone(), (current.clone(), owner)) {
                            out.push(Change::update(key.clone(), current, shown));
                        }
                    } else if owner == source && reason == ChangeReason::Refresh {
                        out.push(Change::refresh(key.clone(), current));
                    }
                }
            }
        }
        out
    }
}

/// Subscribes to every source and combines them under `rule`.
///
/// The output completes once every source has completed.
pub(crate) fn combine_streams<K, V>(sources: Vec<Observable<ChangeSet<K, V>>>, rule: CombineRule) -> Observable<ChangeSet<K, V>>
where
    K: Eq + Hash + Clone + 'static,
    V: Clone + 'static,
{
    Observable::create(move |observer| {
        if sources.is_empty() {
            observer.on_completed();
            return Subscription::empty();
        }
        trace!(sources = sources.len(), ?rule, "combining keyed streams");
        let state = Rc::new(RefCell::new(Combiner::new(rule, sources.len())));
        let remaining = Rc::new(Cell::new(sources.len()));
        let mut subscription = Subscription::empty();
        for (index, source) in sources.iter().enumerate() {
            let state = Rc::clone(&state);
            let remaining = Rc::clone(&remaining);
            subscription.add(
                source.subscribe_observer(
                    Relay::new(observer.clone(), move |changes: &ChangeSet<K, V>, downstream: &dyn Observer<ChangeSet<K, V>>| {
                        let out = state.borrow_mut().process(index, changes);
                        emit(downstream, out, Vec::new());
                    })
                    .with_completed(move |downstream| {
                        remaining.set(remaining.get() - 1);
                        if remaining.get() == 0 {
                            downstream.on_completed();
                        }
                    })
                    .shared(),
                ),
            );
        }
        subscription
    })
}
