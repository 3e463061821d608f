//! Property-based tests for the source containers using proptest.

use hashbrown::HashMap;
use proptest::prelude::*;
use ripple_reactive::{
    ChangeReason, ChangeSet, ListChange, ListChangeSet, ObservableCache, ObservableList, SourceCache, SourceList, Subscription,
};
use std::cell::RefCell;
use std::rc::Rc;

#[derive(Clone, Debug)]
enum ListOp {
    AddRange(Vec<i16>),
    Insert(usize, i16),
    RemoveAt(usize),
    RemoveRange(usize, usize),
    Move(usize, usize),
    Replace(usize, i16),
    Clear,
}

fn list_op() -> impl Strategy<Value = ListOp> {
    prop_oneof![
        3 => prop::collection::vec(any::<i16>(), 0..5).prop_map(ListOp::AddRange),
        2 => (0usize..12, any::<i16>()).prop_map(|(i, v)| ListOp::Insert(i, v)),
        2 => (0usize..12).prop_map(ListOp::RemoveAt),
        1 => (0usize..12, 0usize..4).prop_map(|(i, n)| ListOp::RemoveRange(i, n)),
        2 => (0usize..12, 0usize..12).prop_map(|(a, b)| ListOp::Move(a, b)),
        2 => (0usize..12, any::<i16>()).prop_map(|(i, v)| ListOp::Replace(i, v)),
        1 => Just(ListOp::Clear),
    ]
}

fn run(source: &SourceList<i16>, op: &ListOp) {
    // Rejected operations publish nothing.
    let _ = match op {
        ListOp::AddRange(items) => source.add_range(items.clone()),
        ListOp::Insert(i, v) => source.insert(*i, *v),
        ListOp::RemoveAt(i) => source.remove_at(*i).map(|_| ()),
        ListOp::RemoveRange(i, n) => source.remove_range(*i, *n),
        ListOp::Move(a, b) => source.move_item(*a, *b),
        ListOp::Replace(i, v) => source.replace_at(*i, *v).map(|_| ()),
        ListOp::Clear => source.clear(),
    };
}

/// Connects an observer that replays every change set onto its own copy.
fn replay(source: &SourceList<i16>) -> (Rc<RefCell<Vec<i16>>>, Subscription) {
    let copy = Rc::new(RefCell::new(Vec::new()));
    let sink = copy.clone();
    let sub = source
        .connect()
        .unwrap()
        .subscribe(move |cs: &ListChangeSet<i16>| cs.apply_to(&mut sink.borrow_mut()).unwrap());
    (copy, sub)
}

/// Observers that mutate the list they are notified by.
///
/// Every added multiple of four adds its quarter, and every removed odd item
/// takes the head of the list with it. Both chains are finite.
fn reentrant_mutators(source: &Rc<SourceList<i16>>) -> (Subscription, Subscription) {
    let weak = Rc::downgrade(source);
    let quarters = source.connect().unwrap().subscribe(move |cs: &ListChangeSet<i16>| {
        let Some(source) = weak.upgrade() else { return };
        let added: Vec<i16> = cs
            .iter()
            .flat_map(|change| match change {
                ListChange::Add { item, .. } => vec![*item],
                ListChange::AddRange { items, .. } => items.clone(),
                _ => Vec::new(),
            })
            .filter(|item| *item != 0 && item % 4 == 0)
            .map(|item| item / 4)
            .collect();
        if !added.is_empty() {
            source.add_range(added).unwrap();
        }
    });
    let weak = Rc::downgrade(source);
    let heads = source.connect().unwrap().subscribe(move |cs: &ListChangeSet<i16>| {
        let Some(source) = weak.upgrade() else { return };
        let removed_odd = cs
            .iter()
            .any(|change| matches!(change, ListChange::Remove { item, .. } if item % 2 != 0));
        if removed_odd && !source.is_empty() {
            source.remove_at(0).unwrap();
        }
    });
    (quarters, heads)
}

proptest! {
    /// Every observer sees nested change sets in production order, even when
    /// other observers mutate the list from inside their callbacks.
    #[test]
    fn reentrant_mutations_keep_every_replay_in_sync(ops in prop::collection::vec(list_op(), 0..40)) {
        let source = Rc::new(SourceList::new());
        let (first, _first) = replay(&source);
        let _mutators = reentrant_mutators(&source);
        let (second, _second) = replay(&source);
        let view = ObservableList::new(&source.connect().unwrap());
        let (third, _third) = replay(&source);

        for op in &ops {
            run(&source, op);
            let items = source.items();
            prop_assert_eq!(&*first.borrow(), &items);
            prop_assert_eq!(&*second.borrow(), &items);
            prop_assert_eq!(&*third.borrow(), &items);
            prop_assert_eq!(view.items(), items);
        }
    }

    /// The emitted history of a list rebuilds its current items.
    #[test]
    fn list_history_round_trips(ops in prop::collection::vec(list_op(), 0..40)) {
        let source = SourceList::new();
        let replay = Rc::new(RefCell::new(Vec::new()));
        let sink = replay.clone();
        let _sub = source
            .connect()
            .unwrap()
            .subscribe(move |cs: &ListChangeSet<i16>| cs.apply_to(&mut sink.borrow_mut()).unwrap());
        let view = ObservableList::new(&source.connect().unwrap());

        for op in &ops {
            run(&source, op);
        }
        prop_assert_eq!(&*replay.borrow(), &source.items());
        prop_assert_eq!(view.items(), source.items());
    }

    /// A late subscriber sees the same state as an early one.
    #[test]
    fn late_subscriber_sees_current_items(ops in prop::collection::vec(list_op(), 0..30)) {
        let source = SourceList::new();
        for op in &ops {
            run(&source, op);
        }
        let view = ObservableList::new(&source.connect().unwrap());
        prop_assert_eq!(view.items(), source.items());
    }

    /// Keyed history never adds a live key twice and rebuilds the cache.
    #[test]
    fn cache_history_is_keyed_and_round_trips(
        ops in prop::collection::vec((0u8..3, 0u8..12, any::<i32>()), 0..60)
    ) {
        let source = SourceCache::new(|v: &(u8, i32)| v.0);
        let history = Rc::new(RefCell::new(Vec::new()));
        let sink = history.clone();
        let _sub = source
            .connect()
            .unwrap()
            .subscribe(move |cs: &ChangeSet<u8, (u8, i32)>| sink.borrow_mut().extend(cs.iter().cloned()));
        let view = ObservableCache::new(&source.connect().unwrap());

        for (kind, key, value) in &ops {
            match kind {
                0 | 1 => source.add_or_update((*key, *value)).unwrap(),
                _ => {
                    source.remove(key).unwrap();
                }
            }
        }

        let mut live: HashMap<u8, (u8, i32)> = HashMap::new();
        for change in history.borrow().iter() {
            match change.reason() {
                ChangeReason::Add => {
                    prop_assert!(!live.contains_key(change.key()));
                    live.insert(*change.key(), change.current().clone());
                }
                ChangeReason::Update => {
                    prop_assert!(live.contains_key(change.key()));
                    live.insert(*change.key(), change.current().clone());
                }
                ChangeReason::Remove => {
                    prop_assert!(live.remove(change.key()).is_some());
                }
                ChangeReason::Refresh => {}
            }
        }
        let mut expected = source.items();
        expected.sort();
        let mut replayed: Vec<(u8, i32)> = live.into_values().collect();
        replayed.sort();
        prop_assert_eq!(&replayed, &expected);
        let mut materialized = view.items();
        materialized.sort();
        prop_assert_eq!(materialized, expected);
    }
}
