//! Property-based tests for ripple-core using proptest.

use hashbrown::HashMap;
use proptest::prelude::*;
use ripple_core::{ChangeAwareCache, ChangeAwareList, ChangeReason, ChangeSet};

#[derive(Clone, Debug)]
enum ListOp {
    Add(i32),
    Insert(usize, i32),
    RemoveAt(usize),
    Replace(usize, i32),
    Move(usize, usize),
    Refresh(usize),
    Clear,
}

fn list_op() -> impl Strategy<Value = ListOp> {
    prop_oneof![
        4 => any::<i32>().prop_map(ListOp::Add),
        2 => (0usize..20, any::<i32>()).prop_map(|(i, v)| ListOp::Insert(i, v)),
        2 => (0usize..20).prop_map(ListOp::RemoveAt),
        2 => (0usize..20, any::<i32>()).prop_map(|(i, v)| ListOp::Replace(i, v)),
        2 => (0usize..20, 0usize..20).prop_map(|(a, b)| ListOp::Move(a, b)),
        1 => (0usize..20).prop_map(ListOp::Refresh),
        1 => Just(ListOp::Clear),
    ]
}

fn run(list: &mut ChangeAwareList<i32>, op: &ListOp) {
    // Out-of-range operations fail without touching the list.
    let _ = match *op {
        ListOp::Add(v) => {
            list.add(v);
            Ok(())
        }
        ListOp::Insert(i, v) => list.insert(i, v),
        ListOp::RemoveAt(i) => list.remove_at(i).map(|_| ()),
        ListOp::Replace(i, v) => list.replace_at(i, v).map(|_| ()),
        ListOp::Move(a, b) => list.move_item(a, b),
        ListOp::Refresh(i) => list.refresh_at(i),
        ListOp::Clear => {
            list.clear();
            Ok(())
        }
    };
}

#[derive(Clone, Debug)]
enum CacheOp {
    Upsert(u8, i32),
    Remove(u8),
    Refresh(u8),
    Clear,
}

fn cache_op() -> impl Strategy<Value = CacheOp> {
    prop_oneof![
        5 => (0u8..16, any::<i32>()).prop_map(|(k, v)| CacheOp::Upsert(k, v)),
        3 => (0u8..16).prop_map(CacheOp::Remove),
        1 => (0u8..16).prop_map(CacheOp::Refresh),
        1 => Just(CacheOp::Clear),
    ]
}

fn run_cache(cache: &mut ChangeAwareCache<u8, i32>, op: &CacheOp) {
    match *op {
        CacheOp::Upsert(k, v) => {
            cache.add_or_update(k, v);
        }
        CacheOp::Remove(k) => {
            cache.remove(&k);
        }
        CacheOp::Refresh(k) => {
            cache.refresh(&k);
        }
        CacheOp::Clear => cache.clear(),
    }
}

fn snapshot(cache: &ChangeAwareCache<u8, i32>) -> HashMap<u8, i32> {
    cache.iter().map(|(k, v)| (*k, *v)).collect()
}

proptest! {
    /// Replaying every captured change set rebuilds the list.
    #[test]
    fn list_changes_replay_to_same_state(
        batches in prop::collection::vec(prop::collection::vec(list_op(), 0..8), 1..12)
    ) {
        let mut list = ChangeAwareList::new();
        let mut replay = Vec::new();
        for batch in &batches {
            for op in batch {
                run(&mut list, op);
            }
            list.capture_changes().apply_to(&mut replay).unwrap();
        }
        prop_assert_eq!(replay.as_slice(), list.as_slice());
    }

    /// Rolling back restores the state of the last capture.
    #[test]
    fn list_rollback_restores_captured_state(
        setup in prop::collection::vec(list_op(), 0..10),
        discarded in prop::collection::vec(list_op(), 0..10)
    ) {
        let mut list = ChangeAwareList::new();
        for op in &setup {
            run(&mut list, op);
        }
        list.capture_changes();
        let before = list.as_slice().to_vec();
        for op in &discarded {
            run(&mut list, op);
        }
        list.rollback();
        prop_assert_eq!(list.as_slice(), before.as_slice());
        prop_assert!(!list.has_pending());
    }

    /// Replaying every captured keyed change set rebuilds the cache.
    #[test]
    fn cache_changes_replay_to_same_state(
        batches in prop::collection::vec(prop::collection::vec(cache_op(), 0..8), 1..12)
    ) {
        let mut cache = ChangeAwareCache::new();
        let mut replay = HashMap::new();
        for batch in &batches {
            for op in batch {
                run_cache(&mut cache, op);
            }
            cache.capture_changes().apply_to(&mut replay);
        }
        prop_assert_eq!(replay, snapshot(&cache));
    }

    /// A key is added at most once until it is removed again.
    #[test]
    fn cache_adds_alternate_with_removes(ops in prop::collection::vec(cache_op(), 0..60)) {
        let mut cache = ChangeAwareCache::new();
        let mut history = ChangeSet::new();
        for op in &ops {
            run_cache(&mut cache, op);
            history.extend(cache.capture_changes());
        }
        let mut present: HashMap<u8, bool> = HashMap::new();
        for change in &history {
            let live = present.entry(*change.key()).or_insert(false);
            match change.reason() {
                ChangeReason::Add => {
                    prop_assert!(!*live, "second add for key {}", change.key());
                    *live = true;
                }
                ChangeReason::Remove => {
                    prop_assert!(*live, "remove of absent key {}", change.key());
                    *live = false;
                }
                ChangeReason::Update | ChangeReason::Refresh => prop_assert!(*live),
            }
        }
    }
}
