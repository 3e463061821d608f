//! End-to-end scenarios across sources, operators and materialized views.

use futures::channel::oneshot;
use futures::executor::LocalPool;
use ripple_incremental::prelude::*;
use ripple_incremental::{CancellationToken, Disposable, ListGroup};
use ripple_reactive::{Change, ChangeReason, ChangeSet, ListChange, ListChangeSet, SourceCache, SourceList};
use std::cell::{Cell, RefCell};
use std::rc::Rc;

#[derive(Clone, Debug, PartialEq)]
struct Person {
    id: u32,
    name: String,
}

impl Person {
    fn new(id: u32, name: &str) -> Self {
        Self {
            id,
            name: name.to_string(),
        }
    }
}

/// Surfaces operator traces when run with `--nocapture`.
fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

fn people(ids: &[u32]) -> SourceCache<u32, Person> {
    let source = SourceCache::new(|p: &Person| p.id);
    source
        .add_or_update_many(ids.iter().map(|id| Person::new(*id, &format!("p{id}"))))
        .unwrap();
    source
}

#[test]
fn test_sorted_list_remove_reports_sorted_index() {
    init_tracing();
    let source = SourceList::new();
    source.add_range(vec![3, 1, 4, 1, 5]).unwrap();

    let sorted = source.connect().unwrap().sort(|a: &i32, b: &i32| a.cmp(b));
    let log = Rc::new(RefCell::new(Vec::new()));
    let sink = log.clone();
    let _sub = sorted.subscribe(move |cs: &ListChangeSet<i32>| sink.borrow_mut().push(cs.clone()));
    let view = sorted.as_observable_list();
    assert_eq!(view.items(), vec![1, 1, 3, 4, 5]);

    source.remove(&3).unwrap();
    assert_eq!(
        log.borrow().last().map(|cs| cs.as_slice().to_vec()),
        Some(vec![ListChange::Remove { item: 3, index: 2 }])
    );
    assert_eq!(view.items(), vec![1, 1, 4, 5]);
}

#[test]
fn test_and_of_two_caches() {
    let first = people(&[1, 2, 3]);
    let second = people(&[2, 3, 4]);

    let both = first.connect().unwrap().and(&[second.connect().unwrap()]);
    let log = Rc::new(RefCell::new(Vec::new()));
    let sink = log.clone();
    let _sub = both.subscribe(move |cs: &ChangeSet<u32, Person>| sink.borrow_mut().push(cs.clone()));
    let view = both.as_observable_cache();

    let mut keys = view.keys();
    keys.sort();
    assert_eq!(keys, vec![2, 3]);

    first.remove(&2).unwrap();
    assert_eq!(
        log.borrow().last().map(|cs| cs.as_slice().to_vec()),
        Some(vec![Change::remove(2, Person::new(2, "p2"))])
    );
    assert_eq!(view.keys(), vec![3]);
}

#[test]
fn test_group_by_parity_destroys_empty_group() {
    let source = SourceList::new();
    source.add_range(vec![1, 2, 3]).unwrap();

    let groups = source.connect().unwrap().group_on(|v: &i32| v % 2);
    let log = Rc::new(RefCell::new(Vec::new()));
    let sink = log.clone();
    let _sub = groups.subscribe(move |cs: &ListChangeSet<ListGroup<i32, i32>>| {
        let summary: Vec<(ChangeKind, i32)> = cs
            .iter()
            .flat_map(|change| match change {
                ListChange::Add { item, .. } => vec![(ChangeKind::Add, *item.key())],
                ListChange::AddRange { items, .. } => items.iter().map(|g| (ChangeKind::Add, *g.key())).collect(),
                ListChange::Remove { item, .. } => vec![(ChangeKind::Remove, *item.key())],
                _ => Vec::new(),
            })
            .collect();
        sink.borrow_mut().push(summary);
    });
    let view = groups.as_observable_list();

    let members: Vec<(i32, Vec<i32>)> = view.items().iter().map(|g| (*g.key(), g.list().items())).collect();
    assert_eq!(members, vec![(1, vec![1, 3]), (0, vec![2])]);

    source.remove(&2).unwrap();
    assert_eq!(log.borrow().last(), Some(&vec![(ChangeKind::Remove, 0)]));
    assert_eq!(view.len(), 1);
    assert_eq!(view.items()[0].list().items(), vec![1, 3]);
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum ChangeKind {
    Add,
    Remove,
}

#[test]
fn test_transform_async_removed_item_never_added() {
    init_tracing();
    let mut pool = LocalPool::new();
    let source = SourceCache::new(|p: &Person| p.id);
    let pending: Rc<RefCell<Vec<(u32, oneshot::Sender<String>)>>> = Rc::new(RefCell::new(Vec::new()));
    let queue = pending.clone();
    let cancelled = Rc::new(RefCell::new(Vec::new()));
    let seen_cancel = cancelled.clone();

    let output = source.connect().unwrap().transform_async(
        pool.spawner(),
        move |person: Person, token: CancellationToken| {
            let (tx, rx) = oneshot::channel();
            queue.borrow_mut().push((person.id, tx));
            seen_cancel.borrow_mut().push((person.id, token));
            async move { rx.await.map_err(|_| "sender dropped") }
        },
        TransformAsyncOptions::new(),
    );
    let adds = Rc::new(RefCell::new(Vec::new()));
    let sink = adds.clone();
    let _sub = output.subscribe(move |cs: &ChangeSet<u32, String>| {
        for change in cs {
            if change.reason() == ChangeReason::Add {
                sink.borrow_mut().push(*change.key());
            }
        }
    });

    source.add_or_update(Person::new(1, "kept")).unwrap();
    source.add_or_update(Person::new(2, "dropped")).unwrap();
    source.remove(&2).unwrap();
    assert!(cancelled.borrow().iter().any(|(id, token)| *id == 2 && token.is_cancelled()));

    for (id, tx) in pending.borrow_mut().drain(..) {
        let _ = tx.send(format!("done {id}"));
    }
    pool.run_until_stalled();

    assert_eq!(*adds.borrow(), vec![1]);
}

#[test]
fn test_transform_async_disposal_cancels_everything() {
    init_tracing();
    let pool = LocalPool::new();
    let source = SourceCache::new(|p: &Person| p.id);
    let tokens = Rc::new(RefCell::new(Vec::new()));
    let t = tokens.clone();

    let output = source.connect().unwrap().transform_async(
        pool.spawner(),
        move |_person: Person, token: CancellationToken| {
            t.borrow_mut().push(token);
            futures::future::pending::<Result<String, String>>()
        },
        TransformAsyncOptions::new(),
    );
    let mut sub = output.subscribe(|_: &ChangeSet<u32, String>| {});
    source.add_or_update_many(vec![Person::new(1, "a"), Person::new(2, "b")]).unwrap();
    assert_eq!(tokens.borrow().len(), 2);

    sub.dispose();
    assert!(tokens.borrow().iter().all(CancellationToken::is_cancelled));
}

struct Handle {
    id: u32,
    disposals: Rc<RefCell<Vec<u32>>>,
}

impl Disposable for Handle {
    fn dispose(&self) {
        self.disposals.borrow_mut().push(self.id);
    }
}

#[test]
fn test_dispose_many_disposes_each_value_once() {
    let disposals = Rc::new(RefCell::new(Vec::new()));
    let handle = |id: u32| {
        Rc::new(Handle {
            id,
            disposals: disposals.clone(),
        })
    };

    let source: SourceList<Rc<Handle>> = SourceList::new();
    let _sub = source
        .connect()
        .unwrap()
        .dispose_many()
        .subscribe(|_: &ListChangeSet<Rc<Handle>>| {});

    source.add_range(vec![handle(1), handle(2), handle(3), handle(4)]).unwrap();
    source.remove_at(0).unwrap();
    source.replace_at(0, handle(5)).unwrap();
    assert_eq!(*disposals.borrow(), vec![1, 2]);

    source.clear().unwrap();
    source.add(handle(6)).unwrap();
    source.dispose();

    let mut disposed = disposals.borrow().clone();
    disposed.sort();
    assert_eq!(disposed, vec![1, 2, 3, 4, 5, 6]);
}

#[test]
fn test_merge_many_completes_after_every_inner() {
    let source = SourceList::new();
    let inners: Vec<ripple_reactive::Subject<i32>> = (0..2).map(|_| ripple_reactive::Subject::new()).collect();
    source.add_range(vec![0usize, 1]).unwrap();

    let subjects = inners.clone();
    let merged = source
        .connect()
        .unwrap()
        .merge_many(move |i: &usize| subjects[*i].as_observable());
    let values = Rc::new(RefCell::new(Vec::new()));
    let completed = Rc::new(Cell::new(false));
    let v = values.clone();
    let c = completed.clone();
    let _sub = merged.subscribe_observer(
        ripple_reactive::FnObserver::new(move |value: &i32| v.borrow_mut().push(*value))
            .on_completed(move || c.set(true))
            .shared(),
    );

    inners[0].next(&10);
    inners[1].next(&20);
    source.dispose();
    inners[0].complete();
    assert!(!completed.get());

    inners[1].complete();
    assert!(completed.get());
    assert_eq!(*values.borrow(), vec![10, 20]);
}

#[test]
fn test_round_trip_through_pipeline() {
    let source = SourceList::new();
    let replay = Rc::new(RefCell::new(Vec::new()));
    let sink = replay.clone();
    let _sub = source
        .connect()
        .unwrap()
        .subscribe(move |cs: &ListChangeSet<i32>| cs.apply_to(&mut sink.borrow_mut()).unwrap());

    source.add_range(vec![1, 2, 3, 4]).unwrap();
    source.move_item(3, 0).unwrap();
    source.insert(2, 9).unwrap();
    source.remove_range(1, 2).unwrap();
    source.edit(|list| {
        list.add(7);
        list.replace_at(0, 8)?;
        Ok(())
    })
    .unwrap();

    assert_eq!(*replay.borrow(), source.items());
}
