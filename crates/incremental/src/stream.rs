//! Plumbing shared by every operator.
//!
//! An operator is a piece of per-subscription state plus a `process` step
//! that turns one upstream change set into one downstream change set. The
//! helpers here own the subscription wiring so operators only describe the
//! step: state is borrowed for the step, the borrow is released, and only
//! then is anything emitted downstream.

use core::cell::RefCell;
use core::cmp::Ordering;
use ripple_core::{ChangeSet, Error, ListChangeSet};
use ripple_reactive::{Observable, Observer, Relay, Subscription};
use std::rc::Rc;
use tracing::trace;

/// Item predicate, shareable so it can travel through a stream.
pub type Predicate<T> = Rc<dyn Fn(&T) -> bool>;

/// Total order over items, shareable so it can travel through a stream.
pub type Comparator<T> = Rc<dyn Fn(&T, &T) -> Ordering>;

/// Builds a `Comparator` from a sort key.
pub fn comparing<T, R, F>(key: F) -> Comparator<T>
where
    R: Ord,
    F: Fn(&T) -> R + 'static,
{
    Rc::new(move |a: &T, b: &T| key(a).cmp(&key(b)))
}

/// A change set that may carry no changes.
pub trait ChangeSetLike {
    fn is_empty(&self) -> bool;
}

impl<T> ChangeSetLike for ListChangeSet<T> {
    #[inline]
    fn is_empty(&self) -> bool {
        ListChangeSet::is_empty(self)
    }
}

impl<K, V> ChangeSetLike for ChangeSet<K, V> {
    #[inline]
    fn is_empty(&self) -> bool {
        ChangeSet::is_empty(self)
    }
}

/// Delivers the outcome of one processing step: the change set if it is not
/// empty, then every error collected along the way.
pub(crate) fn emit<O: ChangeSetLike>(downstream: &dyn Observer<O>, changes: O, errors: Vec<Error>) {
    if !changes.is_empty() {
        downstream.on_next(&changes);
    }
    for error in &errors {
        trace!(error = %error, "forwarding operator error");
        downstream.on_error(error);
    }
}

/// Lifts a stateful step into an operator.
///
/// `init` runs once per subscription, so every subscriber owns its own
/// derived state.
pub(crate) fn lift<I, O, S, N, P>(source: &Observable<I>, init: N, process: P) -> Observable<O>
where
    I: 'static,
    O: ChangeSetLike + 'static,
    S: 'static,
    N: Fn() -> S + 'static,
    P: Fn(&mut S, &I, &mut Vec<Error>) -> O + 'static,
{
    let source = source.clone();
    let process = Rc::new(process);
    Observable::create(move |observer| {
        let state = RefCell::new(init());
        let process = Rc::clone(&process);
        source.subscribe_observer(
            Relay::new(observer, move |changes: &I, downstream: &dyn Observer<O>| {
                let mut errors = Vec::new();
                let out = process(&mut state.borrow_mut(), changes, &mut errors);
                emit(downstream, out, errors);
            })
            .shared(),
        )
    })
}

/// Lifts a stateful step driven by two streams: the upstream change sets
/// and a control stream that reconfigures the state (a new predicate, a
/// new comparator, a new window).
///
/// The control stream is subscribed first so that a control value that is
/// already available applies to the initial change set. Completion of the
/// control stream is ignored; completion of the source completes the output.
pub(crate) fn lift_with<I, C, O, S, N, P, R>(
    source: &Observable<I>,
    control: &Observable<C>,
    init: N,
    process: P,
    reconfigure: R,
) -> Observable<O>
where
    I: 'static,
    C: 'static,
    O: ChangeSetLike + 'static,
    S: 'static,
    N: Fn() -> S + 'static,
    P: Fn(&mut S, &I, &mut Vec<Error>) -> O + 'static,
    R: Fn(&mut S, &C, &mut Vec<Error>) -> O + 'static,
{
    let source = source.clone();
    let control = control.clone();
    let process = Rc::new(process);
    let reconfigure = Rc::new(reconfigure);
    Observable::create(move |observer| {
        let state = Rc::new(RefCell::new(init()));
        let mut subscription = Subscription::empty();

        let control_state = Rc::clone(&state);
        let reconfigure = Rc::clone(&reconfigure);
        subscription.add(
            control.subscribe_observer(
                Relay::new(observer.clone(), move |value: &C, downstream: &dyn Observer<O>| {
                    let mut errors = Vec::new();
                    let out = reconfigure(&mut control_state.borrow_mut(), value, &mut errors);
                    emit(downstream, out, errors);
                })
                .with_completed(|_| {})
                .shared(),
            ),
        );

        let process = Rc::clone(&process);
        subscription.add(
            source.subscribe_observer(
                Relay::new(observer, move |changes: &I, downstream: &dyn Observer<O>| {
                    let mut errors = Vec::new();
                    let out = process(&mut state.borrow_mut(), changes, &mut errors);
                    emit(downstream, out, errors);
                })
                .shared(),
            ),
        );
        subscription
    })
}
