//! Utilities available on every change-set stream.

use crate::operators::{not_empty, skip_initial};
use crate::stream::ChangeSetLike;
use ripple_reactive::Observable;

pub trait ObservableChangeSetExt<C: ChangeSetLike + 'static> {
    /// Drops change sets that carry no changes.
    fn not_empty(&self) -> Observable<C>;

    /// Drops the first change set, usually the initial snapshot.
    fn skip_initial(&self) -> Observable<C>;
}

impl<C: ChangeSetLike + 'static> ObservableChangeSetExt<C> for Observable<C> {
    fn not_empty(&self) -> Observable<C> {
        not_empty(self)
    }

    fn skip_initial(&self) -> Observable<C> {
        skip_initial(self)
    }
}
