//! Method-call access to the operators.
//!
//! Import the prelude to chain operators straight off a stream:
//! `source.connect()?.filter(..).sort(..).as_observable_list()`.

mod aggregate;
mod cache;
mod list;
mod stream;

pub use aggregate::ObservableAggregateExt;
pub use cache::ObservableCacheExt;
pub use list::{pages, ObservableListExt};
pub use stream::ObservableChangeSetExt;
