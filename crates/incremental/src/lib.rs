//! Ripple Incremental - Incremental collection operators.
//!
//! Every operator consumes a change-set stream and produces a derived
//! change-set stream, doing work proportional to the change rather than to
//! the size of the collection.
//!
//! # Core Concepts
//!
//! - `ListChangeSet<T>` / `ChangeSet<K, V>`: the batches every stream carries
//! - `Delta<T>`: a `+1`/`-1` contribution, the input of the aggregates
//! - per-subscription operator state: subscribing twice to a derived stream
//!   builds two independent pipelines
//!
//! # Operators
//!
//! - Filter (static and dynamic), Transform, TryTransform, Cast, TransformAsync
//! - Sort (static and dynamic), Distinct, RemoveKey
//! - And / Or / Xor / Except, Combine, MergeChangeSets
//! - Virtualize / Page, Group
//! - SubscribeMany / DisposeMany / MergeMany
//! - Count / Sum / Avg / Min / Max / StdDev
//!
//! # Example
//!
//! ```rust
//! use ripple_incremental::prelude::*;
//! use ripple_reactive::SourceList;
//!
//! let source = SourceList::new();
//! source.add_range(vec![5, 3, 9, 1]).unwrap();
//!
//! let view = source
//!     .connect()
//!     .unwrap()
//!     .filter(|v: &i32| *v > 2)
//!     .sort(|a: &i32, b: &i32| a.cmp(b))
//!     .as_observable_list();
//! assert_eq!(view.items(), vec![3, 5, 9]);
//!
//! source.add(4).unwrap();
//! assert_eq!(view.items(), vec![3, 4, 5, 9]);
//! ```

pub mod delta;
pub mod ext;
pub mod operators;
pub mod stream;

pub use delta::{AggregateSource, Delta};
pub use ext::{
    pages, ObservableAggregateExt, ObservableCacheExt, ObservableChangeSetExt, ObservableListExt,
};
pub use operators::{
    CacheDistinct, CacheFilter, CacheSorter, CacheTransformer, CancellationToken, CombineOperator, Disposable,
    Group, IncrementalAvg, IncrementalCount, IncrementalExtreme, IncrementalStdDev, IncrementalSum, KeyRemover,
    ListDistinct, ListFilter, ListGroup, ListSorter, ListTransformer, PageRequest, Projection, SortOptions,
    TransformAsyncOptions, VirtualRequest, Window,
};
pub use stream::{comparing, ChangeSetLike, Comparator, Predicate};

/// Everything needed to chain operators off a stream.
pub mod prelude {
    pub use crate::ext::{ObservableAggregateExt, ObservableCacheExt, ObservableChangeSetExt, ObservableListExt};
    pub use crate::operators::{CombineOperator, PageRequest, SortOptions, TransformAsyncOptions, VirtualRequest};
    pub use crate::stream::{comparing, Comparator, Predicate};
}
