//! Incremental operators.
//!
//! Every operator is a piece of per-subscription state with a `process`
//! step from one upstream change set to one downstream change set:
//! - Filter: static or dynamic predicate, emitting membership transitions
//! - Transform: synchronous, fallible, and asynchronous projections
//! - Sort: a stable total order, list in and list out, or cache in and list out
//! - Distinct: reference-counted distinct values
//! - Combine: N-ary set operations and ownership merges over keyed streams
//! - Virtualize: offset or page windows diffed against the last window
//! - Group: dynamic groups exposing nested read-only views
//! - Lifecycle: per-item resources bound to item presence
//! - Aggregate: running count, sum, average, extremes and deviation

mod aggregate;
mod combine;
mod distinct;
mod filter;
mod group;
mod lifecycle;
mod sort;
mod transform;
mod transform_async;
mod utility;
mod virtualize;

pub use aggregate::{IncrementalAvg, IncrementalCount, IncrementalExtreme, IncrementalStdDev, IncrementalSum};
pub use combine::CombineOperator;
pub use distinct::{CacheDistinct, ListDistinct};
pub use filter::{CacheFilter, ListFilter};
pub use group::{Group, ListGroup};
pub use lifecycle::Disposable;
pub use sort::{CacheSorter, ListSorter, SortOptions};
pub use transform::{CacheTransformer, KeyRemover, ListTransformer, Projection};
pub use transform_async::{CancellationToken, TransformAsyncOptions};
pub use virtualize::{PageRequest, VirtualRequest, Window};

pub(crate) use aggregate::{avg, count, extreme, std_dev, sum};
pub(crate) use combine::{combine_streams, CombineRule};
pub(crate) use group::{group_cache, group_list};
pub(crate) use lifecycle::{
    dispose_many_cache, dispose_many_list, merge_many_cache, merge_many_list, subscribe_many_cache,
    subscribe_many_list,
};
pub(crate) use transform::{fallible, infallible};
pub(crate) use transform_async::transform_async;
pub(crate) use utility::{cache_snapshots, list_snapshots, not_empty, skip_initial, watch_key};
