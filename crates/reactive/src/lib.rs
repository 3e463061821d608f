//! Ripple Reactive - Observable streams and source containers.
//!
//! This crate provides the push-based plumbing every operator is built on,
//! plus the containers that own mutable state:
//!
//! - `Observable` / `Observer`: cold, synchronous streams with out-of-band,
//!   non-terminal errors and a single completion signal
//! - `Subject`: hot multicast stream
//! - `Subscription`: disposable handle; dropping it unsubscribes
//! - `SourceList` / `SourceCache`: the only mutation entry points; each call
//!   publishes exactly the change set it implies
//! - `ObservableList` / `ObservableCache`: read-only materialized views
//!
//! # Example
//!
//! ```rust
//! use ripple_reactive::{ObservableList, SourceList};
//!
//! let source = SourceList::new();
//! source.add_range(vec![1, 2, 3]).unwrap();
//!
//! let view = ObservableList::new(&source.connect().unwrap());
//! source.remove_at(0).unwrap();
//!
//! assert_eq!(view.items(), vec![2, 3]);
//! ```

pub mod materialize;
pub mod observable;
pub mod source_cache;
pub mod source_list;
mod store;
pub mod subject;
pub mod subscription;

pub use materialize::{ObservableCache, ObservableList};
pub use observable::{FnObserver, Observable, Observer, Relay, SharedObserver};
pub use source_cache::{CacheUpdater, KeySelector, SourceCache};
pub use source_list::SourceList;
pub use subject::Subject;
pub use subscription::{Subscription, SubscriptionId, SubscriptionManager};

// Re-export the change model so downstream crates need a single import.
pub use ripple_core::{
    Change, ChangeAwareCache, ChangeAwareList, ChangeReason, ChangeSet, Error, ItemChange, ListChange,
    ListChangeReason, ListChangeSet, Result,
};
