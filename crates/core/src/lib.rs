//! Ripple Core - Change model for the Ripple incremental collection engine.
//!
//! This crate provides the value types every operator exchanges:
//!
//! - `ListChange` / `ListChangeSet`: positional changes of an ordered collection
//! - `Change` / `ChangeSet`: keyed changes of a cache
//! - `ChangeAwareList` / `ChangeAwareCache`: collections that record a diff for
//!   every mutation and can roll uncaptured changes back
//! - `Error`: the error taxonomy shared by containers, operators and streams
//!
//! # Example
//!
//! ```rust
//! use ripple_core::{ChangeAwareList, ListChangeReason};
//!
//! let mut list = ChangeAwareList::new();
//! list.add_range(vec![3, 1, 4]);
//! list.move_item(0, 2).unwrap();
//!
//! let changes = list.capture_changes();
//! assert_eq!(changes.count_of(ListChangeReason::Moved), 1);
//!
//! let mut replay = Vec::new();
//! changes.apply_to(&mut replay).unwrap();
//! assert_eq!(replay, vec![1, 4, 3]);
//! ```

mod change;
mod collection;
mod error;
mod list_change;

pub use change::{Change, ChangeReason, ChangeSet};
pub use collection::{ChangeAwareCache, ChangeAwareList};
pub use error::{check_index, check_insert_index, check_range, Error, Result};
pub use list_change::{ItemChange, ListChange, ListChangeReason, ListChangeSet};
