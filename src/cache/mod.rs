//! In-memory entity cache.
//!
//! This module holds the normalized collections and everything that reads or
//! changes them:
//! - Collections keep entities by key, in sorted or insertion order
//! - Actions describe queries, saves and cache-only edits
//! - The reducer applies actions, tracking optimistic saves by correlation id so
//!   a failed save undoes only its own change
//! - Selectors derive memoized views of a collection

mod action;
mod collection;
mod reducer;
mod selectors;
mod store;
mod traits;

pub use action::{CorrelationId, EntityAction, EntityOp, Update};
pub use collection::{EntityCollection, PendingChange};
pub use reducer::{merge_changes, reduce, Reduction};
pub use selectors::{
  select_all, select_by_key, select_count, select_entities, select_extra, select_filter,
  select_filtered, select_keys, select_loaded, select_loading, EntitySelectors,
};
pub use store::{CacheEvent, EntityCache};
pub use traits::{reserialize, Entity, EntityKey};
