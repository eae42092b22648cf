//! Client-side query cache.
//!
//! This module provides the in-process store that keeps list pages and
//! single tasks fetched from the task service:
//! - One entry per structural `QueryKey`, never duplicated
//! - Stale entries keep serving their last value until a refresh lands
//! - Observer registry so views hear about every write to their keys
//! - Typed list patches for splicing confirmed mutations into cached pages

mod entry;
mod key;
mod store;

pub use entry::{CacheEntry, CachedValue, EntryStatus};
pub use key::{KeyPattern, QueryKey};
pub use store::{CacheStore, CacheTxn, ListPatch, Listener, Subscription};
