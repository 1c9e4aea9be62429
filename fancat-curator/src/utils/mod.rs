//! Shared helpers for curation services

pub mod entity_locks;
pub mod retry;
pub mod text;

pub use entity_locks::EntityLocks;
pub use retry::{retry_lookup, retry_on_lock, BackoffPolicy, LookupError};
