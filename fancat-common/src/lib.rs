//! # Fancat Common Library
//!
//! Shared code for the fan-content catalog tools including:
//! - Catalog record types (owners, episodes, entities, associations)
//! - Link lifecycle state and audit entry types
//! - Boundary validation of raw datastore records
//! - SQLite schema initialization
//! - Configuration file and root folder resolution

pub mod config;
pub mod db;
pub mod error;
pub mod models;
pub mod slug;
pub mod time;

pub use error::{Error, Result};
pub use models::{
    Association, ContentOwner, Entity, EntityKind, Episode, InactiveReason, LinkAuditEntry,
    LinkState, NewEntity, RawEntity,
};
