//! Catalog persistence
//!
//! Per-table query modules. Every function takes a `&mut SqliteConnection`
//! so the same call works on a pooled connection and inside a transaction.

pub mod associations;
pub mod entities;
pub mod episodes;
pub mod link_audit;
pub mod owners;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::{CurationError, CurationResult};

pub(crate) fn parse_uuid(column: &str, value: &str) -> CurationResult<Uuid> {
    Uuid::parse_str(value).map_err(|e| {
        CurationError::Common(fancat_common::Error::Internal(format!(
            "Corrupt {} column '{}': {}",
            column, value, e
        )))
    })
}

pub(crate) fn parse_ts(value: &str) -> CurationResult<DateTime<Utc>> {
    Ok(fancat_common::time::from_db(value)?)
}
