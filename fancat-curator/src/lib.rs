//! fancat-curator library
//!
//! Entity association and affiliate-link curation for the fan-content catalog:
//! - Candidate matching of free-text entity names to episodes
//! - Confidence scoring and keep/review/reject decisions
//! - Duplicate resolution with canonical election
//! - Link lifecycle state machine with an append-only audit trail
//! - Correction workflow for wrong associations
//!
//! The binary in `main.rs` is a thin batch driver over these services.

pub mod config;
pub mod db;
pub mod error;
pub mod services;
pub mod utils;
pub mod workflow;

pub use crate::config::CurationConfig;
pub use crate::error::{CurationError, CurationResult};
