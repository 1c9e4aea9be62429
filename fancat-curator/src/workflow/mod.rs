//! Batch drivers
//!
//! Sequential, cancellable iteration over entities with per-entity outcome
//! lines and an end-of-run summary.

pub mod batch_runner;
pub mod statistics;

pub use batch_runner::BatchRunner;
pub use statistics::RunSummary;
