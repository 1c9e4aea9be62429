//! Retry with exponential backoff
//!
//! Two flavours:
//! - [`retry_lookup`] for external collaborators: bounded attempt count, then the
//!   failure is classified as `ExternalLookupUnavailable` for the caller to
//!   degrade on.
//! - [`retry_on_lock`] for SQLite lock contention: bounded total wait time,
//!   non-lock errors fail immediately.

use std::future::Future;
use std::time::{Duration, Instant};
use thiserror::Error;

use crate::config::LookupSettings;
use crate::error::{CurationError, CurationResult};

/// Collaborator call failure
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum LookupError {
    /// Timeout, connection reset, 429, 5xx: worth another attempt
    #[error("transient lookup failure: {0}")]
    Transient(String),

    /// Bad credentials, malformed response, 4xx: retrying will not help
    #[error("permanent lookup failure: {0}")]
    Permanent(String),
}

/// Backoff schedule for collaborator calls
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackoffPolicy {
    pub max_attempts: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
}

impl BackoffPolicy {
    /// No waiting between attempts (tests)
    pub fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            initial_backoff: Duration::ZERO,
            max_backoff: Duration::ZERO,
        }
    }
}

impl From<&LookupSettings> for BackoffPolicy {
    fn from(settings: &LookupSettings) -> Self {
        Self {
            max_attempts: settings.max_attempts.max(1),
            initial_backoff: Duration::from_millis(settings.initial_backoff_ms),
            max_backoff: Duration::from_millis(settings.max_backoff_ms),
        }
    }
}

/// Run a collaborator call, retrying transient failures.
///
/// **Algorithm:**
/// 1. Attempt operation
/// 2. Success → return
/// 3. Permanent failure → `ExternalLookupUnavailable` immediately
/// 4. Transient failure → if attempts remain, sleep (initial, doubled, capped) and retry;
///    otherwise `ExternalLookupUnavailable`
pub async fn retry_lookup<F, Fut, T>(
    operation_name: &str,
    policy: BackoffPolicy,
    mut operation: F,
) -> CurationResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, LookupError>>,
{
    let mut backoff = policy.initial_backoff;
    let max_attempts = policy.max_attempts.max(1);

    for attempt in 1..=max_attempts {
        match operation().await {
            Ok(value) => {
                if attempt > 1 {
                    tracing::debug!(
                        operation = operation_name,
                        attempt,
                        "Lookup succeeded after retry"
                    );
                }
                return Ok(value);
            }
            Err(LookupError::Permanent(msg)) => {
                tracing::warn!(
                    operation = operation_name,
                    attempt,
                    error = %msg,
                    "Lookup failed permanently"
                );
                return Err(CurationError::ExternalLookupUnavailable(format!(
                    "{}: {}",
                    operation_name, msg
                )));
            }
            Err(LookupError::Transient(msg)) => {
                if attempt == max_attempts {
                    tracing::warn!(
                        operation = operation_name,
                        attempts = attempt,
                        error = %msg,
                        "Lookup retries exhausted"
                    );
                    return Err(CurationError::ExternalLookupUnavailable(format!(
                        "{}: {} (after {} attempts)",
                        operation_name, msg, attempt
                    )));
                }

                tracing::warn!(
                    operation = operation_name,
                    attempt,
                    backoff_ms = backoff.as_millis() as u64,
                    error = %msg,
                    "Lookup failed, will retry after backoff"
                );

                if !backoff.is_zero() {
                    tokio::time::sleep(backoff).await;
                }
                backoff = (backoff * 2).min(policy.max_backoff);
            }
        }
    }

    Err(CurationError::ExternalLookupUnavailable(operation_name.to_string()))
}

/// Retry a database operation with exponential backoff until `max_wait_ms` elapses.
///
/// Only "database is locked" errors are retried. Backoff starts at 10ms,
/// doubles, and is capped at 1000ms.
pub async fn retry_on_lock<F, Fut, T>(
    operation_name: &str,
    max_wait_ms: u64,
    mut operation: F,
) -> CurationResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = CurationResult<T>>,
{
    let start_time = Instant::now();
    let max_duration = Duration::from_millis(max_wait_ms);
    let mut attempt = 0u32;
    let mut backoff_ms = 10u64;

    loop {
        attempt += 1;

        match operation().await {
            Ok(result) => {
                if attempt > 1 {
                    tracing::debug!(
                        operation = operation_name,
                        attempt,
                        elapsed_ms = start_time.elapsed().as_millis() as u64,
                        "Database operation succeeded after retry"
                    );
                }
                return Ok(result);
            }
            Err(err) => {
                let is_lock_error =
                    matches!(&err, CurationError::Common(e) if e.is_database_locked());
                if !is_lock_error {
                    return Err(err);
                }

                let elapsed = start_time.elapsed();
                if elapsed >= max_duration {
                    tracing::error!(
                        operation = operation_name,
                        attempt,
                        elapsed_ms = elapsed.as_millis() as u64,
                        max_wait_ms,
                        "Database operation failed: max retry time exceeded"
                    );
                    return Err(err);
                }

                tracing::warn!(
                    operation = operation_name,
                    attempt,
                    backoff_ms,
                    "Database locked, will retry after backoff"
                );

                tokio::time::sleep(Duration::from_millis(backoff_ms)).await;
                backoff_ms = (backoff_ms * 2).min(1000);
            }
        }
    }
}
