//! Sequential batch runner
//!
//! Each entity's full pipeline is one unit. Cancellation is checked between
//! entities only, so a cancelled run never leaves an entity mid-transition.
//! Runs that hit external collaborators pause between items.

use fancat_common::RawEntity;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use super::statistics::RunSummary;
use crate::services::{AttachOutcome, Curator, LinkLifecycleManager, VerifyOutcome};

/// Sequential batch driver
pub struct BatchRunner {
    cancel_token: CancellationToken,
    inter_item_delay: Duration,
}

impl BatchRunner {
    pub fn new(cancel_token: CancellationToken, inter_item_delay: Duration) -> Self {
        Self {
            cancel_token,
            inter_item_delay,
        }
    }

    /// Curate records for one owner; `report` receives one line per record
    pub async fn curate_all<F>(
        &self,
        curator: &Curator,
        owner_id: Uuid,
        records: Vec<RawEntity>,
        mut report: F,
    ) -> RunSummary
    where
        F: FnMut(&str),
    {
        let mut summary = RunSummary::default();
        let total = records.len();

        for (index, raw) in records.into_iter().enumerate() {
            if self.cancel_token.is_cancelled() {
                tracing::info!(processed = index, total, "Curation run cancelled");
                summary.cancelled = true;
                break;
            }

            let label = raw.name.clone().unwrap_or_else(|| format!("record #{}", index + 1));
            match curator.curate(owner_id, raw).await {
                Ok(outcome) => {
                    summary.record_curation(outcome.status);
                    report(&outcome.summary_line());
                }
                Err(e) => {
                    tracing::error!(record = %label, error = %e, "Curation failed");
                    summary.record_error();
                    report(&format!("{:<9} {} ({})", "error", label, e));
                }
            }
        }

        tracing::info!(summary = %summary.display_string(), "Curation run finished");
        summary
    }

    /// Verify stored links
    pub async fn verify_links<F>(
        &self,
        lifecycle: &LinkLifecycleManager,
        entity_ids: &[Uuid],
        mut report: F,
    ) -> RunSummary
    where
        F: FnMut(&str),
    {
        let mut summary = RunSummary::default();

        for (index, entity_id) in entity_ids.iter().enumerate() {
            if !self.pause_before_lookup(index).await {
                summary.cancelled = true;
                break;
            }

            match lifecycle.verify(*entity_id).await {
                Ok(outcome) => {
                    summary.record_verification(&outcome);
                    report(&format!("{:<12} {}", verify_label(&outcome), entity_id));
                }
                Err(e) => {
                    tracing::error!(entity_id = %entity_id, error = %e, "Verification failed");
                    summary.record_error();
                    report(&format!("{:<12} {} ({})", "error", entity_id, e));
                }
            }
        }

        tracing::info!(summary = %summary.display_string(), "Verification run finished");
        summary
    }

    /// Search the directory for entities without a link
    pub async fn attach_links<F>(
        &self,
        lifecycle: &LinkLifecycleManager,
        entity_ids: &[Uuid],
        mut report: F,
    ) -> RunSummary
    where
        F: FnMut(&str),
    {
        let mut summary = RunSummary::default();

        for (index, entity_id) in entity_ids.iter().enumerate() {
            if !self.pause_before_lookup(index).await {
                summary.cancelled = true;
                break;
            }

            match lifecycle.find_and_attach(*entity_id).await {
                Ok(outcome) => {
                    summary.record_attach(&outcome);
                    let detail = match &outcome {
                        AttachOutcome::Attached(url) => format!("attached  {} {}", entity_id, url),
                        AttachOutcome::NotFound => format!("not_found {}", entity_id),
                        AttachOutcome::Skipped => format!("skipped   {}", entity_id),
                        AttachOutcome::Unverifiable(msg) => {
                            format!("unverifiable {} ({})", entity_id, msg)
                        }
                    };
                    report(&detail);
                }
                Err(e) => {
                    tracing::error!(entity_id = %entity_id, error = %e, "Link search failed");
                    summary.record_error();
                    report(&format!("error     {} ({})", entity_id, e));
                }
            }
        }

        tracing::info!(summary = %summary.display_string(), "Link search run finished");
        summary
    }

    /// Wait the inter-item delay (not before the first item). False when cancelled.
    async fn pause_before_lookup(&self, index: usize) -> bool {
        if self.cancel_token.is_cancelled() {
            tracing::info!(processed = index, "Run cancelled");
            return false;
        }
        if index == 0 || self.inter_item_delay.is_zero() {
            return true;
        }

        tokio::select! {
            _ = self.cancel_token.cancelled() => {
                tracing::info!(processed = index, "Run cancelled during inter-item delay");
                false
            }
            _ = tokio::time::sleep(self.inter_item_delay) => true,
        }
    }
}

fn verify_label(outcome: &VerifyOutcome) -> String {
    match outcome {
        VerifyOutcome::Activated => "activated".to_string(),
        VerifyOutcome::StillActive => "active".to_string(),
        VerifyOutcome::Deactivated(reason) => format!("inactive:{}", reason),
        VerifyOutcome::StillInactive(reason) => format!("still:{}", reason),
        VerifyOutcome::Unverifiable(_) => "unverifiable".to_string(),
        VerifyOutcome::CorrectionUnconfirmed(reason) => format!("unconfirmed:{}", reason),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    #[tokio::test]
    async fn test_cancelled_token_stops_before_first_lookup() {
        let token = CancellationToken::new();
        token.cancel();
        let runner = BatchRunner::new(token, Duration::from_secs(10));

        assert!(!runner.pause_before_lookup(0).await);
    }

    #[tokio::test]
    async fn test_cancel_interrupts_delay() {
        let token = CancellationToken::new();
        let runner = BatchRunner::new(token.clone(), Duration::from_secs(10));

        let start = Instant::now();
        let canceller = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            token.cancel();
        });

        assert!(!runner.pause_before_lookup(1).await);
        assert!(start.elapsed() < Duration::from_secs(5));
        canceller.await.unwrap();
    }

    #[tokio::test]
    async fn test_delay_applies_between_items() {
        let runner = BatchRunner::new(CancellationToken::new(), Duration::from_millis(30));

        let start = Instant::now();
        assert!(runner.pause_before_lookup(0).await);
        assert!(start.elapsed() < Duration::from_millis(30));
        assert!(runner.pause_before_lookup(1).await);
        assert!(start.elapsed() >= Duration::from_millis(30));
    }
}
