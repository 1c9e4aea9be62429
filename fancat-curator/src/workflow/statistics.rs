//! Run statistics

use serde::{Deserialize, Serialize};

use crate::services::{AttachOutcome, CurationStatus, VerifyOutcome};

/// End-of-run counters
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunSummary {
    pub kept: usize,
    pub rejected: usize,
    pub duplicate: usize,
    pub corrected: usize,
    pub activated: usize,
    pub deactivated: usize,
    pub attached: usize,
    /// Items examined with nothing to change
    pub unchanged: usize,
    pub unverifiable: usize,
    /// Corrected links whose verification failed
    pub unconfirmed: usize,
    pub error: usize,
    /// Run stopped early by cancellation
    pub cancelled: bool,
}

impl RunSummary {
    pub fn record_curation(&mut self, status: CurationStatus) {
        match status {
            CurationStatus::Kept => self.kept += 1,
            CurationStatus::Rejected => self.rejected += 1,
            CurationStatus::Duplicate => self.duplicate += 1,
            CurationStatus::Corrected => self.corrected += 1,
        }
    }

    pub fn record_verification(&mut self, outcome: &VerifyOutcome) {
        match outcome {
            VerifyOutcome::Activated => self.activated += 1,
            VerifyOutcome::Deactivated(_) => self.deactivated += 1,
            VerifyOutcome::StillActive | VerifyOutcome::StillInactive(_) => self.unchanged += 1,
            VerifyOutcome::Unverifiable(_) => self.unverifiable += 1,
            VerifyOutcome::CorrectionUnconfirmed(_) => self.unconfirmed += 1,
        }
    }

    pub fn record_attach(&mut self, outcome: &AttachOutcome) {
        match outcome {
            AttachOutcome::Attached(_) => self.attached += 1,
            AttachOutcome::NotFound | AttachOutcome::Skipped => self.unchanged += 1,
            AttachOutcome::Unverifiable(_) => self.unverifiable += 1,
        }
    }

    pub fn record_error(&mut self) {
        self.error += 1;
    }

    /// Items that reached an outcome, including errors
    pub fn processed(&self) -> usize {
        self.kept
            + self.rejected
            + self.duplicate
            + self.corrected
            + self.activated
            + self.deactivated
            + self.attached
            + self.unchanged
            + self.unverifiable
            + self.unconfirmed
            + self.error
    }

    pub fn display_string(&self) -> String {
        let mut parts = vec![
            format!("{} kept", self.kept),
            format!("{} rejected", self.rejected),
            format!("{} duplicate", self.duplicate),
            format!("{} corrected", self.corrected),
        ];
        for (count, label) in [
            (self.activated, "activated"),
            (self.deactivated, "deactivated"),
            (self.attached, "attached"),
            (self.unchanged, "unchanged"),
            (self.unconfirmed, "unconfirmed"),
        ] {
            if count > 0 {
                parts.push(format!("{} {}", count, label));
            }
        }
        parts.push(format!("{} unverifiable", self.unverifiable));
        parts.push(format!("{} error", self.error));

        let mut line = parts.join(", ");
        if self.cancelled {
            line.push_str(" (cancelled)");
        }
        line
    }
}
