//! Curation services

pub mod candidate_matcher;
pub mod confidence_scorer;
pub mod correction_workflow;
pub mod curator;
pub mod directory_client;
pub mod duplicate_resolver;
pub mod enrichment;
pub mod link_lifecycle;
pub mod metadata_client;
pub mod mismatch_detector;

pub use candidate_matcher::{CandidateMatcher, EpisodeMatch, MatchTier};
pub use confidence_scorer::{ConfidenceScorer, Decision, ScoreBreakdown, Signal};
pub use correction_workflow::{CorrectionOutcome, CorrectionRequest, CorrectionWorkflow};
pub use curator::{CurationOutcome, CurationStatus, Curator};
pub use directory_client::{DirectoryLookup, HttpDirectoryClient, VerificationOutcome};
pub use duplicate_resolver::{DuplicateCheck, DuplicateResolver, MergeRecord, ResolveReport};
pub use enrichment::{EnrichmentReport, Enricher};
pub use link_lifecycle::{AttachOutcome, LinkLifecycleManager, VerifyOutcome};
pub use metadata_client::{HttpMetadataClient, MetadataLookup, PersonResult, WorkResult};
pub use mismatch_detector::{Mismatch, MismatchReport};
