//! Curation pipeline
//!
//! One entity at a time: validate → score → match → duplicate check →
//! persist. Each call is its own unit of atomicity; a batch can stop between
//! calls without leaving anything half-written.

use fancat_common::{Association, Entity, LinkState, NewEntity, RawEntity};
use serde::Serialize;
use sqlx::SqlitePool;
use std::fmt;
use std::sync::Arc;
use uuid::Uuid;

use super::candidate_matcher::{CandidateMatcher, EpisodeMatch};
use super::confidence_scorer::{ConfidenceScorer, Decision};
use super::correction_workflow::{CorrectionRequest, CorrectionWorkflow};
use super::duplicate_resolver::{self, DuplicateResolver};
use super::link_lifecycle::attach_url;
use crate::config::CurationConfig;
use crate::db;
use crate::error::{CurationError, CurationResult};
use crate::utils::{retry_on_lock, EntityLocks};

const LOCK_RETRY_MS: u64 = 5000;

/// Final status of one curation call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CurationStatus {
    Kept,
    Rejected,
    Duplicate,
    Corrected,
}

impl CurationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CurationStatus::Kept => "kept",
            CurationStatus::Rejected => "rejected",
            CurationStatus::Duplicate => "duplicate",
            CurationStatus::Corrected => "corrected",
        }
    }
}

impl fmt::Display for CurationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result handed back to drivers
#[derive(Debug, Clone, Serialize)]
pub struct CurationOutcome {
    pub status: CurationStatus,
    /// Name as submitted
    pub name: String,
    /// Stored record (the canonical one for duplicates); `None` when rejected
    pub entity: Option<Entity>,
    pub score: u8,
    pub decision: Decision,
    pub matches: Vec<EpisodeMatch>,
}

impl CurationOutcome {
    /// One line per entity for driver output
    pub fn summary_line(&self) -> String {
        let target = match &self.entity {
            Some(entity) => format!(" -> {} [{}]", entity.slug, entity.link_state),
            None => String::new(),
        };
        format!(
            "{:<9} score={:>2} ({}) episodes={} {}{}",
            self.status,
            self.score,
            self.decision.label(),
            self.matches.len(),
            self.name,
            target
        )
    }
}

/// Entry point for driver-facing curation
#[derive(Clone)]
pub struct Curator {
    pool: SqlitePool,
    config: Arc<CurationConfig>,
    locks: EntityLocks,
}

impl Curator {
    pub fn new(pool: SqlitePool, config: Arc<CurationConfig>, locks: EntityLocks) -> Self {
        Self { pool, config, locks }
    }

    /// Duplicate resolver sharing this curator's pool, config, and locks
    pub fn resolver(&self) -> DuplicateResolver {
        DuplicateResolver::new(self.pool.clone(), Arc::clone(&self.config), self.locks.clone())
    }

    /// Curate a raw record for one owner
    pub async fn curate(&self, owner_id: Uuid, raw: RawEntity) -> CurationResult<CurationOutcome> {
        let new = NewEntity::try_from(raw)?;
        self.curate_new(owner_id, new).await
    }

    /// Curate an already-validated record for one owner
    pub async fn curate_new(
        &self,
        owner_id: Uuid,
        new: NewEntity,
    ) -> CurationResult<CurationOutcome> {
        let (episodes, existing) = {
            let mut conn = self.pool.acquire().await?;
            db::owners::load_owner(&mut conn, owner_id)
                .await?
                .ok_or_else(|| CurationError::NotFound(format!("owner {}", owner_id)))?;
            let episodes = db::episodes::list_episodes_for_owner(&mut conn, owner_id).await?;
            let existing = db::entities::list_entities_for_owner(&mut conn, owner_id).await?;
            (episodes, existing)
        };

        let scorer = ConfidenceScorer::new(&self.config);
        let breakdown = scorer.breakdown(&new);
        let score = breakdown.score;
        let decision = scorer.decide(score);

        tracing::debug!(
            name = %new.name,
            score,
            signals = ?breakdown.signals,
            "Scored entity"
        );

        if decision == Decision::Reject {
            tracing::info!(name = %new.name, score, "Rejected: below reject threshold");
            return Ok(CurationOutcome {
                status: CurationStatus::Rejected,
                name: new.name,
                entity: None,
                score,
                decision,
                matches: Vec::new(),
            });
        }

        let matches = CandidateMatcher::new(&self.config).match_episodes(
            &new.name,
            new.description.as_deref().unwrap_or(""),
            &new.category_tags,
            owner_id,
            &episodes,
        );
        if matches.is_empty() {
            tracing::info!(name = %new.name, "No episode match; entity stays unassociated");
        }

        let check = duplicate_resolver::resolve(&self.config, &new, &existing)?;
        let (status, entity) = match check.canonical_id {
            Some(canonical_id) if check.is_duplicate => {
                let entity = self
                    .attach_to_canonical(canonical_id, &new, &matches, decision)
                    .await?;
                (CurationStatus::Duplicate, entity)
            }
            _ => {
                let entity = self.insert_new(owner_id, &new, &matches, decision).await?;
                (CurationStatus::Kept, entity)
            }
        };

        tracing::info!(
            entity_id = %entity.id,
            status = status.as_str(),
            score,
            decision = decision.label(),
            episodes = matches.len(),
            "Curated entity"
        );

        Ok(CurationOutcome {
            status,
            name: new.name,
            entity: Some(entity),
            score,
            decision,
            matches,
        })
    }

    /// Correct a stored entity with replacement data
    pub async fn correct(
        &self,
        entity_id: Uuid,
        raw: RawEntity,
        episode_id: Option<Uuid>,
        source: &str,
    ) -> CurationResult<CurationOutcome> {
        let corrected = NewEntity::try_from(raw)?;
        let name = corrected.name.clone();

        let workflow = CorrectionWorkflow::new(
            self.pool.clone(),
            Arc::clone(&self.config),
            self.locks.clone(),
        );
        let outcome = workflow
            .correct(CorrectionRequest {
                entity_id,
                corrected,
                episode_id,
                source: source.to_string(),
            })
            .await?;

        Ok(CurationOutcome {
            status: CurationStatus::Corrected,
            name,
            entity: Some(outcome.entity),
            score: outcome.score,
            decision: outcome.decision,
            matches: outcome.matches,
        })
    }

    async fn insert_new(
        &self,
        owner_id: Uuid,
        new: &NewEntity,
        matches: &[EpisodeMatch],
        decision: Decision,
    ) -> CurationResult<Entity> {
        let mut entity = Entity::from_new(new, Some(owner_id), String::new());

        if let Some(url) = &new.external_link {
            let note = new.import_note.clone().unwrap_or_default();
            attach_url(&mut entity, url, "import", &note)?;
        }

        let associations: Vec<Association> = matches
            .iter()
            .map(|m| {
                Association::new(m.episode_id, entity.id).with_confidence_label(decision.label())
            })
            .collect();

        let pool = &self.pool;
        let row = &entity;
        let assocs = associations.as_slice();
        let slug = retry_on_lock("insert_curated_entity", LOCK_RETRY_MS, move || {
            persist_new_entity(pool, row, assocs)
        })
        .await?;
        entity.slug = slug;

        Ok(entity)
    }

    async fn attach_to_canonical(
        &self,
        canonical_id: Uuid,
        new: &NewEntity,
        matches: &[EpisodeMatch],
        decision: Decision,
    ) -> CurationResult<Entity> {
        let _guard = self.locks.lock(canonical_id).await;

        let mut canonical = {
            let mut conn = self.pool.acquire().await?;
            db::entities::load_entity(&mut conn, canonical_id)
                .await?
                .ok_or_else(|| CurationError::NotFound(format!("entity {}", canonical_id)))?
        };

        // A duplicate may bring the URL the canonical record is missing
        let audit_from = canonical.link_audit.len();
        if let Some(url) = &new.external_link {
            if canonical.external_link.is_none()
                && matches!(canonical.link_state, LinkState::Unlinked | LinkState::Corrected)
            {
                let note = format!("candidate URL supplied by duplicate record {:?}", new.name);
                attach_url(&mut canonical, url, "import", &note)?;
            }
        }

        let associations: Vec<Association> = matches
            .iter()
            .map(|m| {
                Association::new(m.episode_id, canonical_id)
                    .with_confidence_label(decision.label())
            })
            .collect();

        let pool = &self.pool;
        let row = &canonical;
        let new_entries = &canonical.link_audit[audit_from..];
        let assocs = associations.as_slice();
        retry_on_lock("attach_duplicate", LOCK_RETRY_MS, move || {
            persist_duplicate(pool, row, new_entries, assocs)
        })
        .await?;

        tracing::debug!(
            canonical_id = %canonical_id,
            duplicate = %new.name,
            "Duplicate folded into canonical record"
        );
        Ok(canonical)
    }
}

async fn persist_new_entity(
    pool: &SqlitePool,
    entity: &Entity,
    associations: &[Association],
) -> CurationResult<String> {
    let mut tx = pool.begin().await?;

    let mut row = entity.clone();
    row.slug = db::entities::allocate_slug(&mut tx, &row.name, row.id).await?;
    db::entities::insert_entity(&mut tx, &row).await?;
    for entry in &row.link_audit {
        db::link_audit::append_entry(&mut tx, row.id, entry).await?;
    }
    for association in associations {
        db::associations::insert_association(&mut tx, association).await?;
    }

    tx.commit().await?;
    Ok(row.slug)
}

async fn persist_duplicate(
    pool: &SqlitePool,
    canonical: &Entity,
    new_entries: &[fancat_common::LinkAuditEntry],
    associations: &[Association],
) -> CurationResult<()> {
    let mut tx = pool.begin().await?;

    if !new_entries.is_empty() {
        db::entities::update_entity(&mut tx, canonical).await?;
        for entry in new_entries {
            db::link_audit::append_entry(&mut tx, canonical.id, entry).await?;
        }
    }
    for association in associations {
        db::associations::insert_association(&mut tx, association).await?;
    }

    tx.commit().await?;
    Ok(())
}
