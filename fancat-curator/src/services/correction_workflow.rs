//! Correction workflow
//!
//! Re-curates an entity found to point at the wrong real-world place: the
//! replacement data is scored and matched, and either refused (below the
//! reject threshold, nothing written) or applied wholesale with the entity
//! moved to `corrected`. A correction can collide with an existing canonical
//! record, so the duplicate resolver runs afterwards.

use fancat_common::{Association, Entity, LinkAuditEntry, NewEntity};
use sqlx::SqlitePool;
use std::sync::Arc;
use uuid::Uuid;

use super::candidate_matcher::{CandidateMatcher, EpisodeMatch};
use super::confidence_scorer::{ConfidenceScorer, Decision};
use super::duplicate_resolver::{DuplicateResolver, MergeRecord};
use super::link_lifecycle::mark_corrected;
use crate::config::CurationConfig;
use crate::db;
use crate::error::{CurationError, CurationResult};
use crate::utils::{retry_on_lock, EntityLocks};

const LOCK_RETRY_MS: u64 = 5000;

/// Replacement data for one entity
#[derive(Debug, Clone)]
pub struct CorrectionRequest {
    pub entity_id: Uuid,
    pub corrected: NewEntity,
    /// Episode the corrected entity must stay associated with
    pub episode_id: Option<Uuid>,
    /// Who asked for the correction (recorded in the audit trail)
    pub source: String,
}

/// Result of an applied correction
#[derive(Debug, Clone)]
pub struct CorrectionOutcome {
    /// The corrected record, or the canonical record it was merged into
    pub entity: Entity,
    pub score: u8,
    pub decision: Decision,
    pub matches: Vec<EpisodeMatch>,
    pub merge: Option<MergeRecord>,
    /// Set when the corrected record collides with several active records
    pub conflict: Option<Vec<Uuid>>,
}

/// Correction workflow
pub struct CorrectionWorkflow {
    pool: SqlitePool,
    config: Arc<CurationConfig>,
    locks: EntityLocks,
    resolver: DuplicateResolver,
}

impl CorrectionWorkflow {
    pub fn new(pool: SqlitePool, config: Arc<CurationConfig>, locks: EntityLocks) -> Self {
        let resolver = DuplicateResolver::new(pool.clone(), Arc::clone(&config), locks.clone());
        Self {
            pool,
            config,
            locks,
            resolver,
        }
    }

    /// Apply a correction.
    ///
    /// Returns `LowConfidence` without touching the stored record when the
    /// replacement data scores below the review threshold.
    pub async fn correct(&self, request: CorrectionRequest) -> CurationResult<CorrectionOutcome> {
        let entity_id = request.entity_id;

        let (corrected, score, decision, matches) = {
            let _guard = self.locks.lock(entity_id).await;
            self.apply(&request).await?
        };

        let (merge, conflict) = match self.resolver.resolve_entity(entity_id).await {
            Ok(merge) => (merge, None),
            Err(CurationError::ConflictingCanonical { entity_ids }) => {
                tracing::warn!(
                    entity_id = %entity_id,
                    conflicting = ?entity_ids,
                    "Corrected record collides with several active records"
                );
                (None, Some(entity_ids))
            }
            Err(e) => return Err(e),
        };

        let entity = match &merge {
            Some(record) if record.canonical_id != entity_id => {
                let canonical_id = record.canonical_id;
                let mut conn = self.pool.acquire().await?;
                db::entities::load_entity(&mut conn, canonical_id)
                    .await?
                    .ok_or_else(|| CurationError::NotFound(format!("entity {}", canonical_id)))?
            }
            _ => corrected,
        };

        Ok(CorrectionOutcome {
            entity,
            score,
            decision,
            matches,
            merge,
            conflict,
        })
    }

    async fn apply(
        &self,
        request: &CorrectionRequest,
    ) -> CurationResult<(Entity, u8, Decision, Vec<EpisodeMatch>)> {
        let entity_id = request.entity_id;

        let (current, episodes) = {
            let mut conn = self.pool.acquire().await?;
            let current = db::entities::load_entity(&mut conn, entity_id)
                .await?
                .ok_or_else(|| CurationError::NotFound(format!("entity {}", entity_id)))?;

            if let Some(episode_id) = request.episode_id {
                db::episodes::load_episode(&mut conn, episode_id)
                    .await?
                    .ok_or_else(|| CurationError::NotFound(format!("episode {}", episode_id)))?;
            }

            let episodes = match current.owner_id {
                Some(owner_id) => db::episodes::list_episodes_for_owner(&mut conn, owner_id).await?,
                None => Vec::new(),
            };
            (current, episodes)
        };

        let snapshot = snapshot_note(&current);

        let corrected = &request.corrected;
        let scorer = ConfidenceScorer::new(&self.config);
        let score = scorer.score(corrected);
        let decision = scorer.decide(score);
        if decision == Decision::Reject {
            tracing::info!(
                entity_id = %entity_id,
                score,
                "Correction refused: replacement data scores below reject threshold"
            );
            return Err(CurationError::LowConfidence {
                score,
                threshold: self.config.thresholds.review,
            });
        }

        let matches = match current.owner_id {
            Some(owner_id) => CandidateMatcher::new(&self.config).match_episodes(
                &corrected.name,
                corrected.description.as_deref().unwrap_or(""),
                &corrected.category_tags,
                owner_id,
                &episodes,
            ),
            None => Vec::new(),
        };
        if let Some(episode_id) = request.episode_id {
            if !matches.iter().any(|m| m.episode_id == episode_id) {
                tracing::warn!(
                    entity_id = %entity_id,
                    episode_id = %episode_id,
                    "Corrected entity does not match its episode by keyword"
                );
            }
        }

        let mut updated = current.clone();
        updated.name = corrected.name.clone();
        updated.address = corrected.address.clone();
        updated.description = corrected.description.clone();
        if corrected.phone.is_some() {
            updated.phone = corrected.phone.clone();
        }
        if !corrected.category_tags.is_empty() {
            updated.category_tags = corrected.category_tags.clone();
        }
        updated.distinct_branch = corrected.distinct_branch;

        let entry = mark_corrected(
            &mut updated,
            corrected.external_link.clone(),
            &request.source,
            format!("corrected; previous record: {}", snapshot),
        )?;

        let association = request
            .episode_id
            .map(|episode_id| {
                Association::new(episode_id, entity_id).with_confidence_label(decision.label())
            });

        let pool = &self.pool;
        let row = &updated;
        let audit = &entry;
        let assoc = association.as_ref();
        let slug = retry_on_lock("persist_correction", LOCK_RETRY_MS, move || {
            persist_correction(pool, row, audit, assoc)
        })
        .await?;
        updated.slug = slug;

        tracing::info!(
            entity_id = %entity_id,
            score,
            decision = decision.label(),
            "Correction applied"
        );

        Ok((updated, score, decision, matches))
    }
}

/// Human-readable dump of the fields a correction overwrites
pub fn snapshot_note(entity: &Entity) -> String {
    format!(
        "name={:?} address={:?} description={:?} external_link={:?} link_state={}",
        entity.name,
        entity.address.as_deref().unwrap_or(""),
        entity.description.as_deref().unwrap_or(""),
        entity.external_link.as_deref().unwrap_or(""),
        entity.link_state
    )
}

/// Overwrite the entity, re-derive its slug, append the audit entry, and keep
/// the requested association, all in one transaction. Returns the new slug.
async fn persist_correction(
    pool: &SqlitePool,
    entity: &Entity,
    entry: &LinkAuditEntry,
    association: Option<&Association>,
) -> CurationResult<String> {
    let mut tx = pool.begin().await?;

    let mut row = entity.clone();
    row.slug = db::entities::allocate_slug(&mut tx, &row.name, row.id).await?;
    db::entities::update_entity(&mut tx, &row).await?;
    db::link_audit::append_entry(&mut tx, row.id, entry).await?;
    if let Some(association) = association {
        db::associations::insert_association(&mut tx, association).await?;
    }

    tx.commit().await?;
    Ok(row.slug)
}
