//! Duplicate resolution
//!
//! Two records denote the same real-world place when their normalized names
//! share a long prefix, or are identical once branch/area qualifiers are
//! stripped, and neither is marked as a distinct branch. One canonical record
//! is elected per group; the others hand over their associations and are
//! deleted in a single transaction.

use fancat_common::time;
use fancat_common::{Entity, LinkAuditEntry, LinkState, NewEntity};
use sqlx::SqlitePool;
use std::sync::Arc;
use uuid::Uuid;

use super::confidence_scorer::ConfidenceScorer;
use crate::config::{CurationConfig, Vocabulary};
use crate::db;
use crate::error::{CurationError, CurationResult};
use crate::utils::text::{common_prefix_len, normalize_name};
use crate::utils::{retry_on_lock, EntityLocks};

const LOCK_RETRY_MS: u64 = 5000;

/// Result of checking one candidate against stored records
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DuplicateCheck {
    pub is_duplicate: bool,
    pub canonical_id: Option<Uuid>,
}

impl DuplicateCheck {
    fn unique() -> Self {
        Self {
            is_duplicate: false,
            canonical_id: None,
        }
    }
}

/// One completed merge
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergeRecord {
    pub canonical_id: Uuid,
    pub removed_ids: Vec<Uuid>,
    /// Associations newly created on the canonical record
    pub associations_moved: u64,
}

/// Outcome of resolving every record of one owner
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResolveReport {
    pub merges: Vec<MergeRecord>,
    /// Groups left alone because more than one record is active
    pub conflicts: Vec<Vec<Uuid>>,
}

impl ResolveReport {
    /// True when nothing was changed
    pub fn is_noop(&self) -> bool {
        self.merges.is_empty()
    }
}

/// Name with branch/area qualifiers removed, normalized
pub fn strip_qualifiers(name: &str, vocab: &Vocabulary) -> String {
    let mut base = remove_bracketed(&name.to_lowercase());

    for separator in [" - ", " / ", "@", ",", "、"] {
        if let Some(idx) = base.find(separator) {
            if idx > 0 {
                base.truncate(idx);
            }
        }
    }

    let mut qualifiers: Vec<String> = vocab
        .branch_qualifiers
        .iter()
        .chain(vocab.area_names.iter())
        .map(|q| q.trim().to_lowercase())
        .filter(|q| !q.is_empty())
        .collect();
    qualifiers.sort_by_key(|q| std::cmp::Reverse(q.chars().count()));

    loop {
        let trimmed = base.trim_end();
        let stripped = qualifiers.iter().find_map(|q| {
            let rest = trimmed.strip_suffix(q.as_str())?;
            let on_boundary = !q.is_ascii()
                || rest.chars().next_back().map_or(false, |c| !c.is_alphanumeric());
            (on_boundary && !normalize_name(rest).is_empty()).then(|| rest.to_string())
        });
        match stripped {
            Some(rest) => base = rest,
            None => break,
        }
    }

    normalize_name(&base)
}

fn remove_bracketed(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut depth = 0usize;
    for c in text.chars() {
        match c {
            '(' | '（' | '[' | '【' => depth += 1,
            ')' | '）' | ']' | '】' => depth = depth.saturating_sub(1),
            _ if depth == 0 => out.push(c),
            _ => {}
        }
    }
    out
}

/// Do two names (with their distinct-branch flags) denote the same place?
pub fn same_place(
    config: &CurationConfig,
    a_name: &str,
    a_distinct: bool,
    b_name: &str,
    b_distinct: bool,
) -> bool {
    if a_distinct || b_distinct {
        return false;
    }

    let a_norm = normalize_name(a_name);
    let b_norm = normalize_name(b_name);
    if a_norm.is_empty() || b_norm.is_empty() {
        return false;
    }
    if common_prefix_len(&a_norm, &b_norm) >= config.duplicates.min_prefix_len {
        return true;
    }

    let vocab = &config.vocabulary;
    let a_base = strip_qualifiers(a_name, vocab);
    let b_base = strip_qualifiers(b_name, vocab);
    a_base == b_base && !is_generic(&a_base, vocab)
}

/// A stripped name that is nothing but a category word says nothing about identity
fn is_generic(base: &str, vocab: &Vocabulary) -> bool {
    base.is_empty()
        || vocab
            .strong_keywords
            .iter()
            .chain(vocab.medium_keywords.iter())
            .chain(vocab.cuisine_keywords.iter())
            .chain(vocab.domain_nouns.iter())
            .any(|kw| normalize_name(kw) == base)
}

/// Pick the canonical record of a duplicate group.
///
/// The single active record wins; two or more active records are a conflict.
/// Without an active record: highest score, then earliest created, then id.
pub fn elect_canonical(config: &CurationConfig, group: &[&Entity]) -> CurationResult<Uuid> {
    let active: Vec<&Entity> = group
        .iter()
        .copied()
        .filter(|e| e.link_state == LinkState::Active)
        .collect();

    match active.len() {
        0 => {}
        1 => return Ok(active[0].id),
        _ => {
            let mut entity_ids: Vec<Uuid> = active.iter().map(|e| e.id).collect();
            entity_ids.sort();
            return Err(CurationError::ConflictingCanonical { entity_ids });
        }
    }

    let scorer = ConfidenceScorer::new(config);
    group
        .iter()
        .map(|e| (scorer.score_stored(e), *e))
        .max_by(|(sa, a), (sb, b)| {
            sa.cmp(sb)
                .then(b.created_at.cmp(&a.created_at))
                .then(b.id.cmp(&a.id))
        })
        .map(|(_, e)| e.id)
        .ok_or_else(|| CurationError::InvalidInput("empty duplicate group".to_string()))
}

/// Check a not-yet-stored candidate against stored records
pub fn resolve(
    config: &CurationConfig,
    candidate: &NewEntity,
    existing: &[Entity],
) -> CurationResult<DuplicateCheck> {
    let matches: Vec<&Entity> = existing
        .iter()
        .filter(|e| {
            same_place(
                config,
                &candidate.name,
                candidate.distinct_branch,
                &e.name,
                e.distinct_branch,
            )
        })
        .collect();

    if matches.is_empty() {
        return Ok(DuplicateCheck::unique());
    }

    let canonical_id = elect_canonical(config, &matches)?;
    Ok(DuplicateCheck {
        is_duplicate: true,
        canonical_id: Some(canonical_id),
    })
}

/// Partition records into duplicate groups (size ≥ 2), ids in input order
pub fn group_duplicates(config: &CurationConfig, entities: &[Entity]) -> Vec<Vec<Uuid>> {
    let mut parent: Vec<usize> = (0..entities.len()).collect();

    fn find(parent: &mut [usize], mut i: usize) -> usize {
        while parent[i] != i {
            parent[i] = parent[parent[i]];
            i = parent[i];
        }
        i
    }

    for i in 0..entities.len() {
        for j in (i + 1)..entities.len() {
            let (a, b) = (&entities[i], &entities[j]);
            if same_place(config, &a.name, a.distinct_branch, &b.name, b.distinct_branch) {
                let (ra, rb) = (find(&mut parent, i), find(&mut parent, j));
                if ra != rb {
                    parent[rb.max(ra)] = ra.min(rb);
                }
            }
        }
    }

    let mut groups: Vec<(usize, Vec<Uuid>)> = Vec::new();
    for (i, entity) in entities.iter().enumerate() {
        let root = find(&mut parent, i);
        match groups.iter_mut().find(|(r, _)| *r == root) {
            Some((_, members)) => members.push(entity.id),
            None => groups.push((root, vec![entity.id])),
        }
    }

    groups
        .into_iter()
        .map(|(_, members)| members)
        .filter(|members| members.len() > 1)
        .collect()
}

/// Persisted duplicate resolution
pub struct DuplicateResolver {
    pool: SqlitePool,
    config: Arc<CurationConfig>,
    locks: EntityLocks,
}

impl DuplicateResolver {
    pub fn new(pool: SqlitePool, config: Arc<CurationConfig>, locks: EntityLocks) -> Self {
        Self { pool, config, locks }
    }

    /// Merge every duplicate group among one owner's records.
    ///
    /// Conflicting groups are reported and left untouched. Running this twice
    /// in a row makes no further changes.
    pub async fn resolve_owner(&self, owner_id: Uuid) -> CurationResult<ResolveReport> {
        let entities = {
            let mut conn = self.pool.acquire().await?;
            db::entities::list_entities_for_owner(&mut conn, owner_id).await?
        };

        let mut report = ResolveReport::default();
        for group in group_duplicates(&self.config, &entities) {
            match self.merge_group(&group).await {
                Ok(Some(record)) => report.merges.push(record),
                Ok(None) => {}
                Err(CurationError::ConflictingCanonical { entity_ids }) => {
                    tracing::warn!(
                        owner_id = %owner_id,
                        entities = ?entity_ids,
                        "Duplicate group has several active records; needs manual adjudication"
                    );
                    report.conflicts.push(entity_ids);
                }
                Err(e) => return Err(e),
            }
        }

        tracing::info!(
            owner_id = %owner_id,
            merges = report.merges.len(),
            conflicts = report.conflicts.len(),
            "Duplicate resolution complete"
        );
        Ok(report)
    }

    /// Merge one record with any stored duplicates of it (same owner)
    pub async fn resolve_entity(&self, entity_id: Uuid) -> CurationResult<Option<MergeRecord>> {
        let (target, siblings) = {
            let mut conn = self.pool.acquire().await?;
            let target = db::entities::load_entity(&mut conn, entity_id)
                .await?
                .ok_or_else(|| CurationError::NotFound(format!("entity {}", entity_id)))?;
            let Some(owner_id) = target.owner_id else {
                return Ok(None);
            };
            let siblings = db::entities::list_entities_for_owner(&mut conn, owner_id).await?;
            (target, siblings)
        };

        let mut group: Vec<Uuid> = vec![target.id];
        group.extend(
            siblings
                .iter()
                .filter(|e| e.id != target.id)
                .filter(|e| {
                    same_place(
                        &self.config,
                        &target.name,
                        target.distinct_branch,
                        &e.name,
                        e.distinct_branch,
                    )
                })
                .map(|e| e.id),
        );

        if group.len() < 2 {
            return Ok(None);
        }
        self.merge_group(&group).await
    }

    async fn merge_group(&self, ids: &[Uuid]) -> CurationResult<Option<MergeRecord>> {
        let _guards = self.locks.lock_many(ids).await;

        // Re-read under the locks
        let mut members = Vec::with_capacity(ids.len());
        {
            let mut conn = self.pool.acquire().await?;
            for id in ids {
                if let Some(entity) = db::entities::load_entity(&mut conn, *id).await? {
                    members.push(entity);
                }
            }
        }
        if members.len() < 2 {
            return Ok(None);
        }

        let refs: Vec<&Entity> = members.iter().collect();
        let canonical_id = elect_canonical(&self.config, &refs)?;
        let removed_ids: Vec<Uuid> = members
            .iter()
            .map(|e| e.id)
            .filter(|id| *id != canonical_id)
            .collect();

        let canonical = members
            .iter()
            .find(|e| e.id == canonical_id)
            .ok_or_else(|| CurationError::NotFound(format!("canonical entity {}", canonical_id)))?;
        let folded: Vec<&Entity> = members.iter().filter(|e| e.id != canonical_id).collect();
        let entry = merge_entry(canonical, &folded);

        let pool = &self.pool;
        let removed = removed_ids.as_slice();
        let entry = &entry;
        let associations_moved = retry_on_lock("merge_duplicates", LOCK_RETRY_MS, move || {
            apply_merge(pool, canonical_id, removed, entry)
        })
        .await?;

        tracing::info!(
            canonical_id = %canonical_id,
            removed = ?removed_ids,
            associations_moved,
            "Merged duplicate records"
        );

        Ok(Some(MergeRecord {
            canonical_id,
            removed_ids,
            associations_moved,
        }))
    }
}

/// Audit note on the surviving record naming what was folded into it
fn merge_entry(canonical: &Entity, folded: &[&Entity]) -> LinkAuditEntry {
    let merged: Vec<String> = folded
        .iter()
        .map(|e| match &e.external_link {
            Some(url) => format!("{} ({})", e.id, url),
            None => format!("{} (no link)", e.id),
        })
        .collect();

    LinkAuditEntry {
        timestamp: time::now(),
        source: "resolver".to_string(),
        previous_url: canonical.external_link.clone(),
        new_url: canonical.external_link.clone(),
        from_state: canonical.link_state,
        to_state: canonical.link_state,
        reason: None,
        note: format!("merged duplicates: {}", merged.join(", ")),
    }
}

async fn apply_merge(
    pool: &SqlitePool,
    canonical_id: Uuid,
    removed: &[Uuid],
    entry: &LinkAuditEntry,
) -> CurationResult<u64> {
    let mut tx = pool.begin().await?;
    let mut moved = 0;
    for id in removed {
        moved += db::associations::repoint(&mut tx, *id, canonical_id).await?;
        db::entities::delete_entity(&mut tx, *id).await?;
    }
    db::link_audit::append_entry(&mut tx, canonical_id, entry).await?;
    tx.commit().await?;
    Ok(moved)
}
