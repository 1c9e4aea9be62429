//! Link lifecycle management
//!
//! State machine over an entity's external monetized link:
//!
//! ```text
//! unlinked ──attach──▶ candidate ──verify ok──▶ active ◀──reopen── inactive
//!                          │                      │                   ▲
//!                          └──────verify fails────┴───────────────────┘
//! any ──correction──▶ corrected ──attach──▶ candidate
//!                         └──────verify ok──▶ active
//! ```
//!
//! Every transition appends exactly one audit entry. State change and audit
//! append are persisted in one transaction while the entity's lock is held.

use fancat_common::models::validate_url;
use fancat_common::{time, Entity, InactiveReason, LinkAuditEntry, LinkState};
use sqlx::SqlitePool;
use std::sync::Arc;
use uuid::Uuid;

use super::directory_client::{DirectoryLookup, VerificationOutcome};
use crate::db;
use crate::error::{CurationError, CurationResult};
use crate::utils::{retry_lookup, retry_on_lock, BackoffPolicy, EntityLocks};

const LOCK_RETRY_MS: u64 = 5000;

/// Is `from → to` a legal lifecycle transition?
pub fn transition_allowed(from: LinkState, to: LinkState) -> bool {
    use LinkState::*;
    matches!(
        (from, to),
        (Unlinked, Candidate)
            | (Corrected, Candidate)
            | (Candidate, Active)
            | (Corrected, Active)
            | (Inactive, Active)
            | (Active, Inactive)
            | (Candidate, Inactive)
            | (_, Corrected)
    )
}

fn apply(
    entity: &mut Entity,
    to: LinkState,
    new_url: Option<String>,
    reason: Option<InactiveReason>,
    source: &str,
    note: String,
) -> CurationResult<LinkAuditEntry> {
    let from = entity.link_state;
    if !transition_allowed(from, to) {
        return Err(CurationError::InvalidTransition { from, to });
    }

    let entry = LinkAuditEntry {
        timestamp: time::now(),
        source: source.to_string(),
        previous_url: entity.external_link.clone(),
        new_url: new_url.clone(),
        from_state: from,
        to_state: to,
        reason,
        note,
    };

    entity.external_link = new_url;
    entity.link_state = to;
    entity.updated_at = entry.timestamp;
    entity.link_audit.push(entry.clone());
    Ok(entry)
}

/// Attach a found URL: `unlinked`/`corrected` → `candidate`
pub fn attach_url(
    entity: &mut Entity,
    url: &str,
    source: &str,
    note: &str,
) -> CurationResult<LinkAuditEntry> {
    let url = validate_url(url)?;
    let note = if note.is_empty() {
        format!("candidate URL attached: {}", url)
    } else {
        note.to_string()
    };
    apply(entity, LinkState::Candidate, Some(url), None, source, note)
}

/// Verification succeeded: → `active`
pub fn activate(entity: &mut Entity, source: &str, note: &str) -> CurationResult<LinkAuditEntry> {
    let url = entity.external_link.clone().ok_or_else(|| {
        CurationError::VerificationFailed(format!(
            "entity {} has no external link to activate",
            entity.id
        ))
    })?;
    apply(entity, LinkState::Active, Some(url), None, source, note.to_string())
}

/// Closure/relocation/stale URL: → `inactive`, link retained for history
pub fn deactivate(
    entity: &mut Entity,
    reason: InactiveReason,
    source: &str,
    note: &str,
) -> CurationResult<LinkAuditEntry> {
    let retained = entity.external_link.clone();
    let note = if note.is_empty() {
        format!("link deactivated: {}", reason)
    } else {
        note.to_string()
    };
    apply(entity, LinkState::Inactive, retained, Some(reason), source, note)
}

/// Wholesale correction: → `corrected` with the replacement URL (may be none)
pub fn mark_corrected(
    entity: &mut Entity,
    new_url: Option<String>,
    source: &str,
    note: String,
) -> CurationResult<LinkAuditEntry> {
    let new_url = new_url.map(|u| validate_url(&u)).transpose()?;
    apply(entity, LinkState::Corrected, new_url, None, source, note)
}

/// What a verification run did
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VerifyOutcome {
    /// Moved to `active`
    Activated,
    /// Already `active` and still verified; nothing written
    StillActive,
    /// Moved to `inactive`
    Deactivated(InactiveReason),
    /// Already `inactive` and still failing; nothing written
    StillInactive(InactiveReason),
    /// Lookup unavailable after retries; nothing written
    Unverifiable(String),
    /// Curator-supplied link failed verification; stays `corrected` for review
    CorrectionUnconfirmed(InactiveReason),
}

/// What a URL search did
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttachOutcome {
    Attached(String),
    NotFound,
    /// Entity already carries a link; nothing written
    Skipped,
    Unverifiable(String),
}

/// Persisted lifecycle operations
#[derive(Clone)]
pub struct LinkLifecycleManager {
    pool: SqlitePool,
    locks: EntityLocks,
    directory: Arc<dyn DirectoryLookup>,
    policy: BackoffPolicy,
}

impl LinkLifecycleManager {
    pub fn new(
        pool: SqlitePool,
        locks: EntityLocks,
        directory: Arc<dyn DirectoryLookup>,
        policy: BackoffPolicy,
    ) -> Self {
        Self {
            pool,
            locks,
            directory,
            policy,
        }
    }

    /// Attach a known URL to an entity
    pub async fn attach(&self, entity_id: Uuid, url: &str, source: &str) -> CurationResult<Entity> {
        let _guard = self.locks.lock(entity_id).await;
        let mut entity = self.load(entity_id).await?;

        let entry = attach_url(&mut entity, url, source, "")?;
        self.persist(&entity, &entry).await?;

        tracing::info!(entity_id = %entity_id, url = %url, "Candidate link attached");
        Ok(entity)
    }

    /// Ask the directory for a page and attach it as a candidate
    pub async fn find_and_attach(&self, entity_id: Uuid) -> CurationResult<AttachOutcome> {
        let _guard = self.locks.lock(entity_id).await;
        let mut entity = self.load(entity_id).await?;

        if entity.external_link.is_some()
            || !matches!(entity.link_state, LinkState::Unlinked | LinkState::Corrected)
        {
            return Ok(AttachOutcome::Skipped);
        }

        let directory = self.directory.as_ref();
        let name = entity.name.as_str();
        let address = entity.address.as_deref();
        let found = retry_lookup("directory_resolve_url", self.policy, move || {
            directory.resolve_url(name, address)
        })
        .await;

        let url = match found {
            Ok(Some(url)) => url,
            Ok(None) => {
                tracing::debug!(entity_id = %entity_id, "No directory page found");
                return Ok(AttachOutcome::NotFound);
            }
            Err(CurationError::ExternalLookupUnavailable(msg)) => {
                tracing::warn!(
                    entity_id = %entity_id,
                    error = %msg,
                    "Directory search unavailable"
                );
                return Ok(AttachOutcome::Unverifiable(msg));
            }
            Err(e) => return Err(e),
        };

        let entry = attach_url(&mut entity, &url, "directory", "")?;
        self.persist(&entity, &entry).await?;

        tracing::info!(entity_id = %entity_id, url = %url, "Candidate link found and attached");
        Ok(AttachOutcome::Attached(url))
    }

    /// Point-in-time verification of the stored URL
    pub async fn verify(&self, entity_id: Uuid) -> CurationResult<VerifyOutcome> {
        let _guard = self.locks.lock(entity_id).await;
        let mut entity = self.load(entity_id).await?;

        let url = entity.external_link.clone().ok_or_else(|| {
            CurationError::InvalidInput(format!(
                "entity {} has no external link to verify",
                entity_id
            ))
        })?;

        let directory = self.directory.as_ref();
        let subject = &entity;
        let link = url.as_str();
        let checked = retry_lookup("directory_verify", self.policy, move || {
            directory.verify(link, subject)
        })
        .await;

        let verdict = match checked {
            Ok(verdict) => verdict,
            Err(CurationError::ExternalLookupUnavailable(msg)) => {
                tracing::warn!(
                    entity_id = %entity_id,
                    error = %msg,
                    "Link unverifiable; state unchanged"
                );
                return Ok(VerifyOutcome::Unverifiable(msg));
            }
            Err(e) => return Err(e),
        };

        let reason = match verdict {
            VerificationOutcome::Verified => None,
            VerificationOutcome::Closed => Some(InactiveReason::Closed),
            VerificationOutcome::Relocated => Some(InactiveReason::Relocated),
            VerificationOutcome::UrlInvalid => Some(InactiveReason::UrlInvalid),
        };

        match (entity.link_state, reason) {
            (LinkState::Active, None) => Ok(VerifyOutcome::StillActive),
            (LinkState::Inactive, Some(reason)) => Ok(VerifyOutcome::StillInactive(reason)),
            (_, None) => {
                let note = format!("verified reachable: {}", url);
                let entry = activate(&mut entity, "directory", &note)?;
                self.persist(&entity, &entry).await?;
                tracing::info!(entity_id = %entity_id, "Link verified and activated");
                Ok(VerifyOutcome::Activated)
            }
            (LinkState::Corrected, Some(reason)) => {
                tracing::warn!(
                    entity_id = %entity_id,
                    reason = %reason,
                    "Corrected link failed verification; left for review"
                );
                Ok(VerifyOutcome::CorrectionUnconfirmed(reason))
            }
            (_, Some(reason)) => {
                let entry = deactivate(&mut entity, reason, "directory", "")?;
                self.persist(&entity, &entry).await?;
                tracing::info!(entity_id = %entity_id, reason = %reason, "Link deactivated");
                Ok(VerifyOutcome::Deactivated(reason))
            }
        }
    }

    /// Record a closure/relocation reported by a curator
    pub async fn close(
        &self,
        entity_id: Uuid,
        reason: InactiveReason,
        note: &str,
    ) -> CurationResult<Entity> {
        let _guard = self.locks.lock(entity_id).await;
        let mut entity = self.load(entity_id).await?;

        let entry = deactivate(&mut entity, reason, "curator", note)?;
        self.persist(&entity, &entry).await?;

        tracing::info!(entity_id = %entity_id, reason = %reason, "Link closed by curator");
        Ok(entity)
    }

    async fn load(&self, entity_id: Uuid) -> CurationResult<Entity> {
        let mut conn = self.pool.acquire().await?;
        db::entities::load_entity(&mut conn, entity_id)
            .await?
            .ok_or_else(|| CurationError::NotFound(format!("entity {}", entity_id)))
    }

    async fn persist(&self, entity: &Entity, entry: &LinkAuditEntry) -> CurationResult<()> {
        let pool = &self.pool;
        retry_on_lock("persist_link_transition", LOCK_RETRY_MS, move || {
            persist_transition(pool, entity, entry)
        })
        .await
    }
}

/// Write an entity's new link state and its audit entry atomically
pub async fn persist_transition(
    pool: &SqlitePool,
    entity: &Entity,
    entry: &LinkAuditEntry,
) -> CurationResult<()> {
    let mut tx = pool.begin().await?;
    db::entities::update_entity(&mut tx, entity).await?;
    db::link_audit::append_entry(&mut tx, entity.id, entry).await?;
    tx.commit().await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use fancat_common::NewEntity;

    fn fresh() -> Entity {
        Entity::from_new(&NewEntity::named("Ichiban Sushi"), None, "ichiban-sushi".to_string())
    }

    #[test]
    fn test_attach_then_activate() {
        let mut entity = fresh();

        attach_url(&mut entity, "https://tabelog.com/tokyo/A1/", "import", "").unwrap();
        assert_eq!(entity.link_state, LinkState::Candidate);

        let entry = activate(&mut entity, "directory", "ok").unwrap();
        assert_eq!(entity.link_state, LinkState::Active);
        assert_eq!(entry.previous_url, entry.new_url);
        assert_eq!(entity.link_audit.len(), 2);
        assert!(entity.is_monetizable());
    }

    #[test]
    fn test_unlinked_cannot_activate() {
        let mut entity = fresh();
        let result = activate(&mut entity, "directory", "");
        assert!(result.is_err());
        assert!(entity.link_audit.is_empty());
    }

    #[test]
    fn test_deactivate_keeps_url_and_reason() {
        let mut entity = fresh();
        attach_url(&mut entity, "https://tabelog.com/tokyo/A1/", "import", "").unwrap();
        activate(&mut entity, "directory", "").unwrap();

        let entry = deactivate(&mut entity, InactiveReason::Closed, "directory", "").unwrap();

        assert_eq!(entity.link_state, LinkState::Inactive);
        assert_eq!(entry.reason, Some(InactiveReason::Closed));
        assert!(entity.external_link.is_some());
        assert!(!entity.is_monetizable());
    }

    #[test]
    fn test_inactive_can_reopen_but_not_reattach() {
        let mut entity = fresh();
        attach_url(&mut entity, "https://tabelog.com/tokyo/A1/", "import", "").unwrap();
        deactivate(&mut entity, InactiveReason::UrlInvalid, "directory", "").unwrap();

        assert!(matches!(
            attach_url(&mut entity, "https://tabelog.com/tokyo/A2/", "import", ""),
            Err(CurationError::InvalidTransition {
                from: LinkState::Inactive,
                to: LinkState::Candidate
            })
        ));
        activate(&mut entity, "directory", "reopened").unwrap();
        assert_eq!(entity.link_state, LinkState::Active);
    }

    #[test]
    fn test_corrected_reenters_candidate() {
        let mut entity = fresh();
        mark_corrected(&mut entity, None, "curator", "wrong place".to_string()).unwrap();
        assert_eq!(entity.link_state, LinkState::Corrected);

        attach_url(&mut entity, "https://hotpepper.jp/strJ0001/", "directory", "").unwrap();
        assert_eq!(entity.link_state, LinkState::Candidate);
    }

    #[test]
    fn test_invalid_url_rejected_before_transition() {
        let mut entity = fresh();
        assert!(attach_url(&mut entity, "ftp://example.com/x", "import", "").is_err());
        assert_eq!(entity.link_state, LinkState::Unlinked);
        assert!(entity.link_audit.is_empty());
    }

    #[test]
    fn test_transition_table_is_one_directional() {
        assert!(!transition_allowed(LinkState::Active, LinkState::Candidate));
        assert!(!transition_allowed(LinkState::Inactive, LinkState::Unlinked));
        assert!(!transition_allowed(LinkState::Candidate, LinkState::Unlinked));
        assert!(transition_allowed(LinkState::Active, LinkState::Corrected));
    }
}
