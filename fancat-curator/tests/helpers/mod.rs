//! Test helper utilities
//!
//! In-memory catalog fixtures and in-process fakes for the directory and
//! metadata collaborators.

#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use fancat_common::db::open_in_memory;
use fancat_common::{
    Association, ContentOwner, Entity, Episode, InactiveReason, LinkState, NewEntity,
};
use sqlx::SqlitePool;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use uuid::Uuid;

use fancat_curator::config::CurationConfig;
use fancat_curator::db;
use fancat_curator::services::link_lifecycle::{activate, attach_url, deactivate, mark_corrected};
use fancat_curator::services::{
    DirectoryLookup, LinkLifecycleManager, MetadataLookup, PersonResult, VerificationOutcome,
    WorkResult,
};
use fancat_curator::utils::{BackoffPolicy, EntityLocks, LookupError};

/// Fresh in-memory catalog
pub async fn setup_test_db() -> SqlitePool {
    open_in_memory().await.expect("in-memory database")
}

/// Default vocabulary with lookups that never sleep
pub fn fixture_config() -> Arc<CurationConfig> {
    let mut config = CurationConfig::default();
    config.lookup.initial_backoff_ms = 0;
    config.lookup.max_backoff_ms = 0;
    config.lookup.inter_item_delay_ms = 0;
    config.lookup.rate_limit_ms = 0;
    Arc::new(config)
}

pub async fn seed_owner(pool: &SqlitePool, slug: &str) -> ContentOwner {
    let owner = ContentOwner::new(slug.to_uppercase(), slug);
    let mut conn = pool.acquire().await.unwrap();
    db::owners::insert_owner(&mut conn, &owner).await.unwrap();
    owner
}

pub async fn seed_episode(pool: &SqlitePool, owner_id: Uuid, title: &str, day: u32) -> Episode {
    let published = Utc.with_ymd_and_hms(2024, 3, day, 18, 0, 0).unwrap();
    let episode = Episode::new(owner_id, title, None, published);
    let mut conn = pool.acquire().await.unwrap();
    db::episodes::insert_episode(&mut conn, &episode).await.unwrap();
    episode
}

/// Store an entity directly in `state`, with the audit trail that state implies
pub async fn store_entity(
    pool: &SqlitePool,
    owner_id: Uuid,
    name: &str,
    state: LinkState,
) -> Entity {
    let mut conn = pool.acquire().await.unwrap();
    let id = Uuid::new_v4();
    let slug = db::entities::allocate_slug(&mut conn, name, id).await.unwrap();
    let mut entity = Entity::from_new(&NewEntity::named(name), Some(owner_id), slug.clone());
    entity.id = id;

    let url = format!("https://tabelog.com/tokyo/{}/", slug);
    match state {
        LinkState::Unlinked => {}
        LinkState::Candidate => {
            attach_url(&mut entity, &url, "fixture", "").unwrap();
        }
        LinkState::Active => {
            attach_url(&mut entity, &url, "fixture", "").unwrap();
            activate(&mut entity, "fixture", "verified").unwrap();
        }
        LinkState::Inactive => {
            attach_url(&mut entity, &url, "fixture", "").unwrap();
            activate(&mut entity, "fixture", "verified").unwrap();
            deactivate(&mut entity, InactiveReason::Closed, "fixture", "").unwrap();
        }
        LinkState::Corrected => {
            mark_corrected(&mut entity, Some(url), "fixture", "fixture".to_string()).unwrap();
        }
    }

    db::entities::insert_entity(&mut conn, &entity).await.unwrap();
    for entry in &entity.link_audit {
        db::link_audit::append_entry(&mut conn, entity.id, entry).await.unwrap();
    }
    entity
}

pub async fn associate(pool: &SqlitePool, episode_id: Uuid, entity_id: Uuid) {
    let mut conn = pool.acquire().await.unwrap();
    db::associations::insert_association(&mut conn, &Association::new(episode_id, entity_id))
        .await
        .unwrap();
}

pub async fn load(pool: &SqlitePool, entity_id: Uuid) -> Option<Entity> {
    let mut conn = pool.acquire().await.unwrap();
    db::entities::load_entity(&mut conn, entity_id).await.unwrap()
}

pub async fn associations_of(pool: &SqlitePool, entity_id: Uuid) -> Vec<Association> {
    let mut conn = pool.acquire().await.unwrap();
    db::associations::list_for_entity(&mut conn, entity_id).await.unwrap()
}

pub async fn entity_count(pool: &SqlitePool) -> i64 {
    sqlx::query_scalar("SELECT COUNT(*) FROM entities")
        .fetch_one(pool)
        .await
        .unwrap()
}

/// Scripted directory collaborator
#[derive(Default)]
pub struct FakeDirectory {
    /// Consumed front to back; `fallback_verify` once empty
    verify_script: Mutex<VecDeque<Result<VerificationOutcome, LookupError>>>,
    fallback_verify: Option<Result<VerificationOutcome, LookupError>>,
    resolved_url: Option<String>,
    pub verify_calls: AtomicUsize,
    pub resolve_calls: AtomicUsize,
}

impl FakeDirectory {
    pub fn verifying(outcome: VerificationOutcome) -> Self {
        Self {
            fallback_verify: Some(Ok(outcome)),
            ..Default::default()
        }
    }

    pub fn failing(error: LookupError) -> Self {
        Self {
            fallback_verify: Some(Err(error)),
            ..Default::default()
        }
    }

    pub fn scripted(script: Vec<Result<VerificationOutcome, LookupError>>) -> Self {
        Self {
            verify_script: Mutex::new(script.into()),
            ..Default::default()
        }
    }

    pub fn resolving(url: &str) -> Self {
        Self {
            resolved_url: Some(url.to_string()),
            ..Default::default()
        }
    }

    pub fn verify_count(&self) -> usize {
        self.verify_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl DirectoryLookup for FakeDirectory {
    async fn resolve_url(
        &self,
        _name: &str,
        _address: Option<&str>,
    ) -> Result<Option<String>, LookupError> {
        self.resolve_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.resolved_url.clone())
    }

    async fn verify(
        &self,
        _url: &str,
        _entity: &Entity,
    ) -> Result<VerificationOutcome, LookupError> {
        self.verify_calls.fetch_add(1, Ordering::SeqCst);
        let scripted = self.verify_script.lock().unwrap().pop_front();
        match scripted {
            Some(result) => result,
            None => self
                .fallback_verify
                .clone()
                .unwrap_or_else(|| Err(LookupError::Permanent("no scripted response".to_string()))),
        }
    }
}

/// Metadata collaborator that always fails
pub struct UnavailableMetadata;

#[async_trait]
impl MetadataLookup for UnavailableMetadata {
    async fn search_person(&self, _name: &str) -> Result<Option<PersonResult>, LookupError> {
        Err(LookupError::Transient("timeout".to_string()))
    }

    async fn search_work(&self, _title: &str) -> Result<Option<WorkResult>, LookupError> {
        Err(LookupError::Transient("timeout".to_string()))
    }
}

/// Metadata collaborator with canned answers
pub struct CannedMetadata;

#[async_trait]
impl MetadataLookup for CannedMetadata {
    async fn search_person(&self, name: &str) -> Result<Option<PersonResult>, LookupError> {
        Ok(Some(PersonResult {
            external_id: format!("person-{}", name.len()),
            image_url: Some("https://image.tmdb.org/t/p/w500/p.jpg".to_string()),
            work_history: vec!["A Show".to_string()],
        }))
    }

    async fn search_work(&self, title: &str) -> Result<Option<WorkResult>, LookupError> {
        Ok(Some(WorkResult {
            id: "42".to_string(),
            title: title.to_string(),
            overview: Some(format!("Overview of {}", title)),
            release_date: None,
            genre_ids: vec![],
        }))
    }
}

pub fn lifecycle(
    pool: &SqlitePool,
    directory: Arc<FakeDirectory>,
    max_attempts: u32,
) -> LinkLifecycleManager {
    LinkLifecycleManager::new(
        pool.clone(),
        EntityLocks::new(),
        directory,
        BackoffPolicy::immediate(max_attempts),
    )
}
