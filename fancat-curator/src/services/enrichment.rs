//! Owner/episode enrichment from the metadata collaborator
//!
//! Strictly optional: every lookup failure degrades to "no enrichment" with a
//! warning and never blocks curation.

use sqlx::SqlitePool;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

use super::metadata_client::MetadataLookup;
use crate::db;
use crate::error::{CurationError, CurationResult};
use crate::utils::{retry_lookup, BackoffPolicy};

/// What one enrichment pass changed
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EnrichmentReport {
    pub owner_enriched: bool,
    pub episodes_enriched: usize,
    /// Lookups that failed or found nothing
    pub skipped: usize,
}

/// Fills owner ids/images and empty episode descriptions
pub struct Enricher {
    pool: SqlitePool,
    metadata: Arc<dyn MetadataLookup>,
    policy: BackoffPolicy,
    inter_item_delay: Duration,
}

impl Enricher {
    pub fn new(
        pool: SqlitePool,
        metadata: Arc<dyn MetadataLookup>,
        policy: BackoffPolicy,
        inter_item_delay: Duration,
    ) -> Self {
        Self {
            pool,
            metadata,
            policy,
            inter_item_delay,
        }
    }

    /// Enrich one owner and its episodes that lack a description
    pub async fn enrich_owner(&self, owner_id: Uuid) -> CurationResult<EnrichmentReport> {
        let (owner, episodes) = {
            let mut conn = self.pool.acquire().await?;
            let owner = db::owners::load_owner(&mut conn, owner_id)
                .await?
                .ok_or_else(|| CurationError::NotFound(format!("owner {}", owner_id)))?;
            let episodes = db::episodes::list_episodes_for_owner(&mut conn, owner_id).await?;
            (owner, episodes)
        };

        let mut report = EnrichmentReport::default();
        let metadata = self.metadata.as_ref();

        if owner.external_id.is_none() {
            let name = owner.display_name.as_str();
            let found = retry_lookup("metadata_search_person", self.policy, move || {
                metadata.search_person(name)
            })
            .await;
            match found {
                Ok(Some(person)) => {
                    let mut conn = self.pool.acquire().await?;
                    db::owners::update_owner_metadata(
                        &mut conn,
                        owner.id,
                        Some(&person.external_id),
                        person.image_url.as_deref(),
                    )
                    .await?;
                    tracing::info!(
                        owner = %owner.slug,
                        external_id = %person.external_id,
                        known_for = person.work_history.len(),
                        "Owner enriched"
                    );
                    report.owner_enriched = true;
                }
                Ok(None) => report.skipped += 1,
                Err(e) => {
                    tracing::warn!(owner = %owner.slug, error = %e, "Owner enrichment skipped");
                    report.skipped += 1;
                }
            }
        }

        let undescribed = episodes
            .iter()
            .filter(|e| e.description.as_deref().map_or(true, |d| d.trim().is_empty()));
        for episode in undescribed {
            if !self.inter_item_delay.is_zero() {
                tokio::time::sleep(self.inter_item_delay).await;
            }

            let title = episode.title.as_str();
            let found = retry_lookup("metadata_search_work", self.policy, move || {
                metadata.search_work(title)
            })
            .await;
            match found {
                Ok(Some(work)) => match work.overview {
                    Some(overview) => {
                        let mut conn = self.pool.acquire().await?;
                        let filled =
                            db::episodes::fill_episode_description(&mut conn, episode.id, &overview)
                                .await?;
                        if filled {
                            report.episodes_enriched += 1;
                            tracing::debug!(
                                episode_id = %episode.id,
                                work_id = %work.id,
                                "Episode description filled"
                            );
                        }
                    }
                    None => report.skipped += 1,
                },
                Ok(None) => report.skipped += 1,
                Err(e) => {
                    tracing::warn!(
                        episode_id = %episode.id,
                        error = %e,
                        "Episode enrichment skipped"
                    );
                    report.skipped += 1;
                }
            }
        }

        Ok(report)
    }
}
