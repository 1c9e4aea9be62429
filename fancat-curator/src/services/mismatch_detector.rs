//! Association mismatch detection
//!
//! Flags associations whose entity probably is not the place the episode is
//! about. Findings are suggestions for the correction workflow; nothing here
//! writes.

use fancat_common::{Entity, Episode};
use serde::Serialize;
use sqlx::SqlitePool;
use std::collections::HashMap;
use uuid::Uuid;

use crate::config::{CurationConfig, Vocabulary};
use crate::db;
use crate::error::CurationResult;
use crate::utils::text::matching_keywords;

/// A suspected mismatch between an episode and an associated entity
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Mismatch {
    /// Episode names an area the entity's address does not
    Geographic {
        episode_area: String,
        entity_area: String,
    },
    /// Episode names a cuisine/genre the entity does not
    Category {
        episode_genre: String,
        entity_genres: Vec<String>,
    },
}

/// Mismatches for one association
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MismatchReport {
    pub episode_id: Uuid,
    pub episode_title: String,
    pub entity_id: Uuid,
    pub entity_name: String,
    pub mismatches: Vec<Mismatch>,
}

/// Compare one episode with one entity.
///
/// A check only fires when both sides name something from the vocabulary and
/// the two sets are disjoint; silence on either side is not a mismatch.
pub fn detect(episode: &Episode, entity: &Entity, vocab: &Vocabulary) -> Vec<Mismatch> {
    let episode_text = episode.searchable_text();
    let mut mismatches = Vec::new();

    let episode_areas = matching_keywords(&vocab.area_names, &[episode_text.as_str()]);
    let address = entity.address.as_deref().unwrap_or("");
    let entity_areas = matching_keywords(&vocab.area_names, &[address]);
    if let (Some(episode_area), Some(entity_area)) = (episode_areas.first(), entity_areas.first()) {
        if disjoint(&episode_areas, &entity_areas) {
            mismatches.push(Mismatch::Geographic {
                episode_area: episode_area.to_string(),
                entity_area: entity_area.to_string(),
            });
        }
    }

    let episode_genres = matching_keywords(&vocab.cuisine_keywords, &[episode_text.as_str()]);
    let description = entity.description.as_deref().unwrap_or("");
    let tags = entity.category_tags.join(" ");
    let entity_text = [entity.name.as_str(), description, tags.as_str()];
    let entity_genres = matching_keywords(&vocab.cuisine_keywords, &entity_text);
    if let Some(episode_genre) = episode_genres.first() {
        if !entity_genres.is_empty() && disjoint(&episode_genres, &entity_genres) {
            mismatches.push(Mismatch::Category {
                episode_genre: episode_genre.to_string(),
                entity_genres: entity_genres.iter().map(|g| g.to_string()).collect(),
            });
        }
    }

    mismatches
}

fn disjoint(a: &[&str], b: &[&str]) -> bool {
    !a.iter().any(|x| b.iter().any(|y| x.eq_ignore_ascii_case(y)))
}

/// Scan every association of one owner
pub async fn audit_owner(
    pool: &SqlitePool,
    owner_id: Uuid,
    config: &CurationConfig,
) -> CurationResult<Vec<MismatchReport>> {
    let mut conn = pool.acquire().await?;

    let episodes: HashMap<Uuid, Episode> =
        db::episodes::list_episodes_for_owner(&mut conn, owner_id)
            .await?
            .into_iter()
            .map(|e| (e.id, e))
            .collect();
    let associations = db::associations::list_for_owner(&mut conn, owner_id).await?;

    let mut entities: HashMap<Uuid, Entity> = HashMap::new();
    let mut reports = Vec::new();

    for association in associations {
        let Some(episode) = episodes.get(&association.episode_id) else {
            continue;
        };
        if !entities.contains_key(&association.entity_id) {
            let loaded = db::entities::load_entity(&mut conn, association.entity_id).await?;
            if let Some(entity) = loaded {
                entities.insert(entity.id, entity);
            }
        }
        let Some(entity) = entities.get(&association.entity_id) else {
            continue;
        };

        let mismatches = detect(episode, entity, &config.vocabulary);
        if !mismatches.is_empty() {
            tracing::debug!(
                episode_id = %episode.id,
                entity_id = %entity.id,
                count = mismatches.len(),
                "Suspected mismatch"
            );
            reports.push(MismatchReport {
                episode_id: episode.id,
                episode_title: episode.title.clone(),
                entity_id: entity.id,
                entity_name: entity.name.clone(),
                mismatches,
            });
        }
    }

    Ok(reports)
}
