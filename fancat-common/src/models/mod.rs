//! Catalog record types
//!
//! Owners and episodes are created by ingestion collaborators and are read-only
//! to the curation engine apart from corrective edits. Entities and associations
//! are owned by the curation engine.

mod entity;
mod link;
mod raw;

pub use entity::{Entity, EntityKind, NewEntity};
pub use link::{InactiveReason, LinkAuditEntry, LinkState};
pub use raw::{validate_url, LegacyAffiliateInfo, LegacyLinkswitch, RawEntity};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A celebrity or channel whose episodes reference entities
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContentOwner {
    pub id: Uuid,
    pub display_name: String,
    pub slug: String,
    /// Identifier in the metadata lookup service (set by enrichment)
    pub external_id: Option<String>,
    pub image_url: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl ContentOwner {
    pub fn new(display_name: impl Into<String>, slug: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            display_name: display_name.into(),
            slug: slug.into(),
            external_id: None,
            image_url: None,
            created_at: crate::time::now(),
        }
    }
}

/// A single piece of published content
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Episode {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub published_at: DateTime<Utc>,
}

impl Episode {
    pub fn new(
        owner_id: Uuid,
        title: impl Into<String>,
        description: Option<String>,
        published_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            owner_id,
            title: title.into(),
            description,
            published_at,
        }
    }

    /// Title and description joined for keyword scans
    pub fn searchable_text(&self) -> String {
        match &self.description {
            Some(desc) => format!("{} {}", self.title, desc),
            None => self.title.clone(),
        }
    }
}

/// Link between an episode and an entity (episode_locations / episode_items)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Association {
    pub episode_id: Uuid,
    pub entity_id: Uuid,
    /// Free-text scene marker, e.g. a timestamp in the video
    pub scene_note: Option<String>,
    /// `high` or `review`, copied from the scorer decision at curation time
    pub confidence_label: Option<String>,
}

impl Association {
    pub fn new(episode_id: Uuid, entity_id: Uuid) -> Self {
        Self {
            episode_id,
            entity_id,
            scene_note: None,
            confidence_label: None,
        }
    }

    pub fn with_confidence_label(mut self, label: impl Into<String>) -> Self {
        self.confidence_label = Some(label.into());
        self
    }
}
