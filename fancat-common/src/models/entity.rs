//! Entity records (locations and items referenced by episodes)

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use super::link::{LinkAuditEntry, LinkState};
use crate::Error;

/// Whether an entity is a place (episode_locations) or a product (episode_items)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    #[default]
    Location,
    Item,
}

impl EntityKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityKind::Location => "location",
            EntityKind::Item => "item",
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EntityKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "location" | "locations" | "place" => Ok(EntityKind::Location),
            "item" | "items" | "product" => Ok(EntityKind::Item),
            other => Err(Error::InvalidInput(format!("Unknown entity kind: {}", other))),
        }
    }
}

/// A stored entity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    pub id: Uuid,
    /// Owner scope the entity was first observed under
    pub owner_id: Option<Uuid>,
    pub kind: EntityKind,
    pub name: String,
    /// Derived from `name`, unique across all entities
    pub slug: String,
    pub description: Option<String>,
    pub address: Option<String>,
    pub phone: Option<String>,
    pub category_tags: Vec<String>,
    pub external_link: Option<String>,
    pub link_state: LinkState,
    /// Oldest first; append-only
    pub link_audit: Vec<LinkAuditEntry>,
    /// Curator marked this record as a separate branch that must never be merged
    pub distinct_branch: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Entity {
    /// Build an unlinked entity from validated input.
    ///
    /// The external link on `new` is NOT copied here; attaching a URL is a
    /// lifecycle transition and must go through the link lifecycle manager so
    /// that it is audited.
    pub fn from_new(new: &NewEntity, owner_id: Option<Uuid>, slug: String) -> Self {
        let now = crate::time::now();
        Self {
            id: Uuid::new_v4(),
            owner_id,
            kind: new.kind,
            name: new.name.clone(),
            slug,
            description: new.description.clone(),
            address: new.address.clone(),
            phone: new.phone.clone(),
            category_tags: new.category_tags.clone(),
            external_link: None,
            link_state: LinkState::Unlinked,
            link_audit: Vec::new(),
            distinct_branch: new.distinct_branch,
            created_at: now,
            updated_at: now,
        }
    }

    /// Only active links may be rendered with affiliate parameters
    pub fn is_monetizable(&self) -> bool {
        self.link_state == LinkState::Active && self.external_link.is_some()
    }

    /// Field snapshot used for scoring without touching the stored record
    pub fn as_new_entity(&self) -> NewEntity {
        NewEntity {
            kind: self.kind,
            name: self.name.clone(),
            description: self.description.clone(),
            address: self.address.clone(),
            phone: self.phone.clone(),
            category_tags: self.category_tags.clone(),
            external_link: self.external_link.clone(),
            distinct_branch: self.distinct_branch,
            import_note: None,
        }
    }
}

/// Entity data that has passed boundary validation but is not yet stored
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct NewEntity {
    pub kind: EntityKind,
    pub name: String,
    pub description: Option<String>,
    pub address: Option<String>,
    pub phone: Option<String>,
    pub category_tags: Vec<String>,
    pub external_link: Option<String>,
    pub distinct_branch: bool,
    /// Free text carried over from legacy affiliate blobs
    pub import_note: Option<String>,
}

impl NewEntity {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }
}
