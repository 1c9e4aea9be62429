//! Raw datastore records and their boundary validation
//!
//! Records arriving from scripts and the legacy datastore are loosely typed:
//! phones may be numbers, links may hide inside `affiliate_info.linkswitch`,
//! and free-text notes carry state. Everything is checked here, once, before
//! any curation logic sees it.

use serde::Deserialize;
use url::Url;

use super::entity::{EntityKind, NewEntity};
use super::link::LinkState;
use crate::Error;

/// Legacy `affiliate_info` JSON blob
#[derive(Debug, Clone, Default, Deserialize)]
pub struct LegacyAffiliateInfo {
    pub linkswitch: Option<LegacyLinkswitch>,
}

/// Legacy `affiliate_info.linkswitch` blob
#[derive(Debug, Clone, Default, Deserialize)]
pub struct LegacyLinkswitch {
    pub url: Option<String>,
    pub status: Option<String>,
    pub notes: Option<String>,
}

/// Entity record as supplied by a driver or read from a legacy export
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawEntity {
    pub name: Option<String>,
    pub kind: Option<String>,
    pub description: Option<String>,
    pub address: Option<String>,
    /// String or number in legacy exports
    pub phone: Option<serde_json::Value>,
    #[serde(default, alias = "tags")]
    pub category_tags: Vec<String>,
    #[serde(alias = "url")]
    pub external_link: Option<String>,
    pub link_state: Option<String>,
    pub affiliate_info: Option<LegacyAffiliateInfo>,
    #[serde(default)]
    pub distinct_branch: bool,
}

impl RawEntity {
    /// Parse one record from JSON text
    pub fn from_json(json: &str) -> crate::Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Parse a JSON array of records
    pub fn list_from_json(json: &str) -> crate::Result<Vec<Self>> {
        Ok(serde_json::from_str(json)?)
    }
}

impl TryFrom<RawEntity> for NewEntity {
    type Error = Error;

    fn try_from(raw: RawEntity) -> Result<Self, Self::Error> {
        let name = clean(raw.name)
            .ok_or_else(|| Error::InvalidInput("Entity name is required".to_string()))?;

        let kind = match clean(raw.kind) {
            Some(kind) => kind.parse::<EntityKind>()?,
            None => EntityKind::default(),
        };

        let linkswitch = raw.affiliate_info.and_then(|info| info.linkswitch);
        let (legacy_url, legacy_status, legacy_notes) = match linkswitch {
            Some(ls) => (clean(ls.url), clean(ls.status), clean(ls.notes)),
            None => (None, None, None),
        };

        // An explicit link wins over the legacy blob
        let external_link = match clean(raw.external_link).or(legacy_url) {
            Some(link) => Some(validate_url(&link)?),
            None => None,
        };

        let stated_state = match clean(raw.link_state).or(legacy_status) {
            Some(state) => Some(state.parse::<LinkState>()?),
            None => None,
        };

        let import_note = match (stated_state, legacy_notes) {
            (Some(state), Some(notes)) => Some(format!("imported as {}: {}", state, notes)),
            (Some(state), None) => Some(format!("imported as {}", state)),
            (None, Some(notes)) => Some(notes),
            (None, None) => None,
        };

        let category_tags = raw
            .category_tags
            .into_iter()
            .map(|t| t.trim().to_lowercase())
            .filter(|t| !t.is_empty())
            .collect();

        Ok(NewEntity {
            kind,
            name,
            description: clean(raw.description),
            address: clean(raw.address),
            phone: phone_text(raw.phone),
            category_tags,
            external_link,
            distinct_branch: raw.distinct_branch,
            import_note,
        })
    }
}

/// Accept only absolute http(s) URLs with a host
pub fn validate_url(candidate: &str) -> crate::Result<String> {
    let parsed = Url::parse(candidate)
        .map_err(|e| Error::InvalidInput(format!("Invalid URL '{}': {}", candidate, e)))?;

    if !matches!(parsed.scheme(), "http" | "https") || parsed.host_str().is_none() {
        return Err(Error::InvalidInput(format!(
            "URL must be http(s) with a host: {}",
            candidate
        )));
    }

    Ok(parsed.to_string())
}

fn clean(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn phone_text(value: Option<serde_json::Value>) -> Option<String> {
    let text = match value? {
        serde_json::Value::String(s) => s,
        serde_json::Value::Number(n) => n.to_string(),
        _ => return None,
    };
    let text = text.trim().to_string();
    if text.chars().any(|c| c.is_ascii_digit()) {
        Some(text)
    } else {
        None
    }
}
