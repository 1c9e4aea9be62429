//! Link lifecycle state and audit entries

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::Error;

/// Lifecycle stage of an entity's external monetized link
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LinkState {
    /// No external link attached
    Unlinked,
    /// URL found but not yet verified
    Candidate,
    /// URL verified; eligible for monetized rendering
    Active,
    /// Entity closed/relocated or URL stale; link kept for history only
    Inactive,
    /// Record was rewritten to point at a different real-world place
    Corrected,
}

impl LinkState {
    pub fn as_str(&self) -> &'static str {
        match self {
            LinkState::Unlinked => "unlinked",
            LinkState::Candidate => "candidate",
            LinkState::Active => "active",
            LinkState::Inactive => "inactive",
            LinkState::Corrected => "corrected",
        }
    }
}

impl fmt::Display for LinkState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LinkState {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "unlinked" => Ok(LinkState::Unlinked),
            "candidate" => Ok(LinkState::Candidate),
            "active" => Ok(LinkState::Active),
            "inactive" => Ok(LinkState::Inactive),
            "corrected" => Ok(LinkState::Corrected),
            other => Err(Error::InvalidInput(format!("Unknown link state: {}", other))),
        }
    }
}

/// Why a link left the active state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InactiveReason {
    Closed,
    Relocated,
    UrlInvalid,
}

impl InactiveReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            InactiveReason::Closed => "closed",
            InactiveReason::Relocated => "relocated",
            InactiveReason::UrlInvalid => "url_invalid",
        }
    }
}

impl fmt::Display for InactiveReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for InactiveReason {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "closed" => Ok(InactiveReason::Closed),
            "relocated" => Ok(InactiveReason::Relocated),
            "url_invalid" => Ok(InactiveReason::UrlInvalid),
            other => Err(Error::InvalidInput(format!("Unknown inactive reason: {}", other))),
        }
    }
}

/// One append-only record of a link state transition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinkAuditEntry {
    pub timestamp: DateTime<Utc>,
    /// Who or what caused the transition (e.g. `import`, `directory`, `curator`)
    pub source: String,
    pub previous_url: Option<String>,
    pub new_url: Option<String>,
    pub from_state: LinkState,
    pub to_state: LinkState,
    pub reason: Option<InactiveReason>,
    pub note: String,
}
