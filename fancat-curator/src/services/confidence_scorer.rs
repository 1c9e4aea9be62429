//! Confidence scoring
//!
//! Independent additive signals summed once and clamped to 0-10. The decision
//! policy (keep high / review / reject) reads its cut-offs from configuration.

use fancat_common::{Entity, LinkState, NewEntity};
use serde::Serialize;

use super::directory_client::host_in_domains;
use crate::config::{CurationConfig, Thresholds};
use crate::utils::text::{contains_word, matching_keywords};

pub const MIN_SCORE: i32 = 0;
pub const MAX_SCORE: i32 = 10;

/// Keep/review/reject decision
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Decision {
    /// Keep with high confidence
    KeepHigh,
    /// Keep, needs manual review
    Review,
    /// Reject the candidate
    Reject,
}

impl Decision {
    /// Classify a score against the configured thresholds
    pub fn from_score(score: u8, thresholds: &Thresholds) -> Self {
        let score = i32::from(score);
        if score >= thresholds.keep_high {
            Decision::KeepHigh
        } else if score >= thresholds.review {
            Decision::Review
        } else {
            Decision::Reject
        }
    }

    /// Label stored on associations (`high` / `review`)
    pub fn label(&self) -> &'static str {
        match self {
            Decision::KeepHigh => "high",
            Decision::Review => "review",
            Decision::Reject => "reject",
        }
    }
}

/// One scoring signal
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Signal {
    StrongKeyword,
    MediumKeyword,
    CuisineKeyword,
    DirectoryUrl,
    Phone,
    SpecificAddress,
    NegativeKeyword,
}

impl Signal {
    pub const ALL: [Signal; 7] = [
        Signal::StrongKeyword,
        Signal::MediumKeyword,
        Signal::CuisineKeyword,
        Signal::DirectoryUrl,
        Signal::Phone,
        Signal::SpecificAddress,
        Signal::NegativeKeyword,
    ];

    pub fn weight(&self) -> i32 {
        match self {
            Signal::StrongKeyword => 8,
            Signal::MediumKeyword => 5,
            Signal::CuisineKeyword => 3,
            Signal::DirectoryUrl => 6,
            Signal::Phone => 2,
            Signal::SpecificAddress => 2,
            Signal::NegativeKeyword => -5,
        }
    }
}

/// Score with the signals that contributed to it
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScoreBreakdown {
    pub signals: Vec<Signal>,
    /// Unclamped sum
    pub raw: i32,
    /// Clamped to 0-10
    pub score: u8,
}

/// Deterministic confidence scorer
pub struct ConfidenceScorer<'a> {
    config: &'a CurationConfig,
}

impl<'a> ConfidenceScorer<'a> {
    pub fn new(config: &'a CurationConfig) -> Self {
        Self { config }
    }

    /// Score an entity (0-10)
    pub fn score(&self, entity: &NewEntity) -> u8 {
        self.breakdown(entity).score
    }

    /// Score a stored record.
    ///
    /// A link that failed verification (`inactive`) earns no directory bonus.
    pub fn score_stored(&self, entity: &Entity) -> u8 {
        let mut fields = entity.as_new_entity();
        if entity.link_state == LinkState::Inactive {
            fields.external_link = None;
        }
        self.score(&fields)
    }

    /// Score plus the contributing signals
    pub fn breakdown(&self, entity: &NewEntity) -> ScoreBreakdown {
        self.breakdown_in_order(entity, &Signal::ALL)
    }

    /// Evaluate signals in a caller-chosen order
    pub fn breakdown_in_order(&self, entity: &NewEntity, order: &[Signal]) -> ScoreBreakdown {
        let mut signals: Vec<Signal> = Vec::new();
        for signal in order {
            if !signals.contains(signal) && self.signal_present(*signal, entity) {
                signals.push(*signal);
            }
        }

        let raw: i32 = signals.iter().map(Signal::weight).sum();
        let score = raw.clamp(MIN_SCORE, MAX_SCORE) as u8;

        // Report in canonical order regardless of evaluation order
        signals.sort_by_key(|s| Signal::ALL.iter().position(|x| x == s));

        ScoreBreakdown { signals, raw, score }
    }

    /// Keep/review/reject for a score
    pub fn decide(&self, score: u8) -> Decision {
        Decision::from_score(score, &self.config.thresholds)
    }

    fn signal_present(&self, signal: Signal, entity: &NewEntity) -> bool {
        let vocab = &self.config.vocabulary;
        let name = entity.name.as_str();
        let description = entity.description.as_deref().unwrap_or("");

        match signal {
            Signal::StrongKeyword => {
                !matching_keywords(&vocab.strong_keywords, &[name, description]).is_empty()
                    || tags_match(&entity.category_tags, &vocab.strong_keywords)
            }
            Signal::MediumKeyword => !matching_keywords(&vocab.medium_keywords, &[name]).is_empty(),
            Signal::CuisineKeyword => {
                !matching_keywords(&vocab.cuisine_keywords, &[name, description]).is_empty()
            }
            Signal::DirectoryUrl => entity
                .external_link
                .as_deref()
                .and_then(|link| url::Url::parse(link).ok())
                .and_then(|parsed| {
                    parsed
                        .host_str()
                        .map(|h| host_in_domains(h, &vocab.directory_domains))
                })
                .unwrap_or(false),
            Signal::Phone => entity
                .phone
                .as_deref()
                .map(|p| p.chars().any(|c| c.is_ascii_digit()))
                .unwrap_or(false),
            Signal::SpecificAddress => entity
                .address
                .as_deref()
                .map(|addr| self.is_specific_address(addr))
                .unwrap_or(false),
            Signal::NegativeKeyword => {
                !matching_keywords(&vocab.negative_keywords, &[name, description]).is_empty()
                    || tags_match(&entity.category_tags, &vocab.negative_keywords)
            }
        }
    }

    fn is_specific_address(&self, address: &str) -> bool {
        let trimmed = address.trim();
        if trimmed.chars().count() <= 10 {
            return false;
        }
        let lowered = trimmed.to_lowercase();
        let vocab = &self.config.vocabulary;
        !vocab
            .address_placeholders
            .iter()
            .chain(vocab.area_names.iter())
            .any(|p| p.to_lowercase() == lowered)
    }
}

fn tags_match(tags: &[String], keywords: &[String]) -> bool {
    tags.iter().any(|tag| keywords.iter().any(|kw| contains_word(tag, kw)))
}
