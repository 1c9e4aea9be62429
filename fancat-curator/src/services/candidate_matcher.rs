//! Candidate episode matching
//!
//! Maps a free-text entity name to the episodes of one owner that plausibly
//! feature it. Three tiers, highest precision first; the first tier with any
//! hit wins and lower tiers are never consulted:
//!
//! 1. Manual override: curator-configured keywords for this exact name
//! 2. Derived keyword: domain nouns found in the name/hint, caller tags, and the
//!    name itself
//! 3. Fallback: generic outing/shopping words
//!
//! Keywords are matched as case-insensitive substrings of episode titles.
//! Within a tier, results are ordered by the most specific (longest) keyword,
//! then by earliest publication.

use fancat_common::Episode;
use serde::Serialize;
use std::collections::HashMap;
use uuid::Uuid;

use crate::config::CurationConfig;
use crate::utils::text::{contains_substring, contains_word};

/// Keywords shorter than this (in chars) are ignored
const MIN_KEYWORD_CHARS: usize = 2;

/// Which tier produced a match
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchTier {
    ManualOverride,
    DerivedKeyword,
    Fallback,
}

impl MatchTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            MatchTier::ManualOverride => "manual_override",
            MatchTier::DerivedKeyword => "derived_keyword",
            MatchTier::Fallback => "fallback",
        }
    }
}

/// One plausible episode for an entity
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EpisodeMatch {
    pub episode_id: Uuid,
    pub matched_keyword: String,
    pub tier: MatchTier,
}

/// Tiered keyword matcher
pub struct CandidateMatcher<'a> {
    config: &'a CurationConfig,
}

impl<'a> CandidateMatcher<'a> {
    pub fn new(config: &'a CurationConfig) -> Self {
        Self { config }
    }

    /// Ranked episode matches for an entity within one owner's episodes.
    ///
    /// Episodes of other owners in `episodes` are ignored. An empty result means
    /// the entity must stay unlinked.
    pub fn match_episodes(
        &self,
        entity_name: &str,
        hint_text: &str,
        tags: &[String],
        scope_owner_id: Uuid,
        episodes: &[Episode],
    ) -> Vec<EpisodeMatch> {
        let name = entity_name.trim();
        if name.is_empty() {
            return Vec::new();
        }

        let scoped: Vec<&Episode> = episodes
            .iter()
            .filter(|e| e.owner_id == scope_owner_id)
            .collect();
        if scoped.is_empty() {
            return Vec::new();
        }

        let tiers = [
            (MatchTier::ManualOverride, self.override_keywords(name)),
            (MatchTier::DerivedKeyword, self.derived_keywords(name, hint_text, tags)),
            (MatchTier::Fallback, self.config.vocabulary.generic_activity_keywords.clone()),
        ];

        for (tier, keywords) in tiers {
            let hits = search_titles(&keywords, &scoped, tier);
            if !hits.is_empty() {
                tracing::debug!(
                    entity = %name,
                    tier = tier.as_str(),
                    matches = hits.len(),
                    "Episode matches found"
                );
                return hits;
            }
        }

        tracing::debug!(entity = %name, "No episode match in any tier");
        Vec::new()
    }

    fn override_keywords(&self, name: &str) -> Vec<String> {
        self.config.overrides.get(name).cloned().unwrap_or_default()
    }

    fn derived_keywords(&self, name: &str, hint_text: &str, tags: &[String]) -> Vec<String> {
        let mut keywords: Vec<String> = self
            .config
            .vocabulary
            .domain_nouns
            .iter()
            .filter(|noun| contains_word(name, noun) || contains_word(hint_text, noun))
            .cloned()
            .collect();

        keywords.extend(tags.iter().cloned());
        keywords.push(name.to_string());
        keywords
    }
}

/// Episodes whose title contains any keyword; each episode keeps its longest keyword
fn search_titles(keywords: &[String], episodes: &[&Episode], tier: MatchTier) -> Vec<EpisodeMatch> {
    let mut best: HashMap<Uuid, (&Episode, &str)> = HashMap::new();

    for keyword in keywords {
        let keyword = keyword.trim();
        if keyword.chars().count() < MIN_KEYWORD_CHARS {
            continue;
        }
        for episode in episodes {
            if !contains_substring(&episode.title, keyword) {
                continue;
            }
            let replace = match best.get(&episode.id) {
                Some((_, current)) => keyword.chars().count() > current.chars().count(),
                None => true,
            };
            if replace {
                best.insert(episode.id, (*episode, keyword));
            }
        }
    }

    let mut ranked: Vec<(&Episode, &str)> = best.into_values().collect();
    ranked.sort_by(|(ea, ka), (eb, kb)| {
        kb.chars()
            .count()
            .cmp(&ka.chars().count())
            .then(ea.published_at.cmp(&eb.published_at))
            .then(ea.id.cmp(&eb.id))
    });

    ranked
        .into_iter()
        .map(|(episode, keyword)| EpisodeMatch {
            episode_id: episode.id,
            matched_keyword: keyword.to_string(),
            tier,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn episode(owner: Uuid, title: &str, day: u32) -> Episode {
        Episode::new(owner, title, None, Utc.with_ymd_and_hms(2024, 1, day, 12, 0, 0).unwrap())
    }

    fn fixture_config() -> CurationConfig {
        let mut config = CurationConfig::default();
        config.vocabulary.domain_nouns = vec!["sushi".to_string(), "yakiniku".to_string()];
        config.vocabulary.generic_activity_keywords = vec!["shopping".to_string()];
        config
    }

    #[test]
    fn test_empty_name_returns_nothing() {
        let owner = Uuid::new_v4();
        let config = fixture_config();
        let episodes = vec![episode(owner, "Sushi night", 1)];

        let matcher = CandidateMatcher::new(&config);
        let matches = matcher.match_episodes("  ", "", &[], owner, &episodes);
        assert!(matches.is_empty());
    }

    #[test]
    fn test_override_tier_wins_over_derived() {
        let owner = Uuid::new_v4();
        let mut config = fixture_config();
        config
            .overrides
            .insert("Ichiban Sushi".to_string(), vec!["birthday".to_string()]);
        let episodes = vec![
            episode(owner, "Sushi night", 1),
            episode(owner, "My birthday dinner", 2),
        ];

        let matcher = CandidateMatcher::new(&config);
        let matches = matcher.match_episodes("Ichiban Sushi", "", &[], owner, &episodes);

        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].tier, MatchTier::ManualOverride);
        assert_eq!(matches[0].episode_id, episodes[1].id);
    }

    #[test]
    fn test_unresolvable_override_falls_through() {
        let owner = Uuid::new_v4();
        let mut config = fixture_config();
        config
            .overrides
            .insert("Ichiban Sushi".to_string(), vec!["nonexistent".to_string()]);
        let episodes = vec![episode(owner, "Sushi night", 1)];

        let matcher = CandidateMatcher::new(&config);
        let matches = matcher.match_episodes("Ichiban Sushi", "", &[], owner, &episodes);

        assert_eq!(matches[0].tier, MatchTier::DerivedKeyword);
        assert_eq!(matches[0].matched_keyword, "sushi");
    }

    #[test]
    fn test_longest_keyword_ranks_first_then_earliest() {
        let owner = Uuid::new_v4();
        let config = fixture_config();
        let episodes = vec![
            episode(owner, "Sushi crawl", 3),
            episode(owner, "Ichiban Sushi review", 5),
            episode(owner, "Sushi for breakfast", 1),
        ];

        let matcher = CandidateMatcher::new(&config);
        let matches = matcher.match_episodes("Ichiban Sushi", "", &[], owner, &episodes);

        let ids: Vec<Uuid> = matches.iter().map(|m| m.episode_id).collect();
        assert_eq!(ids, vec![episodes[1].id, episodes[2].id, episodes[0].id]);
        assert_eq!(matches[0].matched_keyword, "Ichiban Sushi");
    }

    #[test]
    fn test_fallback_only_when_nothing_specific() {
        let owner = Uuid::new_v4();
        let config = fixture_config();
        let episodes = vec![episode(owner, "Shopping haul", 1)];

        let matcher = CandidateMatcher::new(&config);
        let matches = matcher.match_episodes("Mystery Store", "", &[], owner, &episodes);

        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].tier, MatchTier::Fallback);
    }

    #[test]
    fn test_other_owners_episodes_ignored() {
        let owner = Uuid::new_v4();
        let config = fixture_config();
        let episodes = vec![episode(Uuid::new_v4(), "Sushi night", 1)];

        let matcher = CandidateMatcher::new(&config);
        let matches = matcher.match_episodes("Ichiban Sushi", "", &[], owner, &episodes);
        assert!(matches.is_empty());
    }

    #[test]
    fn test_single_char_keywords_ignored() {
        let owner = Uuid::new_v4();
        let config = fixture_config();
        let episodes = vec![episode(owner, "A day out", 1)];

        let matches = CandidateMatcher::new(&config).match_episodes(
            "Zzz",
            "",
            &["a".to_string()],
            owner,
            &episodes,
        );
        assert!(matches.is_empty());
    }
}
