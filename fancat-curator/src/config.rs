//! Curation configuration
//!
//! Keyword vocabularies, decision thresholds, and lookup policy live in one
//! explicit object that is passed into the matcher, scorer, and resolver.
//! Tests build fixture vocabularies instead of relying on module constants.
//!
//! Loaded from TOML (see `fancat_common::config` for file resolution). Every
//! section is optional; missing keys take the compiled defaults below.

use fancat_common::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

/// Complete curation configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CurationConfig {
    pub vocabulary: Vocabulary,
    pub thresholds: Thresholds,
    pub duplicates: DuplicateSettings,
    pub lookup: LookupSettings,
    /// Manual override tier: exact entity name → episode title keywords
    pub overrides: BTreeMap<String, Vec<String>>,
}

impl CurationConfig {
    /// Load from an optional TOML path and validate
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let config: CurationConfig = fancat_common::config::load_toml(path)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject internally inconsistent settings
    pub fn validate(&self) -> Result<()> {
        let t = &self.thresholds;
        if !(0..=10).contains(&t.review) || !(0..=10).contains(&t.keep_high) {
            return Err(Error::Config(format!(
                "Thresholds must be within 0-10 (review={}, keep_high={})",
                t.review, t.keep_high
            )));
        }
        if t.review > t.keep_high {
            return Err(Error::Config(format!(
                "review threshold {} exceeds keep_high threshold {}",
                t.review, t.keep_high
            )));
        }
        if self.duplicates.min_prefix_len == 0 {
            return Err(Error::Config("duplicates.min_prefix_len must be at least 1".to_string()));
        }
        if self.lookup.max_attempts == 0 {
            return Err(Error::Config("lookup.max_attempts must be at least 1".to_string()));
        }
        Ok(())
    }
}

/// Keyword tables used by the matcher, scorer, resolver, and mismatch detector
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Vocabulary {
    /// Venue category words; +8 when found in name, description, or tags
    pub strong_keywords: Vec<String>,
    /// Weaker venue hints; +5 when found in the name only
    pub medium_keywords: Vec<String>,
    /// Cuisine/genre words; +3 when found in name or description
    pub cuisine_keywords: Vec<String>,
    /// Non-venue markers (buildings, stations, shrines, ...); -5
    pub negative_keywords: Vec<String>,
    /// Category words and brand-like tokens for the derived-keyword tier
    pub domain_nouns: Vec<String>,
    /// Generic outing/shopping words for the fallback tier
    pub generic_activity_keywords: Vec<String>,
    /// Neighbourhood and city names; branch qualifiers and geographic checks
    pub area_names: Vec<String>,
    /// Trailing words that mark a branch rather than a different place
    pub branch_qualifiers: Vec<String>,
    /// Addresses that say nothing specific
    pub address_placeholders: Vec<String>,
    /// Hosts recognised as directory/booking pages
    pub directory_domains: Vec<String>,
}

impl Default for Vocabulary {
    fn default() -> Self {
        Self {
            strong_keywords: words(&[
                "restaurant", "cafe", "café", "coffee", "sushi", "ramen", "udon", "soba",
                "izakaya", "yakiniku", "yakitori", "bakery", "patisserie", "bistro", "diner",
                "bar", "pub", "brewery", "tempura", "tonkatsu", "okonomiyaki", "shokudo",
                "レストラン", "カフェ", "寿司", "鮨", "ラーメン", "焼肉", "居酒屋", "食堂",
            ]),
            medium_keywords: words(&[
                "kitchen", "dining", "grill", "house", "tavern", "stand", "deli", "eatery",
                "canteen", "shop", "store", "亭", "屋", "店",
            ]),
            cuisine_keywords: words(&[
                "italian", "french", "chinese", "korean", "thai", "indian", "vietnamese",
                "spanish", "mexican", "seafood", "steak", "burger", "pizza", "pasta", "curry",
                "vegan", "dessert", "sweets", "noodle", "bbq", "dim sum", "イタリアン",
                "フレンチ", "中華", "韓国料理", "カレー", "スイーツ",
            ]),
            negative_keywords: words(&[
                "building", "station", "museum", "studio", "office", "city hall", "government",
                "shrine", "temple", "church", "tower", "landmark", "park", "airport", "school",
                "university", "hospital", "駅", "ビル", "神社", "寺", "博物館", "美術館",
                "タワー", "スタジオ", "役所",
            ]),
            domain_nouns: words(&[
                "sushi", "ramen", "yakiniku", "cafe", "bakery", "curry", "pizza", "burger",
                "pancake", "donut", "izakaya", "udon", "convenience store", "uniqlo",
                "don quijote", "muji", "daiso", "costco", "ikea", "寿司", "ラーメン", "焼肉",
                "カフェ", "パン", "コンビニ", "ドンキ", "無印", "ダイソー",
            ]),
            generic_activity_keywords: words(&[
                "shopping", "haul", "outing", "date", "eating", "mukbang", "food tour", "trip",
                "買い物", "ショッピング", "デート", "食べ歩き", "爆買い", "お出かけ",
            ]),
            area_names: words(&[
                "shibuya", "shinjuku", "ginza", "harajuku", "roppongi", "akihabara", "asakusa",
                "ikebukuro", "ueno", "shinagawa", "ebisu", "nakameguro", "shimokitazawa",
                "kichijoji", "shinmaruko", "higashiyo", "yokohama", "osaka", "kyoto", "fukuoka",
                "sapporo", "nagoya", "渋谷", "新宿", "銀座", "原宿", "六本木", "秋葉原", "浅草",
                "池袋", "上野", "品川", "恵比寿", "中目黒", "下北沢", "吉祥寺", "新丸子", "東陽",
                "横浜", "大阪", "京都", "福岡", "札幌", "名古屋",
            ]),
            branch_qualifiers: words(&[
                "branch", "honten", "shiten", "annex", "ekimae", "main store", "store",
                "本店", "支店", "別館", "駅前店", "店",
            ]),
            address_placeholders: words(&[
                "tokyo", "japan", "unknown", "tbd", "n/a", "various", "online",
                "multiple locations", "東京", "東京都", "日本", "不明",
            ]),
            directory_domains: words(&[
                "tabelog.com", "hotpepper.jp", "gnavi.co.jp", "retty.me", "ikyu.com",
                "yelp.com", "tripadvisor.com", "amazon.co.jp", "rakuten.co.jp",
            ]),
        }
    }
}

/// Decision thresholds on the 0-10 confidence scale
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Thresholds {
    /// Score at or above which a match is kept with high confidence
    pub keep_high: i32,
    /// Score at or above which a match is kept for manual review; below is rejected
    pub review: i32,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            keep_high: 7,
            review: 4,
        }
    }
}

/// Duplicate detection settings
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DuplicateSettings {
    /// Shared normalized-name prefix length that marks two records as one place
    pub min_prefix_len: usize,
}

impl Default for DuplicateSettings {
    fn default() -> Self {
        Self { min_prefix_len: 10 }
    }
}

/// External lookup policy
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LookupSettings {
    pub max_attempts: u32,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
    pub timeout_secs: u64,
    /// Minimum spacing between requests to one collaborator
    pub rate_limit_ms: u64,
    /// Pause before each entity's external lookup in batch runs
    pub inter_item_delay_ms: u64,
    /// Directory search URL; `{query}` is replaced by the encoded name and address
    pub directory_search_url: Option<String>,
    pub metadata_base_url: String,
    pub metadata_api_key: Option<String>,
    pub user_agent: String,
}

impl Default for LookupSettings {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff_ms: 500,
            max_backoff_ms: 4000,
            timeout_secs: 15,
            rate_limit_ms: 1000,
            inter_item_delay_ms: 1000,
            directory_search_url: None,
            metadata_base_url: "https://api.themoviedb.org/3".to_string(),
            metadata_api_key: None,
            user_agent: format!("fancat/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

impl LookupSettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn inter_item_delay(&self) -> Duration {
        Duration::from_millis(self.inter_item_delay_ms)
    }
}

fn words(list: &[&str]) -> Vec<String> {
    list.iter().map(|w| w.to_string()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_validate() {
        CurationConfig::default().validate().unwrap();
    }

    #[test]
    fn test_inverted_thresholds_rejected() {
        let mut config = CurationConfig::default();
        config.thresholds = Thresholds { keep_high: 3, review: 5 };
        assert!(matches!(config.validate(), Err(Error::Config(_))));
    }

    #[test]
    fn test_partial_toml_keeps_other_defaults() {
        let config: CurationConfig = toml::from_str(
            r#"
            [thresholds]
            keep_high = 8

            [overrides]
            "Daruma Higashiyo" = ["daruma", "yakiniku"]
            "#,
        )
        .unwrap();

        assert_eq!(config.thresholds.keep_high, 8);
        assert_eq!(config.thresholds.review, 4);
        assert_eq!(config.duplicates.min_prefix_len, 10);
        assert_eq!(config.overrides["Daruma Higashiyo"], vec!["daruma", "yakiniku"]);
        assert!(!config.vocabulary.strong_keywords.is_empty());
    }
}
