//! Keyword and name matching helpers
//!
//! ASCII keywords match on word boundaries ("bar" does not hit "barber").
//! Non-ASCII keywords (kana/kanji) match as plain substrings since those
//! scripts have no spaces between words.

/// Case-insensitive keyword test with word boundaries for ASCII keywords
pub fn contains_word(haystack: &str, keyword: &str) -> bool {
    let kw = keyword.trim().to_lowercase();
    if kw.is_empty() {
        return false;
    }
    let hay = haystack.to_lowercase();
    if !kw.is_ascii() {
        return hay.contains(&kw);
    }

    let mut start = 0;
    while let Some(pos) = hay[start..].find(&kw) {
        let begin = start + pos;
        let end = begin + kw.len();
        let before_ok = hay[..begin]
            .chars()
            .next_back()
            .map_or(true, |c| !c.is_alphanumeric());
        let after_ok = hay[end..].chars().next().map_or(true, |c| !c.is_alphanumeric());
        if before_ok && after_ok {
            return true;
        }
        // ASCII keyword: first char is one byte
        start = begin + 1;
    }
    false
}

/// Case-insensitive plain substring test
pub fn contains_substring(haystack: &str, needle: &str) -> bool {
    let needle = needle.trim().to_lowercase();
    !needle.is_empty() && haystack.to_lowercase().contains(&needle)
}

/// Lowercase and drop everything that is not a letter or digit
pub fn normalize_name(name: &str) -> String {
    name.chars()
        .filter(|c| c.is_alphanumeric())
        .flat_map(|c| c.to_lowercase())
        .collect()
}

/// Lowercased alphanumeric tokens
pub fn tokens(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(|t| t.to_lowercase())
        .collect()
}

/// Length in chars of the shared prefix
pub fn common_prefix_len(a: &str, b: &str) -> usize {
    a.chars().zip(b.chars()).take_while(|(x, y)| x == y).count()
}

/// Keywords from `vocabulary` present anywhere in `fields`
pub fn matching_keywords<'a>(vocabulary: &'a [String], fields: &[&str]) -> Vec<&'a str> {
    vocabulary
        .iter()
        .map(|kw| kw.as_str())
        .filter(|kw| fields.iter().any(|field| contains_word(field, kw)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ascii_keywords_respect_word_boundaries() {
        assert!(contains_word("Ichiban Sushi", "sushi"));
        assert!(contains_word("SUSHI-YA Ginza", "sushi"));
        assert!(!contains_word("Barber Shop", "bar"));
        assert!(contains_word("Tokyo Tower", "tower"));
        assert!(contains_word("a dim sum place", "dim sum"));
    }

    #[test]
    fn test_repeated_partial_hits_still_find_later_word() {
        assert!(contains_word("barbar bar", "bar"));
    }

    #[test]
    fn test_non_ascii_keywords_match_as_substrings() {
        assert!(contains_word("すし処 寿司一番", "寿司"));
        assert!(contains_word("東京タワー", "タワー"));
    }

    #[test]
    fn test_empty_keyword_never_matches() {
        assert!(!contains_word("anything", "  "));
        assert!(!contains_substring("anything", ""));
    }

    #[test]
    fn test_normalize_name_strips_punctuation_and_case() {
        assert_eq!(normalize_name("Daruma (Higashiyo)"), "darumahigashiyo");
        assert_eq!(normalize_name("だるま 東陽町店"), "だるま東陽町店");
    }

    #[test]
    fn test_common_prefix_len_counts_chars() {
        assert_eq!(common_prefix_len("darumahigashiyo", "darumashinmaruko"), 6);
        assert_eq!(common_prefix_len("寿司一番", "寿司二番"), 2);
    }
}
