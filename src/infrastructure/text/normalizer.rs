//! Message text normalization
//!
//! Lowercases, strips everything that is not a letter or digit, collapses
//! whitespace, and optionally applies light English morphology so that
//! "bullying" and "bully" count as the same token. A synonym table widens
//! keyword coverage after normalization.

use std::collections::HashMap;

use tracing::warn;

/// Bundled synonym groups for moderation keywords.
const SYNONYMS_JSON: &str = include_str!("../../../resources/moderation-synonyms.json");

/// How aggressively tokens are reduced to a base form
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MorphologyMode {
    None,
    Stem,
    Lemma,
}

/// Normalized text plus its synonym-expanded form
#[derive(Debug, Clone)]
pub struct NormalizedResult {
    pub normalized: String,
    pub expanded: String,
}

pub struct TextNormalizer {
    mode: MorphologyMode,
    expansions: HashMap<String, Vec<String>>,
}

impl TextNormalizer {
    pub fn new(synonyms: HashMap<String, Vec<String>>, mode: MorphologyMode) -> Self {
        let mut normalizer = Self {
            mode,
            expansions: HashMap::new(),
        };
        normalizer.expansions = normalizer.build_expansions(synonyms);
        normalizer
    }

    /// Builds a normalizer from the bundled synonym resource.
    pub fn from_embedded(mode: MorphologyMode) -> Self {
        let synonyms: HashMap<String, Vec<String>> = match serde_json::from_str(SYNONYMS_JSON) {
            Ok(map) => map,
            Err(e) => {
                warn!("Failed to parse bundled synonyms: {}", e);
                HashMap::new()
            }
        };
        Self::new(synonyms, mode)
    }

    pub fn normalize_and_expand(&self, input: &str) -> NormalizedResult {
        let normalized = self.normalize(input);
        let expanded = self.expand_with_synonyms(&normalized);
        NormalizedResult {
            normalized,
            expanded,
        }
    }

    pub fn normalize(&self, input: &str) -> String {
        if input.trim().is_empty() {
            return String::new();
        }
        let lowered = input.to_lowercase();
        let cleaned: String = lowered
            .chars()
            .map(|c| if c.is_alphanumeric() { c } else { ' ' })
            .collect();
        let tokens: Vec<&str> = cleaned.split_whitespace().collect();
        if tokens.is_empty() {
            return String::new();
        }
        if self.mode == MorphologyMode::None {
            return tokens.join(" ");
        }
        let normalized: Vec<String> = tokens
            .iter()
            .map(|token| self.apply_morphology(token))
            .filter(|token| !token.is_empty())
            .collect();
        normalized.join(" ")
    }

    /// Appends synonym-group members for every known token, keeping first
    /// occurrence order and dropping duplicates.
    pub fn expand_with_synonyms(&self, normalized: &str) -> String {
        if normalized.trim().is_empty() {
            return String::new();
        }
        let mut expanded: Vec<&str> = Vec::new();
        for token in normalized.split(' ') {
            if token.is_empty() {
                continue;
            }
            if !expanded.contains(&token) {
                expanded.push(token);
            }
            if let Some(group) = self.expansions.get(token) {
                for synonym in group {
                    if !expanded.contains(&synonym.as_str()) {
                        expanded.push(synonym);
                    }
                }
            }
        }
        expanded.join(" ")
    }

    /// Every member of a synonym group expands to all the other members.
    fn build_expansions(
        &self,
        synonyms: HashMap<String, Vec<String>>,
    ) -> HashMap<String, Vec<String>> {
        let mut expansions: HashMap<String, Vec<String>> = HashMap::new();
        for (key, values) in synonyms {
            let key = self.normalize_token(&key);
            if key.is_empty() {
                continue;
            }
            let mut group = vec![key];
            for synonym in values {
                let normalized = self.normalize_token(&synonym);
                if !normalized.is_empty() && !group.contains(&normalized) {
                    group.push(normalized);
                }
            }
            for term in &group {
                let entry = expansions.entry(term.clone()).or_default();
                for other in &group {
                    if other != term && !entry.contains(other) {
                        entry.push(other.clone());
                    }
                }
            }
        }
        expansions
    }

    fn normalize_token(&self, token: &str) -> String {
        let cleaned: String = token
            .to_lowercase()
            .chars()
            .map(|c| if c.is_alphanumeric() { c } else { ' ' })
            .collect();
        let collapsed = cleaned.split_whitespace().collect::<Vec<_>>().join(" ");
        if collapsed.is_empty() || collapsed.contains(' ') || self.mode == MorphologyMode::None {
            return collapsed;
        }
        self.apply_morphology(&collapsed)
    }

    fn apply_morphology(&self, token: &str) -> String {
        if self.mode == MorphologyMode::Lemma {
            let lemma = lemmatize_token(token);
            if lemma != token {
                return lemma.to_string();
            }
        }
        stem_token(token).to_string()
    }
}

fn lemmatize_token(token: &str) -> &str {
    match token {
        "children" => "child",
        "people" => "person",
        "men" => "man",
        "women" => "woman",
        "mice" => "mouse",
        "geese" => "goose",
        _ => token,
    }
}

/// Suffix-stripping rules for common English inflections.
fn stem_token(token: &str) -> &str {
    let len = token.len();
    if len <= 3 {
        return token;
    }
    if token.ends_with("ing") && len > 5 {
        return &token[..len - 3];
    }
    if token.ends_with("ed") && len > 4 {
        return &token[..len - 2];
    }
    if token.ends_with("es") && len > 4 {
        return &token[..len - 2];
    }
    if token.ends_with('s') {
        return &token[..len - 1];
    }
    token
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_removes_punctuation_emoji_and_collapses_whitespace() {
        let normalizer = TextNormalizer::new(HashMap::new(), MorphologyMode::None);
        let normalized = normalizer.normalize(" Hello,   WORLD!! \u{1F44B} ");
        assert_eq!(normalized, "hello world");
    }

    #[test]
    fn expands_synonyms_after_stemming() {
        let normalizer = TextNormalizer::from_embedded(MorphologyMode::Stem);
        let result = normalizer.normalize_and_expand("Stop bullying people!");
        assert_eq!(result.normalized, "stop bully people");
        assert!(result.expanded.contains("harass"));
        assert!(result.expanded.contains("intimidate"));
    }

    #[test]
    fn stem_strips_common_suffixes() {
        assert_eq!(stem_token("bullying"), "bully");
        assert_eq!(stem_token("threatened"), "threaten");
        assert_eq!(stem_token("leaks"), "leak");
        assert_eq!(stem_token("sing"), "sing");
        assert_eq!(stem_token("kys"), "kys");
    }

    #[test]
    fn lemma_mode_maps_irregular_plurals() {
        let normalizer = TextNormalizer::new(HashMap::new(), MorphologyMode::Lemma);
        assert_eq!(normalizer.normalize("children women mice"), "child woman mouse");
    }

    #[test]
    fn expansion_is_symmetric_across_a_group() {
        let mut synonyms = HashMap::new();
        synonyms.insert(
            "dox".to_string(),
            vec!["leak".to_string(), "expose".to_string()],
        );
        let normalizer = TextNormalizer::new(synonyms, MorphologyMode::None);
        let expanded = normalizer.expand_with_synonyms("leak");
        assert!(expanded.contains("dox"));
        assert!(expanded.contains("expose"));
    }
}
