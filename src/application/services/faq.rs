//! FAQ lookup and fuzzy matching

use std::collections::BTreeSet;

use crate::application::errors::BotError;
use crate::domain::entities::FaqEntry;

const FAQ_JSON: &str = include_str!("../../../resources/faq.json");

pub struct FaqService {
    entries: Vec<FaqEntry>,
}

impl FaqService {
    pub fn from_embedded() -> Result<Self, BotError> {
        let entries: Vec<FaqEntry> = serde_json::from_str(FAQ_JSON)
            .map_err(|e| BotError::Internal(format!("Failed to load FAQ entries: {}", e)))?;
        Ok(Self { entries })
    }

    pub fn entries(&self) -> &[FaqEntry] {
        &self.entries
    }

    pub fn find_by_topic(&self, topic: &str) -> Option<&FaqEntry> {
        self.entries
            .iter()
            .find(|entry| entry.topic.eq_ignore_ascii_case(topic))
    }

    /// Best token-overlap match for a free-form question, if any entry
    /// scores above zero.
    pub fn find_best_match(&self, query: &str) -> Option<&FaqEntry> {
        if query.trim().is_empty() {
            return None;
        }
        self.entries
            .iter()
            .map(|entry| (entry, score_entry(entry, query)))
            .filter(|(_, score)| *score > 0.0)
            .max_by(|(_, a), (_, b)| a.total_cmp(b))
            .map(|(entry, _)| entry)
    }

    /// Topics ranked by match score, best first, at most `limit`.
    pub fn suggest_topics(&self, query: &str, limit: usize) -> Vec<String> {
        if query.trim().is_empty() {
            return Vec::new();
        }
        let mut scored: Vec<(&FaqEntry, f64)> = self
            .entries
            .iter()
            .map(|entry| (entry, score_entry(entry, query)))
            .filter(|(_, score)| *score > 0.0)
            .collect();
        scored.sort_by(|(_, a), (_, b)| b.total_cmp(a));
        scored
            .into_iter()
            .take(limit)
            .map(|(entry, _)| entry.topic.clone())
            .collect()
    }
}

fn score_entry(entry: &FaqEntry, query: &str) -> f64 {
    let normalized_query = query.to_lowercase();
    if entry.topic.eq_ignore_ascii_case(normalized_query.trim()) {
        return 1.5;
    }
    let query_tokens = tokenize(&normalized_query);
    if query_tokens.is_empty() {
        return 0.0;
    }
    let entry_tokens = tokenize(&format!(
        "{} {} {}",
        entry.topic, entry.title, entry.description
    ));
    let matches = query_tokens
        .iter()
        .filter(|token| entry_tokens.contains(*token))
        .count();
    matches as f64 / query_tokens.len() as f64
}

fn tokenize(input: &str) -> BTreeSet<String> {
    input
        .to_lowercase()
        .split(|c: char| !c.is_ascii_alphanumeric())
        .filter(|token| token.len() > 2)
        .map(String::from)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn service() -> FaqService {
        FaqService::from_embedded().unwrap()
    }

    #[test]
    fn loads_embedded_entries() {
        assert!(!service().entries().is_empty());
    }

    #[test]
    fn topic_lookup_ignores_case() {
        let faq = service();
        assert!(faq.find_by_topic("RULES").is_some());
        assert!(faq.find_by_topic("nonexistent").is_none());
    }

    #[test]
    fn exact_topic_query_wins() {
        let faq = service();
        let entry = faq.find_best_match("events").unwrap();
        assert_eq!(entry.topic, "events");
    }

    #[test]
    fn fuzzy_question_finds_closest_entry() {
        let faq = service();
        let entry = faq.find_best_match("how do I join the vrchat group").unwrap();
        assert_eq!(entry.topic, "group");
    }

    #[test]
    fn unmatched_question_returns_none() {
        let faq = service();
        assert!(faq.find_best_match("quantum chromodynamics").is_none());
        assert!(faq.find_best_match("   ").is_none());
    }

    #[test]
    fn suggestions_are_ranked_and_limited() {
        let faq = service();
        let topics = faq.suggest_topics("how do I join the vrchat group", 3);
        assert!(!topics.is_empty());
        assert!(topics.len() <= 3);
        assert_eq!(topics[0], "group");
    }
}
