//! Moderation decision engine
//!
//! Layered scoring: rule matches set the base score, message formatting and
//! per-user history add to it, the classifier can only raise the total (a
//! floor, never a discount), and two review passes trim false positives
//! before the action is final.

use std::collections::HashMap;
use std::sync::Arc;

use once_cell::sync::Lazy;
use regex_lite::Regex;

use crate::domain::entities::{
    Action, Decision, DecisionContext, MessageFacts, RiskLevel, RuleContext,
};
use crate::infrastructure::config::Config;
use crate::infrastructure::llm::RiskClassifier;
use crate::infrastructure::memory::WordMemoryStore;
use crate::infrastructure::text::{
    compile_config_pattern, compile_keyword_pattern, is_age_gap_concern, matches_any,
    TextNormalizer,
};

static LINK_PATTERN: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)https?://\S+").unwrap());
/// Tenor GIF links are embeds, not link spam; they are stripped before
/// blocked-pattern matching.
static ALLOWED_GIF_LINK_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)https?://(?:www\.)?tenor\.com/view/\S*gif\S*").unwrap());
static REPORT_CONTEXT_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(report|reported|reporting|screenshots|evidence|proof|log|logs)\b").unwrap()
});

const KEYWORD_BASE_SCORE: i32 = 30;
const BLOCKED_BASE_SCORE: i32 = 70;
const AGE_GAP_KEYWORD: &str = "age gap (adult/minor)";

pub struct DecisionEngine {
    warn_threshold: i32,
    delete_threshold: i32,
    escalate_threshold: i32,
    channel_risk_scores: HashMap<String, i32>,
    memory: Arc<WordMemoryStore>,
    normalizer: Arc<TextNormalizer>,
    classifier: Arc<dyn RiskClassifier>,
    keyword_patterns: Vec<(String, Regex)>,
    blocked_patterns: Vec<(String, Regex)>,
}

impl DecisionEngine {
    pub fn new(
        config: &Config,
        memory: Arc<WordMemoryStore>,
        normalizer: Arc<TextNormalizer>,
        classifier: Arc<dyn RiskClassifier>,
    ) -> Self {
        let keyword_patterns = config
            .moderation
            .scan_keywords
            .iter()
            .filter_map(|keyword| {
                compile_keyword_pattern(keyword).map(|pattern| (keyword.clone(), pattern))
            })
            .collect();
        let blocked_patterns = config
            .moderation
            .blocked_patterns
            .iter()
            .filter_map(|source| {
                compile_config_pattern(source).map(|pattern| (source.clone(), pattern))
            })
            .collect();
        Self {
            warn_threshold: config.moderation.warn_threshold,
            delete_threshold: config.moderation.delete_threshold,
            escalate_threshold: config.moderation.escalate_threshold,
            channel_risk_scores: config.moderation.channel_risk_scores.clone(),
            memory,
            normalizer,
            classifier,
            keyword_patterns,
            blocked_patterns,
        }
    }

    pub async fn evaluate(&self, facts: &MessageFacts) -> Decision {
        let content = facts.content.as_str();
        let result = self.normalizer.normalize_and_expand(content);
        let sanitized = strip_allowed_gif_links(content);
        let blocked_result = self.normalizer.normalize_and_expand(&sanitized);

        let candidates = [content, result.normalized.as_str(), result.expanded.as_str()];
        let mut matched_keyword = self
            .keyword_patterns
            .iter()
            .find(|(_, pattern)| matches_any(pattern, &candidates))
            .map(|(keyword, _)| keyword.clone());
        if matched_keyword.is_none()
            && is_age_gap_concern(content, &result.normalized, &result.expanded)
        {
            matched_keyword = Some(AGE_GAP_KEYWORD.to_string());
        }

        let blocked_candidates = [
            sanitized.as_str(),
            blocked_result.normalized.as_str(),
            blocked_result.expanded.as_str(),
        ];
        let matched_blocked_pattern = self
            .blocked_patterns
            .iter()
            .find(|(_, pattern)| matches_any(pattern, &blocked_candidates))
            .map(|(source, _)| source.clone());

        let message_length = content.chars().count();
        let link_count = count_links(&sanitized.to_lowercase());
        let uppercase_ratio = calculate_uppercase_ratio(content);
        let message_format_score =
            score_message_format(content, message_length, link_count, uppercase_ratio);

        let token_counts =
            self.memory
                .token_counts(&facts.guild_id, &facts.channel_id, &facts.user_id);
        let total_recent_tokens: u64 = token_counts.values().map(|&c| c as u64).sum();
        let recent_keyword_matches = match &matched_keyword {
            Some(keyword) => self.memory.token_count(
                &facts.guild_id,
                &facts.channel_id,
                &facts.user_id,
                keyword,
            ),
            None => 0,
        };
        let history_score = score_history(total_recent_tokens, recent_keyword_matches);
        let channel_risk_score = self
            .channel_risk_scores
            .get(&facts.channel_id)
            .copied()
            .unwrap_or(0);

        let mut base_score = 0;
        if matched_blocked_pattern.is_some() {
            base_score += BLOCKED_BASE_SCORE;
        }
        if matched_keyword.is_some() {
            base_score += KEYWORD_BASE_SCORE;
        }

        let rules = RuleContext {
            matched_keyword: matched_keyword.clone(),
            blocked_pattern: matched_blocked_pattern.clone(),
        };
        let classification = self.classifier.classify(content, &rules).await;
        let llm_floor = match classification.risk {
            RiskLevel::High => self.escalate_threshold,
            RiskLevel::Medium => self.delete_threshold,
            RiskLevel::Low => 0,
        };

        let total_score =
            (base_score + message_format_score + history_score + channel_risk_score).max(llm_floor);

        let action = if total_score >= self.escalate_threshold {
            Action::EscalateToMods
        } else if total_score >= self.delete_threshold {
            Action::Delete
        } else if total_score >= self.warn_threshold {
            Action::Warn
        } else {
            Action::Allow
        };

        let adjusted = quick_think_review(
            action,
            matched_keyword.as_deref(),
            matched_blocked_pattern.as_deref(),
            classification.risk,
            message_format_score,
            history_score,
            channel_risk_score,
            &candidates,
        );
        let (final_action, review_note) = review_action(
            adjusted,
            matched_keyword.as_deref(),
            matched_blocked_pattern.as_deref(),
            classification.risk,
            message_format_score,
            history_score,
            channel_risk_score,
        );

        Decision {
            action: final_action,
            context: DecisionContext {
                content: content.to_string(),
                matched_keyword,
                matched_blocked_pattern,
                llm_risk: classification.risk,
                llm_rationale: classification.rationale,
                review_note: review_note.to_string(),
                recent_keyword_matches,
                total_recent_tokens,
                channel_risk_score,
                message_format_score,
                history_score,
                base_score,
                llm_floor,
                total_score,
                message_length,
                link_count,
                uppercase_ratio,
                warn_threshold: self.warn_threshold,
                delete_threshold: self.delete_threshold,
                escalate_threshold: self.escalate_threshold,
            },
        }
    }
}

fn score_message_format(
    content: &str,
    message_length: usize,
    link_count: usize,
    uppercase_ratio: f64,
) -> i32 {
    let mut score = 0;
    if message_length >= 800 {
        score += 20;
    } else if message_length >= 400 {
        score += 10;
    }
    if link_count >= 2 {
        score += 12;
    } else if link_count == 1 {
        score += 6;
    }
    if uppercase_ratio >= 0.7 {
        score += 8;
    }
    if has_repeated_run(content, 7) {
        score += 12;
    }
    score
}

/// Keyboard-mash detection: the same character at least `min_run` times in
/// a row.
fn has_repeated_run(content: &str, min_run: usize) -> bool {
    let mut previous = None;
    let mut run = 0;
    for c in content.chars() {
        if Some(c) == previous {
            run += 1;
        } else {
            previous = Some(c);
            run = 1;
        }
        if run >= min_run {
            return true;
        }
    }
    false
}

fn score_history(total_recent_tokens: u64, recent_keyword_matches: u32) -> i32 {
    let mut score = 0;
    if total_recent_tokens >= 2000 {
        score += 12;
    } else if total_recent_tokens >= 800 {
        score += 6;
    }
    if recent_keyword_matches > 0 {
        score += (recent_keyword_matches as i32 * 5).min(25);
    }
    score
}

fn count_links(content: &str) -> usize {
    LINK_PATTERN.find_iter(content).count()
}

fn strip_allowed_gif_links(content: &str) -> String {
    if content.trim().is_empty() {
        return String::new();
    }
    ALLOWED_GIF_LINK_PATTERN.replace_all(content, " ").into_owned()
}

/// Shouting heuristic; short messages never trip it.
fn calculate_uppercase_ratio(content: &str) -> f64 {
    let mut uppercase = 0usize;
    let mut letters = 0usize;
    for c in content.chars() {
        if c.is_alphabetic() {
            letters += 1;
            if c.is_uppercase() {
                uppercase += 1;
            }
        }
    }
    if letters < 12 {
        return 0.0;
    }
    uppercase as f64 / letters as f64
}

/// Second-guess DELETE verdicts: users describing a report, or messages
/// with only soft signals, get a warning instead. Age-gap matches go the
/// other way and escalate for human eyes.
#[allow(clippy::too_many_arguments)]
fn quick_think_review(
    proposed: Action,
    matched_keyword: Option<&str>,
    blocked_pattern: Option<&str>,
    llm_risk: RiskLevel,
    message_format_score: i32,
    history_score: i32,
    channel_risk_score: i32,
    candidates: &[&str],
) -> Action {
    if proposed != Action::Delete {
        return proposed;
    }
    if blocked_pattern.is_some() {
        return proposed;
    }
    if llm_risk == RiskLevel::High {
        return proposed;
    }
    let report_context = candidates
        .iter()
        .any(|candidate| !candidate.trim().is_empty() && REPORT_CONTEXT_PATTERN.is_match(candidate));
    let soft_signals = message_format_score < 10 && history_score < 5 && channel_risk_score == 0;
    if report_context || soft_signals {
        return Action::Warn;
    }
    if matched_keyword.is_some_and(|keyword| keyword.contains("age gap")) {
        return Action::EscalateToMods;
    }
    proposed
}

/// Final sanity pass: anything above ALLOW needs at least one concrete
/// signal behind it.
fn review_action(
    proposed: Action,
    matched_keyword: Option<&str>,
    blocked_pattern: Option<&str>,
    llm_risk: RiskLevel,
    message_format_score: i32,
    history_score: i32,
    channel_risk_score: i32,
) -> (Action, &'static str) {
    if proposed == Action::Allow {
        return (Action::Allow, "No moderation action required.");
    }
    if blocked_pattern.is_some() || matched_keyword.is_some() {
        return (proposed, "Rule match present; keep action.");
    }
    if llm_risk != RiskLevel::Low {
        return (proposed, "LLM risk elevated; keep action.");
    }
    if history_score > 0 {
        return (proposed, "Recent history indicates spam; keep action.");
    }
    if channel_risk_score > 0 {
        return (proposed, "Channel risk profile elevated; keep action.");
    }
    if message_format_score >= 12 {
        return (proposed, "Message formatting indicates spam; keep action.");
    }
    (Action::Allow, "Low risk with no rule matches; action downgraded.")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::entities::Classification;
    use crate::infrastructure::text::MorphologyMode;
    use async_trait::async_trait;
    use std::collections::HashMap as StdHashMap;

    struct StubClassifier(RiskLevel);

    #[async_trait]
    impl RiskClassifier for StubClassifier {
        async fn classify(&self, _content: &str, _rules: &RuleContext) -> Classification {
            Classification::new(self.0, "stub")
        }
    }

    fn engine_with(config: Config, risk: RiskLevel) -> (tempfile::TempDir, DecisionEngine) {
        let dir = tempfile::tempdir().unwrap();
        let memory = Arc::new(WordMemoryStore::new(dir.path().join("memory.jsonl"), 30));
        let normalizer = Arc::new(TextNormalizer::from_embedded(MorphologyMode::Stem));
        let engine = DecisionEngine::new(&config, memory, normalizer, Arc::new(StubClassifier(risk)));
        (dir, engine)
    }

    fn facts(content: &str) -> MessageFacts {
        MessageFacts {
            guild_id: "guild".into(),
            channel_id: "channel".into(),
            user_id: "user".into(),
            content: content.into(),
        }
    }

    #[tokio::test]
    async fn keyword_match_warns() {
        let (_dir, engine) = engine_with(Config::default(), RiskLevel::Low);
        let decision = engine.evaluate(&facts("do not harass him")).await;
        assert_eq!(decision.action, Action::Warn);
        assert_eq!(decision.context.matched_keyword.as_deref(), Some("harass"));
        assert_eq!(decision.context.base_score, 30);
    }

    #[tokio::test]
    async fn blocked_pattern_deletes() {
        let (_dir, engine) = engine_with(Config::default(), RiskLevel::Low);
        let decision = engine.evaluate(&facts("visit www.example.com")).await;
        assert_eq!(decision.action, Action::Delete);
        assert!(decision.context.matched_blocked_pattern.is_some());
    }

    #[tokio::test]
    async fn high_risk_classification_escalates_benign_text() {
        let (_dir, engine) = engine_with(Config::default(), RiskLevel::High);
        let decision = engine.evaluate(&facts("good evening everyone")).await;
        assert_eq!(decision.action, Action::EscalateToMods);
        assert_eq!(decision.context.llm_floor, 80);
        assert_eq!(decision.context.total_score, 80);
    }

    #[tokio::test]
    async fn benign_message_is_allowed() {
        let (_dir, engine) = engine_with(Config::default(), RiskLevel::Low);
        let decision = engine.evaluate(&facts("anyone up for a game tonight?")).await;
        assert_eq!(decision.action, Action::Allow);
        assert_eq!(decision.context.total_score, 0);
    }

    #[tokio::test]
    async fn soft_delete_is_downgraded_to_warning() {
        let mut config = Config::default();
        config.moderation.warn_threshold = 10;
        config.moderation.delete_threshold = 30;
        let (_dir, engine) = engine_with(config, RiskLevel::Low);
        // keyword alone reaches the lowered delete threshold, but the
        // signals around it are weak
        let decision = engine.evaluate(&facts("do not harass him")).await;
        assert_eq!(decision.action, Action::Warn);
    }

    #[tokio::test]
    async fn age_gap_delete_escalates_instead() {
        let mut config = Config::default();
        config.moderation.delete_threshold = 30;
        let mut scores = StdHashMap::new();
        scores.insert("channel".to_string(), 5);
        config.moderation.channel_risk_scores = scores;
        let (_dir, engine) = engine_with(config, RiskLevel::Low);
        let decision = engine
            .evaluate(&facts("an adult dating a minor kid, so romantic"))
            .await;
        assert_eq!(decision.action, Action::EscalateToMods);
        assert_eq!(
            decision.context.matched_keyword.as_deref(),
            Some("age gap (adult/minor)")
        );
    }

    #[tokio::test]
    async fn format_only_warning_is_reviewed_down_to_allow() {
        let mut config = Config::default();
        config.moderation.warn_threshold = 10;
        let (_dir, engine) = engine_with(config, RiskLevel::Low);
        let long_benign = "lorem ".repeat(75);
        let decision = engine.evaluate(&facts(&long_benign)).await;
        assert_eq!(decision.action, Action::Allow);
        assert_eq!(decision.context.message_format_score, 10);
        assert_eq!(
            decision.context.review_note,
            "Low risk with no rule matches; action downgraded."
        );
    }

    #[tokio::test]
    async fn repeated_character_runs_count_as_format_risk() {
        let (_dir, engine) = engine_with(Config::default(), RiskLevel::Low);
        let decision = engine.evaluate(&facts("whaaaaaaaat is going on")).await;
        assert_eq!(decision.context.message_format_score, 12);
        assert_eq!(decision.action, Action::Allow);
    }

    #[tokio::test]
    async fn tenor_gif_links_are_not_link_spam() {
        let (_dir, engine) = engine_with(Config::default(), RiskLevel::Low);
        let decision = engine
            .evaluate(&facts("https://tenor.com/view/wave-gif-12345"))
            .await;
        assert_eq!(decision.action, Action::Allow);
        assert_eq!(decision.context.link_count, 0);
    }

    #[tokio::test]
    async fn repeat_offender_history_raises_the_score() {
        let (_dir, engine) = engine_with(Config::default(), RiskLevel::Low);
        let decision = engine.evaluate(&facts("do not harass him")).await;
        assert_eq!(decision.context.history_score, 0);

        // same engine and memory: record earlier uses of the keyword
        let (_dir2, engine2) = {
            let dir = tempfile::tempdir().unwrap();
            let memory = Arc::new(WordMemoryStore::new(dir.path().join("memory.jsonl"), 30));
            for _ in 0..3 {
                memory.record_message("guild", "channel", "user", "harass", chrono::Utc::now());
            }
            let normalizer = Arc::new(TextNormalizer::from_embedded(MorphologyMode::Stem));
            let engine = DecisionEngine::new(
                &Config::default(),
                memory,
                normalizer,
                Arc::new(StubClassifier(RiskLevel::Low)),
            );
            (dir, engine)
        };
        let decision = engine2.evaluate(&facts("do not harass him")).await;
        assert_eq!(decision.context.recent_keyword_matches, 3);
        assert_eq!(decision.context.history_score, 15);
        assert_eq!(decision.action, Action::Delete);
    }
}
