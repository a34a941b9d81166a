//! Moderation domain types
//!
//! Plain data passed between the decision engine, the classifier and the
//! gateway listeners. Nothing here depends on serenity types so the engine
//! stays testable without a live connection.

use serde::{Deserialize, Serialize};

/// What the bot should do with a message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Action {
    Allow,
    Warn,
    Delete,
    EscalateToMods,
}

impl Action {
    pub fn as_str(&self) -> &'static str {
        match self {
            Action::Allow => "ALLOW",
            Action::Warn => "WARN",
            Action::Delete => "DELETE",
            Action::EscalateToMods => "ESCALATE_TO_MODS",
        }
    }
}

/// Risk level reported by the classifier. Ordered LOW < MEDIUM < HIGH.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum RiskLevel {
    Low,
    Medium,
    High,
}

impl RiskLevel {
    /// Parses a risk level; unknown values are rejected so callers can
    /// fall back to rule-based classification.
    pub fn parse(value: &str) -> Option<RiskLevel> {
        match value.trim().to_ascii_uppercase().as_str() {
            "LOW" => Some(RiskLevel::Low),
            "MEDIUM" => Some(RiskLevel::Medium),
            "HIGH" => Some(RiskLevel::High),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RiskLevel::Low => "LOW",
            RiskLevel::Medium => "MEDIUM",
            RiskLevel::High => "HIGH",
        }
    }
}

/// Classifier verdict for one message
#[derive(Debug, Clone)]
pub struct Classification {
    pub risk: RiskLevel,
    pub rationale: String,
}

impl Classification {
    pub fn new(risk: RiskLevel, rationale: impl Into<String>) -> Self {
        Self {
            risk,
            rationale: rationale.into(),
        }
    }
}

/// Rule-match signals handed to the classifier for its fallback path
#[derive(Debug, Clone, Default)]
pub struct RuleContext {
    pub matched_keyword: Option<String>,
    pub blocked_pattern: Option<String>,
}

/// The facts about one message the engine needs to decide on it
#[derive(Debug, Clone)]
pub struct MessageFacts {
    pub guild_id: String,
    pub channel_id: String,
    pub user_id: String,
    pub content: String,
}

/// Everything that went into a decision, kept for mod-log transparency
#[derive(Debug, Clone)]
pub struct DecisionContext {
    pub content: String,
    pub matched_keyword: Option<String>,
    pub matched_blocked_pattern: Option<String>,
    pub llm_risk: RiskLevel,
    pub llm_rationale: String,
    pub review_note: String,
    pub recent_keyword_matches: u32,
    pub total_recent_tokens: u64,
    pub channel_risk_score: i32,
    pub message_format_score: i32,
    pub history_score: i32,
    pub base_score: i32,
    pub llm_floor: i32,
    pub total_score: i32,
    pub message_length: usize,
    pub link_count: usize,
    pub uppercase_ratio: f64,
    pub warn_threshold: i32,
    pub delete_threshold: i32,
    pub escalate_threshold: i32,
}

/// Final verdict plus the context that produced it
#[derive(Debug, Clone)]
pub struct Decision {
    pub action: Action,
    pub context: DecisionContext,
}
