//! Risk classification
//!
//! The decision engine consults a classifier for every evaluated message.
//! `HttpClassifier` talks to a local LLM endpoint and falls back to plain
//! rule-based levels whenever the endpoint is disabled, unreachable, slow,
//! or returns something unusable.

use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use tracing::debug;

use crate::application::errors::BotError;
use crate::domain::entities::{Classification, RiskLevel, RuleContext};
use crate::infrastructure::config::LlmConfig;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(2);
const REQUEST_TIMEOUT: Duration = Duration::from_secs(5);

/// Classifies a message's risk level
#[async_trait]
pub trait RiskClassifier: Send + Sync {
    async fn classify(&self, content: &str, rules: &RuleContext) -> Classification;
}

#[derive(Serialize)]
struct ClassifyRequest<'a> {
    message: &'a str,
    format: &'static str,
    response_format: &'static str,
}

pub struct HttpClassifier {
    enabled: bool,
    endpoint: Option<String>,
    debug: bool,
    client: reqwest::Client,
}

impl HttpClassifier {
    pub fn new(config: &LlmConfig) -> Result<Self, BotError> {
        let client = reqwest::Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| BotError::Network(e.to_string()))?;
        Ok(Self {
            enabled: config.enabled,
            endpoint: config.endpoint.clone(),
            debug: config.debug,
            client,
        })
    }

    async fn request(&self, endpoint: &str, content: &str) -> Result<String, reqwest::Error> {
        let response = self
            .client
            .post(endpoint)
            .json(&ClassifyRequest {
                message: content,
                format: "risk",
                response_format: "json",
            })
            .send()
            .await?
            .error_for_status()?;
        response.text().await
    }

    fn log_decision(
        &self,
        source: &str,
        content: &str,
        rules: &RuleContext,
        classification: &Classification,
        note: &str,
    ) {
        if !self.debug {
            return;
        }
        debug!(
            source,
            risk = classification.risk.as_str(),
            rationale = %classification.rationale,
            blocked_pattern = rules.blocked_pattern.as_deref().unwrap_or("none"),
            matched_keyword = rules.matched_keyword.as_deref().unwrap_or("none"),
            message_length = content.len(),
            message_preview = %summarize_content(content),
            note,
            "risk classification"
        );
    }
}

#[async_trait]
impl RiskClassifier for HttpClassifier {
    async fn classify(&self, content: &str, rules: &RuleContext) -> Classification {
        if !self.enabled {
            let classification =
                Classification::new(RiskLevel::Low, "LLM classification disabled.");
            self.log_decision(
                "disabled",
                content,
                rules,
                &classification,
                "LLM classification disabled in config.",
            );
            return classification;
        }
        let Some(endpoint) = self.endpoint.as_deref().filter(|e| !e.trim().is_empty()) else {
            let classification = classify_by_rules(rules);
            self.log_decision(
                "rules",
                content,
                rules,
                &classification,
                "LLM endpoint not configured.",
            );
            return classification;
        };
        let body = match self.request(endpoint, content).await {
            Ok(body) => body,
            Err(e) => {
                let classification = classify_by_rules(rules);
                let note = format!("LLM request failed ({}); using rules.", e);
                self.log_decision("rules", content, rules, &classification, &note);
                return classification;
            }
        };
        match parse_response(&body) {
            Some(classification) => {
                self.log_decision("llm", content, rules, &classification, "LLM response parsed.");
                classification
            }
            None => {
                let classification = classify_by_rules(rules);
                self.log_decision(
                    "rules",
                    content,
                    rules,
                    &classification,
                    "LLM response unusable; using rules.",
                );
                classification
            }
        }
    }
}

/// Accepts either a top-level classification object or one nested under a
/// `classification` key, with `riskLevel` or `risk_level` naming.
pub fn parse_response(body: &str) -> Option<Classification> {
    let root: Value = serde_json::from_str(body).ok()?;
    let node = root.get("classification").unwrap_or(&root);
    let level = node
        .get("riskLevel")
        .or_else(|| node.get("risk_level"))
        .and_then(Value::as_str)?;
    let risk = RiskLevel::parse(level)?;
    let rationale = node
        .get("rationale")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|r| !r.is_empty())
        .unwrap_or("LLM classification applied.");
    Some(Classification::new(risk, rationale))
}

/// Deterministic fallback mirroring the engine's own rule weights.
pub fn classify_by_rules(rules: &RuleContext) -> Classification {
    if rules.blocked_pattern.is_some() {
        return Classification::new(RiskLevel::High, "Blocked pattern matched.");
    }
    if rules.matched_keyword.is_some() {
        return Classification::new(RiskLevel::Medium, "Keyword match detected.");
    }
    Classification::new(RiskLevel::Low, "No rules matched.")
}

fn summarize_content(content: &str) -> String {
    let normalized = content.split_whitespace().collect::<Vec<_>>().join(" ");
    if normalized.is_empty() {
        return "n/a".to_string();
    }
    if normalized.chars().count() <= 120 {
        return normalized;
    }
    let truncated: String = normalized.chars().take(117).collect();
    format!("{}...", truncated)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_wrapped_classification() {
        let body = r#"{"classification":{"riskLevel":"HIGH","rationale":"threats"}}"#;
        let parsed = parse_response(body).unwrap();
        assert_eq!(parsed.risk, RiskLevel::High);
        assert_eq!(parsed.rationale, "threats");
    }

    #[test]
    fn parses_top_level_snake_case() {
        let body = r#"{"risk_level":"medium","rationale":""}"#;
        let parsed = parse_response(body).unwrap();
        assert_eq!(parsed.risk, RiskLevel::Medium);
        assert_eq!(parsed.rationale, "LLM classification applied.");
    }

    #[test]
    fn rejects_missing_or_invalid_risk_level() {
        assert!(parse_response(r#"{"rationale":"no level"}"#).is_none());
        assert!(parse_response(r#"{"riskLevel":"EXTREME"}"#).is_none());
        assert!(parse_response("not json").is_none());
    }

    #[test]
    fn rule_fallback_ranks_blocked_above_keyword() {
        let blocked = RuleContext {
            matched_keyword: Some("scam".into()),
            blocked_pattern: Some(r"www\.".into()),
        };
        assert_eq!(classify_by_rules(&blocked).risk, RiskLevel::High);

        let keyword = RuleContext {
            matched_keyword: Some("scam".into()),
            blocked_pattern: None,
        };
        assert_eq!(classify_by_rules(&keyword).risk, RiskLevel::Medium);

        assert_eq!(
            classify_by_rules(&RuleContext::default()).risk,
            RiskLevel::Low
        );
    }

    #[test]
    fn summarizes_long_content() {
        let long = "word ".repeat(100);
        let summary = summarize_content(&long);
        assert!(summary.ends_with("..."));
        assert_eq!(summary.chars().count(), 120);
    }
}
