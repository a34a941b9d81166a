use std::sync::{Arc, Once};

use vrc_group_bot::application::services::DecisionEngine;
use vrc_group_bot::domain::entities::{Action, MessageFacts, RiskLevel};
use vrc_group_bot::infrastructure::config::Config;
use vrc_group_bot::infrastructure::llm::HttpClassifier;
use vrc_group_bot::infrastructure::memory::WordMemoryStore;
use vrc_group_bot::infrastructure::text::{MorphologyMode, TextNormalizer};

static INIT: Once = Once::new();

fn ensure_init() {
    INIT.call_once(|| {
        tracing_subscriber::fmt()
            .with_target(false)
            .with_env_filter(
                tracing_subscriber::EnvFilter::from_default_env()
                    .add_directive(tracing::Level::INFO.into()),
            )
            .try_init()
            .ok();
    });
}

/// Full engine wiring as `run_bot` builds it, with the LLM disabled so the
/// classifier stays offline.
fn build_engine(dir: &tempfile::TempDir) -> DecisionEngine {
    let config = Config::default();
    assert!(!config.llm.enabled);
    let memory = Arc::new(WordMemoryStore::new(dir.path().join("memory.jsonl"), 30));
    memory.load();
    let normalizer = Arc::new(TextNormalizer::from_embedded(MorphologyMode::Stem));
    let classifier = Arc::new(HttpClassifier::new(&config.llm).unwrap());
    DecisionEngine::new(&config, memory, normalizer, classifier)
}

fn facts(content: &str) -> MessageFacts {
    MessageFacts {
        guild_id: "123".into(),
        channel_id: "456".into(),
        user_id: "789".into(),
        content: content.into(),
    }
}

#[tokio::test]
async fn benign_chat_passes_through() {
    ensure_init();
    let dir = tempfile::tempdir().unwrap();
    let engine = build_engine(&dir);
    let decision = engine.evaluate(&facts("meet you at the usual world tonight")).await;
    assert_eq!(decision.action, Action::Allow);
    assert_eq!(decision.context.llm_risk, RiskLevel::Low);
    assert_eq!(decision.context.llm_rationale, "LLM classification disabled.");
}

#[tokio::test]
async fn scam_link_is_deleted_with_full_context() {
    ensure_init();
    let dir = tempfile::tempdir().unwrap();
    let engine = build_engine(&dir);
    let decision = engine.evaluate(&facts("https://example.com")).await;
    assert_eq!(decision.action, Action::Delete);
    assert!(decision.context.matched_blocked_pattern.is_some());
    assert_eq!(decision.context.base_score, 70);
    assert_eq!(decision.context.link_count, 1);
    assert_eq!(decision.context.message_format_score, 6);
    assert_eq!(decision.context.total_score, 76);
    assert_eq!(decision.context.review_note, "Rule match present; keep action.");
}

#[tokio::test]
async fn keyword_hit_draws_a_warning() {
    ensure_init();
    let dir = tempfile::tempdir().unwrap();
    let engine = build_engine(&dir);
    let decision = engine.evaluate(&facts("do not harass him")).await;
    assert_eq!(decision.action, Action::Warn);
    assert_eq!(decision.context.matched_keyword.as_deref(), Some("harass"));
    assert_eq!(decision.context.total_score, 30);
}
