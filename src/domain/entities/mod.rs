pub mod faq;
pub mod moderation;

pub use faq::FaqEntry;
pub use moderation::{
    Action, Classification, Decision, DecisionContext, MessageFacts, RiskLevel, RuleContext,
};
