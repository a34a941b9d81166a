//! Text normalization and pattern compilation for moderation

pub mod normalizer;
pub mod patterns;

pub use normalizer::{MorphologyMode, NormalizedResult, TextNormalizer};
pub use patterns::{compile_config_pattern, compile_keyword_pattern, is_age_gap_concern, matches_any};
