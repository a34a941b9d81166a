use serde::Deserialize;

/// A single FAQ entry loaded from the bundled resource file
#[derive(Debug, Clone, Deserialize)]
pub struct FaqEntry {
    pub topic: String,
    pub title: String,
    pub description: String,
}
