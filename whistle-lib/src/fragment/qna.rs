use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use crate::embed::Embedding;

/// A curated question/answer pair pointing back at rule paragraphs.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct QnaPair {
    pub question: String,
    pub answer: String,
    /// Paragraphs the answer relies on, e.g. `["1.1", "1.2"]`
    pub related_paragraphs: Vec<String>,
    pub embedding: Option<Embedding>,
}

impl QnaPair {
    /// Text indexed for similarity search.
    #[must_use]
    pub fn content(&self) -> String {
        format!("Q: {}\nA: {}", self.question, self.answer)
    }

    /// Metadata map for the store.
    ///
    /// Store metadata values must be scalars, so the related paragraphs are
    /// joined into one comma-separated string.
    #[must_use]
    pub fn metadata(&self) -> Map<String, Value> {
        let mut map = Map::new();
        map.insert(
            "related_paragraphs".to_string(),
            json!(self.related_paragraphs.join(", ")),
        );
        map
    }
}
