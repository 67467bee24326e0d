//! Rule fragments and their storage shape
//!
//! A rulebook is numbered hierarchically:
//!
//! ```text
//! 6. Violations
//! 6.1. Fouls
//! 6.1.1. A foul is awarded when ...
//! ```
//!
//! Each numbered unit becomes one [`RuleFragment`]. Its `hierarchy` holds the
//! ancestor headings (`6. Violations`, `6.1. Fouls`) but never the fragment's
//! own paragraph.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::embed::Embedding;

/// Separator used when rendering a hierarchy as a single breadcrumb.
pub const PATH_SEPARATOR: &str = " > ";

/// One ancestor heading in a fragment's hierarchy.
#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq)]
pub struct RuleLevel {
    /// Heading text with its numeric prefix stripped
    pub title: String,
    /// Dotted number of this level (e.g. "1.1"); `None` for unnumbered levels
    pub paragraph_number: Option<String>,
    /// Full rendered heading, e.g. "1.1. Basic terms"
    pub heading_text: String,
}

impl RuleLevel {
    /// Level for a numbered heading, rendered as `"<number>. <title>"`.
    #[must_use]
    pub fn numbered(paragraph_number: &str, title: &str) -> Self {
        Self {
            title: title.to_string(),
            paragraph_number: Some(paragraph_number.to_string()),
            heading_text: format!("{paragraph_number}. {title}"),
        }
    }
}

/// One leaf unit of retrievable rule text.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RuleFragment {
    /// Body text of the paragraph
    pub content: String,
    /// Dotted paragraph id ("1.1.1") or a label with a counter ("Comment 10")
    pub paragraph: String,
    /// Ancestor levels, root first
    pub hierarchy: Vec<RuleLevel>,
    /// Precomputed vector; normally `None`, the store embeds at index time
    pub embedding: Option<Embedding>,
    /// Internal handle, not the store key
    pub fragment_id: String,
}

impl RuleFragment {
    /// Create a fragment with a freshly generated `fragment_id`.
    #[must_use]
    pub fn new(
        content: impl Into<String>,
        paragraph: impl Into<String>,
        hierarchy: Vec<RuleLevel>,
    ) -> Self {
        Self {
            content: content.into(),
            paragraph: paragraph.into(),
            hierarchy,
            embedding: None,
            fragment_id: Uuid::new_v4().to_string(),
        }
    }

    /// Ancestor headings joined root-first with `" > "`.
    ///
    /// An empty hierarchy yields an empty string.
    #[must_use]
    pub fn full_path(&self) -> String {
        self.hierarchy
            .iter()
            .map(|level| level.heading_text.as_str())
            .collect::<Vec<_>>()
            .join(PATH_SEPARATOR)
    }

    /// Derive the record persisted by the vector store.
    ///
    /// The paragraph doubles as the store id, so re-ingesting a fragment
    /// replaces the earlier record.
    #[must_use]
    pub fn to_storage_record(&self) -> StorageRecord {
        StorageRecord {
            id: self.paragraph.clone(),
            text: self.content.clone(),
            metadata: RecordMetadata {
                paragraph: self.paragraph.clone(),
                full_path: self.full_path(),
            },
        }
    }
}

/// The shape a fragment takes inside the vector store.
#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq)]
pub struct StorageRecord {
    pub id: String,
    pub text: String,
    pub metadata: RecordMetadata,
}

/// Metadata stored next to each fragment.
#[derive(Debug, Clone, Default, Serialize, Deserialize, Eq, PartialEq)]
#[serde(default)]
pub struct RecordMetadata {
    pub paragraph: String,
    pub full_path: String,
}

/// Paragraph ids that occur more than once, in first-seen order.
///
/// The store keys fragments by paragraph, so every id listed here means an
/// earlier fragment will be overwritten on load.
#[must_use]
pub fn find_duplicate_paragraphs(fragments: &[RuleFragment]) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut reported = HashSet::new();
    let mut duplicates = Vec::new();

    for fragment in fragments {
        let id = fragment.paragraph.as_str();
        if !seen.insert(id) && reported.insert(id) {
            duplicates.push(id.to_string());
        }
    }
    duplicates
}

mod qna;

pub use qna::*;
