//! Document segmentation
//!
//! Two input formats are supported:
//! - Rulebooks: hierarchically numbered paragraphs (`1.`, `1.1.`, `1.1.1.`),
//!   usually extracted from a PDF. See [`NumberedSegmenter`].
//! - Comments: plain text blocks of a heading followed by statements, blocks
//!   separated by blank lines. See [`FlatSegmenter`].
//!
//! Nesting is reconstructed purely from numbering; no outline or bookmark
//! metadata is used.
//!
//! # Usage
//!
//! ```ignore
//! use whistle_lib::segment::{FlatSegmenter, NumberedSegmenter, Segmenter};
//!
//! let rules = NumberedSegmenter.segment(&rules_text);
//! let comments = FlatSegmenter::new("Comment").segment(&comments_text);
//! ```

use crate::fragment::RuleFragment;

/// Trait for turning a whole document into rule fragments
pub trait Segmenter: Send + Sync {
    /// Split document text into fragments, in document order
    fn segment(&self, text: &str) -> Vec<RuleFragment>;

    /// Returns the name of this segmentation strategy
    fn name(&self) -> &str;
}

/// Trimmed, non-blank lines of `text`.
///
/// This is the linearised form the numbered segmenter works on.
#[must_use]
pub fn document_lines(text: &str) -> Vec<&str> {
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .collect()
}

mod flat;
mod numbered;

pub use flat::*;
pub use numbered::*;
