//! One-shot population of the rule fragment collection
//!
//! The rulebook (usually a PDF) is segmented by its numbering, the comments
//! file by blank-line separated blocks; both land in the rules collection.
//! Filling happens once: a collection that already holds documents is left
//! untouched.

use std::fs;
use std::path::Path;
use std::process::Command;

use crate::embed::Embedder;
use crate::fragment::{find_duplicate_paragraphs, RuleFragment};
use crate::segment::{FlatSegmenter, NumberedSegmenter, Segmenter};
use crate::store::{FragmentStore, VectorBackend};
use crate::{Error, Result};

/// Result of a [`fill_collection`] run. Both variants are successes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FillOutcome {
    /// Fragments were segmented and loaded
    Filled { fragments: usize },
    /// The rules collection already had documents; nothing was written
    AlreadyPopulated { count: usize },
}

/// Read a source document as text.
///
/// `.pdf` files go through the `pdftotext` binary from poppler; anything else
/// is read as UTF-8.
pub fn load_document(path: &Path) -> Result<String> {
    let is_pdf = path
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("pdf"));

    if is_pdf {
        extract_pdf_text(path)
    } else {
        Ok(fs::read_to_string(path)?)
    }
}

fn extract_pdf_text(path: &Path) -> Result<String> {
    tracing::info!(path = %path.display(), "extracting PDF text with pdftotext");

    let output = Command::new("pdftotext")
        .arg("-enc")
        .arg("UTF-8")
        .arg(path)
        .arg("-")
        .output()
        .map_err(|e| Error::InvalidInput(format!("failed to run pdftotext (is poppler installed?): {e}")))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(Error::InvalidInput(format!(
            "pdftotext failed on {}: {}",
            path.display(),
            stderr.trim()
        )));
    }

    let text = String::from_utf8_lossy(&output.stdout).into_owned();
    if text.trim().is_empty() {
        return Err(Error::InvalidInput(format!(
            "pdftotext produced no text for {}",
            path.display()
        )));
    }
    tracing::info!(chars = text.chars().count(), "extracted PDF text");
    Ok(text)
}

/// Segment the rulebook and the comments file into one fragment list,
/// rulebook first.
pub fn segment_sources(
    rules_path: &Path,
    comments_path: &Path,
    comment_label: &str,
) -> Result<Vec<RuleFragment>> {
    let mut fragments = NumberedSegmenter.segment(&load_document(rules_path)?);
    let rules = fragments.len();

    fragments.extend(FlatSegmenter::new(comment_label).segment(&load_document(comments_path)?));
    tracing::info!(
        rules,
        comments = fragments.len() - rules,
        "segmented source documents"
    );
    Ok(fragments)
}

/// Fill the rules collection unless it already holds documents.
///
/// Collections are created first if missing. When the rules collection is
/// non-empty nothing is read or written.
pub fn fill_collection<E: Embedder, B: VectorBackend>(
    store: &FragmentStore<E, B>,
    rules_path: &Path,
    comments_path: &Path,
    comment_label: &str,
) -> Result<FillOutcome> {
    store.ensure_collections()?;

    let count = store.rules_count()?;
    if count > 0 {
        tracing::info!(
            collection = store.rules_collection(),
            count,
            "collection is not empty, skipping fill"
        );
        return Ok(FillOutcome::AlreadyPopulated { count });
    }
    tracing::info!(collection = store.rules_collection(), "collection is empty, filling");

    let fragments = segment_sources(rules_path, comments_path, comment_label)?;
    let duplicates = find_duplicate_paragraphs(&fragments);
    if !duplicates.is_empty() {
        tracing::warn!(
            ?duplicates,
            "duplicate paragraph ids, later fragments replace earlier ones"
        );
    }
    if let Some(first) = fragments.first() {
        tracing::debug!(paragraph = %first.paragraph, content = %first.content, "example fragment");
    }

    let added = store.add_fragments_batch(&fragments)?;
    tracing::info!(fragments = added, "collection filling completed");
    Ok(FillOutcome::Filled { fragments: added })
}
