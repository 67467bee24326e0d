use crate::fragment::{RuleFragment, RuleLevel};
use crate::segment::Segmenter;

/// First counter value used for flat fragment labels.
pub const FIRST_FLAT_NUMBER: usize = 10;

/// Segmenter for heading/statement comment files
///
/// Expected layout:
///
/// ```text
/// High level heading
/// Statement 1
/// Statement 2
///
/// High level heading 2
/// Statement 1
/// ```
///
/// Each statement becomes its own fragment, prefixed by its heading. Labels
/// are `"<label_prefix> <n>"` with `n` counting up across the whole file.
#[derive(Debug, Clone)]
pub struct FlatSegmenter {
    pub label_prefix: String,
}

impl FlatSegmenter {
    #[must_use]
    pub fn new(label_prefix: impl Into<String>) -> Self {
        Self {
            label_prefix: label_prefix.into(),
        }
    }
}

impl Segmenter for FlatSegmenter {
    fn name(&self) -> &str {
        "flat"
    }

    fn segment(&self, text: &str) -> Vec<RuleFragment> {
        let lines: Vec<&str> = text.lines().collect();
        segment_flat_document(&lines, &self.label_prefix)
    }
}

/// Split raw lines (blank lines included) into one fragment per statement.
#[must_use]
pub fn segment_flat_document(lines: &[&str], label_prefix: &str) -> Vec<RuleFragment> {
    let mut fragments = Vec::new();
    let mut heading: Option<&str> = None;
    let mut counter = FIRST_FLAT_NUMBER;

    for line in lines {
        let line = line.trim();

        // blank line closes the current block
        if line.is_empty() {
            heading = None;
            continue;
        }

        let Some(current) = heading else {
            heading = Some(line);
            continue;
        };

        fragments.push(RuleFragment::new(
            format!("{current}\n{line}"),
            format!("{label_prefix} {counter}"),
            vec![RuleLevel {
                title: String::new(),
                paragraph_number: Some("-".to_string()),
                heading_text: current.to_string(),
            }],
        ));
        counter += 1;
    }

    tracing::info!(
        count = fragments.len(),
        label = label_prefix,
        "split flat document into fragments"
    );
    fragments
}
