use std::sync::LazyLock;

use regex::Regex;

use crate::fragment::{RuleFragment, RuleLevel};
use crate::segment::{document_lines, Segmenter};

/// Matches a paragraph number such as `4.1.2.` at the start of a line.
static PARAGRAPH_NUMBER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\d+(?:\.\d+)*\.").expect("paragraph number pattern is valid")
});

/// Segmenter for hierarchically numbered rulebooks
///
/// Every line starting with a number like `2.3.` opens a new paragraph;
/// following lines belong to it until the next numbered line.
#[derive(Debug, Clone, Copy, Default)]
pub struct NumberedSegmenter;

impl Segmenter for NumberedSegmenter {
    fn name(&self) -> &str {
        "numbered"
    }

    fn segment(&self, text: &str) -> Vec<RuleFragment> {
        segment_numbered_document(&document_lines(text))
    }
}

/// Split non-blank lines into one fragment per numbered paragraph.
///
/// Lines before the first numbered line are dropped, as are paragraphs that
/// end up without any text.
#[must_use]
pub fn segment_numbered_document(lines: &[&str]) -> Vec<RuleFragment> {
    let fragments: Vec<RuleFragment> = NumberedUnits::from(lines)
        .map(|unit| {
            let hierarchy = derive_hierarchy(unit.paragraph, lines);
            tracing::debug!(paragraph = unit.paragraph, "created fragment");
            RuleFragment::new(unit.chunks.join(" "), unit.paragraph, hierarchy)
        })
        .collect();

    tracing::info!(count = fragments.len(), "split numbered document into fragments");
    fragments
}

/// Ancestor levels of `paragraph`, root first.
///
/// For `1.2.3` the candidates are `1` and `1.2`; each is resolved to the
/// first line numbered exactly that way. Candidates with no heading line are
/// skipped, so the result may be shorter than the nesting depth.
#[must_use]
pub fn derive_hierarchy(paragraph: &str, lines: &[&str]) -> Vec<RuleLevel> {
    ancestor_numbers(paragraph)
        .filter_map(|number| {
            find_heading_title(number, lines).map(|title| RuleLevel::numbered(number, title))
        })
        .collect()
}

/// Strict prefixes of a dotted number: `1.2.3` -> `1`, `1.2`.
fn ancestor_numbers(paragraph: &str) -> impl Iterator<Item = &str> {
    paragraph
        .match_indices('.')
        .map(move |(i, _)| &paragraph[..i])
}

/// Title of the first line numbered exactly `number`.
///
/// A descendant line such as `2.1.3.` also starts with `2.1.`, so the text
/// after the dot may not start with a digit. Otherwise a descendant listed
/// before its ancestor would be taken as the heading.
fn find_heading_title<'a>(number: &str, lines: &[&'a str]) -> Option<&'a str> {
    lines.iter().find_map(|line| {
        let rest = line.strip_prefix(number)?.strip_prefix('.')?;
        if rest.starts_with(|c: char| c.is_ascii_digit()) {
            None
        } else {
            Some(rest.trim())
        }
    })
}

/// A numbered paragraph and its text pieces, before hierarchy resolution.
struct NumberedUnit<'a> {
    paragraph: &'a str,
    chunks: Vec<&'a str>,
}

/// Iterator over numbered paragraphs in a line sequence.
struct NumberedUnits<'a> {
    lines: std::slice::Iter<'a, &'a str>,
    pending: Option<NumberedUnit<'a>>,
}

impl<'a> NumberedUnits<'a> {
    fn from(lines: &'a [&'a str]) -> Self {
        Self {
            lines: lines.iter(),
            pending: None,
        }
    }
}

/// Split a line into its paragraph number (without the trailing dot) and
/// the remaining text, if it opens a paragraph.
fn open_paragraph(line: &str) -> Option<NumberedUnit<'_>> {
    let matched = PARAGRAPH_NUMBER.find(line)?;
    let rest = line[matched.end()..].trim();

    Some(NumberedUnit {
        paragraph: matched.as_str().trim_end_matches('.'),
        chunks: if rest.is_empty() { Vec::new() } else { vec![rest] },
    })
}

impl<'a> Iterator for NumberedUnits<'a> {
    type Item = NumberedUnit<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            // Find the opening line, discarding text before the first number.
            let mut unit = match self.pending.take() {
                Some(unit) => unit,
                None => loop {
                    let line = *self.lines.next()?;
                    if let Some(unit) = open_paragraph(line) {
                        break unit;
                    }
                },
            };

            // Collect body lines until the next numbered line.
            for &line in self.lines.by_ref() {
                if let Some(next) = open_paragraph(line) {
                    self.pending = Some(next);
                    break;
                }
                let line = line.trim();
                if !line.is_empty() {
                    unit.chunks.push(line);
                }
            }

            if !unit.chunks.is_empty() {
                return Some(unit);
            }
            if self.pending.is_none() {
                return None;
            }
        }
    }
}
