//! Line diffs between document contents.

use serde::Serialize;
use similar::{ChangeTag, TextDiff};

/// How a line differs between the two sides.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LineTag {
    Equal,
    Insert,
    Delete,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DiffLine {
    pub tag: LineTag,
    /// The line without its trailing newline.
    pub text: String,
}

/// A line diff from one content to another, for review.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ContentDiff {
    pub lines: Vec<DiffLine>,
    /// The same diff rendered as unified text.
    pub unified: String,
    pub insertions: usize,
    pub deletions: usize,
}

impl ContentDiff {
    /// Diff `from` against `to`. Labels name the sides in the unified header.
    pub fn compute(from_label: &str, from: &str, to_label: &str, to: &str) -> Self {
        let diff = TextDiff::from_lines(from, to);
        let mut lines = Vec::new();
        let mut unified = String::new();
        let mut insertions = 0;
        let mut deletions = 0;

        unified.push_str(&format!("--- {}\n", from_label));
        unified.push_str(&format!("+++ {}\n", to_label));

        for change in diff.iter_all_changes() {
            let (tag, sign) = match change.tag() {
                ChangeTag::Delete => {
                    deletions += 1;
                    (LineTag::Delete, "-")
                }
                ChangeTag::Insert => {
                    insertions += 1;
                    (LineTag::Insert, "+")
                }
                ChangeTag::Equal => (LineTag::Equal, " "),
            };
            let text = change.value().trim_end_matches('\n');
            unified.push_str(&format!("{}{}\n", sign, text));
            lines.push(DiffLine {
                tag,
                text: text.to_string(),
            });
        }

        Self {
            lines,
            unified,
            insertions,
            deletions,
        }
    }

    /// Whether both sides are identical.
    pub fn is_empty(&self) -> bool {
        self.insertions == 0 && self.deletions == 0
    }
}
