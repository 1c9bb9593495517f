//! Line-oriented diffing shared by the VFS (in-memory documents) and the
//! local environment (on-disk files). Built on `similar`'s Myers diff rather
//! than a hand-rolled LCS: the spec only pins `has_diff` plus a unified-text
//! rendering, and a maintained crate is the idiomatic choice the rest of the
//! corpus reaches for when it needs a diff engine.

use serde::{Deserialize, Serialize};
use similar::{ChangeTag, TextDiff};

/// One contiguous run of changed/unchanged lines, in unified-diff order.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DiffHunk {
    pub header: String,
    pub lines: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DiffResult {
    pub hunks: Vec<DiffHunk>,
    pub unified_text: String,
    pub has_diff: bool,
}

/// Compute a unified diff between `old` and `new`, labelling hunks with
/// `path` in the `---`/`+++` header lines.
pub fn unified_diff(path: &str, old: &str, new: &str) -> DiffResult {
    if old == new {
        return DiffResult { hunks: Vec::new(), unified_text: String::new(), has_diff: false };
    }

    let diff = TextDiff::from_lines(old, new);
    let unified_text = diff
        .unified_diff()
        .context_radius(3)
        .header(&format!("a/{path}"), &format!("b/{path}"))
        .to_string();

    let mut hunks = Vec::new();
    for group in diff.grouped_ops(3) {
        let mut lines = Vec::new();
        for op in &group {
            for change in diff.iter_changes(op) {
                let prefix = match change.tag() {
                    ChangeTag::Delete => '-',
                    ChangeTag::Insert => '+',
                    ChangeTag::Equal => ' ',
                };
                lines.push(format!("{prefix}{}", change.value().trim_end_matches('\n')));
            }
        }
        let header = group
            .first()
            .map(|op| format!("@@ -{},{} +{},{} @@", op.old_range().start + 1, op.old_range().len(), op.new_range().start + 1, op.new_range().len()))
            .unwrap_or_default();
        hunks.push(DiffHunk { header, lines });
    }

    DiffResult { hunks, unified_text, has_diff: true }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identical_content_has_no_diff() {
        let result = unified_diff("a.txt", "same\n", "same\n");
        assert!(!result.has_diff);
        assert!(result.hunks.is_empty());
    }

    #[test]
    fn changed_content_produces_hunks_and_unified_text() {
        let result = unified_diff("a.txt", "one\ntwo\n", "one\nthree\n");
        assert!(result.has_diff);
        assert!(!result.hunks.is_empty());
        assert!(result.unified_text.contains("-two"));
        assert!(result.unified_text.contains("+three"));
    }
}
