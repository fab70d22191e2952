//! Mutation specifications for the `edit` operation.
//!
//! Two independent shapes share the `edit` operation tag: a line-selected
//! splice (against the pre-edit file's original numbering, never
//! cumulatively re-numbered) and a content-anchored find/replace. Both are
//! pure functions over the old file text; the tracker is responsible for
//! turning their output into bytes on disk and a diff.

use std::collections::HashMap;
use std::path::Path;

use crate::error::{EngineError, Result};

/// One line selector, as accepted by the line-specified edit tool.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineSelector {
    /// `"N"` — replace line `N` (1-indexed).
    Line(u64),
    /// `"N-M"` — replace the inclusive range `[N, M]`.
    Range(u64, u64),
    /// `"Ni"` — insert after line `N`; `0` means "at the beginning".
    InsertAfter(u64),
    /// `"a"` — append to the end of the file.
    Append,
}

impl LineSelector {
    /// The inclusive `[start, end]` line range this selector occupies, for
    /// overlap detection. Insertions and append don't consume any existing
    /// line, so they never conflict with anything.
    fn span(self) -> Option<(u64, u64)> {
        match self {
            LineSelector::Line(n) => Some((n, n)),
            LineSelector::Range(n, m) => Some((n, m)),
            LineSelector::InsertAfter(_) | LineSelector::Append => None,
        }
    }
}

/// Parses one selector string, e.g. `"3"`, `"3-7"`, `"0i"`, `"a"`.
pub fn parse_selector(raw: &str) -> Result<LineSelector> {
    let invalid = || EngineError::InvalidArgument {
        message: format!("invalid line selector `{raw}`"),
    };

    if raw == "a" {
        return Ok(LineSelector::Append);
    }

    if let Some(prefix) = raw.strip_suffix('i') {
        let n: u64 = prefix.parse().map_err(|_| invalid())?;
        return Ok(LineSelector::InsertAfter(n));
    }

    if let Some((lo, hi)) = raw.split_once('-') {
        let lo: u64 = lo.parse().map_err(|_| invalid())?;
        let hi: u64 = hi.parse().map_err(|_| invalid())?;
        if lo == 0 || hi < lo {
            return Err(invalid());
        }
        return Ok(LineSelector::Range(lo, hi));
    }

    let n: u64 = raw.parse().map_err(|_| invalid())?;
    if n == 0 {
        return Err(invalid());
    }
    Ok(LineSelector::Line(n))
}

/// Applies a set of line selectors to `original`, all resolved against the
/// original (pre-edit) line numbering. Rejects overlapping replace/range
/// selectors with `ConflictingEdit`.
pub fn apply_line_edits(original: &str, edits: &[(LineSelector, String)], path: &Path) -> Result<String> {
    check_no_overlaps(edits, path)?;

    let lines: Vec<&str> = split_keep_trailing(original);
    let line_count = lines.len() as u64;

    let mut replacements: HashMap<u64, Option<&str>> = HashMap::new();
    let mut inserts_after: HashMap<u64, Vec<&str>> = HashMap::new();
    let mut appended: Vec<&str> = Vec::new();

    for (selector, text) in edits {
        match *selector {
            LineSelector::Line(n) => {
                if n > line_count {
                    return Err(EngineError::InvalidArgument {
                        message: format!("line {n} is out of range (file has {line_count} lines)"),
                    });
                }
                replacements.insert(n, Some(text.as_str()));
            }
            LineSelector::Range(lo, hi) => {
                if hi > line_count {
                    return Err(EngineError::InvalidArgument {
                        message: format!("line {hi} is out of range (file has {line_count} lines)"),
                    });
                }
                replacements.insert(lo, Some(text.as_str()));
                for n in (lo + 1)..=hi {
                    replacements.insert(n, None);
                }
            }
            LineSelector::InsertAfter(n) => {
                if n > line_count {
                    return Err(EngineError::InvalidArgument {
                        message: format!("line {n} is out of range (file has {line_count} lines)"),
                    });
                }
                inserts_after.entry(n).or_default().push(text.as_str());
            }
            LineSelector::Append => appended.push(text.as_str()),
        }
    }

    let mut out = String::new();
    if let Some(block) = inserts_after.get(&0) {
        for chunk in block {
            push_chunk(&mut out, chunk);
        }
    }
    for (idx, line) in lines.iter().enumerate() {
        let n = idx as u64 + 1;
        match replacements.get(&n) {
            Some(None) => {} // consumed by a range, dropped
            Some(Some(text)) => push_chunk(&mut out, text),
            None => push_chunk(&mut out, line),
        }
        if let Some(block) = inserts_after.get(&n) {
            for chunk in block {
                push_chunk(&mut out, chunk);
            }
        }
    }
    for chunk in appended {
        push_chunk(&mut out, chunk);
    }
    Ok(out)
}

/// Splits into lines, each retaining its trailing `\n` so re-joining the
/// unreplaced lines is a byte-identity operation.
fn split_keep_trailing(text: &str) -> Vec<&str> {
    let mut out = Vec::new();
    let mut start = 0;
    for (i, b) in text.bytes().enumerate() {
        if b == b'\n' {
            out.push(&text[start..=i]);
            start = i + 1;
        }
    }
    if start < text.len() {
        out.push(&text[start..]);
    }
    out
}

/// Appends `text` to `out`, inserting a separating `\n` first if `out` is
/// non-empty and doesn't already end in one. Never forces a trailing `\n`
/// onto `text` itself, so a file whose last line has none can still be
/// reproduced byte-for-byte when nothing follows it.
fn push_chunk(out: &mut String, text: &str) {
    if !out.is_empty() && !out.ends_with('\n') {
        out.push('\n');
    }
    out.push_str(text);
}

fn check_no_overlaps(edits: &[(LineSelector, String)], path: &Path) -> Result<()> {
    let mut spans: Vec<(u64, u64)> = edits.iter().filter_map(|(s, _)| s.span()).collect();
    spans.sort_unstable();
    for w in spans.windows(2) {
        let (_, end_a) = w[0];
        let (start_b, _) = w[1];
        if start_b <= end_a {
            return Err(EngineError::ConflictingEdit {
                path: path.to_path_buf(),
                detail: format!("overlapping selectors around line {start_b}"),
            });
        }
    }
    Ok(())
}

/// A content-anchored edit: literal substring replacements and insertions.
/// Anchors are matched verbatim — no fuzzy or whitespace-normalized
/// matching.
#[derive(Debug, Clone, Default)]
pub struct AnchoredEdit {
    pub replacements: Vec<(String, String)>,
    pub inserts: Vec<(String, String)>,
    pub replace_all: bool,
}

impl AnchoredEdit {
    /// Applies replacements then insertions, in the order given, each
    /// matched against the file state left by the previous step. Every
    /// anchor must be found verbatim or the whole call fails with
    /// `AnchorNotFound`.
    pub fn apply(&self, original: &str, path: &Path) -> Result<String> {
        let mut content = original.to_string();

        for (find, replace) in &self.replacements {
            if !content.contains(find.as_str()) {
                return Err(EngineError::AnchorNotFound {
                    path: path.to_path_buf(),
                    anchor: find.clone(),
                });
            }
            content = if self.replace_all {
                content.replace(find.as_str(), replace)
            } else {
                content.replacen(find.as_str(), replace, 1)
            };
        }

        for (anchor, insertion) in &self.inserts {
            let Some(pos) = content.find(anchor.as_str()) else {
                return Err(EngineError::AnchorNotFound {
                    path: path.to_path_buf(),
                    anchor: anchor.clone(),
                });
            };
            let insert_at = pos + anchor.len();
            content.insert_str(insert_at, insertion);
        }

        Ok(content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn p() -> PathBuf {
        PathBuf::from("/ws/a.txt")
    }

    #[test]
    fn parses_all_selector_shapes() {
        assert_eq!(parse_selector("3").unwrap(), LineSelector::Line(3));
        assert_eq!(parse_selector("3-7").unwrap(), LineSelector::Range(3, 7));
        assert_eq!(parse_selector("0i").unwrap(), LineSelector::InsertAfter(0));
        assert_eq!(parse_selector("5i").unwrap(), LineSelector::InsertAfter(5));
        assert_eq!(parse_selector("a").unwrap(), LineSelector::Append);
        assert!(parse_selector("0").is_err());
        assert!(parse_selector("bogus").is_err());
    }

    #[test]
    fn replaces_single_line() {
        let out = apply_line_edits("one\ntwo\nthree\n", &[(LineSelector::Line(2), "TWO\n".into())], &p()).unwrap();
        assert_eq!(out, "one\nTWO\nthree\n");
    }

    #[test]
    fn replaces_inclusive_range_with_one_block() {
        let out = apply_line_edits(
            "one\ntwo\nthree\nfour\n",
            &[(LineSelector::Range(2, 3), "MID\n".into())],
            &p(),
        )
        .unwrap();
        assert_eq!(out, "one\nMID\nfour\n");
    }

    #[test]
    fn inserts_after_line_and_at_beginning() {
        let out = apply_line_edits(
            "one\ntwo\n",
            &[
                (LineSelector::InsertAfter(0), "ZERO\n".into()),
                (LineSelector::InsertAfter(1), "AFTER_ONE\n".into()),
            ],
            &p(),
        )
        .unwrap();
        assert_eq!(out, "ZERO\none\nAFTER_ONE\ntwo\n");
    }

    #[test]
    fn appends_to_end() {
        let out = apply_line_edits("one\n", &[(LineSelector::Append, "two\n".into())], &p()).unwrap();
        assert_eq!(out, "one\ntwo\n");
    }

    #[test]
    fn selectors_resolve_against_original_numbering_not_cumulative() {
        // Replacing line 1 and line 2 in the same call must both see the
        // *original* file, not a shifted view after the first replacement.
        let out = apply_line_edits(
            "a\nb\nc\n",
            &[(LineSelector::Line(1), "A\n".into()), (LineSelector::Line(2), "B\n".into())],
            &p(),
        )
        .unwrap();
        assert_eq!(out, "A\nB\nc\n");
    }

    #[test]
    fn overlapping_ranges_are_rejected() {
        let result = apply_line_edits(
            "a\nb\nc\nd\n",
            &[(LineSelector::Range(1, 2), "x\n".into()), (LineSelector::Range(2, 3), "y\n".into())],
            &p(),
        );
        assert!(matches!(result, Err(EngineError::ConflictingEdit { .. })));
    }

    #[test]
    fn out_of_range_line_is_rejected() {
        let result = apply_line_edits("a\n", &[(LineSelector::Line(5), "x\n".into())], &p());
        assert!(result.is_err());
    }

    #[test]
    fn out_of_range_insert_after_is_rejected() {
        let result = apply_line_edits("a\nb\n", &[(LineSelector::InsertAfter(5), "x\n".into())], &p());
        assert!(matches!(result, Err(EngineError::InvalidArgument { .. })));
    }

    #[test]
    fn insert_after_zero_is_always_valid_even_on_empty_file() {
        let out = apply_line_edits("", &[(LineSelector::InsertAfter(0), "x\n".into())], &p()).unwrap();
        assert_eq!(out, "x\n");
    }

    #[test]
    fn append_separates_from_a_final_line_missing_its_newline() {
        let out = apply_line_edits("a\nb", &[(LineSelector::Append, "c\n".into())], &p()).unwrap();
        assert_eq!(out, "a\nb\nc\n");
    }

    #[test]
    fn replacing_the_last_line_can_reproduce_a_missing_trailing_newline() {
        let out = apply_line_edits("a\nb", &[(LineSelector::Line(2), "B".into())], &p()).unwrap();
        assert_eq!(out, "a\nB");
    }

    #[test]
    fn anchored_replace_single_occurrence() {
        let edit = AnchoredEdit {
            replacements: vec![("hello".into(), "world".into())],
            inserts: vec![],
            replace_all: false,
        };
        assert_eq!(edit.apply("hello\n", &p()).unwrap(), "world\n");
    }

    #[test]
    fn anchored_replace_all_occurrences() {
        let edit = AnchoredEdit {
            replacements: vec![("x".into(), "y".into())],
            inserts: vec![],
            replace_all: true,
        };
        assert_eq!(edit.apply("x x x\n", &p()).unwrap(), "y y y\n");
    }

    #[test]
    fn anchored_replace_missing_anchor_fails() {
        let edit = AnchoredEdit {
            replacements: vec![("nope".into(), "x".into())],
            inserts: vec![],
            replace_all: false,
        };
        assert!(matches!(edit.apply("hi\n", &p()), Err(EngineError::AnchorNotFound { .. })));
    }

    #[test]
    fn anchored_insert_after_anchor() {
        let edit = AnchoredEdit {
            replacements: vec![],
            inserts: vec![("fn main() {".into(), "\n    setup();".into())],
            replace_all: false,
        };
        assert_eq!(edit.apply("fn main() {\n}\n", &p()).unwrap(), "fn main() {\n    setup();\n}\n");
    }

    #[test]
    fn anchor_matching_is_literal_not_fuzzy() {
        let edit = AnchoredEdit {
            replacements: vec![("  hello  ".into(), "x".into())],
            inserts: vec![],
            replace_all: false,
        };
        // Whitespace-trimmed content should NOT match a padded anchor.
        assert!(matches!(edit.apply("hello\n", &p()), Err(EngineError::AnchorNotFound { .. })));
    }
}
