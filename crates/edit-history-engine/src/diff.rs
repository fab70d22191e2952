//! Unified-diff generation and application.
//!
//! Generation uses `imara-diff`'s unified-diff builder; application uses
//! `diffy`'s patch parser, which fails closed on context mismatch rather than
//! fuzzily relocating hunks — exactly the behaviour replay depends on.

use imara_diff::{Algorithm, UnifiedDiffBuilder, diff as imara_diff_compute};

use crate::error::{EngineError, Result};

/// Produces unified-diff bytes for `old -> new`, labelling both sides with
/// `label` (as `a/<label>` / `b/<label>`). Byte-identical inputs yield an
/// empty diff.
pub fn unified_diff(old: &[u8], new: &[u8], label: &str) -> Vec<u8> {
    if old == new {
        return Vec::new();
    }

    let old_text = String::from_utf8_lossy(old);
    let new_text = String::from_utf8_lossy(new);

    let input = imara_diff::intern::InternedInput::new(old_text.as_ref(), new_text.as_ref());
    let diff_body = imara_diff_compute(
        Algorithm::Histogram,
        &input,
        UnifiedDiffBuilder::new(&input),
    );

    if diff_body.is_empty() {
        return Vec::new();
    }

    let a_label = format!("a/{label}");
    let b_label = format!("b/{label}");
    let mut out = format!("--- {a_label}\n+++ {b_label}\n");
    out.push_str(&diff_body);
    out.into_bytes()
}

/// Applies unified-diff bytes to `old`. Fails with `PatchContextMismatch`
/// (surfaced by the caller, which knows the edit id) when hunk context lines
/// do not match `old`.
pub fn apply_patch(old: &[u8], diff_bytes: &[u8]) -> Result<Vec<u8>> {
    if diff_bytes.is_empty() {
        return Ok(old.to_vec());
    }

    let old_text = String::from_utf8_lossy(old);
    let diff_text = std::str::from_utf8(diff_bytes)
        .map_err(|e| EngineError::InvalidArgument { message: format!("diff is not valid utf-8: {e}") })?;

    let patch = diffy::Patch::from_str(diff_text)
        .map_err(|e| EngineError::InvalidArgument { message: format!("malformed unified diff: {e}") })?;

    diffy::apply(&old_text, &patch)
        .map(String::into_bytes)
        .map_err(|_| EngineError::PatchContextMismatch {
            path: Default::default(),
            edit_id: String::new(),
        })
}
