//! Deterministic text normalization.
//!
//! Two flavours are used by the pipeline:
//!
//! - [`normalize_text`] tidies extracted text for storage and segmentation:
//!   line structure is kept, but blank-line runs collapse to one blank line
//!   and space runs collapse to one space.
//! - [`canonical_form`] is the fingerprint input: case-folded, every
//!   whitespace run collapsed to a single space, ends trimmed.

use std::sync::LazyLock;

use regex::Regex;

static SPACE_RUN: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[ \t\u{00A0}]+").unwrap());

/// Normalize whitespace in extracted text.
///
/// Runs of two or more blank (or whitespace-only) lines become exactly one
/// blank line, runs of spaces become one space, and each line is trimmed.
pub fn normalize_text(text: &str) -> String {
    let text = text.replace("\r\n", "\n").replace('\r', "\n");
    let mut out = String::with_capacity(text.len());
    let mut pending_blank = false;

    for line in text.split('\n') {
        let line = SPACE_RUN.replace_all(line.trim(), " ");
        if line.is_empty() {
            pending_blank = true;
            continue;
        }
        if !out.is_empty() {
            out.push_str(if pending_blank { "\n\n" } else { "\n" });
        }
        pending_blank = false;
        out.push_str(&line);
    }

    out
}

/// Canonical form used for fingerprinting.
pub fn canonical_form(text: &str) -> String {
    text.to_lowercase()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Cut `text` to at most `max_chars` characters on a char boundary.
///
/// Returns the kept prefix and whether anything was cut.
pub fn truncate_chars(text: &str, max_chars: usize) -> (&str, bool) {
    match text.char_indices().nth(max_chars) {
        Some((byte_idx, _)) => (&text[..byte_idx], true),
        None => (text, false),
    }
}
