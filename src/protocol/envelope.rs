//! Suggestions-envelope normalization.
//!
//! The engine is free to answer with a bare JSON array, a full object, or
//! arbitrary prose; the extension only understands one shape:
//! `{"suggestions":[...]}`. This module canonicalizes whatever came back
//! into that envelope, bounding size first so a runaway engine cannot blow
//! up the outbound frame.

use crate::protocol::extract::{array_literal, escape_into};

/// Safety ceiling on raw engine output, in bytes.
///
/// Output beyond this is truncated (on a UTF-8 boundary) before
/// normalization, bounding both host memory and downstream frame size.
pub const MAX_ENGINE_OUTPUT: usize = 900_000;

/// Envelope produced for whitespace-only engine output.
pub const EMPTY_OUTPUT_ENVELOPE: &str = r#"{"suggestions":["Error","Empty response"]}"#;

/// Fixed fallback envelope when the engine returns nothing at all.
///
/// Keeps the protocol contract satisfiable: the caller always gets a
/// well-formed suggestions array, never an empty one.
pub const EMPTY_ENGINE_FALLBACK: &str = r#"{"suggestions":["Polite","Could you clarify this point?","I would appreciate your feedback when you have a moment."]}"#;

/// Build a `{"suggestions":[...]}` envelope from plain strings, escaping
/// each element.
pub fn suggestions_envelope(items: &[&str]) -> String {
    let mut out = String::with_capacity(32 + items.iter().map(|s| s.len() + 4).sum::<usize>());
    out.push_str(r#"{"suggestions":["#);
    for (i, item) in items.iter().enumerate() {
        if i > 0 {
            out.push(',');
        }
        out.push('"');
        escape_into(&mut out, item);
        out.push('"');
    }
    out.push_str("]}");
    out
}

/// Wrap a raw array literal as a suggestions envelope without re-escaping.
pub fn wrap_array(array_text: &str) -> String {
    let mut out = String::with_capacity(array_text.len() + 18);
    out.push_str(r#"{"suggestions":"#);
    out.push_str(array_text);
    out.push('}');
    out
}

/// Canonicalize raw engine output into a suggestions envelope.
///
/// Policy, in order:
/// 1. truncate beyond [`MAX_ENGINE_OUTPUT`] (UTF-8 boundary safe), trim;
/// 2. whitespace-only → [`EMPTY_OUTPUT_ENVELOPE`];
/// 3. a balanced `[...]` blob → wrap directly as the array;
/// 4. starts with `{` → extract a `"suggestions"` array from within and wrap
///    that, else treat the whole object text as one opaque suggestion;
/// 5. anything else (including an array left unbalanced by truncation) →
///    one opaque, escaped suggestion.
///
/// Idempotent: normalizing an already-normalized envelope returns it
/// unchanged. Never fails, and always yields a valid JSON envelope; a
/// malformed blob degrades to case 5 rather than erroring.
pub fn normalize_engine_output(raw: &str) -> String {
    let bounded = truncate_utf8(raw, MAX_ENGINE_OUTPUT);
    let trimmed = bounded.trim();
    if trimmed.is_empty() {
        return EMPTY_OUTPUT_ENVELOPE.to_string();
    }

    if trimmed.starts_with('[') && brackets_balance(trimmed) {
        return wrap_array(trimmed);
    }

    if trimmed.starts_with('{') {
        if let Some(arr) = array_literal(trimmed, "suggestions") {
            return wrap_array(arr);
        }
    }

    suggestions_envelope(&[trimmed])
}

/// Whether the blob is one balanced `[...]` literal, end to end.
///
/// Bracket depth only; brackets inside string elements are not understood,
/// the same limitation the extractor has.
fn brackets_balance(s: &str) -> bool {
    let mut depth = 0usize;
    for (i, b) in s.bytes().enumerate() {
        match b {
            b'[' => depth += 1,
            b']' => {
                if depth == 0 {
                    return false;
                }
                depth -= 1;
                if depth == 0 {
                    return i == s.len() - 1;
                }
            }
            _ => {}
        }
    }
    false
}

/// Truncate to at most `max` bytes without splitting a UTF-8 sequence.
fn truncate_utf8(s: &str, max: usize) -> &str {
    if s.len() <= max {
        return s;
    }
    let mut end = max;
    while end > 0 && !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}
