//! Minimal JSON field/array extraction.
//!
//! Deliberately not a general parser. The host only ever needs named string
//! fields (`type`, `focus`, `context`, `body`) and one named array literal
//! (`suggestions`) out of small, trusted blobs, and it must keep working on
//! input a full parser would reject — a half-written engine response must
//! degrade to an empty result, never an error.
//!
//! Limits, by design: no numbers, booleans, null, or `\uXXXX` decoding.
//! Callers must never feed this data whose correctness depends on those.

/// Extract a named string field from a JSON blob.
///
/// Locates the literal quoted key, the following colon, then a `"`-opened
/// string value, applying the escape set `\" \\ \n \r \t` and passing any
/// other escaped character through verbatim. Returns an empty string when
/// the key is absent or the value is missing/malformed.
///
/// # Example
///
/// ```
/// use tonebridge::protocol::string_field;
///
/// let blob = r#"{"type":"analyze","body":"a \"quoted\" word"}"#;
/// assert_eq!(string_field(blob, "type"), "analyze");
/// assert_eq!(string_field(blob, "body"), "a \"quoted\" word");
/// assert_eq!(string_field(blob, "missing"), "");
/// ```
pub fn string_field(blob: &str, key: &str) -> String {
    let Some(rest) = after_key_colon(blob, key) else {
        return String::new();
    };
    let rest = rest.trim_start();
    let Some(rest) = rest.strip_prefix('"') else {
        return String::new();
    };

    let mut value = String::new();
    let mut chars = rest.chars();
    while let Some(c) = chars.next() {
        match c {
            '\\' => match chars.next() {
                Some('n') => value.push('\n'),
                Some('r') => value.push('\r'),
                Some('t') => value.push('\t'),
                Some(other) => value.push(other), // includes '"' and '\\'
                None => break,                    // truncated escape
            },
            '"' => break,
            other => value.push(other),
        }
    }
    value
}

/// Extract a named bracketed array literal from a JSON blob.
///
/// After the key and colon, requires `[` and scans forward tracking nested
/// bracket depth; returns the full balanced substring including brackets.
/// Returns `None` when the key is absent, the value is not an array, or the
/// brackets never balance. Nesting inside string values is not understood —
/// acceptable for the suggestion arrays this host handles.
pub fn array_literal<'a>(blob: &'a str, key: &str) -> Option<&'a str> {
    let rest = after_key_colon(blob, key)?;
    let trimmed = rest.trim_start();
    if !trimmed.starts_with('[') {
        return None;
    }

    let mut depth = 0usize;
    for (i, b) in trimmed.bytes().enumerate() {
        match b {
            b'[' => depth += 1,
            b']' => {
                depth -= 1;
                if depth == 0 {
                    return Some(&trimmed[..=i]);
                }
            }
            _ => {}
        }
    }
    None
}

/// Position the input just after `"key":`, or `None` if not found.
fn after_key_colon<'a>(blob: &'a str, key: &str) -> Option<&'a str> {
    let pattern = format!("\"{key}\"");
    let key_pos = blob.find(&pattern)?;
    let rest = &blob[key_pos + pattern.len()..];
    let colon = rest.find(':')?;
    Some(&rest[colon + 1..])
}

/// Append a JSON-escaped copy of `s` to `out`.
///
/// Escapes the same six-character set the extractor decodes. Control
/// characters outside that set pass through untouched, matching the wire
/// behavior the extension already tolerates.
pub fn escape_into(out: &mut String, s: &str) {
    for c in s.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            other => out.push(other),
        }
    }
}

/// JSON-escape a string (convenience over [`escape_into`]).
pub fn escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 8);
    escape_into(&mut out, s);
    out
}
