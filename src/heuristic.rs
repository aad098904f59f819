//! Keyword heuristic used when no engine binding is available.
//!
//! Exists purely to keep the protocol contract satisfiable without the
//! engine; it does not attempt real tone classification.

use crate::protocol::envelope::suggestions_envelope;

/// Markers that flag a body as rude.
const RUDE_MARKERS: [&str; 2] = ["idiot", "stupid"];

/// Classify a message body and produce a suggestions envelope.
///
/// Deterministic and dependency-free: lower-case the body, look for the
/// fixed rudeness markers, answer with fixed coaching strings.
pub fn classify(body: &str) -> String {
    let lowered = body.to_lowercase();
    let rude = RUDE_MARKERS.iter().any(|m| lowered.contains(m));

    if rude {
        suggestions_envelope(&[
            "Rude",
            "Please soften the expression.",
            "Consider acknowledging the recipient's view.",
        ])
    } else {
        suggestions_envelope(&["Polite", "Adding a brief thanks at the end can help."])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_polite_body() {
        assert_eq!(
            classify("hello"),
            r#"{"suggestions":["Polite","Adding a brief thanks at the end can help."]}"#
        );
    }

    #[test]
    fn test_rude_body() {
        let out = classify("you idiot");
        assert_eq!(
            out,
            r#"{"suggestions":["Rude","Please soften the expression.","Consider acknowledging the recipient's view."]}"#
        );
    }

    #[test]
    fn test_markers_are_case_insensitive() {
        assert!(classify("STUPID plan").contains("Rude"));
        assert!(classify("IdIoT").contains("Rude"));
    }

    #[test]
    fn test_marker_inside_word_still_matches() {
        // Substring match is the documented behavior, not word-boundary.
        assert!(classify("stupidity").contains("Rude"));
    }

    #[test]
    fn test_empty_body_is_polite() {
        assert!(classify("").contains("Polite"));
    }
}
