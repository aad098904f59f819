//! Prompt construction for the rewrite engine.
//!
//! A pure string transform: wraps the target sentence in the fixed ChatML
//! role/instruction template the engine was tuned against. Deterministic and
//! side-effect-free; the protocol layer treats the result as opaque text.

/// System block: role, language rules, and the output contract the engine
/// must honor (a JSON array of four strings, tone tag first).
const SYSTEM_RULES: &str = "\
ROLE: Email Tone Polishing Assistant.

OBJECTIVE:
Given a \"Target\" sentence, return three polite and professional rewrites \
that preserve its original meaning and intent.

LANGUAGE:
- If the Target is Korean, respond in Korean using formal business register \
with honorific endings.
- Else if the Target is Japanese, respond in Japanese using polite desu/masu \
forms.
- Else if the Target is English, respond in English with a professional \
business tone.
- Otherwise, respond in the Target's language.

OUTPUT:
Return exactly one JSON array of four UTF-8 strings:
[
  \"polite\" or \"impolite\",
  \"alternative1\",
  \"alternative2\",
  \"alternative3\"
]
No extra text, no trailing commentary.

TONE CLASSIFICATION:
- Use \"impolite\" for informal speech, slang, blunt commands without \
courtesy, sarcasm, offensive language, or unprofessional tone.
- Otherwise, use \"polite\".

CONDUCT:
- Preserve the meaning, facts, numbers, entities, and placeholders exactly.
- Do NOT change or invent new deadlines, conditions, or commitments.
- Do NOT repeat the Target in the output.
- Output must always contain exactly four strings.
";

/// Sentence substituted when the caller supplied nothing usable.
pub const PLACEHOLDER_TARGET: &str = "Hello.";

/// Build the full prompt for one target sentence.
///
/// The target is trimmed; an empty target becomes [`PLACEHOLDER_TARGET`] so
/// the engine always sees a well-formed user block.
pub fn make_prompt(target: &str) -> String {
    let target = target.trim();
    let target = if target.is_empty() {
        PLACEHOLDER_TARGET
    } else {
        target
    };

    let mut out = String::with_capacity(SYSTEM_RULES.len() + target.len() + 96);
    out.push_str("<|im_start|>system\n");
    out.push_str(SYSTEM_RULES);
    out.push_str("\n<|im_end|>\n");
    out.push_str("<|im_start|>user\nTarget: ");
    out.push_str(target);
    out.push_str("\n<|im_end|>\n");
    out.push_str("<|im_start|>assistant\n");
    out
}
