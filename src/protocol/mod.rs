//! Protocol layer: framed transport, minimal JSON extraction, and
//! response-envelope normalization.

pub mod envelope;
pub mod extract;
pub mod framing;

pub use envelope::{
    normalize_engine_output, suggestions_envelope, wrap_array, EMPTY_ENGINE_FALLBACK,
    EMPTY_OUTPUT_ENVELOPE, MAX_ENGINE_OUTPUT,
};
pub use extract::{array_literal, escape, escape_into, string_field};
pub use framing::{ensure_binary_mode, FrameReader, FrameWriter, MAX_FRAME_LEN};
