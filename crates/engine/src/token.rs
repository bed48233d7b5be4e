//! Token estimation.
//!
//! Uses a character-based heuristic: ~4 characters per token. This is a
//! budgeting approximation only and does not match any real tokenizer.

/// Estimate the token count for a string.
///
/// Counts Unicode scalar values, not bytes, and rounds up.
pub fn estimate_tokens(text: &str) -> usize {
    text.chars().count().div_ceil(4)
}
