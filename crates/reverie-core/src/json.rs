// SPDX-FileCopyrightText: 2026 Reverie Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Best-effort salvage of structured data from free-text LLM output.
//!
//! Model responses routinely wrap JSON in markdown fences or prose.
//! These helpers slice out the first JSON object/array and deserialize
//! it, returning [`ReverieError::Parse`] instead of panicking so that
//! callers can decide between a local no-op and escalation.

use serde::de::DeserializeOwned;

use crate::error::ReverieError;

/// Extract and deserialize the first `{...}` object in `text`.
///
/// Slices from the first `{` to the last `}` (tolerates markdown code
/// fences and surrounding prose), then parses with serde.
pub fn extract_object<T: DeserializeOwned>(text: &str) -> Result<T, ReverieError> {
    let slice = slice_between(text, '{', '}')
        .ok_or_else(|| ReverieError::Parse("no JSON object in response".to_string()))?;
    serde_json::from_str(slice).map_err(|e| ReverieError::Parse(e.to_string()))
}

/// Extract and deserialize the first `[...]` array in `text`.
pub fn extract_array<T: DeserializeOwned>(text: &str) -> Result<Vec<T>, ReverieError> {
    let slice = slice_between(text, '[', ']')
        .ok_or_else(|| ReverieError::Parse("no JSON array in response".to_string()))?;
    serde_json::from_str(slice).map_err(|e| ReverieError::Parse(e.to_string()))
}

/// Parse a model-emitted score as a float clamped to `[0.0, 1.0]`.
///
/// A non-numeric response scores `0.0` rather than erroring; scoring
/// prompts are advisory and must never fail the surrounding operation.
pub fn parse_unit_score(text: &str) -> f32 {
    let token = text
        .split_whitespace()
        .find(|t| t.trim_matches(|c: char| !c.is_ascii_digit() && c != '.').parse::<f32>().is_ok());
    match token {
        Some(t) => t
            .trim_matches(|c: char| !c.is_ascii_digit() && c != '.')
            .parse::<f32>()
            .unwrap_or(0.0)
            .clamp(0.0, 1.0),
        None => 0.0,
    }
}

/// Slice from the first `open` to the last `close` character, inclusive.
fn slice_between(text: &str, open: char, close: char) -> Option<&str> {
    let start = text.find(open)?;
    let end = text.rfind(close)?;
    if end < start {
        return None;
    }
    Some(&text[start..=end])
}
