//! Recovers a single JSON object from a possibly noisy model reply.

use serde_json::{Map, Value};
use thiserror::Error;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ParseError {
    #[error("model response is empty")]
    Empty,
    #[error("no JSON object found in model response")]
    NoObject,
    #[error("JSON object in model response is not balanced")]
    Unbalanced,
    #[error("recovered JSON object is invalid: {0}")]
    InvalidJson(String),
}

/// Strips one surrounding code fence, tries a whole-string parse, then falls
/// back to scanning for the first balanced `{...}` block.
pub fn parse_model_json(raw: &str) -> Result<Map<String, Value>, ParseError> {
    let text = strip_code_fence(raw.trim());
    if text.is_empty() {
        return Err(ParseError::Empty);
    }

    if let Ok(Value::Object(object)) = serde_json::from_str::<Value>(text) {
        return Ok(object);
    }

    let candidate = scan_first_object(text)?;
    match serde_json::from_str::<Value>(candidate) {
        Ok(Value::Object(object)) => Ok(object),
        Ok(_) => Err(ParseError::NoObject),
        Err(error) => Err(ParseError::InvalidJson(error.to_string())),
    }
}

fn strip_code_fence(text: &str) -> &str {
    let Some(rest) = text.strip_prefix("```") else {
        return text;
    };

    // The opening fence line may carry a language tag (```json).
    let body = match rest.find('\n') {
        Some(newline) => &rest[newline + 1..],
        None => rest.trim_start_matches(|ch: char| ch.is_ascii_alphabetic()),
    };
    body.trim_end().strip_suffix("```").unwrap_or(body).trim()
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum ScanState {
    Normal,
    InString,
    Escaped,
}

fn scan_first_object(text: &str) -> Result<&str, ParseError> {
    let start = text.find('{').ok_or(ParseError::NoObject)?;
    let mut state = ScanState::Normal;
    let mut depth = 0usize;

    for (offset, ch) in text[start..].char_indices() {
        state = match (state, ch) {
            (ScanState::Escaped, _) => ScanState::InString,
            (ScanState::InString, '\\') => ScanState::Escaped,
            (ScanState::InString, '"') => ScanState::Normal,
            (ScanState::InString, _) => ScanState::InString,
            (ScanState::Normal, '"') => ScanState::InString,
            (ScanState::Normal, '{') => {
                depth += 1;
                ScanState::Normal
            }
            (ScanState::Normal, '}') => {
                depth = depth.saturating_sub(1);
                if depth == 0 {
                    let end = start + offset + ch.len_utf8();
                    return Ok(&text[start..end]);
                }
                ScanState::Normal
            }
            (ScanState::Normal, _) => ScanState::Normal,
        };
    }

    Err(ParseError::Unbalanced)
}
