use serde::de::DeserializeOwned;

use crate::error::GeneratorError;

/// Removes Markdown code fences (with or without a language tag) around a
/// completion. Text without fences is only trimmed.
#[must_use]
pub fn strip_code_fences(raw: &str) -> &str {
    let trimmed = raw.trim();
    let Some(start) = trimmed.find("```") else {
        return trimmed;
    };
    let after_open = &trimmed[start + 3..];
    // Language tag, e.g. "json", ends at whitespace or the opening bracket.
    let tag_len = after_open
        .bytes()
        .take_while(u8::is_ascii_alphanumeric)
        .count();
    let body = match after_open[tag_len..].chars().next() {
        Some(next) if tag_len > 0 && (next.is_whitespace() || next == '[' || next == '{') => {
            &after_open[tag_len..]
        }
        _ => after_open,
    };
    match body.rfind("```") {
        Some(end) => body[..end].trim(),
        None => body.trim(),
    }
}

/// Parses a completion that must be a JSON array of `T`.
///
/// # Errors
///
/// Returns `GeneratorError::Parse` if the text is not JSON or an element does
/// not match `T`, and `GeneratorError::NotAnArray` for any other JSON value.
/// There is never a partial result.
pub fn parse_json_array<T: DeserializeOwned>(
    raw: &str,
    what: &'static str,
) -> Result<Vec<T>, GeneratorError> {
    let cleaned = strip_code_fences(raw);
    let value: serde_json::Value =
        serde_json::from_str(cleaned).map_err(|e| GeneratorError::Parse {
            what,
            reason: e.to_string(),
        })?;
    if !value.is_array() {
        return Err(GeneratorError::NotAnArray { what });
    }
    serde_json::from_value(value).map_err(|e| GeneratorError::Parse {
        what,
        reason: e.to_string(),
    })
}
