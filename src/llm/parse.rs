//! Defensive parsing of backend verdicts
//!
//! Models asked for `{"answer": ..., "confidence": ...}` do not always
//! comply. These functions accept the common deviations and report anything
//! else as unknown; choosing a default is left to the caller.

use serde_json::Value;

/// Fields recovered from a backend response
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct ParsedVerdict {
    /// `None` when the answer field is missing or not boolean-like
    pub answer: Option<bool>,
    /// Confidence scaled into `[0, 1]`, `None` when not numeric
    pub confidence: Option<f64>,
}

/// Remove an enclosing fenced-code wrapper (```` ```json ... ``` ````)
pub fn strip_code_fence(text: &str) -> &str {
    let trimmed = text.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    // Drop the info string (e.g. "json") on the opening line, or before the
    // payload when the whole fence sits on one line
    let body = match rest.find('\n') {
        Some(newline) => &rest[newline + 1..],
        None => rest.trim_start_matches(|c: char| {
            c.is_ascii_alphanumeric() || c == '-' || c == '_'
        }),
    };
    body.trim_end().trim_end_matches("```").trim()
}

/// Parse a response into its answer and confidence
///
/// Returns `None` when the text is not a JSON object at all.
pub fn parse_verdict(text: &str) -> Option<ParsedVerdict> {
    let value: Value = serde_json::from_str(strip_code_fence(text)).ok()?;
    let object = value.as_object()?;
    Some(ParsedVerdict {
        answer: object.get("answer").and_then(coerce_answer),
        confidence: object.get("confidence").and_then(coerce_confidence),
    })
}

/// Boolean or `"true"`/`"yes"`/`"false"`/`"no"` in any case
pub fn coerce_answer(value: &Value) -> Option<bool> {
    match value {
        Value::Bool(b) => Some(*b),
        Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
            "true" | "yes" => Some(true),
            "false" | "no" => Some(false),
            _ => None,
        },
        _ => None,
    }
}

/// Number or numeric string, scaled into `[0, 1]`
///
/// Values in `(1, 100]` are read as percentages. A float like `5.0` is
/// therefore indistinguishable from 5 percent.
pub fn coerce_confidence(value: &Value) -> Option<f64> {
    let raw = match value {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => s.trim().parse::<f64>().ok()?,
        _ => return None,
    };
    if !raw.is_finite() {
        return None;
    }
    let scaled = if raw > 1.0 && raw <= 100.0 {
        raw / 100.0
    } else {
        raw
    };
    Some(scaled.clamp(0.0, 1.0))
}
