//! Normalization of reasoning-service text into typed records.
//!
//! Everything here is pure: no I/O, no logging side effects beyond `tracing`
//! debug events for dropped array items.

use serde_json::Value;

use courtroom_common::ModelOutput;

/// Why a response could not be turned into the target record.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ParseError {
    #[error("empty response")]
    Empty,

    #[error("no JSON value found: {0}")]
    Malformed(String),

    #[error("does not match target schema: {0}")]
    Schema(String),

    #[error("failed validation: {0}")]
    Invalid(String),

    #[error("none of {0} array items were valid")]
    NoValidItems(usize),
}

impl From<ParseError> for courtroom_common::CourtroomError {
    fn from(e: ParseError) -> Self {
        courtroom_common::CourtroomError::Validation(e.to_string())
    }
}

/// Repair `text` and validate it as a `T`.
pub fn repair_and_validate<T: ModelOutput>(text: &str) -> Result<T, ParseError> {
    let value = repair(text)?;
    let record: T = serde_json::from_value(value).map_err(|e| ParseError::Schema(e.to_string()))?;
    record.check().map_err(ParseError::Invalid)?;
    Ok(record)
}

/// Repair `text` as a top-level array of `T`, dropping individually invalid items.
///
/// A lone object is treated as a one-item array, and an object whose only
/// field is an array (`{"analyses": [...]}`) is unwrapped.
pub fn repair_and_validate_array<T: ModelOutput>(text: &str) -> Result<Vec<T>, ParseError> {
    let items = match repair(text)? {
        Value::Array(items) => items,
        Value::Object(map) if map.len() == 1 && map.values().all(Value::is_array) => {
            match map.into_iter().next() {
                Some((_, Value::Array(items))) => items,
                _ => Vec::new(),
            }
        }
        obj @ Value::Object(_) => vec![obj],
        other => {
            return Err(ParseError::Schema(format!(
                "expected array, got {}",
                type_name(&other)
            )))
        }
    };

    let total = items.len();
    let valid: Vec<T> = items
        .into_iter()
        .enumerate()
        .filter_map(|(i, item)| {
            let record = match serde_json::from_value::<T>(item) {
                Ok(r) => r,
                Err(e) => {
                    tracing::debug!(index = i, error = %e, "Dropping array item");
                    return None;
                }
            };
            match record.check() {
                Ok(()) => Some(record),
                Err(e) => {
                    tracing::debug!(index = i, error = %e, "Dropping invalid array item");
                    None
                }
            }
        })
        .collect();

    if total > 0 && valid.is_empty() {
        return Err(ParseError::NoValidItems(total));
    }
    Ok(valid)
}

/// Turn raw model text into a JSON value, applying repairs only as needed.
pub fn repair(text: &str) -> Result<Value, ParseError> {
    repair_depth(text, 0)
}

const MAX_UNWRAP_DEPTH: u8 = 2;

fn repair_depth(text: &str, depth: u8) -> Result<Value, ParseError> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Err(ParseError::Empty);
    }

    let value = match serde_json::from_str::<Value>(trimmed) {
        Ok(v) => v,
        Err(_) => {
            let unfenced = strip_fences(trimmed);
            let sliced = slice_outermost(unfenced).unwrap_or(unfenced);
            match serde_json::from_str::<Value>(sliced) {
                Ok(v) => v,
                Err(_) => {
                    let fixed = escape_control_chars(&convert_single_quotes(
                        &remove_trailing_commas(sliced),
                    ));
                    serde_json::from_str::<Value>(&fixed)
                        .map_err(|e| ParseError::Malformed(e.to_string()))?
                }
            }
        }
    };

    if depth >= MAX_UNWRAP_DEPTH {
        return Ok(value);
    }
    match unwrap_envelope(value) {
        Unwrapped::Text(inner) => repair_depth(&inner, depth + 1),
        Unwrapped::Value(v) => Ok(v),
    }
}

enum Unwrapped {
    Text(String),
    Value(Value),
}

/// Peel transport wrappers: a JSON string holding JSON, a `{"type":"text","text":..}`
/// block, or a list of such blocks.
fn unwrap_envelope(value: Value) -> Unwrapped {
    match envelope_text(&value) {
        Some(text) => Unwrapped::Text(text),
        None => Unwrapped::Value(value),
    }
}

fn envelope_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Object(map) if is_text_block(map) => {
            map.get("text").and_then(Value::as_str).map(str::to_string)
        }
        Value::Array(items)
            if !items.is_empty()
                && items
                    .iter()
                    .all(|i| i.as_object().is_some_and(is_text_block)) =>
        {
            Some(
                items
                    .iter()
                    .filter_map(|i| i.get("text").and_then(Value::as_str))
                    .collect::<Vec<_>>()
                    .join(""),
            )
        }
        _ => None,
    }
}

fn is_text_block(map: &serde_json::Map<String, Value>) -> bool {
    map.get("type").and_then(Value::as_str) == Some("text")
        && map.get("text").is_some_and(Value::is_string)
}

/// Content of the first markdown code fence, or the input unchanged.
fn strip_fences(text: &str) -> &str {
    let Some(open) = text.find("```") else {
        return text;
    };
    let after_open = &text[open + 3..];
    // Skip the info string ("json") up to the end of the fence line.
    let body_start = after_open.find('\n').map(|i| i + 1).unwrap_or(0);
    let body = &after_open[body_start..];
    match body.find("```") {
        Some(close) => body[..close].trim(),
        None => body.trim(),
    }
}

/// Slice from the first `{`/`[` to the last matching closer.
fn slice_outermost(text: &str) -> Option<&str> {
    let start = text.find(['{', '['])?;
    let closer = if text[start..].starts_with('{') { '}' } else { ']' };
    let end = text.rfind(closer)?;
    (end > start).then(|| &text[start..=end])
}

/// Drop commas directly followed (modulo whitespace) by `}` or `]`.
fn remove_trailing_commas(text: &str) -> String {
    let chars: Vec<char> = text.chars().collect();
    let mut out = String::with_capacity(text.len());
    let mut in_string = false;
    let mut escaped = false;

    for (i, &c) in chars.iter().enumerate() {
        if in_string {
            out.push(c);
            match c {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match c {
            '"' => {
                in_string = true;
                out.push(c);
            }
            ',' => {
                let next = chars[i + 1..].iter().find(|n| !n.is_whitespace());
                if !matches!(next, Some('}') | Some(']')) {
                    out.push(c);
                }
            }
            _ => out.push(c),
        }
    }
    out
}

/// Rewrite single-quoted strings as double-quoted ones.
fn convert_single_quotes(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut chars = text.chars().peekable();
    let mut in_double = false;

    while let Some(c) = chars.next() {
        if in_double {
            out.push(c);
            if c == '\\' {
                if let Some(n) = chars.next() {
                    out.push(n);
                }
            } else if c == '"' {
                in_double = false;
            }
            continue;
        }
        match c {
            '"' => {
                in_double = true;
                out.push(c);
            }
            '\'' => {
                out.push('"');
                while let Some(s) = chars.next() {
                    match s {
                        '\\' if chars.peek() == Some(&'\'') => {
                            out.push('\'');
                            chars.next();
                        }
                        '\\' => {
                            out.push('\\');
                            if let Some(n) = chars.next() {
                                out.push(n);
                            }
                        }
                        '"' => out.push_str("\\\""),
                        '\'' => break,
                        other => out.push(other),
                    }
                }
                out.push('"');
            }
            other => out.push(other),
        }
    }
    out
}

/// Escape raw control characters that appear inside string literals.
fn escape_control_chars(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut in_string = false;
    let mut escaped = false;

    for c in text.chars() {
        if !in_string {
            if c == '"' {
                in_string = true;
            }
            out.push(c);
            continue;
        }
        if escaped {
            escaped = false;
            out.push(c);
            continue;
        }
        match c {
            '\\' => {
                escaped = true;
                out.push(c);
            }
            '"' => {
                in_string = false;
                out.push(c);
            }
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c if (c as u32) < 0x20 => out.push_str(&format!("\\u{:04x}", c as u32)),
            c => out.push(c),
        }
    }
    out
}

fn type_name(v: &Value) -> &'static str {
    match v {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
