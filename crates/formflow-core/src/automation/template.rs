//! Payload template rendering.
//!
//! A template is a JSON value whose string leaves may reference trigger data
//! with `{{ trigger.<dotted.path> }}`. Only `trigger.` references are
//! recognised; anything else is left in place verbatim.
//!
//! - A string that is exactly one placeholder is replaced by the referenced
//!   JSON value, keeping its type (`"{{ trigger.count }}"` -> `3`).
//! - Placeholders embedded in longer strings are replaced by the value's
//!   string form (strings unquoted, everything else as compact JSON).
//! - References that do not resolve stay as written.

use serde_json::Value;

use formflow_types::webhook::{PayloadTemplate, PayloadType};

const OPEN: &str = "{{";
const CLOSE: &str = "}}";
const MAX_DEPTH: usize = 64;

#[derive(Debug, thiserror::Error)]
pub enum TemplateError {
    #[error("payload template nested deeper than {MAX_DEPTH} levels")]
    TooDeep,

    #[error("failed to encode payload: {0}")]
    Encode(String),
}

/// Render `template` against `trigger_data`.
pub fn render(template: &PayloadTemplate, trigger_data: &Value) -> Result<Value, TemplateError> {
    render_value(template.as_value(), trigger_data, 0)
}

/// Turn a rendered payload into the request body for the given payload type.
///
/// `json` serialises the value; `text` sends strings verbatim and falls back
/// to JSON for anything else.
pub fn encode_body(payload: &Value, payload_type: PayloadType) -> Result<String, TemplateError> {
    match (payload_type, payload) {
        (PayloadType::Text, Value::String(s)) => Ok(s.clone()),
        _ => serde_json::to_string(payload).map_err(|e| TemplateError::Encode(e.to_string())),
    }
}

fn render_value(value: &Value, data: &Value, depth: usize) -> Result<Value, TemplateError> {
    if depth > MAX_DEPTH {
        return Err(TemplateError::TooDeep);
    }
    Ok(match value {
        Value::String(s) => render_string(s, data),
        Value::Array(items) => Value::Array(
            items
                .iter()
                .map(|v| render_value(v, data, depth + 1))
                .collect::<Result<_, _>>()?,
        ),
        Value::Object(map) => {
            let mut out = serde_json::Map::with_capacity(map.len());
            for (k, v) in map {
                out.insert(k.clone(), render_value(v, data, depth + 1)?);
            }
            Value::Object(out)
        }
        other => other.clone(),
    })
}

fn render_string(s: &str, data: &Value) -> Value {
    // Whole-string placeholder keeps the JSON type.
    let trimmed = s.trim();
    if let Some(inner) = trimmed
        .strip_prefix(OPEN)
        .and_then(|rest| rest.strip_suffix(CLOSE))
    {
        if !inner.contains(OPEN) && !inner.contains(CLOSE) {
            if let Some(found) = lookup(inner.trim(), data) {
                return found.clone();
            }
            return Value::String(s.to_string());
        }
    }

    let mut out = String::with_capacity(s.len());
    let mut rest = s;
    while let Some(start) = rest.find(OPEN) {
        out.push_str(&rest[..start]);
        let after_open = &rest[start + OPEN.len()..];
        let Some(end) = after_open.find(CLOSE) else {
            out.push_str(&rest[start..]);
            return Value::String(out);
        };
        let reference = after_open[..end].trim();
        match lookup(reference, data) {
            Some(found) => out.push_str(&stringify(found)),
            None => out.push_str(&rest[start..start + OPEN.len() + end + CLOSE.len()]),
        }
        rest = &after_open[end + CLOSE.len()..];
    }
    out.push_str(rest);
    Value::String(out)
}

/// Resolve `trigger.a.b.0` against the trigger data.
fn lookup<'a>(reference: &str, data: &'a Value) -> Option<&'a Value> {
    let path = reference.strip_prefix("trigger")?;
    if path.is_empty() {
        return Some(data);
    }
    let path = path.strip_prefix('.')?;
    let mut current = data;
    for segment in path.split('.') {
        if segment.is_empty() {
            return None;
        }
        current = match current {
            Value::Object(map) => map.get(segment)?,
            Value::Array(items) => items.get(segment.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }
    Some(current)
}

fn stringify(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}
