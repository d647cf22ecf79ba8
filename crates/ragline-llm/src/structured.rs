//! Helpers for pulling JSON values out of free-form model replies.

use serde::de::DeserializeOwned;

use crate::error::LlmError;
use crate::provider::{Message, Role};

const SCHEMA_PREAMBLE: &str = "Respond with a single JSON value only, no commentary. \
     The value must conform to this JSON schema:";

/// Copy `messages`, folding a schema instruction into the leading system message.
///
/// A system message is inserted at the front when the conversation has none.
#[must_use]
pub fn with_schema_instruction(messages: &[Message], schema: &str) -> Vec<Message> {
    let instruction = format!("{SCHEMA_PREAMBLE}\n{schema}");
    let mut out = messages.to_vec();
    match out.first_mut() {
        Some(first) if first.role == Role::System => {
            first.content.push_str("\n\n");
            first.content.push_str(&instruction);
        }
        _ => out.insert(0, Message::system(instruction)),
    }
    out
}

/// Locate the JSON payload inside a model reply.
///
/// Accepts a bare value, a ```` ```json ```` fenced block, or a value embedded in
/// prose (first opening bracket to the matching last closing bracket).
#[must_use]
pub fn extract_json(raw: &str) -> Option<&str> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }

    if let Some(start) = trimmed.find("```") {
        let after = &trimmed[start + 3..];
        let body_start = after.find('\n').map_or(0, |i| i + 1);
        let body = &after[body_start..];
        if let Some(end) = body.find("```") {
            let inner = body[..end].trim();
            if !inner.is_empty() {
                return Some(inner);
            }
        }
    }

    let open = trimmed.find(['{', '['])?;
    let close_char = if trimmed[open..].starts_with('{') {
        '}'
    } else {
        ']'
    };
    let close = trimmed.rfind(close_char)?;
    (close > open).then(|| &trimmed[open..=close])
}

/// Deserialize a `T` from a model reply.
///
/// # Errors
///
/// Returns `LlmError::StructuredParse` if the reply holds no JSON or the JSON does
/// not match `T`.
pub fn parse_json<T: DeserializeOwned>(raw: &str) -> Result<T, LlmError> {
    let payload = extract_json(raw)
        .ok_or_else(|| LlmError::StructuredParse("reply contains no JSON value".into()))?;
    serde_json::from_str(payload).map_err(|e| LlmError::StructuredParse(e.to_string()))
}
