//! Record decoding for the chat event stream.
//!
//! A record is one blank-line delimited block of `data:` lines. Its payload is
//! parsed into [`WirePayload`] and then classified by a fixed priority order,
//! so a payload carrying several recognised fields always maps to the same
//! event.

use serde_json::Value;

use super::logging::emit_malformed_record;
use crate::types::{StreamEvent, WirePayload};

pub const DONE_SENTINEL: &str = "[DONE]";
pub const UNKNOWN_TOOL_NAME: &str = "unknown";
pub const MISSING_TOOL_RESULT: &str = "no result";
pub const UNKNOWN_TOOL_ERROR: &str = "unknown error";

/// Decode one record. `None` means the record carries nothing to act on.
pub fn decode_record(record: &str) -> Option<StreamEvent> {
    if record.trim().is_empty() {
        return None;
    }

    let mut data_lines = Vec::new();
    for raw_line in record.split('\n') {
        let line = raw_line.trim_end_matches('\r');
        if let Some(rest) = line.strip_prefix("data:") {
            data_lines.push(rest.strip_prefix(' ').unwrap_or(rest));
        }
    }

    if data_lines.is_empty() {
        tracing::trace!(record, "skipping record without data");
        return None;
    }

    let data = data_lines.join("\n");
    let data = data.trim();
    if data == DONE_SENTINEL {
        return Some(StreamEvent::StreamEnd);
    }
    if data.is_empty() {
        return None;
    }

    let value: Value = match serde_json::from_str(data) {
        Ok(value) => value,
        Err(error) => {
            emit_malformed_record(data, &error);
            return Some(StreamEvent::Malformed {
                raw_text: data.to_string(),
            });
        }
    };

    if !value.is_object() {
        tracing::debug!(data, "ignoring non-object payload");
        return None;
    }

    match serde_json::from_value::<WirePayload>(value) {
        Ok(payload) => classify_payload(payload),
        Err(error) => {
            emit_malformed_record(data, &error);
            Some(StreamEvent::Malformed {
                raw_text: data.to_string(),
            })
        }
    }
}

/// Map a decoded payload to at most one event.
pub fn classify_payload(payload: WirePayload) -> Option<StreamEvent> {
    let tool_complete = payload.tool_execution_complete.unwrap_or(false);
    let tool_error = payload.tool_execution_error.unwrap_or(false);
    let error_message = payload.error.as_ref().and_then(error_text);

    if let Some(message) = &error_message {
        if !tool_complete && !tool_error {
            return Some(StreamEvent::ServerError {
                message: message.clone(),
            });
        }
    }

    if tool_complete {
        return Some(StreamEvent::ToolExecutionComplete {
            tool_name: payload
                .tool_name
                .filter(|name| !name.is_empty())
                .unwrap_or_else(|| UNKNOWN_TOOL_NAME.to_string()),
            arguments: payload
                .tool_arguments
                .filter(|arguments| !arguments.is_null())
                .unwrap_or_else(|| Value::Object(serde_json::Map::new())),
            result: payload
                .tool_result
                .filter(|result| !is_blank_result(result))
                .unwrap_or_else(|| Value::String(MISSING_TOOL_RESULT.to_string())),
        });
    }

    if tool_error {
        return Some(StreamEvent::ToolExecutionError {
            message: error_message.unwrap_or_else(|| UNKNOWN_TOOL_ERROR.to_string()),
        });
    }

    let delta = payload
        .choices
        .and_then(|choices| choices.into_iter().next())
        .and_then(|choice| choice.delta)?;

    match delta.content {
        Some(text) if !text.is_empty() => Some(StreamEvent::ContentDelta { text }),
        _ if delta.tool_calls.is_some() => Some(StreamEvent::ToolCallStarted),
        _ => None,
    }
}

fn error_text(error: &Value) -> Option<String> {
    match error {
        Value::Null => None,
        Value::Bool(false) => None,
        Value::String(text) if text.is_empty() => None,
        Value::String(text) => Some(text.clone()),
        Value::Object(fields) => Some(
            fields
                .get("message")
                .and_then(Value::as_str)
                .map(ToOwned::to_owned)
                .unwrap_or_else(|| error.to_string()),
        ),
        other => Some(other.to_string()),
    }
}

fn is_blank_result(result: &Value) -> bool {
    match result {
        Value::Null => true,
        Value::String(text) => text.is_empty(),
        _ => false,
    }
}
