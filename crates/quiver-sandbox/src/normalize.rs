//! Result normalization.
//!
//! Tools report results in several shapes. Whatever the shape, the caller
//! receives one [`ExecutionResult`]:
//!
//! 1. An explicit error indicator (`ok: false`, a non-null `error`, or
//!    `isError: true`) makes the result a `tool_execution` failure, whatever
//!    else the payload carries.
//! 2. Structured data wins over text: `data`, then `structuredContent`, then
//!    the bare object.
//! 3. Textual payloads (`text`, `content`, anything that is not JSON) become
//!    `{"text": ...}`.
//! 4. A declared output schema is checked last.
//! 5. A nonzero exit after a well-formed result still fails the call.

use std::time::Duration;

use quiver_core::utils::truncation_marker;
use quiver_core::{ErrorKind, ExecutionError, ExecutionResult};
use quiver_package::schema::validate_instance;
use serde_json::{Map, Value, json};

/// `EX_TEMPFAIL` from `sysexits.h`: a temporary failure worth retrying.
pub const EXIT_TEMPFAIL: i32 = 75;

/// Keys that only carry the envelope, never payload.
const ENVELOPE_KEYS: &[&str] = &["ok", "retryable"];

/// Keys of a textual payload.
const TEXT_KEYS: &[&str] = &["text", "content"];

/// What the sandbox collected from a finished process.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawOutput {
    /// Payload of the first result frame, already redacted and capped.
    pub result: Option<String>,
    /// Bytes of the result frame cut by the result ceiling.
    pub result_dropped: usize,
    /// Process exit status, when it exited normally.
    pub exit_code: Option<i32>,
}

/// Turn raw process output into the canonical envelope.
#[must_use]
pub fn normalize(raw: &RawOutput, output_schema: Option<&Value>, duration: Duration) -> ExecutionResult {
    let tempfail = raw.exit_code == Some(EXIT_TEMPFAIL);

    let Some(payload) = &raw.result else {
        let status = raw
            .exit_code
            .map_or_else(|| "a signal".to_owned(), |code| format!("status {code}"));
        return ExecutionResult::failure(
            ExecutionError::new(
                ErrorKind::ToolExecution,
                format!("tool exited with {status} without producing a result"),
            )
            .with_retryable(tempfail),
            duration,
        );
    };

    let shaped = shape(payload, raw, output_schema, duration);
    match raw.exit_code {
        Some(code) if code != 0 && shaped.is_ok() => ExecutionResult::failure(
            ExecutionError::new(
                ErrorKind::ToolExecution,
                format!("tool exited with status {code} after producing a result"),
            )
            .with_retryable(tempfail),
            duration,
        ),
        _ => shaped,
    }
}

fn shape(payload: &str, raw: &RawOutput, output_schema: Option<&Value>, duration: Duration) -> ExecutionResult {
    if raw.result_dropped > 0 {
        let text = format!("{payload}{}", truncation_marker(raw.result_dropped));
        return finish(json!({ "text": text, "truncated": true }), output_schema, duration);
    }

    let parsed = match serde_json::from_str::<Value>(payload) {
        Ok(value) => value,
        Err(_) => return finish(json!({ "text": payload }), output_schema, duration),
    };

    match parsed {
        Value::Object(map) => {
            if let Some(error) = error_indicator(&map) {
                let retryable = raw.exit_code == Some(EXIT_TEMPFAIL) || declared_retryable(&map);
                return ExecutionResult::failure(error.with_retryable(retryable), duration);
            }
            finish(structured_or_text(map), output_schema, duration)
        },
        Value::String(text) => finish(json!({ "text": text }), output_schema, duration),
        other => finish(other, output_schema, duration),
    }
}

fn finish(data: Value, output_schema: Option<&Value>, duration: Duration) -> ExecutionResult {
    if let Some(schema) = output_schema
        && let Err(violations) = validate_instance(schema, &data)
    {
        return ExecutionResult::failure(
            ExecutionError::new(
                ErrorKind::SchemaViolation,
                format!("output does not match the declared schema: {violations}"),
            ),
            duration,
        );
    }
    ExecutionResult::success(data, duration)
}

fn error_indicator(map: &Map<String, Value>) -> Option<ExecutionError> {
    let flagged = map.get("ok") == Some(&Value::Bool(false))
        || map.get("isError") == Some(&Value::Bool(true));
    let error = map.get("error").filter(|e| !e.is_null());
    if !flagged && error.is_none() {
        return None;
    }
    let message = error
        .and_then(|e| match e {
            Value::String(s) => Some(s.clone()),
            Value::Object(o) => o.get("message").and_then(Value::as_str).map(str::to_owned),
            _ => None,
        })
        .or_else(|| text_of(map))
        .unwrap_or_else(|| "tool reported an error".to_owned());
    Some(ExecutionError::new(ErrorKind::ToolExecution, message))
}

fn declared_retryable(map: &Map<String, Value>) -> bool {
    let flag = |v: Option<&Value>| v.and_then(Value::as_bool).unwrap_or(false);
    flag(map.get("retryable")) || flag(map.get("error").and_then(|e| e.get("retryable")))
}

/// Text carried by `text` or MCP-style `content` blocks.
fn text_of(map: &Map<String, Value>) -> Option<String> {
    if let Some(text) = map.get("text").and_then(Value::as_str) {
        return Some(text.to_owned());
    }
    match map.get("content")? {
        Value::String(s) => Some(s.clone()),
        Value::Array(blocks) => {
            let parts: Vec<&str> = blocks
                .iter()
                .filter_map(|b| b.get("text").and_then(Value::as_str))
                .collect();
            (!parts.is_empty()).then(|| parts.join("\n"))
        },
        _ => None,
    }
}

fn structured_or_text(mut map: Map<String, Value>) -> Value {
    if let Some(data) = map.remove("data") {
        return data;
    }
    if let Some(structured) = map.remove("structuredContent") {
        return structured;
    }
    for key in ENVELOPE_KEYS {
        map.remove(*key);
    }
    let only_text = map.keys().all(|k| TEXT_KEYS.contains(&k.as_str()));
    if only_text && let Some(text) = text_of(&map) {
        return json!({ "text": text });
    }
    Value::Object(map)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw(result: &str) -> RawOutput {
        RawOutput {
            result: Some(result.to_owned()),
            result_dropped: 0,
            exit_code: Some(0),
        }
    }

    fn run(result: &str) -> ExecutionResult {
        normalize(&raw(result), None, Duration::from_millis(5))
    }

    #[test]
    fn test_error_indicators_win() {
        for payload in [
            r#"{"ok": false, "data": {"x": 1}, "error": "boom"}"#,
            r#"{"error": {"message": "boom"}, "data": {"x": 1}}"#,
            r#"{"isError": true, "content": [{"type": "text", "text": "boom"}]}"#,
        ] {
            let result = run(payload);
            assert_eq!(result.error_kind(), Some(ErrorKind::ToolExecution), "{payload}");
            assert_eq!(result.error().unwrap().message, "boom");
        }
    }

    #[test]
    fn test_null_error_is_not_an_error() {
        let result = run(r#"{"error": null, "data": {"x": 1}}"#);
        assert_eq!(result.data(), Some(&json!({"x": 1})));
    }

    #[test]
    fn test_structured_preferred_over_text() {
        assert_eq!(
            run(r#"{"data": {"pages": 3}, "text": "3 pages"}"#).data(),
            Some(&json!({"pages": 3}))
        );
        assert_eq!(
            run(r#"{"structuredContent": {"pages": 3}, "content": "3 pages"}"#).data(),
            Some(&json!({"pages": 3}))
        );
        assert_eq!(
            run(r#"{"ok": true, "pages": 3}"#).data(),
            Some(&json!({"pages": 3}))
        );
    }

    #[test]
    fn test_text_fallbacks() {
        assert_eq!(run(r#"{"text": "hello"}"#).data(), Some(&json!({"text": "hello"})));
        assert_eq!(
            run(r#"{"content": [{"type": "text", "text": "a"}, {"type": "text", "text": "b"}]}"#)
                .data(),
            Some(&json!({"text": "a\nb"}))
        );
        assert_eq!(run("plain words").data(), Some(&json!({"text": "plain words"})));
        assert_eq!(run(r#""quoted""#).data(), Some(&json!({"text": "quoted"})));
    }

    #[test]
    fn test_missing_result() {
        let result = normalize(
            &RawOutput {
                result: None,
                result_dropped: 0,
                exit_code: Some(2),
            },
            None,
            Duration::ZERO,
        );
        let err = result.error().unwrap();
        assert_eq!(err.kind, ErrorKind::ToolExecution);
        assert!(err.message.contains("status 2"));
        assert!(!err.retryable);
    }

    #[test]
    fn test_retryable_set_here() {
        let mut tempfail = raw(r#"{"ok": false, "error": "busy"}"#);
        tempfail.exit_code = Some(EXIT_TEMPFAIL);
        assert!(normalize(&tempfail, None, Duration::ZERO).error().unwrap().retryable);

        let declared = run(r#"{"ok": false, "error": "busy", "retryable": true}"#);
        assert!(declared.error().unwrap().retryable);

        let plain = run(r#"{"ok": false, "error": "bad input"}"#);
        assert!(!plain.error().unwrap().retryable);
    }

    #[test]
    fn test_nonzero_exit_after_result_fails() {
        let mut crashed = raw(r#"{"data": {"partial": true}}"#);
        crashed.exit_code = Some(3);
        let result = normalize(&crashed, None, Duration::ZERO);
        let err = result.error().unwrap();
        assert_eq!(err.kind, ErrorKind::ToolExecution);
        assert!(err.message.contains("status 3"));
        assert!(!err.retryable);

        crashed.exit_code = Some(EXIT_TEMPFAIL);
        assert!(normalize(&crashed, None, Duration::ZERO).error().unwrap().retryable);

        let mut reported = raw(r#"{"ok": false, "error": "disk full"}"#);
        reported.exit_code = Some(1);
        assert_eq!(
            normalize(&reported, None, Duration::ZERO).error().unwrap().message,
            "disk full"
        );
    }

    #[test]
    fn test_output_schema_enforced() {
        let schema = json!({
            "type": "object",
            "required": ["pages"],
            "properties": {"pages": {"type": "integer"}}
        });
        let good = normalize(&raw(r#"{"data": {"pages": 3}}"#), Some(&schema), Duration::ZERO);
        assert!(good.is_ok());
        let bad = normalize(&raw(r#"{"data": {"pages": "three"}}"#), Some(&schema), Duration::ZERO);
        assert_eq!(bad.error_kind(), Some(ErrorKind::SchemaViolation));
    }

    #[test]
    fn test_truncated_result_is_marked() {
        let result = normalize(
            &RawOutput {
                result: Some(r#"{"data": {"blob": "aaaa"#.to_owned()),
                result_dropped: 1200,
                exit_code: Some(0),
            },
            None,
            Duration::ZERO,
        );
        let data = result.data().unwrap();
        assert_eq!(data["truncated"], true);
        assert!(
            data["text"]
                .as_str()
                .unwrap()
                .ends_with("[... truncated 1200 bytes]")
        );
    }
}
