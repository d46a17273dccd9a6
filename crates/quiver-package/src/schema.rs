//! JSON Schema compilation and instance validation.

use jsonschema::{Draft, Validator};
use serde_json::Value;

/// Maximum number of violations reported for one instance.
const MAX_REPORTED_ERRORS: usize = 8;

/// Compile a schema under draft 2020-12.
///
/// # Errors
///
/// Returns the compiler's message when the schema is invalid.
pub fn compile_schema(schema: &Value) -> Result<Validator, String> {
    jsonschema::options()
        .with_draft(Draft::Draft202012)
        .build(schema)
        .map_err(|err| format!("invalid schema: {err}"))
}

/// Whether a schema describes objects.
///
/// Accepts `type: object`, a type list containing `object`, or an untyped
/// schema that declares `properties`.
#[must_use]
pub fn is_object_schema(schema: &Value) -> bool {
    if let Some(kind) = schema.get("type").and_then(Value::as_str) {
        return kind == "object";
    }
    if let Some(kinds) = schema.get("type").and_then(Value::as_array) {
        return kinds.iter().any(|kind| kind.as_str() == Some("object"));
    }
    schema.get("properties").is_some()
}

/// Validate `instance` against `schema`, compiling it first.
///
/// # Errors
///
/// Returns a joined description of the violations (at most a handful), or
/// the compile error if the schema itself is invalid.
pub fn validate_instance(schema: &Value, instance: &Value) -> Result<(), String> {
    let validator = compile_schema(schema)?;
    let messages: Vec<String> = validator
        .iter_errors(instance)
        .take(MAX_REPORTED_ERRORS)
        .map(|err| err.to_string())
        .collect();
    if messages.is_empty() {
        Ok(())
    } else {
        Err(messages.join("; "))
    }
}
