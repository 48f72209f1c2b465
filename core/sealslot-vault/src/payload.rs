//! User payload sanitation.
//!
//! The store persists exactly one plain JSON object. Arrays, null, and
//! scalars are rejected at the root; values that cannot be represented as
//! JSON at all fail during serialization and surface the same way.

use serde::Serialize;
use serde_json::{Map, Value};

use crate::error::{Error, Result};

/// Serializes a caller value and checks it is a plain object.
pub fn to_plain_object<T: Serialize + ?Sized>(payload: &T) -> Result<Map<String, Value>> {
    let value = serde_json::to_value(payload)
        .map_err(|e| Error::Validation(format!("payload is not JSON-representable: {e}")))?;
    require_object(value)
}

/// Checks an already-parsed value is a plain object.
pub fn require_object(value: Value) -> Result<Map<String, Value>> {
    match value {
        Value::Object(map) => Ok(map),
        Value::Array(_) => Err(Error::Validation("payload must be a plain object, not an array".into())),
        Value::Null => Err(Error::Validation("payload must be a plain object, not null".into())),
        other => Err(Error::Validation(format!(
            "payload must be a plain object, got {}",
            json_type_name(&other)
        ))),
    }
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
