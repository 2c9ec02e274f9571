//! Structured JSON Lines records.
//!
//! Each line is exactly `{"key": <non-empty string>, "value": <object>}`. The value
//! is checked on both ends: encoding refuses values that do not serialize to a JSON
//! object, decoding reconstructs the value through its `Deserialize` impl and reports
//! a [`StageError::SchemaMismatch`] if the stored fields do not fit.
//!
//! Use `#[serde(deny_unknown_fields)]` on the value type to also reject extra fields.

use crate::error::{Result, StageError};
use crate::io::Codec;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use std::path::Path;

#[derive(Serialize)]
struct RecordRef<'a> {
    key: &'a str,
    value: &'a Map<String, Value>,
}

/// Encode `(key, value)` as one newline-terminated JSON line.
pub(crate) fn encode_record<T: Serialize>(key: &str, value: &T) -> Result<Vec<u8>> {
    let fields = match serde_json::to_value(value) {
        Ok(Value::Object(fields)) => fields,
        Ok(other) => {
            return Err(StageError::UnsupportedValueType {
                codec: Codec::Jsonl,
                message: format!("expected a record with named fields, got {}", kind(&other)),
            });
        }
        Err(e) => {
            return Err(StageError::UnsupportedValueType {
                codec: Codec::Jsonl,
                message: e.to_string(),
            });
        }
    };
    let mut line = serde_json::to_vec(&RecordRef {
        key,
        value: &fields,
    })
    .map_err(|e| StageError::UnsupportedValueType {
        codec: Codec::Jsonl,
        message: e.to_string(),
    })?;
    line.push(b'\n');
    Ok(line)
}

/// Decode one JSON line (trailing newline allowed).
pub(crate) fn decode_record<T: DeserializeOwned>(
    frame: &[u8],
    path: &Path,
    record: usize,
) -> Result<(String, T)> {
    let malformed = |message: String| StageError::MalformedRecord {
        path: path.to_path_buf(),
        record,
        message,
    };

    let doc: Value =
        serde_json::from_slice(frame).map_err(|e| malformed(format!("invalid JSON: {e}")))?;
    let Value::Object(mut fields) = doc else {
        return Err(malformed(format!("expected an object, got {}", kind(&doc))));
    };
    if fields.len() != 2 {
        return Err(malformed(
            "expected exactly the fields `key` and `value`".to_string(),
        ));
    }
    let key = match fields.remove("key") {
        Some(Value::String(key)) if !key.is_empty() => key,
        Some(_) => return Err(malformed("`key` must be a non-empty string".to_string())),
        None => return Err(malformed("missing `key`".to_string())),
    };
    let Some(value) = fields.remove("value") else {
        return Err(malformed("missing `value`".to_string()));
    };
    if !value.is_object() {
        return Err(StageError::SchemaMismatch {
            path: path.to_path_buf(),
            record,
            message: format!("expected a record, got {}", kind(&value)),
        });
    }
    let value = serde_json::from_value(value).map_err(|e| StageError::SchemaMismatch {
        path: path.to_path_buf(),
        record,
        message: e.to_string(),
    })?;
    Ok((key, value))
}

const fn kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
