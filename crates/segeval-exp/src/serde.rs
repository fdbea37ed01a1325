use segeval_core::errors::{ErrorInfo, EvalError};
use serde::de::DeserializeOwned;
use serde::Serialize;

/// Serialises a payload to JSON with object keys in sorted order.
///
/// Routing through `serde_json::Value` sorts map keys, so two payloads that are
/// equal produce identical bytes regardless of field insertion order.
pub fn to_canonical_json_bytes<T: Serialize>(value: &T) -> Result<Vec<u8>, EvalError> {
    let value = serde_json::to_value(value)
        .map_err(|err| EvalError::Serde(ErrorInfo::new("json-encode", err.to_string())))?;
    serde_json::to_vec_pretty(&value)
        .map_err(|err| EvalError::Serde(ErrorInfo::new("json-encode", err.to_string())))
}

/// Restores a payload previously written with [`to_canonical_json_bytes`].
pub fn from_json_slice<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, EvalError> {
    serde_json::from_slice(bytes)
        .map_err(|err| EvalError::Serde(ErrorInfo::new("json-decode", err.to_string())))
}
