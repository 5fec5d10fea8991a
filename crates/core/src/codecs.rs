//! JSON encoding helpers.

use crate::error::{CoreError, CoreErrorExt};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::fs;
use std::marker::PhantomData;
use std::path::Path;

/// Returns `true` for JSON objects and arrays.
#[must_use]
pub const fn is_json_container(value: &Value) -> bool {
    matches!(value, Value::Object(_) | Value::Array(_))
}

pub fn to_json_bytes<T: Serialize + ?Sized>(data: &T) -> Result<Vec<u8>, CoreError> {
    Ok(serde_json::to_vec(data)?)
}

pub fn to_json_string<T: Serialize + ?Sized>(data: &T) -> Result<String, CoreError> {
    Ok(serde_json::to_string(data)?)
}

/// Writes `data` as JSON into `path` and returns the number of bytes written.
pub fn to_json_file<T: Serialize + ?Sized>(
    data: &T,
    path: impl AsRef<Path>,
) -> Result<usize, CoreError> {
    let bytes = to_json_bytes(data)?;
    fs::write(path.as_ref(), &bytes).context(path.as_ref().display().to_string())?;
    Ok(bytes.len())
}

pub fn from_json<T: DeserializeOwned>(data: impl AsRef<[u8]>) -> Result<T, CoreError> {
    Ok(serde_json::from_slice(data.as_ref())?)
}

pub fn from_json_file<T: DeserializeOwned>(path: impl AsRef<Path>) -> Result<T, CoreError> {
    let bytes = fs::read(path.as_ref()).context(path.as_ref().display().to_string())?;
    from_json(bytes)
}

/// Decodes `data` when it holds a JSON object or array, otherwise hands back the text as is.
#[must_use]
pub fn safe_load_json(data: &str) -> Value {
    match serde_json::from_str::<Value>(data) {
        Ok(value) if is_json_container(&value) => value,
        _ => Value::String(data.to_owned()),
    }
}

/// A typed encoder/decoder pair.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec<T> {
    _marker: PhantomData<fn() -> T>,
}

impl<T: Serialize + DeserializeOwned> JsonCodec<T> {
    pub fn encode(&self, data: &T) -> Result<Vec<u8>, CoreError> {
        to_json_bytes(data)
    }

    pub fn decode(&self, data: impl AsRef<[u8]>) -> Result<T, CoreError> {
        from_json(data)
    }
}

#[must_use]
pub const fn json_codecs<T>() -> JsonCodec<T> {
    JsonCodec { _marker: PhantomData }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use serde_json::json;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Point {
        x: i32,
        y: i32,
    }

    #[test]
    fn test_safe_load_json_keeps_plain_text() {
        assert_eq!(safe_load_json(r#"{"a": 1}"#), json!({"a": 1}));
        assert_eq!(safe_load_json("[1, 2]"), json!([1, 2]));
        assert_eq!(safe_load_json("42"), json!("42"));
        assert_eq!(safe_load_json("not json"), json!("not json"));
    }

    #[test]
    fn test_json_file_helpers() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("point.json");

        let written = to_json_file(&Point { x: 1, y: -2 }, &path).unwrap();
        assert_eq!(written, r#"{"x":1,"y":-2}"#.len());
        assert_eq!(from_json_file::<Point>(&path).unwrap(), Point { x: 1, y: -2 });
    }

    #[test]
    fn test_typed_codec() {
        let codec = json_codecs::<Point>();
        let bytes = codec.encode(&Point { x: 3, y: 4 }).unwrap();
        assert_eq!(codec.decode(&bytes).unwrap(), Point { x: 3, y: 4 });
        assert!(codec.decode(b"{\"x\": 1}").is_err());
    }
}
