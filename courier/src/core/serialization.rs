use super::error::{CoreError, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Value};

/// Serializes a value to a JSON object map.
///
/// Non-object values are wrapped under a `value` key so the result can always
/// be merged into a task payload.
///
/// # Errors
/// Returns `CoreError::Serialization` if the value cannot be serialized.
pub fn to_object<T: Serialize>(value: &T) -> Result<Map<String, Value>> {
    match serde_json::to_value(value).map_err(CoreError::Serialization)? {
        Value::Object(map) => Ok(map),
        other => {
            let mut map = Map::new();
            map.insert("value".to_string(), other);
            Ok(map)
        }
    }
}

/// Serializes a value to JSON text for storage.
///
/// # Errors
/// Returns `CoreError::Serialization` if the value cannot be serialized.
pub fn serialize_value<T: Serialize>(value: &T) -> Result<String> {
    serde_json::to_string(value).map_err(CoreError::Serialization)
}

/// Deserializes JSON text read from storage.
///
/// # Errors
/// Returns `CoreError::Deserialization` if the text cannot be deserialized.
pub fn deserialize_value<T: DeserializeOwned>(text: &str) -> Result<T> {
    serde_json::from_str(text).map_err(CoreError::Deserialization)
}

/// Reads an integer field from a JSON object.
pub fn int_field(map: &Map<String, Value>, name: &str) -> Result<i64> {
    map.get(name)
        .and_then(Value::as_i64)
        .ok_or_else(|| CoreError::MissingField(name.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_to_object_wraps_scalars() {
        let map = to_object(&"msg-1").unwrap();
        assert_eq!(map.get("value"), Some(&json!("msg-1")));

        let map = to_object(&json!({"provider_message_id": "abc"})).unwrap();
        assert_eq!(map.get("provider_message_id"), Some(&json!("abc")));
    }

    #[test]
    fn test_int_field() {
        let map = to_object(&json!({"send_attempt_id": 42, "name": "x"})).unwrap();
        assert_eq!(int_field(&map, "send_attempt_id").unwrap(), 42);
        assert!(matches!(
            int_field(&map, "name"),
            Err(CoreError::MissingField(field)) if field == "name"
        ));
    }
}
