use std::str::FromStr;

use secops_core::error::ParseEnumError;
use serde_json::{Map, Value};

use crate::error::ToolError;

pub(crate) fn required_string(args: &Map<String, Value>, key: &str) -> Result<String, ToolError> {
    let value = args
        .get(key)
        .ok_or_else(|| ToolError::invalid(key, format!("Missing required field '{key}'")))?;
    match value {
        Value::String(v) if !v.trim().is_empty() => Ok(v.trim().to_string()),
        Value::String(_) => Err(ToolError::invalid(key, format!("'{key}' must not be empty"))),
        _ => Err(ToolError::invalid(key, format!("'{key}' must be a string"))),
    }
}

pub(crate) fn arg_string(
    args: &Map<String, Value>,
    key: &str,
    default: &str,
) -> Result<String, ToolError> {
    match args.get(key) {
        None | Some(Value::Null) => Ok(default.to_string()),
        Some(Value::String(v)) => Ok(v.clone()),
        Some(_) => Err(ToolError::invalid(key, format!("'{key}' must be a string"))),
    }
}

pub(crate) fn arg_optional_string(
    args: &Map<String, Value>,
    key: &str,
) -> Result<Option<String>, ToolError> {
    match args.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(v)) if v.trim().is_empty() => Ok(None),
        Some(Value::String(v)) => Ok(Some(v.trim().to_string())),
        Some(_) => Err(ToolError::invalid(key, format!("'{key}' must be a string"))),
    }
}

pub(crate) fn arg_bool(
    args: &Map<String, Value>,
    key: &str,
    default: bool,
) -> Result<bool, ToolError> {
    match args.get(key) {
        None | Some(Value::Null) => Ok(default),
        Some(Value::Bool(v)) => Ok(*v),
        Some(_) => Err(ToolError::invalid(key, format!("'{key}' must be a boolean"))),
    }
}

pub(crate) fn arg_optional_bool(
    args: &Map<String, Value>,
    key: &str,
) -> Result<Option<bool>, ToolError> {
    match args.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Bool(v)) => Ok(Some(*v)),
        Some(_) => Err(ToolError::invalid(key, format!("'{key}' must be a boolean"))),
    }
}

pub(crate) fn arg_u64(args: &Map<String, Value>, key: &str, default: u64) -> Result<u64, ToolError> {
    Ok(arg_optional_u64(args, key)?.unwrap_or(default))
}

pub(crate) fn arg_optional_u64(
    args: &Map<String, Value>,
    key: &str,
) -> Result<Option<u64>, ToolError> {
    match args.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Number(n)) => n.as_u64().map(Some).ok_or_else(|| {
            ToolError::invalid(key, format!("'{key}' must be an unsigned integer"))
        }),
        Some(_) => Err(ToolError::invalid(
            key,
            format!("'{key}' must be an unsigned integer"),
        )),
    }
}

pub(crate) fn arg_optional_string_array(
    args: &Map<String, Value>,
    key: &str,
) -> Result<Option<Vec<String>>, ToolError> {
    let Some(value) = args.get(key) else {
        return Ok(None);
    };
    if value.is_null() {
        return Ok(None);
    }
    let items = value
        .as_array()
        .ok_or_else(|| ToolError::invalid(key, format!("'{key}' must be an array of strings")))?;
    let mut out = Vec::with_capacity(items.len());
    for item in items {
        let text = item
            .as_str()
            .ok_or_else(|| ToolError::invalid(key, format!("'{key}' items must be strings")))?;
        let normalized = text.trim();
        if !normalized.is_empty() {
            out.push(normalized.to_string());
        }
    }
    Ok(Some(out))
}

pub(crate) fn required_string_array(
    args: &Map<String, Value>,
    key: &str,
) -> Result<Vec<String>, ToolError> {
    match arg_optional_string_array(args, key)? {
        Some(items) if !items.is_empty() => Ok(items),
        Some(_) => Err(ToolError::invalid(
            key,
            format!("'{key}' must contain at least one non-empty string"),
        )),
        None => Err(ToolError::invalid(
            key,
            format!("Missing required field '{key}'"),
        )),
    }
}

pub(crate) fn required_object_array(
    args: &Map<String, Value>,
    key: &str,
) -> Result<Vec<Value>, ToolError> {
    match args.get(key) {
        Some(Value::Array(items)) => Ok(items.clone()),
        None | Some(Value::Null) => Err(ToolError::invalid(
            key,
            format!("Missing required field '{key}'"),
        )),
        Some(_) => Err(ToolError::invalid(key, format!("'{key}' must be an array"))),
    }
}

pub(crate) fn arg_optional_object(
    args: &Map<String, Value>,
    key: &str,
) -> Result<Option<Map<String, Value>>, ToolError> {
    match args.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Object(map)) => Ok(Some(map.clone())),
        Some(_) => Err(ToolError::invalid(key, format!("'{key}' must be an object"))),
    }
}

pub(crate) fn required_object(
    args: &Map<String, Value>,
    key: &str,
) -> Result<Map<String, Value>, ToolError> {
    match arg_optional_object(args, key)? {
        Some(map) if !map.is_empty() => Ok(map),
        Some(_) => Err(ToolError::invalid(key, format!("'{key}' must not be empty"))),
        None => Err(ToolError::invalid(
            key,
            format!("Missing required field '{key}'"),
        )),
    }
}

pub(crate) fn arg_optional_array(
    args: &Map<String, Value>,
    key: &str,
) -> Result<Option<Vec<Value>>, ToolError> {
    match args.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Array(items)) => Ok(Some(items.clone())),
        Some(_) => Err(ToolError::invalid(key, format!("'{key}' must be an array"))),
    }
}

/// Parses a string argument into one of the core enums.
pub(crate) fn parse_enum<T>(raw: &str, key: &str) -> Result<T, ToolError>
where
    T: FromStr<Err = ParseEnumError>,
{
    raw.parse::<T>()
        .map_err(|e| ToolError::invalid(key, e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use secops_core::exceptions::NamespaceType;
    use serde_json::json;

    fn map(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => Map::new(),
        }
    }

    #[test]
    fn required_string_rejects_missing_blank_and_non_string() {
        let args = map(json!({ "blank": "  ", "number": 3 }));
        for key in ["missing", "blank", "number"] {
            let err = required_string(&args, key).unwrap_err();
            assert!(matches!(err, ToolError::InvalidArguments { field: Some(ref f), .. } if f == key));
        }
    }

    #[test]
    fn string_arrays_drop_blank_entries() {
        let args = map(json!({ "tags": ["a", " ", "b "] }));
        assert_eq!(
            arg_optional_string_array(&args, "tags").unwrap(),
            Some(vec!["a".to_string(), "b".to_string()])
        );
        let args = map(json!({ "tags": [" "] }));
        assert!(required_string_array(&args, "tags").is_err());
    }

    #[test]
    fn null_is_treated_as_absent() {
        let args = map(json!({ "page": null, "enabled": null }));
        assert_eq!(arg_optional_u64(&args, "page").unwrap(), None);
        assert!(arg_bool(&args, "enabled", true).unwrap());
    }

    #[test]
    fn required_object_rejects_empty_and_non_objects() {
        let args = map(json!({ "empty": {}, "list": [1], "full": { "pid": 7 } }));
        assert!(required_object(&args, "empty").is_err());
        assert!(required_object(&args, "list").is_err());
        assert!(required_object(&args, "missing").is_err());
        assert_eq!(required_object(&args, "full").unwrap()["pid"], 7);
    }

    #[test]
    fn negative_numbers_are_rejected() {
        let args = map(json!({ "page": -1 }));
        assert!(arg_optional_u64(&args, "page").is_err());
    }

    #[test]
    fn enum_parse_errors_point_at_the_argument() {
        let err = parse_enum::<NamespaceType>("global", "namespace_type").unwrap_err();
        assert_eq!(err.to_value()["field"], "namespace_type");
    }
}
