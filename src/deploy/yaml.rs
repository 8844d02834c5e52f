//! Helpers over `serde_yaml` values: tagged includes, JSON pointers and
//! conversion into JSON.

use std::path::Path;

use serde_yaml::value::TaggedValue;
use serde_yaml::Value;

use crate::error::InputError;

/// Tag recognized as an include directive (`!include`).
pub const INCLUDE_TAG: &str = "include";

/// Parses YAML text, keeping custom tags.
///
/// # Errors
///
/// Returns an error if the text is not valid YAML.
pub fn parse(text: &str, source: Option<&Path>) -> Result<Value, InputError> {
    serde_yaml::from_str(text).map_err(|e| {
        InputError::parse(
            format!("YAML parse error: {e}"),
            source.map(|p| p.display().to_string()),
        )
    })
}

/// Returns the payload of an `!include` tag, rejecting other tags.
///
/// Returns `Ok(None)` when the value is not tagged at all.
///
/// # Errors
///
/// Returns an error for a tag other than `!include` or a non-string payload.
pub fn include_payload(value: &Value) -> Result<Option<&str>, InputError> {
    let Value::Tagged(tagged) = value else {
        return Ok(None);
    };

    let TaggedValue { tag, value } = tagged.as_ref();
    if *tag != INCLUDE_TAG {
        return Err(InputError::InvalidTag {
            tag: tag.to_string(),
        });
    }

    value
        .as_str()
        .map(Some)
        .ok_or_else(|| InputError::InvalidTag {
            tag: format!("{tag} (payload must be a path)"),
        })
}

/// Splits an include payload into its path and optional pointer fragment.
#[must_use]
pub fn split_fragment(payload: &str) -> (&str, Option<&str>) {
    match payload.split_once('#') {
        Some((path, fragment)) if !fragment.is_empty() => (path, Some(fragment)),
        Some((path, _)) => (path, None),
        None => (payload, None),
    }
}

/// Evaluates a JSON pointer (`/a/b/0`) against a YAML value.
#[must_use]
pub fn pointer<'a>(value: &'a Value, pointer: &str) -> Option<&'a Value> {
    if pointer.is_empty() {
        return Some(value);
    }

    let tokens = pointer.strip_prefix('/')?;
    tokens.split('/').try_fold(value, |current, raw| {
        let token = raw.replace("~1", "/").replace("~0", "~");
        match current {
            Value::Mapping(mapping) => mapping.get(token.as_str()).or_else(|| {
                token
                    .parse::<i64>()
                    .ok()
                    .and_then(|number| mapping.get(Value::from(number)))
            }),
            Value::Sequence(items) => token.parse::<usize>().ok().and_then(|i| items.get(i)),
            _ => None,
        }
    })
}

/// Converts a fully resolved YAML value into JSON.
///
/// Scalar mapping keys become strings.
///
/// # Errors
///
/// Returns an error if a tag is left in the value, a key is not a scalar,
/// or a float is not finite.
pub fn to_json(value: &Value) -> Result<serde_json::Value, InputError> {
    Ok(match value {
        Value::Null => serde_json::Value::Null,
        Value::Bool(b) => serde_json::Value::Bool(*b),
        Value::Number(n) => number_to_json(n)?,
        Value::String(s) => serde_json::Value::String(s.clone()),
        Value::Sequence(items) => serde_json::Value::Array(
            items.iter().map(to_json).collect::<Result<Vec<_>, _>>()?,
        ),
        Value::Mapping(mapping) => {
            let mut object = serde_json::Map::new();
            for (key, entry) in mapping {
                object.insert(key_to_string(key)?, to_json(entry)?);
            }
            serde_json::Value::Object(object)
        }
        Value::Tagged(tagged) => {
            return Err(InputError::InvalidTag {
                tag: tagged.tag.to_string(),
            });
        }
    })
}

/// Converts a JSON value back into YAML.
///
/// # Errors
///
/// Returns an error if the value cannot be represented.
pub fn from_json(value: &serde_json::Value) -> Result<Value, InputError> {
    serde_yaml::to_value(value).map_err(|e| InputError::parse(e.to_string(), None))
}

/// Renders a mapping key as a string.
///
/// # Errors
///
/// Returns an error if the key is not a scalar.
pub fn key_to_string(key: &Value) -> Result<String, InputError> {
    match key {
        Value::String(s) => Ok(s.clone()),
        Value::Number(n) => Ok(n.to_string()),
        Value::Bool(b) => Ok(b.to_string()),
        Value::Null => Ok(String::from("null")),
        Value::Sequence(_) | Value::Mapping(_) | Value::Tagged(_) => Err(InputError::parse(
            "mapping keys must be scalars",
            None,
        )),
    }
}

fn number_to_json(number: &serde_yaml::Number) -> Result<serde_json::Value, InputError> {
    if let Some(i) = number.as_i64() {
        return Ok(serde_json::Value::from(i));
    }
    if let Some(u) = number.as_u64() {
        return Ok(serde_json::Value::from(u));
    }

    number
        .as_f64()
        .and_then(serde_json::Number::from_f64)
        .map(serde_json::Value::Number)
        .ok_or_else(|| InputError::parse(format!("number {number} is not representable"), None))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_include_payload() {
        let value = parse("!include resources/schema/todo.json", None).expect("should parse");
        assert_eq!(
            include_payload(&value).expect("include tag"),
            Some("resources/schema/todo.json")
        );

        let plain = parse("foo", None).expect("should parse");
        assert_eq!(include_payload(&plain).expect("untagged"), None);

        let other = parse("!php/const FOO", None).expect("should parse");
        assert!(matches!(include_payload(&other), Err(InputError::InvalidTag { .. })));
    }

    #[test]
    fn test_split_fragment() {
        assert_eq!(split_fragment("a.yaml#/foo"), ("a.yaml", Some("/foo")));
        assert_eq!(split_fragment("a.yaml#"), ("a.yaml", None));
        assert_eq!(split_fragment("a.yaml"), ("a.yaml", None));
    }

    #[test]
    fn test_pointer() {
        let value = parse("a:\n  b/c: [x, y]\n  d~e: 1\n", None).expect("should parse");

        assert_eq!(pointer(&value, ""), Some(&value));
        assert_eq!(
            pointer(&value, "/a/b~1c/1").and_then(Value::as_str),
            Some("y")
        );
        assert_eq!(pointer(&value, "/a/d~0e").and_then(Value::as_i64), Some(1));
        assert!(pointer(&value, "/a/missing").is_none());
        assert!(pointer(&value, "a").is_none());
    }

    #[test]
    fn test_to_json_stringifies_keys() {
        let value = parse("throws:\n  500: Error\n  true: yes\n", None).expect("should parse");
        let json = to_json(&value).expect("should convert");

        assert_eq!(json, json!({"throws": {"500": "Error", "true": "yes"}}));
    }

    #[test]
    fn test_to_json_rejects_leftover_tags() {
        let value = parse("a: !include foo.yaml", None).expect("should parse");
        assert!(matches!(to_json(&value), Err(InputError::InvalidTag { .. })));
    }
}
