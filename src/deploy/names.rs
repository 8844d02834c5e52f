//! Stable names for actions and schemas.
//!
//! The backend resolves cross references by name, so a given declaration
//! must always produce the same name. Inline schemas without a `$ref` or
//! `title` fall back to a content hash.

use std::collections::BTreeSet;
use std::path::Path;
use std::sync::LazyLock;

use regex::Regex;
use serde_yaml::Value;
use sha2::{Digest, Sha256};

use crate::error::InputError;

use super::yaml;

#[allow(clippy::unwrap_used)]
static SHORT_NAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9_-]{3,255}$").unwrap());

#[allow(clippy::unwrap_used)]
static TYPE_NAME: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^[A-Za-z0-9_\\]+$").unwrap());

#[allow(clippy::unwrap_used)]
static UNSAFE_CHARS: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[^A-Za-z0-9_-]").unwrap());

/// Canonical reference prefix for schemas.
pub const SCHEMA_SCHEME: &str = "schema://";

/// Canonical reference prefix for actions.
pub const ACTION_SCHEME: &str = "action://";

/// Schema used when an operation declares no body schema.
pub const PASSTHRU: &str = "Passthru";

/// Builds canonical `scheme://name` references.
pub struct SchemeBuilder;

impl SchemeBuilder {
    /// `schema://name`
    #[must_use]
    pub fn for_schema(name: &str) -> String {
        format!("{SCHEMA_SCHEME}{name}")
    }

    /// `action://name`
    #[must_use]
    pub fn for_action(name: &str) -> String {
        format!("{ACTION_SCHEME}{name}")
    }
}

/// Fully qualified type names the backend can load (e.g. built-in schema
/// classes).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TypeRegistry {
    types: BTreeSet<String>,
}

impl TypeRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a registry from a list of type names.
    #[must_use]
    pub fn with_types<I, S>(types: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            types: types.into_iter().map(Into::into).collect(),
        }
    }

    /// Registers a type name.
    pub fn register(&mut self, name: impl Into<String>) {
        self.types.insert(name.into());
    }

    /// Returns true if the type is known.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.types.contains(name)
    }
}

/// Replaces every character outside `[A-Za-z0-9_-]` with `_`.
#[must_use]
pub fn sanitize(name: &str) -> String {
    UNSAFE_CHARS.replace_all(name, "_").into_owned()
}

/// Derives an action name from an action reference.
///
/// A reference naming an existing file is reduced to its path below `src`.
///
/// # Errors
///
/// Returns an error if the source is not a string.
pub fn action_name_from_source(source: &Value) -> Result<String, InputError> {
    let Value::String(source) = source else {
        return Err(InputError::InvalidActionSource);
    };

    let source = source
        .find("://")
        .map_or(source.as_str(), |pos| &source[pos + 3..]);

    let path = Path::new(source);
    if path.is_file() {
        if let Ok(canonical) = path.canonicalize() {
            let canonical = canonical.to_string_lossy().replace('\\', "/");
            let suffix = src_suffix(&canonical).unwrap_or(canonical.as_str());
            return Ok(sanitize(suffix));
        }
    }

    Ok(sanitize(source))
}

/// Part of `path` after its first `src` directory segment, leading slash kept.
fn src_suffix(path: &str) -> Option<&str> {
    path.match_indices("/src").find_map(|(pos, _)| {
        let rest = &path[pos + 4..];
        (rest.is_empty() || rest.starts_with('/')).then_some(rest)
    })
}

/// Derives a schema name from a schema reference or inline schema.
///
/// # Errors
///
/// Returns an error for tags other than `!include`, unknown type names,
/// invalid inline JSON or unsupported value shapes.
pub fn schema_name_from_source(source: &Value, types: &TypeRegistry) -> Result<String, InputError> {
    if let Some(path) = yaml::include_payload(source)? {
        return Ok(name_from_include_path(path));
    }

    match source {
        Value::String(s) => {
            if SHORT_NAME.is_match(s) {
                Ok(s.clone())
            } else if let Some(name) = s.strip_prefix(SCHEMA_SCHEME) {
                Ok(name.to_string())
            } else {
                name_from_schema(s, types)
            }
        }
        Value::Sequence(_) | Value::Mapping(_) => {
            let json = yaml::to_json(source)?;
            name_from_schema(&json.to_string(), types)
        }
        _ => Err(InputError::schema_source(
            "Schema should be a string containing an \"!include\" directive pointing to a JsonSchema file",
        )),
    }
}

/// `resources/schema/todo/entry.json` becomes `Todo-Entry`.
fn name_from_include_path(path: &str) -> String {
    let path = path
        .trim()
        .replace('\\', "/")
        .replace("resources/schema/", "")
        .replace(".json", "")
        .replace('/', " ");

    let mut name = String::with_capacity(path.len());
    let mut word_start = true;
    for c in path.chars() {
        if word_start {
            name.extend(c.to_uppercase());
        } else {
            name.push(c);
        }
        word_start = c.is_whitespace();
    }

    name.replace(' ', "-")
}

fn name_from_schema(schema: &str, types: &TypeRegistry) -> Result<String, InputError> {
    if TYPE_NAME.is_match(schema) {
        return if types.contains(schema) {
            Ok(sanitize(schema))
        } else {
            Err(InputError::UnknownType {
                name: schema.to_string(),
            })
        };
    }

    let data: serde_json::Value = serde_json::from_str(schema)
        .map_err(|_| InputError::schema_source("Schema must be a valid json schema"))?;
    let serde_json::Value::Object(object) = data else {
        return Err(InputError::schema_source("Schema must be a valid json schema"));
    };

    for key in ["$ref", "title"] {
        if let Some(serde_json::Value::String(name)) = object.get(key) {
            return Ok(sanitize(name));
        }
    }

    let digest = hex::encode(Sha256::digest(schema.as_bytes()));
    Ok(format!("Schema-{}", &digest[..8]))
}
