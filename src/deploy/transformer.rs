//! Per-kind normalization of deploy declarations.
//!
//! Every kind has one transform function in [`TRANSFORMERS`]. A transform
//! receives the entity name and its raw declaration and returns the JSON
//! body appended to the import document. Transforms only touch the
//! filesystem, never the network.

use std::collections::{BTreeSet, VecDeque};
use std::path::Path;

use serde_json::{json, Map, Value as JsonValue};
use serde_yaml::{Mapping, Value};
use tracing::debug;

use crate::error::InputError;
use crate::kind::Kind;
use crate::model::ImportDocument;

use super::include::IncludeResolver;
use super::names::{self, SchemeBuilder, TypeRegistry, PASSTHRU};
use super::yaml;

/// Shared inputs of all transforms.
#[derive(Debug, Clone, Copy)]
pub struct TransformContext<'a> {
    /// Include resolver.
    pub resolver: IncludeResolver<'a>,
    /// Types usable as class-like schema references.
    pub types: &'a TypeRegistry,
    /// Directory includes are resolved against.
    pub base_path: &'a Path,
}

/// Normalizes one declaration of a kind into its JSON body.
pub type TransformFn =
    fn(&TransformContext<'_>, Kind, &str, &Value) -> Result<JsonValue, InputError>;

/// Transform functions in import order.
pub const TRANSFORMERS: [(Kind, TransformFn); 11] = [
    (Kind::Action, transform_action),
    (Kind::Config, transform_config),
    (Kind::Connection, transform_passthrough),
    (Kind::Cronjob, transform_cronjob),
    (Kind::Event, transform_event),
    (Kind::Plan, transform_passthrough),
    (Kind::Rate, transform_passthrough),
    (Kind::Role, transform_passthrough),
    (Kind::Schema, transform_schema),
    (Kind::Scope, transform_passthrough),
    (Kind::Operation, transform_operation),
];

/// Transforms the section of one kind and appends the results.
///
/// # Errors
///
/// Returns an error if the section is not a mapping or any declaration in it
/// cannot be transformed.
pub fn transform_section(
    context: &TransformContext<'_>,
    kind: Kind,
    transform: TransformFn,
    section: &Value,
    document: &mut ImportDocument,
) -> Result<(), InputError> {
    let entries = match section {
        Value::Null => return Ok(()),
        Value::Sequence(items) if items.is_empty() => return Ok(()),
        Value::Mapping(entries) => entries,
        _ => {
            return Err(InputError::InvalidDeclaration {
                kind: kind.to_string(),
            });
        }
    };

    for (key, body) in entries {
        let name = yaml::key_to_string(key)?;
        debug!("Transforming {kind} {name}");
        let normalized = transform(context, kind, &name, body)?;
        document.push(kind, normalized)?;
    }

    Ok(())
}

/// Resolves a declaration, checks it is a mapping and sets its name.
fn prepare(
    context: &TransformContext<'_>,
    kind: Kind,
    name: &str,
    body: &Value,
) -> Result<Mapping, InputError> {
    let resolved = context.resolver.resolve(body, context.base_path, kind)?;
    let Value::Mapping(mut mapping) = resolved else {
        return Err(InputError::InvalidEntity {
            kind: kind.to_string(),
            name: name.to_string(),
            message: String::from("declaration must be a mapping"),
        });
    };

    mapping.insert(Value::from("name"), Value::from(name));
    Ok(mapping)
}

fn schema_reference(context: &TransformContext<'_>, source: &Value) -> Result<Value, InputError> {
    let name = names::schema_name_from_source(source, context.types)?;
    Ok(Value::String(SchemeBuilder::for_schema(&name)))
}

fn action_reference(source: &Value) -> Result<Value, InputError> {
    let name = names::action_name_from_source(source)?;
    Ok(Value::String(SchemeBuilder::for_action(&name)))
}

/// Returns a field unless it is missing or null.
fn present<'m>(mapping: &'m Mapping, key: &str) -> Option<&'m Value> {
    mapping.get(key).filter(|value| !value.is_null())
}

fn transform_passthrough(
    context: &TransformContext<'_>,
    kind: Kind,
    name: &str,
    body: &Value,
) -> Result<JsonValue, InputError> {
    yaml::to_json(&Value::Mapping(prepare(context, kind, name, body)?))
}

fn transform_config(
    _context: &TransformContext<'_>,
    _kind: Kind,
    name: &str,
    body: &Value,
) -> Result<JsonValue, InputError> {
    Ok(json!({
        "name": name,
        "value": yaml::to_json(body)?,
    }))
}

fn transform_action(
    context: &TransformContext<'_>,
    kind: Kind,
    name: &str,
    body: &Value,
) -> Result<JsonValue, InputError> {
    let mut action = prepare(context, kind, name, body)?;

    if let Some(Value::Mapping(config)) = action.get_mut("config") {
        for (_, value) in config.iter_mut() {
            if let Some(file) = yaml::include_payload(value)? {
                let path = context.base_path.join(file);
                if !path.is_file() {
                    return Err(InputError::FileNotFound { path });
                }
                let contents = std::fs::read_to_string(&path).map_err(|e| {
                    InputError::parse(format!("Failed to read file: {e}"), Some(path.display().to_string()))
                })?;
                *value = Value::String(contents);
            }
        }
    }

    yaml::to_json(&Value::Mapping(action))
}

fn transform_operation(
    context: &TransformContext<'_>,
    kind: Kind,
    name: &str,
    body: &Value,
) -> Result<JsonValue, InputError> {
    let mut operation = prepare(context, kind, name, body)?;

    let method = operation
        .get("httpMethod")
        .and_then(Value::as_str)
        .map(str::to_uppercase);
    let passthru = Value::String(SchemeBuilder::for_schema(PASSTHRU));

    if let Some(source) = present(&operation, "incoming") {
        let incoming = schema_reference(context, source)?;
        operation.insert(Value::from("incoming"), incoming);
    } else if !matches!(method.as_deref(), Some("GET" | "DELETE")) {
        operation.insert(Value::from("incoming"), passthru.clone());
    }

    if let Some(source) = present(&operation, "outgoing") {
        let outgoing = schema_reference(context, source)?;
        operation.insert(Value::from("outgoing"), outgoing);
    } else {
        operation.insert(Value::from("outgoing"), passthru);
    }

    if let Some(Value::Mapping(throws)) = operation.get("throws") {
        let mut normalized = Mapping::new();
        for (code, schema) in throws {
            normalized.insert(code.clone(), schema_reference(context, schema)?);
        }
        operation.insert(Value::from("throws"), Value::Mapping(normalized));
    }

    if let Some(source) = present(&operation, "action") {
        let action = action_reference(source)?;
        operation.insert(Value::from("action"), action);
    }

    yaml::to_json(&Value::Mapping(operation))
}

fn transform_cronjob(
    context: &TransformContext<'_>,
    kind: Kind,
    name: &str,
    body: &Value,
) -> Result<JsonValue, InputError> {
    let mut cronjob = prepare(context, kind, name, body)?;

    if let Some(source) = present(&cronjob, "action") {
        let action = action_reference(source)?;
        cronjob.insert(Value::from("action"), action);
    }

    yaml::to_json(&Value::Mapping(cronjob))
}

fn transform_event(
    context: &TransformContext<'_>,
    kind: Kind,
    name: &str,
    body: &Value,
) -> Result<JsonValue, InputError> {
    let mut event = prepare(context, kind, name, body)?;

    if let Some(source) = present(&event, "schema") {
        let schema = schema_reference(context, source)?;
        event.insert(Value::from("schema"), schema);
    }

    yaml::to_json(&Value::Mapping(event))
}

fn transform_schema(
    context: &TransformContext<'_>,
    _kind: Kind,
    name: &str,
    body: &Value,
) -> Result<JsonValue, InputError> {
    Ok(json!({
        "name": name,
        "source": schema_source(context, body)?,
    }))
}

fn schema_source(context: &TransformContext<'_>, body: &Value) -> Result<JsonValue, InputError> {
    if let Some(payload) = yaml::include_payload(body)? {
        let (file, fragment) = yaml::split_fragment(payload);
        let path = context.base_path.join(file);
        if !path.is_file() {
            return Err(InputError::FileNotFound { path });
        }

        let text = std::fs::read_to_string(&path).map_err(|e| {
            InputError::parse(format!("Failed to read file: {e}"), Some(path.display().to_string()))
        })?;
        let parsed = yaml::parse(&text, Some(&path))?;
        let selected = match fragment {
            Some(pointer) => yaml::pointer(&parsed, pointer).ok_or_else(|| InputError::PointerNotFound {
                pointer: pointer.to_string(),
                path: path.clone(),
            })?,
            None => &parsed,
        };

        let mut schema = yaml::to_json(selected)?;
        prune_definitions(&mut schema);
        return Ok(schema);
    }

    match body {
        Value::String(s) if context.types.contains(s) => Ok(json!({ "$class": s })),
        Value::String(s) => serde_json::from_str(s)
            .map_err(|e| InputError::schema_source(format!("Schema must be valid JSON: {e}"))),
        Value::Mapping(_) | Value::Sequence(_) => yaml::to_json(body),
        _ => Err(InputError::schema_source("Schema must be a string or array")),
    }
}

/// Keywords whose string values name another definition.
const REFERENCE_KEYWORDS: [&str; 3] = ["$ref", "$extends", "$template"];

/// Drops entries of `definitions` that the root does not reach through
/// `$ref`, `$extends` or `$template`.
///
/// Documents whose root references nothing are left untouched.
pub fn prune_definitions(schema: &mut JsonValue) {
    let Some(root) = schema.as_object() else {
        return;
    };
    let Some(JsonValue::Object(definitions)) = root.get("definitions") else {
        return;
    };

    let mut queue: VecDeque<String> = VecDeque::new();
    for (key, value) in root {
        if key != "definitions" {
            collect_references(key, value, &mut queue);
        }
    }
    if queue.is_empty() {
        return;
    }

    let mut reachable: BTreeSet<String> = BTreeSet::new();
    while let Some(name) = queue.pop_front() {
        if !reachable.insert(name.clone()) {
            continue;
        }
        if let Some(definition) = definitions.get(&name) {
            collect_references("", definition, &mut queue);
        }
    }

    let pruned: Map<String, JsonValue> = definitions
        .iter()
        .filter(|(name, _)| reachable.contains(name.as_str()))
        .map(|(name, definition)| (name.clone(), definition.clone()))
        .collect();

    if let Some(object) = schema.as_object_mut() {
        object.insert(String::from("definitions"), JsonValue::Object(pruned));
    }
}

fn collect_references(key: &str, value: &JsonValue, queue: &mut VecDeque<String>) {
    let is_reference = REFERENCE_KEYWORDS.contains(&key);

    match value {
        JsonValue::String(target) if is_reference => {
            let name = target.rsplit('/').next().unwrap_or(target);
            queue.push_back(name.to_string());
        }
        JsonValue::Object(object) => {
            for (child_key, child) in object {
                // Every string below `$template` is a type name.
                let child_key = if is_reference { key } else { child_key.as_str() };
                collect_references(child_key, child, queue);
            }
        }
        JsonValue::Array(items) => {
            for item in items {
                collect_references(key, item, queue);
            }
        }
        _ => {}
    }
}
