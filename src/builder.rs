//! Builder includes.
//!
//! An `!include` whose path ends in `.builder` does not read the file as
//! data. Instead the file stem selects a [`BuilderScript`] registered by the
//! host program, which fills a kind-specific builder. The builder's output
//! replaces the include. Only operations can be built this way.

use std::collections::BTreeMap;
use std::fmt;

use serde_json::{Map, Value};

use crate::deploy::env::Vars;
use crate::error::InputError;
use crate::kind::Kind;

/// File extension that marks an include as a builder.
pub const BUILDER_EXTENSION: &str = "builder";

/// HTTP methods an operation can be bound to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpMethod {
    /// GET
    Get,
    /// POST
    Post,
    /// PUT
    Put,
    /// PATCH
    Patch,
    /// DELETE
    Delete,
}

impl HttpMethod {
    /// Wire representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
            Self::Put => "PUT",
            Self::Patch => "PATCH",
            Self::Delete => "DELETE",
        }
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle stage of an operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stability {
    /// Scheduled for removal.
    Deprecated = 0,
    /// May change without notice.
    Experimental = 1,
    /// Covered by compatibility guarantees.
    Stable = 2,
    /// Kept for old clients only.
    Legacy = 3,
}

/// Setter-style builder for an operation entity.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OperationBuilder {
    scopes: Option<Vec<String>>,
    public: Option<bool>,
    stability: Option<Stability>,
    description: Option<String>,
    http_method: Option<HttpMethod>,
    http_path: Option<String>,
    http_code: Option<u16>,
    parameters: Map<String, Value>,
    incoming: Option<String>,
    outgoing: Option<String>,
    throws: BTreeMap<u16, String>,
    action: Option<String>,
}

impl OperationBuilder {
    /// Creates an empty builder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the scopes required to call the operation.
    pub fn set_scopes(&mut self, scopes: Vec<String>) -> &mut Self {
        self.scopes = Some(scopes);
        self
    }

    /// Marks the operation as callable without authorization.
    pub const fn set_public(&mut self, public: bool) -> &mut Self {
        self.public = Some(public);
        self
    }

    /// Sets the stability.
    pub const fn set_stability(&mut self, stability: Stability) -> &mut Self {
        self.stability = Some(stability);
        self
    }

    /// Sets the description.
    pub fn set_description(&mut self, description: impl Into<String>) -> &mut Self {
        self.description = Some(description.into());
        self
    }

    /// Sets the HTTP method.
    pub const fn set_http_method(&mut self, method: HttpMethod) -> &mut Self {
        self.http_method = Some(method);
        self
    }

    /// Sets the HTTP path.
    pub fn set_http_path(&mut self, path: impl Into<String>) -> &mut Self {
        self.http_path = Some(path.into());
        self
    }

    /// Sets the success status code.
    pub const fn set_http_code(&mut self, code: u16) -> &mut Self {
        self.http_code = Some(code);
        self
    }

    /// Adds a query parameter with its type definition.
    pub fn add_parameter(&mut self, name: impl Into<String>, definition: Value) -> &mut Self {
        self.parameters.insert(name.into(), definition);
        self
    }

    /// Sets the request schema reference.
    pub fn set_incoming(&mut self, incoming: impl Into<String>) -> &mut Self {
        self.incoming = Some(incoming.into());
        self
    }

    /// Sets the response schema reference.
    pub fn set_outgoing(&mut self, outgoing: impl Into<String>) -> &mut Self {
        self.outgoing = Some(outgoing.into());
        self
    }

    /// Adds an error schema reference for a status code.
    pub fn add_throw(&mut self, code: u16, schema: impl Into<String>) -> &mut Self {
        self.throws.insert(code, schema.into());
        self
    }

    /// Sets the action reference.
    pub fn set_action(&mut self, action: impl Into<String>) -> &mut Self {
        self.action = Some(action.into());
        self
    }

    /// Serializes the builder; unset fields are omitted.
    #[must_use]
    pub fn to_value(&self) -> Value {
        let mut object = Map::new();

        let mut put = |key: &str, value: Option<Value>| {
            if let Some(value) = value {
                object.insert(key.to_string(), value);
            }
        };

        put("scopes", self.scopes.clone().map(Value::from));
        put("public", self.public.map(Value::Bool));
        put("stability", self.stability.map(|s| Value::from(s as u8)));
        put("description", self.description.clone().map(Value::String));
        put("httpMethod", self.http_method.map(|m| Value::from(m.as_str())));
        put("httpPath", self.http_path.clone().map(Value::String));
        put("httpCode", self.http_code.map(Value::from));
        put("parameters", Some(Value::Object(self.parameters.clone())));
        put("incoming", self.incoming.clone().map(Value::String));
        put("outgoing", self.outgoing.clone().map(Value::String));
        put(
            "throws",
            Some(Value::Object(
                self.throws
                    .iter()
                    .map(|(code, schema)| (code.to_string(), Value::String(schema.clone())))
                    .collect(),
            )),
        );
        put("action", self.action.clone().map(Value::String));

        Value::Object(object)
    }
}

/// A fresh builder for the kind being included.
#[derive(Debug, Clone, PartialEq)]
pub enum EntityBuilder {
    /// Operation builder.
    Operation(OperationBuilder),
}

impl EntityBuilder {
    /// Creates the builder for a kind.
    ///
    /// # Errors
    ///
    /// Returns an error if the kind has no builder.
    pub fn for_kind(kind: Kind) -> Result<Self, InputError> {
        match kind {
            Kind::Operation => Ok(Self::Operation(OperationBuilder::new())),
            other => Err(InputError::UnsupportedBuilder {
                kind: other.to_string(),
            }),
        }
    }

    /// Serializes the built entity.
    #[must_use]
    pub fn to_value(&self) -> Value {
        match self {
            Self::Operation(builder) => builder.to_value(),
        }
    }
}

/// Read-only view of the substitution variables handed to a script.
#[derive(Debug, Clone, Default)]
pub struct BuilderContext {
    vars: Vars,
}

impl BuilderContext {
    /// Wraps a materialized variable table.
    #[must_use]
    pub const fn new(vars: Vars) -> Self {
        Self { vars }
    }

    /// Looks up a variable, case-insensitively.
    #[must_use]
    pub fn get(&self, category: &str, key: &str) -> Option<&Value> {
        self.vars
            .get(&category.to_lowercase())
            .and_then(|values| values.get(&key.to_lowercase()))
    }

    /// Looks up a string from the `env` category.
    #[must_use]
    pub fn env(&self, key: &str) -> Option<&str> {
        self.get(crate::deploy::env::ENV_CATEGORY, key)
            .and_then(Value::as_str)
    }
}

/// A host-provided function that fills a builder.
pub trait BuilderScript: Send + Sync {
    /// Populates `builder` for the entity being included.
    fn build(&self, builder: &mut EntityBuilder, context: &BuilderContext);
}

impl<F> BuilderScript for F
where
    F: Fn(&mut EntityBuilder, &BuilderContext) + Send + Sync,
{
    fn build(&self, builder: &mut EntityBuilder, context: &BuilderContext) {
        self(builder, context);
    }
}

/// Builder scripts by name.
#[derive(Default)]
pub struct BuilderRegistry {
    scripts: BTreeMap<String, Box<dyn BuilderScript>>,
}

impl fmt::Debug for BuilderRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BuilderRegistry")
            .field("scripts", &self.scripts.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl BuilderRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a script under `name`.
    pub fn register(&mut self, name: impl Into<String>, script: impl BuilderScript + 'static) {
        self.scripts.insert(name.into(), Box::new(script));
    }

    /// Runs the script `name` against a fresh builder for `kind`.
    ///
    /// # Errors
    ///
    /// Returns an error if the kind has no builder or no script is registered.
    pub fn run(&self, kind: Kind, name: &str, context: &BuilderContext) -> Result<Value, InputError> {
        let mut builder = EntityBuilder::for_kind(kind)?;
        let script = self
            .scripts
            .get(name)
            .ok_or_else(|| InputError::UnknownBuilder {
                name: name.to_string(),
            })?;

        script.build(&mut builder, context);
        Ok(builder.to_value())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn registry() -> BuilderRegistry {
        let mut registry = BuilderRegistry::new();
        registry.register("get_todos", |builder: &mut EntityBuilder, context: &BuilderContext| {
            let EntityBuilder::Operation(operation) = builder;
            operation
                .set_http_method(HttpMethod::Get)
                .set_http_path("/todo")
                .set_http_code(200)
                .set_stability(Stability::Experimental)
                .set_outgoing("schema://Todo-Collection")
                .set_action("action://Todo-List");
            if let Some(host) = context.env("HOST") {
                operation.set_description(format!("Served by {host}"));
            }
        });
        registry
    }

    #[test]
    fn test_operation_builder_omits_unset_fields() {
        let mut context_vars = Vars::new();
        context_vars.insert(
            String::from("env"),
            BTreeMap::from([(String::from("host"), json!("api.acme.com"))]),
        );

        let value = registry()
            .run(Kind::Operation, "get_todos", &BuilderContext::new(context_vars))
            .expect("script should run");

        assert_eq!(
            value,
            json!({
                "stability": 1,
                "description": "Served by api.acme.com",
                "httpMethod": "GET",
                "httpPath": "/todo",
                "httpCode": 200,
                "parameters": {},
                "outgoing": "schema://Todo-Collection",
                "throws": {},
                "action": "action://Todo-List",
            })
        );
    }

    #[test]
    fn test_unsupported_kind() {
        let result = registry().run(Kind::Schema, "get_todos", &BuilderContext::default());
        assert!(matches!(result, Err(InputError::UnsupportedBuilder { .. })));
    }

    #[test]
    fn test_unknown_script() {
        let result = registry().run(Kind::Operation, "missing", &BuilderContext::default());
        assert!(matches!(result, Err(InputError::UnknownBuilder { .. })));
    }
}
