//! Import document and result types.
//!
//! The import document is the JSON shape shared by `deploy`, `import` and
//! `export`. Every kind has its own entity struct; fields the client does
//! not know about travel in the flattened `extra` map.

use std::collections::BTreeMap;
use std::fmt;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use validator::Validate;

use crate::error::{InputError, RawResponse};
use crate::kind::Kind;

/// An action entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct ActionEntity {
    /// Unique action name.
    #[validate(length(min = 1, max = 255))]
    pub name: String,
    /// Implementing class on the backend.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub class: Option<String>,
    /// Whether the action runs asynchronously.
    #[serde(default, rename = "async", skip_serializing_if = "Option::is_none")]
    pub is_async: Option<bool>,
    /// Action specific configuration.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config: Option<Map<String, Value>>,
    /// Additional fields.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// A configuration entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct ConfigEntity {
    /// Configuration key.
    #[validate(length(min = 1, max = 255))]
    pub name: String,
    /// Configuration value.
    #[serde(default)]
    pub value: Value,
}

/// A connection entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct ConnectionEntity {
    /// Unique connection name.
    #[validate(length(min = 1, max = 255))]
    pub name: String,
    /// Implementing class on the backend.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub class: Option<String>,
    /// Connection parameters.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config: Option<Map<String, Value>>,
    /// Additional fields.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// A cronjob entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct CronjobEntity {
    /// Unique cronjob name.
    #[validate(length(min = 1, max = 255))]
    pub name: String,
    /// Cron expression.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cron: Option<String>,
    /// Canonical action reference (`action://...`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action: Option<String>,
    /// Additional fields.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// An event entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct EventEntity {
    /// Unique event name.
    #[validate(length(min = 1, max = 255))]
    pub name: String,
    /// Human readable description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Canonical schema reference (`schema://...`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema: Option<String>,
    /// Additional fields.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// A plan entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct PlanEntity {
    /// Unique plan name.
    #[validate(length(min = 1, max = 255))]
    pub name: String,
    /// Human readable description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Plan price.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub price: Option<f64>,
    /// Points credited by the plan.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub points: Option<i64>,
    /// Additional fields.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// A rate limit entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct RateEntity {
    /// Unique rate name.
    #[validate(length(min = 1, max = 255))]
    pub name: String,
    /// Evaluation priority.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<i64>,
    /// Allowed requests per timespan.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rate_limit: Option<i64>,
    /// ISO 8601 duration of the window.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timespan: Option<String>,
    /// Additional fields.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// A role entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct RoleEntity {
    /// Unique role name.
    #[validate(length(min = 1, max = 255))]
    pub name: String,
    /// Scopes granted to the role.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scopes: Option<Vec<String>>,
    /// Additional fields.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// A schema entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct SchemaEntity {
    /// Unique schema name.
    #[validate(length(min = 1, max = 255))]
    pub name: String,
    /// Schema body.
    #[serde(default)]
    pub source: Value,
    /// Additional fields.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// A scope entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct ScopeEntity {
    /// Unique scope name.
    #[validate(length(min = 1, max = 255))]
    pub name: String,
    /// Human readable description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Additional fields.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// An operation entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct OperationEntity {
    /// Unique operation name.
    #[validate(length(min = 1, max = 255))]
    pub name: String,
    /// HTTP method.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub http_method: Option<String>,
    /// HTTP path.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub http_path: Option<String>,
    /// Success status code.
    #[validate(range(min = 100, max = 599))]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub http_code: Option<u16>,
    /// Canonical request schema reference.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub incoming: Option<String>,
    /// Canonical response schema reference.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub outgoing: Option<String>,
    /// Canonical error schema references by status code.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub throws: BTreeMap<String, String>,
    /// Canonical action reference.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action: Option<String>,
    /// Additional fields.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// The normalized document passed from deploy to import.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ImportDocument {
    /// Reserved for format migrations.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    /// Actions.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub action: Vec<ActionEntity>,
    /// Configuration entries.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub config: Vec<ConfigEntity>,
    /// Connections.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub connection: Vec<ConnectionEntity>,
    /// Cronjobs.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub cronjob: Vec<CronjobEntity>,
    /// Events.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub event: Vec<EventEntity>,
    /// Plans.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub plan: Vec<PlanEntity>,
    /// Rates.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub rate: Vec<RateEntity>,
    /// Roles.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub role: Vec<RoleEntity>,
    /// Schemas.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub schema: Vec<SchemaEntity>,
    /// Scopes.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub scope: Vec<ScopeEntity>,
    /// Operations.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub operation: Vec<OperationEntity>,
}

impl ImportDocument {
    /// Creates an empty document.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Validates a JSON body against its kind and appends it.
    ///
    /// # Errors
    ///
    /// Returns an error if the body does not fit the kind's entity type.
    pub fn push(&mut self, kind: Kind, body: Value) -> Result<(), InputError> {
        match kind {
            Kind::Action => self.action.push(typed(kind, body)?),
            Kind::Config => self.config.push(typed(kind, body)?),
            Kind::Connection => self.connection.push(typed(kind, body)?),
            Kind::Cronjob => self.cronjob.push(typed(kind, body)?),
            Kind::Event => self.event.push(typed(kind, body)?),
            Kind::Plan => self.plan.push(typed(kind, body)?),
            Kind::Rate => self.rate.push(typed(kind, body)?),
            Kind::Role => self.role.push(typed(kind, body)?),
            Kind::Schema => self.schema.push(typed(kind, body)?),
            Kind::Scope => self.scope.push(typed(kind, body)?),
            Kind::Operation => self.operation.push(typed(kind, body)?),
        }
        Ok(())
    }

    /// Number of entities declared for a kind.
    #[must_use]
    pub fn count(&self, kind: Kind) -> usize {
        match kind {
            Kind::Action => self.action.len(),
            Kind::Config => self.config.len(),
            Kind::Connection => self.connection.len(),
            Kind::Cronjob => self.cronjob.len(),
            Kind::Event => self.event.len(),
            Kind::Plan => self.plan.len(),
            Kind::Rate => self.rate.len(),
            Kind::Role => self.role.len(),
            Kind::Schema => self.schema.len(),
            Kind::Scope => self.scope.len(),
            Kind::Operation => self.operation.len(),
        }
    }

    /// Total number of entities.
    #[must_use]
    pub fn total(&self) -> usize {
        Kind::ALL.iter().map(|kind| self.count(*kind)).sum()
    }

    /// Returns true if no entity is declared.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.total() == 0
    }

    /// Serializes the document to its JSON wire form.
    ///
    /// # Errors
    ///
    /// Returns an error if a value cannot be represented as JSON.
    pub fn to_json(&self) -> Result<String, InputError> {
        serde_json::to_string(self).map_err(|e| InputError::MalformedDocument {
            message: e.to_string(),
        })
    }
}

/// Checks a raw import entry against its kind, returning the validated body.
///
/// # Errors
///
/// Returns an error if the entry does not fit the kind's entity type.
pub fn validate_entry(kind: Kind, body: &Value) -> Result<(), InputError> {
    let mut probe = ImportDocument::new();
    probe.push(kind, body.clone())
}

fn typed<T: DeserializeOwned + Validate>(kind: Kind, body: Value) -> Result<T, InputError> {
    let name = body
        .get(kind.natural_key())
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();

    let entity: T = serde_json::from_value(body).map_err(|e| InputError::InvalidEntity {
        kind: kind.to_string(),
        name: name.clone(),
        message: e.to_string(),
    })?;

    entity.validate().map_err(|e| InputError::InvalidEntity {
        kind: kind.to_string(),
        name,
        message: e.to_string(),
    })?;

    Ok(entity)
}

/// What happened to a reconciled entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ResultAction {
    /// The entity did not exist and was created.
    Created,
    /// The entity existed and was updated.
    Updated,
    /// The entity could not be applied.
    Failed,
}

impl fmt::Display for ResultAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Created => write!(f, "CREATED"),
            Self::Updated => write!(f, "UPDATED"),
            Self::Failed => write!(f, "FAILED"),
        }
    }
}

/// Outcome of reconciling one entity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ImportResult {
    /// Kind of the entity.
    pub kind: Kind,
    /// What happened.
    pub action: ResultAction,
    /// Entity name, followed by the failure reason when failed.
    pub message: String,
    /// Raw backend response for transport failures.
    #[serde(skip)]
    pub response: Option<RawResponse>,
}

impl ImportResult {
    /// Creates a result without an attached response.
    #[must_use]
    pub fn new(kind: Kind, action: ResultAction, message: impl Into<String>) -> Self {
        Self {
            kind,
            action,
            message: message.into(),
            response: None,
        }
    }

    /// Attaches the raw response that caused a failure.
    #[must_use]
    pub fn with_response(mut self, response: Option<RawResponse>) -> Self {
        self.response = response;
        self
    }

    /// Returns true if the entity could not be applied.
    #[must_use]
    pub fn is_failed(&self) -> bool {
        self.action == ResultAction::Failed
    }
}

impl fmt::Display for ImportResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {} {}", self.action, self.kind, self.message)
    }
}

/// Backend id of an entity, as used in `{kind}/{id}` paths.
#[must_use]
pub fn entity_id(entity: &Map<String, Value>) -> Option<String> {
    match entity.get("id")? {
        Value::Number(n) => Some(n.to_string()),
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        _ => None,
    }
}

/// Counts failed results.
#[must_use]
pub fn error_count(results: &[ImportResult]) -> usize {
    results.iter().filter(|r| r.is_failed()).count()
}
