//! The fixed table of entity kinds.
//!
//! Kinds are imported in [`Kind::ALL`] order so that references by name
//! (an operation pointing at a schema or an action) resolve on the backend.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// An entity category managed by the backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Kind {
    /// Executable actions.
    Action,
    /// Key/value configuration entries.
    Config,
    /// Connections to external systems.
    Connection,
    /// Scheduled actions.
    Cronjob,
    /// Events apps can subscribe to.
    Event,
    /// Payment plans.
    Plan,
    /// Rate limits.
    Rate,
    /// User roles.
    Role,
    /// Request/response schemas.
    Schema,
    /// Authorization scopes.
    Scope,
    /// Exposed API operations.
    Operation,
}

impl Kind {
    /// All kinds in import order.
    pub const ALL: [Self; 11] = [
        Self::Action,
        Self::Config,
        Self::Connection,
        Self::Cronjob,
        Self::Event,
        Self::Plan,
        Self::Rate,
        Self::Role,
        Self::Schema,
        Self::Scope,
        Self::Operation,
    ];

    /// Name used in deploy files, import documents and API paths.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Action => "action",
            Self::Config => "config",
            Self::Connection => "connection",
            Self::Cronjob => "cronjob",
            Self::Event => "event",
            Self::Plan => "plan",
            Self::Rate => "rate",
            Self::Role => "role",
            Self::Schema => "schema",
            Self::Scope => "scope",
            Self::Operation => "operation",
        }
    }

    /// Field used to look up an existing entity.
    #[must_use]
    pub const fn natural_key(self) -> &'static str {
        "name"
    }

    /// Backend model name, suffixed with `Create`/`Update` for payloads.
    #[must_use]
    pub const fn model(self) -> &'static str {
        match self {
            Self::Action => "Action",
            Self::Config => "Config",
            Self::Connection => "Connection",
            Self::Cronjob => "Cronjob",
            Self::Event => "Event",
            Self::Plan => "Plan",
            Self::Rate => "Rate",
            Self::Role => "Role",
            Self::Schema => "Schema",
            Self::Scope => "Scope",
            Self::Operation => "Operation",
        }
    }

    /// Model name for create payloads.
    #[must_use]
    pub fn create_model(self) -> String {
        format!("{}Create", self.model())
    }

    /// Model name for update payloads.
    #[must_use]
    pub fn update_model(self) -> String {
        format!("{}Update", self.model())
    }

    /// Server-managed fields removed when exporting.
    #[must_use]
    pub const fn export_excluded_fields(self) -> &'static [&'static str] {
        match self {
            Self::Action | Self::Rate | Self::Schema => &["id", "status"],
            Self::Cronjob => &["id", "status", "executeDate", "exitCode", "errors"],
            Self::Scope => &["id", "routes"],
            Self::Config
            | Self::Connection
            | Self::Event
            | Self::Plan
            | Self::Role
            | Self::Operation => &["id"],
        }
    }
}

impl fmt::Display for Kind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Kind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| format!("Unknown kind: {s}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_operation_is_imported_last() {
        assert_eq!(Kind::ALL.first(), Some(&Kind::Action));
        assert_eq!(Kind::ALL.last(), Some(&Kind::Operation));

        let schema = Kind::ALL.iter().position(|k| *k == Kind::Schema);
        let operation = Kind::ALL.iter().position(|k| *k == Kind::Operation);
        assert!(schema < operation);
    }

    #[test]
    fn test_parse_kind() {
        assert_eq!("schema".parse::<Kind>(), Ok(Kind::Schema));
        assert_eq!("CRONJOB".parse::<Kind>(), Ok(Kind::Cronjob));
        assert!("routes".parse::<Kind>().is_err());
    }

    #[test]
    fn test_payload_models() {
        assert_eq!(Kind::Action.create_model(), "ActionCreate");
        assert_eq!(Kind::Operation.update_model(), "OperationUpdate");
    }
}
