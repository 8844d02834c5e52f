//! Error types for the apiman client.
//!
//! Errors are split by how the deploy/import pipeline treats them:
//! [`InputError`] aborts the whole call before anything is applied,
//! [`TransportError`] is isolated per entity during reconciliation and
//! fatal everywhere else, and [`TokenError`] surfaces before any entity
//! is processed.

use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// The main error type for the apiman client.
#[derive(Debug, Error)]
pub enum ApimanError {
    /// Malformed input, unresolvable include or invalid declaration.
    #[error("Input error: {0}")]
    Input(#[from] InputError),

    /// The backend answered with an error or could not be reached.
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    /// Missing or unusable credentials.
    #[error("Token error: {0}")]
    Token(#[from] TokenError),

    /// IO errors.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Errors caused by the deploy file, an included file or an import document.
#[derive(Debug, Error)]
pub enum InputError {
    /// A `${category.key}` placeholder used an unregistered category.
    #[error("Usage of unknown variable type \"{category}\", allowed is ({})", .known.join(", "))]
    UnknownCategory {
        /// The requested category.
        category: String,
        /// Registered categories.
        known: Vec<String>,
    },

    /// A `${category.key}` placeholder used a key the category does not provide.
    #[error("Usage of unknown variable key \"{key}\" in \"{category}\", allowed is ({})", .known.join(", "))]
    UnknownKey {
        /// The category that was searched.
        category: String,
        /// The requested key.
        key: String,
        /// Keys provided by the category.
        known: Vec<String>,
    },

    /// A referenced file does not exist.
    #[error("Could not resolve file: {path}")]
    FileNotFound {
        /// Path to the missing file.
        path: PathBuf,
    },

    /// A YAML tag other than `!include` was used.
    #[error("Invalid tag provided: {tag}")]
    InvalidTag {
        /// The offending tag.
        tag: String,
    },

    /// A declaration is neither a mapping, a sequence nor an include.
    #[error("{kind} must be either an array or a string containing a \"!include\" directive")]
    InvalidDeclaration {
        /// Kind whose declaration was invalid.
        kind: String,
    },

    /// An action reference is not a string.
    #[error("Invalid action source")]
    InvalidActionSource,

    /// A schema reference has an unsupported shape.
    #[error("Invalid schema source: {message}")]
    InvalidSchemaSource {
        /// Description of the problem.
        message: String,
    },

    /// A class-like type reference is not registered.
    #[error("Provided class \"{name}\" does not exist")]
    UnknownType {
        /// The type name.
        name: String,
    },

    /// A JSON pointer fragment does not exist in the included file.
    #[error("Pointer {pointer} does not exist in {path}")]
    PointerNotFound {
        /// The pointer that failed.
        pointer: String,
        /// File the pointer was evaluated against.
        path: PathBuf,
    },

    /// A YAML or JSON text could not be parsed.
    #[error("Failed to parse {}: {message}", .location.as_deref().unwrap_or("input"))]
    Parse {
        /// Description of the parse error.
        message: String,
        /// Optional source location.
        location: Option<String>,
    },

    /// The import document is not a JSON object.
    #[error("Malformed import document: {message}")]
    MalformedDocument {
        /// Description of the problem.
        message: String,
    },

    /// A declared entity does not fit its kind.
    #[error("Invalid {kind} \"{name}\": {message}")]
    InvalidEntity {
        /// Kind of the entity.
        kind: String,
        /// Entity name.
        name: String,
        /// What is wrong with it.
        message: String,
    },

    /// Builder includes are not available for this kind.
    #[error("Builders are not supported for type {kind}")]
    UnsupportedBuilder {
        /// The kind that was requested.
        kind: String,
    },

    /// No builder script is registered under this name.
    #[error("No builder registered for {name}")]
    UnknownBuilder {
        /// File stem used to look up the builder.
        name: String,
    },

    /// A create/update payload does not fit the target model.
    #[error("Could not insert data into model {model}, got: {message}")]
    InvalidPayload {
        /// Model name (e.g. `ActionCreate`).
        model: String,
        /// Description of the problem.
        message: String,
    },
}

/// A response as received from the backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawResponse {
    /// HTTP status code.
    pub status: u16,
    /// Raw response body.
    pub body: String,
}

impl RawResponse {
    /// Creates a response from a status and body.
    #[must_use]
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }
}

impl fmt::Display for RawResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "HTTP {} {}", self.status, self.body)
    }
}

/// Backend communication errors.
#[derive(Debug, Error)]
pub enum TransportError {
    /// The backend returned a non-successful status code.
    #[error("{message}")]
    Status {
        /// HTTP status code.
        status: u16,
        /// Error message (from the body when available).
        message: String,
        /// The raw response.
        response: RawResponse,
    },

    /// The backend returned a body that is not a JSON object.
    #[error("{message}")]
    InvalidBody {
        /// Description of the body issue.
        message: String,
        /// The raw response.
        response: RawResponse,
    },

    /// The request could not be sent.
    #[error("Network error: {message}")]
    Network {
        /// Description of the network error.
        message: String,
    },
}

impl TransportError {
    /// Creates a network error.
    #[must_use]
    pub fn network(message: impl Into<String>) -> Self {
        Self::Network {
            message: message.into(),
        }
    }

    /// Returns the raw response, when one was received.
    #[must_use]
    pub const fn response(&self) -> Option<&RawResponse> {
        match self {
            Self::Status { response, .. } | Self::InvalidBody { response, .. } => Some(response),
            Self::Network { .. } => None,
        }
    }

    /// Returns true if the backend reported the resource as missing.
    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::Status { status: 404, .. })
    }
}

/// Credential errors.
#[derive(Debug, Error)]
pub enum TokenError {
    /// No token has been stored yet.
    #[error("Found no existing token at {path}, please request a token through the login command")]
    Missing {
        /// Token file location.
        path: PathBuf,
    },

    /// The stored token lacks a field.
    #[error("Could not find {key} in token")]
    MissingField {
        /// Name of the missing field.
        key: String,
    },

    /// The token file could not be written.
    #[error("Could not write token to file {path}: {message}")]
    Write {
        /// Token file location.
        path: PathBuf,
        /// Underlying error.
        message: String,
    },

    /// The token file is not valid JSON.
    #[error("Token file is corrupted: {message}")]
    Corrupted {
        /// Description of the corruption.
        message: String,
    },
}

/// Result type alias for apiman operations.
pub type Result<T> = std::result::Result<T, ApimanError>;

impl ApimanError {
    /// Creates a new internal error with the given message.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    /// Message without the category prefix, as shown next to a failed entity.
    #[must_use]
    pub fn detail(&self) -> String {
        match self {
            Self::Input(e) => e.to_string(),
            Self::Transport(e) => e.to_string(),
            Self::Token(e) => e.to_string(),
            Self::Io(e) => e.to_string(),
            Self::Internal(message) => message.clone(),
        }
    }
}

impl InputError {
    /// Creates a parse error for the given location.
    #[must_use]
    pub fn parse(message: impl Into<String>, location: Option<String>) -> Self {
        Self::Parse {
            message: message.into(),
            location,
        }
    }

    /// Creates an invalid schema source error.
    #[must_use]
    pub fn schema_source(message: impl Into<String>) -> Self {
        Self::InvalidSchemaSource {
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_only_for_404() {
        let missing = TransportError::Status {
            status: 404,
            message: String::from("API returned an invalid status code"),
            response: RawResponse::new(404, ""),
        };
        let broken = TransportError::Status {
            status: 500,
            message: String::from("API returned an invalid status code"),
            response: RawResponse::new(500, ""),
        };

        assert!(missing.is_not_found());
        assert!(!broken.is_not_found());
        assert!(!TransportError::network("refused").is_not_found());
    }

    #[test]
    fn test_unknown_key_lists_alternatives() {
        let err = InputError::UnknownKey {
            category: String::from("env"),
            key: String::from("foo"),
            known: vec![String::from("bar"), String::from("baz")],
        };

        assert!(err.to_string().contains("(bar, baz)"));
    }

    #[test]
    fn test_detail_strips_prefix() {
        let err = ApimanError::from(TransportError::network("refused"));
        assert_eq!(err.detail(), "Network error: refused");
    }
}
