//! Backend entity API.

use serde_json::{Map, Value};
use tracing::debug;

use crate::error::{InputError, Result};
use crate::kind::Kind;
use crate::model::validate_entry;

use super::auth::Credentials;
use super::parser::ResponseParser;
use super::transport::{ApiRequest, Method, Transport};

/// Prefix of all entity endpoints.
const BACKEND_PREFIX: &str = "backend";

/// Paging and filtering of a collection request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListQuery {
    /// Offset of the first entry.
    pub start_index: Option<u32>,
    /// Page size.
    pub count: Option<u32>,
    /// Search term.
    pub search: Option<String>,
    /// Sort field.
    pub sort_by: Option<String>,
    /// Sort order (0 ascending, 1 descending).
    pub sort_order: Option<u8>,
}

impl ListQuery {
    fn to_pairs(&self) -> Vec<(String, String)> {
        let mut pairs = Vec::new();
        if let Some(search) = self.search.as_deref().filter(|s| !s.is_empty()) {
            pairs.push((String::from("search"), search.to_string()));
        }
        if let Some(start_index) = self.start_index {
            pairs.push((String::from("startIndex"), start_index.to_string()));
        }
        if let Some(count) = self.count {
            pairs.push((String::from("count"), count.to_string()));
        }
        if let Some(sort_by) = &self.sort_by {
            pairs.push((String::from("sortBy"), sort_by.clone()));
        }
        if let Some(sort_order) = self.sort_order {
            pairs.push((String::from("sortOrder"), sort_order.to_string()));
        }
        pairs
    }
}

/// Authenticated client for the backend entity API.
#[derive(Debug)]
pub struct Client<T: Transport> {
    transport: T,
    credentials: Credentials,
}

impl<T: Transport> Client<T> {
    /// Creates a client.
    #[must_use]
    pub const fn new(transport: T, credentials: Credentials) -> Self {
        Self {
            transport,
            credentials,
        }
    }

    /// Credentials used for every request.
    #[must_use]
    pub const fn credentials(&self) -> &Credentials {
        &self.credentials
    }

    /// Lists a page of entities.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails.
    pub async fn get_all(&self, kind: Kind, query: &ListQuery) -> Result<Map<String, Value>> {
        let request = self
            .request(Method::Get, kind.as_str().to_string())
            .with_query(query.to_pairs());
        self.send(request).await
    }

    /// Fetches an entity by numeric id, or by name for anything else.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails, including a 404 for unknown entities.
    pub async fn get(&self, kind: Kind, id: &str) -> Result<Map<String, Value>> {
        if is_numeric_id(id) {
            self.get_by_id(kind, id).await
        } else {
            self.get_by_name(kind, id).await
        }
    }

    /// Fetches an entity by id.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails.
    pub async fn get_by_id(&self, kind: Kind, id: &str) -> Result<Map<String, Value>> {
        self.send(self.request(Method::Get, format!("{kind}/{id}")))
            .await
    }

    /// Fetches an entity by name.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails.
    pub async fn get_by_name(&self, kind: Kind, name: &str) -> Result<Map<String, Value>> {
        let path = format!("{kind}/~{}", urlencoding::encode(name));
        self.send(self.request(Method::Get, path)).await
    }

    /// Creates an entity.
    ///
    /// # Errors
    ///
    /// Returns an error if the payload does not fit the kind or the request fails.
    pub async fn create(&self, kind: Kind, payload: &Value) -> Result<Map<String, Value>> {
        check_payload(kind, payload, &kind.create_model())?;

        let request = self
            .request(Method::Post, kind.as_str().to_string())
            .with_json(payload.clone());
        self.send(request).await
    }

    /// Updates the entity with the given id.
    ///
    /// # Errors
    ///
    /// Returns an error if the payload does not fit the kind or the request fails.
    pub async fn update(&self, kind: Kind, id: &str, payload: &Value) -> Result<Map<String, Value>> {
        check_payload(kind, payload, &kind.update_model())?;

        let request = self
            .request(Method::Put, format!("{kind}/{id}"))
            .with_json(payload.clone());
        self.send(request).await
    }

    /// Deletes the entity with the given id.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails.
    pub async fn delete(&self, kind: Kind, id: &str) -> Result<Map<String, Value>> {
        self.send(self.request(Method::Delete, format!("{kind}/{id}")))
            .await
    }

    fn request(&self, method: Method, path: String) -> ApiRequest {
        ApiRequest::new(
            &self.credentials.base_uri,
            method,
            format!("{BACKEND_PREFIX}/{path}"),
        )
        .with_auth(self.credentials.auth())
    }

    async fn send(&self, request: ApiRequest) -> Result<Map<String, Value>> {
        debug!("{} {}", request.method, request.path);
        let response = self.transport.request(request).await?;
        Ok(ResponseParser::parse(response)?)
    }
}

/// Parses a create/update payload written as JSON or YAML.
///
/// # Errors
///
/// Returns an error if the text is not an object or does not fit the kind.
pub fn parse_payload(text: &str, kind: Kind, model: &str) -> Result<Value> {
    let invalid = |message: String| InputError::InvalidPayload {
        model: model.to_string(),
        message,
    };

    let payload = match serde_json::from_str::<Value>(text) {
        Ok(value) => value,
        Err(_) => {
            let yaml: serde_yaml::Value =
                serde_yaml::from_str(text).map_err(|e| invalid(e.to_string()))?;
            crate::deploy::yaml::to_json(&yaml).map_err(|e| invalid(e.to_string()))?
        }
    };

    check_payload(kind, &payload, model)?;
    Ok(payload)
}

fn check_payload(kind: Kind, payload: &Value, model: &str) -> std::result::Result<(), InputError> {
    if !payload.is_object() {
        return Err(InputError::InvalidPayload {
            model: model.to_string(),
            message: String::from("payload must be an object"),
        });
    }

    validate_entry(kind, payload).map_err(|e| InputError::InvalidPayload {
        model: model.to_string(),
        message: e.to_string(),
    })
}

fn is_numeric_id(id: &str) -> bool {
    !id.is_empty() && id.bytes().all(|b| b.is_ascii_digit())
}
