//! Transport layer between the client and the backend.
//!
//! [`HttpTransport`] talks to a real backend. [`MemoryTransport`] answers
//! from scripted responses and records every request, for tests and dry
//! runs.

use std::collections::VecDeque;
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use reqwest::header;
use serde_json::Value;
use tracing::trace;

use crate::error::{RawResponse, TransportError};

/// User agent sent with every request.
pub const USER_AGENT: &str = concat!("apiman/", env!("CARGO_PKG_VERSION"));

/// HTTP method.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    /// GET
    Get,
    /// POST
    Post,
    /// PUT
    Put,
    /// DELETE
    Delete,
}

impl Method {
    const fn to_reqwest(self) -> reqwest::Method {
        match self {
            Self::Get => reqwest::Method::GET,
            Self::Post => reqwest::Method::POST,
            Self::Put => reqwest::Method::PUT,
            Self::Delete => reqwest::Method::DELETE,
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Get => "GET",
            Self::Post => "POST",
            Self::Put => "PUT",
            Self::Delete => "DELETE",
        })
    }
}

/// Request authorization.
#[derive(Clone, PartialEq, Eq)]
pub enum Auth {
    /// `Authorization: Bearer <token>`
    Bearer(String),
    /// `Authorization: Basic <base64(user:password)>`
    Basic {
        /// Client id.
        username: String,
        /// Client secret.
        password: String,
    },
}

impl fmt::Debug for Auth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bearer(_) => f.write_str("Bearer(***)"),
            Self::Basic { username, .. } => write!(f, "Basic({username}:***)"),
        }
    }
}

/// Request body.
#[derive(Debug, Clone, PartialEq)]
pub enum RequestBody {
    /// JSON document.
    Json(Value),
    /// `application/x-www-form-urlencoded` body.
    Form(String),
}

/// A request against the backend.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiRequest {
    /// Base URI of the backend.
    pub base_uri: String,
    /// HTTP method.
    pub method: Method,
    /// Path relative to the base URI.
    pub path: String,
    /// Query parameters.
    pub query: Vec<(String, String)>,
    /// Authorization.
    pub auth: Option<Auth>,
    /// Body.
    pub body: Option<RequestBody>,
}

impl ApiRequest {
    /// Creates a request without query, auth or body.
    #[must_use]
    pub fn new(base_uri: impl Into<String>, method: Method, path: impl Into<String>) -> Self {
        Self {
            base_uri: base_uri.into(),
            method,
            path: path.into(),
            query: Vec::new(),
            auth: None,
            body: None,
        }
    }

    /// Adds query parameters.
    #[must_use]
    pub fn with_query(mut self, query: Vec<(String, String)>) -> Self {
        self.query = query;
        self
    }

    /// Sets the authorization.
    #[must_use]
    pub fn with_auth(mut self, auth: Auth) -> Self {
        self.auth = Some(auth);
        self
    }

    /// Sets a JSON body.
    #[must_use]
    pub fn with_json(mut self, body: Value) -> Self {
        self.body = Some(RequestBody::Json(body));
        self
    }

    /// Sets a form body.
    #[must_use]
    pub fn with_form(mut self, body: impl Into<String>) -> Self {
        self.body = Some(RequestBody::Form(body.into()));
        self
    }

    /// Full URL of the request, without query.
    #[must_use]
    pub fn url(&self) -> String {
        format!(
            "{}/{}",
            self.base_uri.trim_end_matches('/'),
            self.path.trim_start_matches('/')
        )
    }
}

/// Sends requests to the backend.
///
/// Non-2xx responses are returned as responses, not errors; only failures
/// to obtain a response are errors.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Transport: Send + Sync {
    /// Sends a request and returns the raw response.
    async fn request(&self, request: ApiRequest) -> Result<RawResponse, TransportError>;
}

#[async_trait]
impl<T: Transport + ?Sized> Transport for Arc<T> {
    async fn request(&self, request: ApiRequest) -> Result<RawResponse, TransportError> {
        (**self).request(request).await
    }
}

/// Transport over HTTP.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    /// Creates a transport with the given request timeout.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be created.
    pub fn new(timeout: Duration) -> Result<Self, TransportError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| TransportError::network(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self { client })
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn request(&self, request: ApiRequest) -> Result<RawResponse, TransportError> {
        let url = request.url();
        trace!("{} {url}", request.method);

        let mut builder = self.client.request(request.method.to_reqwest(), &url);

        if !request.query.is_empty() {
            builder = builder.query(&request.query);
        }

        builder = match request.auth {
            Some(Auth::Bearer(token)) => builder.bearer_auth(token),
            Some(Auth::Basic { username, password }) => builder.basic_auth(username, Some(password)),
            None => builder,
        };

        builder = match request.body {
            Some(RequestBody::Json(body)) => builder.json(&body),
            Some(RequestBody::Form(body)) => builder
                .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
                .body(body),
            None => builder,
        };

        let response = builder
            .send()
            .await
            .map_err(|e| TransportError::network(format!("Request failed: {e}")))?;

        let status = response.status().as_u16();
        let body = response
            .text()
            .await
            .map_err(|e| TransportError::network(format!("Failed to read response: {e}")))?;

        trace!("{url} answered {status}");
        Ok(RawResponse::new(status, body))
    }
}

type Responder = Box<dyn Fn(&ApiRequest) -> RawResponse + Send + Sync>;

/// In-memory transport answering from a script.
///
/// Queued responses are returned first, in order. Once the queue is empty
/// the responder (if any) answers.
#[derive(Default)]
pub struct MemoryTransport {
    responses: Mutex<VecDeque<RawResponse>>,
    responder: Option<Responder>,
    requests: Mutex<Vec<ApiRequest>>,
}

impl fmt::Debug for MemoryTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemoryTransport")
            .field("requests", &self.requests().len())
            .finish_non_exhaustive()
    }
}

impl MemoryTransport {
    /// Creates a transport with no scripted responses.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a transport answering every request with `responder`.
    #[must_use]
    pub fn with_responder<F>(responder: F) -> Self
    where
        F: Fn(&ApiRequest) -> RawResponse + Send + Sync + 'static,
    {
        Self {
            responder: Some(Box::new(responder)),
            ..Self::default()
        }
    }

    /// Queues a response.
    pub fn add_response(&self, response: RawResponse) {
        self.responses
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push_back(response);
    }

    /// Requests received so far.
    #[must_use]
    pub fn requests(&self) -> Vec<ApiRequest> {
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

#[async_trait]
impl Transport for MemoryTransport {
    async fn request(&self, request: ApiRequest) -> Result<RawResponse, TransportError> {
        let queued = self
            .responses
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop_front();

        let response = match (queued, &self.responder) {
            (Some(response), _) => response,
            (None, Some(responder)) => responder(&request),
            (None, None) => {
                return Err(TransportError::network(format!(
                    "No response scripted for {} {}",
                    request.method, request.path
                )));
            }
        };

        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(request);

        Ok(response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_string, header as header_is, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn test_http_transport_sends_bearer_and_query() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/backend/action"))
            .and(query_param("count", "64"))
            .and(header_is("authorization", "Bearer secret"))
            .and(header_is("user-agent", USER_AGENT))
            .respond_with(ResponseTemplate::new(200).set_body_string(r#"{"totalResults":0}"#))
            .mount(&server)
            .await;

        let transport = HttpTransport::new(Duration::from_secs(5)).expect("client");
        let request = ApiRequest::new(server.uri(), Method::Get, "backend/action")
            .with_query(vec![(String::from("count"), String::from("64"))])
            .with_auth(Auth::Bearer(String::from("secret")));

        let response = transport.request(request).await.expect("response");
        assert_eq!(response.status, 200);
        assert_eq!(response.body, r#"{"totalResults":0}"#);
    }

    #[tokio::test]
    async fn test_http_transport_returns_error_statuses() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/authorization/token"))
            .and(header_is("authorization", "Basic Zm9vOmJhcg=="))
            .and(body_string("grant_type=client_credentials"))
            .respond_with(ResponseTemplate::new(401).set_body_string("denied"))
            .mount(&server)
            .await;

        let transport = HttpTransport::new(Duration::from_secs(5)).expect("client");
        let request = ApiRequest::new(format!("{}/", server.uri()), Method::Post, "/authorization/token")
            .with_auth(Auth::Basic {
                username: String::from("foo"),
                password: String::from("bar"),
            })
            .with_form("grant_type=client_credentials");

        let response = transport.request(request).await.expect("response");
        assert_eq!(response, RawResponse::new(401, "denied"));
    }

    #[tokio::test]
    async fn test_http_transport_network_error() {
        let transport = HttpTransport::new(Duration::from_secs(1)).expect("client");
        let request = ApiRequest::new("http://127.0.0.1:9", Method::Get, "backend/action");

        let err = transport.request(request).await.unwrap_err();
        assert!(matches!(err, TransportError::Network { .. }));
        assert!(err.response().is_none());
    }

    #[tokio::test]
    async fn test_memory_transport_queue_then_responder() {
        let transport = MemoryTransport::with_responder(|request: &ApiRequest| {
            RawResponse::new(404, format!("{{\"path\":\"{}\"}}", request.path))
        });
        transport.add_response(RawResponse::new(200, "{}"));

        let first = transport
            .request(ApiRequest::new("http://api", Method::Get, "a"))
            .await
            .expect("queued");
        let second = transport
            .request(ApiRequest::new("http://api", Method::Post, "b").with_json(json!({"name": "x"})))
            .await
            .expect("responder");

        assert_eq!(first.status, 200);
        assert_eq!(second.status, 404);
        assert_eq!(transport.requests().len(), 2);
        assert_eq!(transport.requests()[1].body, Some(RequestBody::Json(json!({"name": "x"}))));
    }

    #[tokio::test]
    async fn test_memory_transport_without_script_fails() {
        let transport = MemoryTransport::new();
        let result = transport
            .request(ApiRequest::new("http://api", Method::Get, "a"))
            .await;

        assert!(result.is_err());
        assert!(transport.requests().is_empty());
    }
}
