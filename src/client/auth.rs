//! Access token handling.
//!
//! The token obtained by `login` is stored as a small JSON file
//! (`{access_token, base_uri, obtained_at}`) and read back by every other
//! command.

use std::fmt;
use std::path::{Path, PathBuf};

use chrono::Utc;
use serde_json::{Map, Value};
use tokio::fs;
use tracing::{debug, info};

use crate::error::{Result, TokenError, TransportError};

use super::parser::ResponseParser;
use super::transport::{ApiRequest, Auth, Method, Transport};

/// Base URI and bearer token of a logged in session.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    /// Base URI of the backend.
    pub base_uri: String,
    /// Bearer token.
    pub access_token: String,
}

impl Credentials {
    /// Creates credentials.
    #[must_use]
    pub fn new(base_uri: impl Into<String>, access_token: impl Into<String>) -> Self {
        Self {
            base_uri: base_uri.into(),
            access_token: access_token.into(),
        }
    }

    /// Authorization for requests made with these credentials.
    #[must_use]
    pub fn auth(&self) -> Auth {
        Auth::Bearer(self.access_token.clone())
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("base_uri", &self.base_uri)
            .field("access_token", &"***")
            .finish()
    }
}

/// File-based token storage.
#[derive(Debug, Clone)]
pub struct TokenStore {
    path: PathBuf,
}

impl TokenStore {
    /// Creates a store backed by `path`.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Location of the token file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns true if a token file exists.
    #[must_use]
    pub fn exists(&self) -> bool {
        self.path.is_file()
    }

    /// Reads the stored token.
    ///
    /// # Errors
    ///
    /// Returns an error if no token is stored or the file is corrupted.
    pub async fn load(&self) -> std::result::Result<Map<String, Value>, TokenError> {
        if !self.exists() {
            return Err(TokenError::Missing {
                path: self.path.clone(),
            });
        }

        let content = fs::read_to_string(&self.path)
            .await
            .map_err(|e| TokenError::Corrupted {
                message: format!("Failed to read token file: {e}"),
            })?;

        match serde_json::from_str(&content) {
            Ok(Value::Object(token)) => Ok(token),
            Ok(_) => Err(TokenError::Corrupted {
                message: String::from("token must be a JSON object"),
            }),
            Err(e) => Err(TokenError::Corrupted {
                message: e.to_string(),
            }),
        }
    }

    /// Reads one string field of the stored token.
    ///
    /// # Errors
    ///
    /// Returns an error if no token is stored or the field is missing.
    pub async fn value(&self, key: &str) -> std::result::Result<String, TokenError> {
        self.load()
            .await?
            .get(key)
            .and_then(Value::as_str)
            .map(String::from)
            .ok_or_else(|| TokenError::MissingField {
                key: key.to_string(),
            })
    }

    /// Reads the base URI and access token.
    ///
    /// # Errors
    ///
    /// Returns an error if no token is stored or a field is missing.
    pub async fn credentials(&self) -> std::result::Result<Credentials, TokenError> {
        let token = self.load().await?;
        let field = |key: &str| {
            token
                .get(key)
                .and_then(Value::as_str)
                .map(String::from)
                .ok_or_else(|| TokenError::MissingField {
                    key: key.to_string(),
                })
        };

        Ok(Credentials::new(field("base_uri")?, field("access_token")?))
    }

    /// Writes the token.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written.
    pub async fn save(&self, token: &Map<String, Value>) -> std::result::Result<(), TokenError> {
        let write_error = |message: String| TokenError::Write {
            path: self.path.clone(),
            message,
        };

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| write_error(e.to_string()))?;
        }

        let content = serde_json::to_string(token).map_err(|e| write_error(e.to_string()))?;
        fs::write(&self.path, content)
            .await
            .map_err(|e| write_error(e.to_string()))?;

        debug!("Token written to {}", self.path.display());
        Ok(())
    }

    /// Deletes the token file; returns whether one existed.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be removed.
    pub async fn remove(&self) -> Result<bool> {
        if !self.exists() {
            return Ok(false);
        }

        fs::remove_file(&self.path).await?;
        Ok(true)
    }
}

/// Obtains, inspects and revokes access tokens.
#[derive(Debug)]
pub struct Authenticator<T: Transport> {
    transport: T,
    store: TokenStore,
}

impl<T: Transport> Authenticator<T> {
    /// Creates an authenticator.
    #[must_use]
    pub const fn new(transport: T, store: TokenStore) -> Self {
        Self { transport, store }
    }

    /// The token store.
    #[must_use]
    pub const fn store(&self) -> &TokenStore {
        &self.store
    }

    /// Requests a token with the client credentials grant and stores it.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend rejects the credentials, the response
    /// carries no token, or the token cannot be stored.
    pub async fn request_access_token(
        &self,
        base_uri: &str,
        username: &str,
        password: &str,
    ) -> Result<String> {
        let request = ApiRequest::new(base_uri, Method::Post, "authorization/token")
            .with_auth(Auth::Basic {
                username: username.to_string(),
                password: password.to_string(),
            })
            .with_form("grant_type=client_credentials");

        let response = self.transport.request(request).await?;
        let mut token = ResponseParser::parse(response.clone())?;

        let access_token = match token.get("access_token").and_then(Value::as_str) {
            Some(access_token) => access_token.to_string(),
            None => {
                return Err(TransportError::InvalidBody {
                    message: String::from("Could not find access token in body"),
                    response,
                }
                .into());
            }
        };

        token.insert(String::from("base_uri"), Value::from(base_uri));
        token.insert(String::from("obtained_at"), Value::from(Utc::now().to_rfc3339()));
        self.store.save(&token).await?;

        info!("Obtained access token for {base_uri}");
        Ok(access_token)
    }

    /// Returns true if a usable token is stored.
    pub async fn has_access_token(&self) -> bool {
        self.store
            .value("access_token")
            .await
            .is_ok_and(|token| !token.is_empty())
    }

    /// Reads the stored credentials.
    ///
    /// # Errors
    ///
    /// Returns an error if no token is stored.
    pub async fn credentials(&self) -> Result<Credentials> {
        Ok(self.store.credentials().await?)
    }

    /// Asks the backend who the token belongs to.
    ///
    /// # Errors
    ///
    /// Returns an error if no token is stored or the backend call fails.
    pub async fn whoami(&self) -> Result<Map<String, Value>> {
        let credentials = self.credentials().await?;
        let request = ApiRequest::new(&credentials.base_uri, Method::Get, "authorization/whoami")
            .with_auth(credentials.auth());

        let response = self.transport.request(request).await?;
        Ok(ResponseParser::parse(response)?)
    }

    /// Revokes the stored token and deletes it. Does nothing without a token.
    ///
    /// # Errors
    ///
    /// Returns an error if the token is unreadable or the file cannot be deleted.
    pub async fn remove_access_token(&self) -> Result<()> {
        if !self.store.exists() {
            return Ok(());
        }

        let credentials = self.credentials().await?;
        let request = ApiRequest::new(&credentials.base_uri, Method::Post, "authorization/revoke")
            .with_auth(credentials.auth());

        if let Err(e) = self.transport.request(request).await {
            debug!("Token revocation failed: {e}");
        }

        self.store.remove().await?;
        info!("Removed access token");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use crate::client::transport::{MemoryTransport, RequestBody};
    use crate::error::{ApimanError, RawResponse};

    fn store(dir: &tempfile::TempDir) -> TokenStore {
        TokenStore::new(dir.path().join("token.json"))
    }

    #[tokio::test]
    async fn test_login_stores_token() {
        let dir = tempfile::tempdir().expect("tempdir");
        let transport = Arc::new(MemoryTransport::new());
        transport.add_response(RawResponse::new(200, r#"{"access_token":"2YotnFZFEjr1zCsicMWpAA"}"#));

        let authenticator = Authenticator::new(Arc::clone(&transport), store(&dir));
        let token = authenticator
            .request_access_token("https://api.acme.com", "foo", "bar")
            .await
            .expect("token");
        assert_eq!(token, "2YotnFZFEjr1zCsicMWpAA");

        let requests = transport.requests();
        assert_eq!(requests[0].path, "authorization/token");
        assert_eq!(
            requests[0].auth,
            Some(Auth::Basic {
                username: String::from("foo"),
                password: String::from("bar"),
            })
        );
        assert_eq!(
            requests[0].body,
            Some(RequestBody::Form(String::from("grant_type=client_credentials")))
        );

        let credentials = authenticator.credentials().await.expect("credentials");
        assert_eq!(credentials.base_uri, "https://api.acme.com");
        assert_eq!(credentials.access_token, "2YotnFZFEjr1zCsicMWpAA");
        assert!(authenticator.store().load().await.expect("token").contains_key("obtained_at"));
    }

    #[tokio::test]
    async fn test_login_without_token_in_body() {
        let dir = tempfile::tempdir().expect("tempdir");
        let transport = MemoryTransport::new();
        transport.add_response(RawResponse::new(200, r#"{"token_type":"bearer"}"#));

        let authenticator = Authenticator::new(transport, store(&dir));
        let result = authenticator.request_access_token("https://api.acme.com", "foo", "bar").await;

        assert!(matches!(
            result,
            Err(ApimanError::Transport(TransportError::InvalidBody { .. }))
        ));
        assert!(!authenticator.store().exists());
    }

    #[tokio::test]
    async fn test_missing_token() {
        let dir = tempfile::tempdir().expect("tempdir");
        let authenticator = Authenticator::new(MemoryTransport::new(), store(&dir));

        assert!(!authenticator.has_access_token().await);
        assert!(matches!(
            authenticator.credentials().await,
            Err(ApimanError::Token(TokenError::Missing { .. }))
        ));
    }

    #[tokio::test]
    async fn test_missing_field() {
        let dir = tempfile::tempdir().expect("tempdir");
        std::fs::write(dir.path().join("token.json"), r#"{"access_token":"abc"}"#).expect("write");

        let result = store(&dir).credentials().await;
        assert!(matches!(result, Err(TokenError::MissingField { key }) if key == "base_uri"));
    }

    #[tokio::test]
    async fn test_logout_revokes_and_deletes() {
        let dir = tempfile::tempdir().expect("tempdir");
        std::fs::write(
            dir.path().join("token.json"),
            r#"{"access_token":"abc","base_uri":"https://api.acme.com"}"#,
        )
        .expect("write");

        let transport = Arc::new(MemoryTransport::new());
        transport.add_response(RawResponse::new(200, r#"{"success":true}"#));

        let authenticator = Authenticator::new(Arc::clone(&transport), store(&dir));
        authenticator.remove_access_token().await.expect("logout");

        assert!(!authenticator.store().exists());
        let requests = transport.requests();
        assert_eq!(requests[0].path, "authorization/revoke");
        assert_eq!(requests[0].auth, Some(Auth::Bearer(String::from("abc"))));
    }
}
