//! Backend client.
//!
//! This module provides the pieces used to talk to the backend:
//! - [`Transport`] implementations (HTTP and in-memory)
//! - Response parsing
//! - Token handling ([`Authenticator`], [`TokenStore`])
//! - The entity API ([`Client`])

mod api;
mod auth;
mod parser;
mod transport;

pub use api::{parse_payload, Client, ListQuery};
pub use auth::{Authenticator, Credentials, TokenStore};
pub use parser::ResponseParser;
pub use transport::{
    ApiRequest, Auth, HttpTransport, MemoryTransport, Method, RequestBody, Transport, USER_AGENT,
};

#[cfg(test)]
pub use transport::MockTransport;
