// ============================================================================
// Linting
// ============================================================================

#![deny(unsafe_code)]                 // Unsafe code is forbidden
#![warn(missing_docs)]                // Public items should be documented
#![deny(non_camel_case_types)]        // Types must follow CamelCase convention
#![deny(unused_must_use)]             // Must handle Result and Option explicitly
#![deny(nonstandard_style)]           // Non-standard code style is forbidden

// Clippy lints (warnings only)
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]
#![warn(clippy::panic)]
#![warn(clippy::print_stdout)]
#![warn(clippy::todo)]
#![warn(clippy::unimplemented)]
#![warn(clippy::unwrap_in_result)]
#![warn(clippy::redundant_clone)]
#![cfg_attr(test, allow(clippy::unwrap_used, clippy::expect_used))]

// Safety and robustness lints
#![deny(overflowing_literals)]
#![deny(arithmetic_overflow)]

// ============================================================================
// Crate Documentation
// ============================================================================

//! # Apiman
//!
//! A declarative deploy, import and export client for an API-management
//! backend.
//!
//! ## Overview
//!
//! A deploy file describes the entities of a backend (actions, schemas,
//! operations, ...) as YAML. Apiman turns it into an import document and
//! reconciles every entity against the backend: entities that exist by name
//! are updated, all others are created.
//!
//! ## Pipeline
//!
//! 1. **Substitute**: `${env.KEY}` placeholders are replaced in the raw text
//! 2. **Resolve**: `!include path[#/pointer]` values are loaded from disk
//! 3. **Transform**: every kind is normalized (canonical `schema://` and
//!    `action://` references, schema pruning, defaults)
//! 4. **Import**: entities are reconciled one at a time, in a fixed kind
//!    order, and every entity yields a `CREATED`, `UPDATED` or `FAILED`
//!    result
//!
//! ## Modules
//!
//! - [`deploy`]: Substitution, includes, naming, transforms and the deployer
//! - [`import`]: Lazy import reconciler
//! - [`export`]: Export of backend entities
//! - [`client`]: Transport, authentication and entity API
//! - [`model`]: Import document and results
//! - [`builder`]: Builder scripts for `.builder` includes
//! - [`config`]: Runtime settings
//! - [`cli`]: Command-line interface
//!
//! ## Example
//!
//! ```yaml
//! scope:
//!   todo:
//!     description: Todo scope
//! schema:
//!   Todo: !include resources/schema/todo.json
//! operation:
//!   todo.getAll:
//!     httpMethod: GET
//!     httpPath: /todo
//!     outgoing: Todo
//!     action: Todo-GetAll
//! ```

// ============================================================================
// Modules
// ============================================================================

pub mod builder;
pub mod cli;
pub mod client;
pub mod config;
pub mod deploy;
pub mod error;
pub mod export;
pub mod import;
pub mod kind;
pub mod model;

// ============================================================================
// Re-exports
// ============================================================================

pub use builder::{BuilderRegistry, EntityBuilder, OperationBuilder};
pub use cli::{Cli, Commands, OutputFormatter};
pub use client::{Authenticator, Client, HttpTransport, MemoryTransport, TokenStore, Transport};
pub use config::Settings;
pub use deploy::env::EnvSubstitutor;
pub use deploy::{build_document, Deployer};
pub use error::{ApimanError, Result};
pub use export::Exporter;
pub use import::{ImportRun, Importer};
pub use kind::Kind;
pub use model::{ImportDocument, ImportResult, ResultAction};
