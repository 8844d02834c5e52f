//! Deploy orchestration.
//!
//! A deploy file is turned into an import document in a fixed sequence:
//! substitute `${category.key}` placeholders, parse the YAML, resolve
//! section-level includes, then run every kind's transform in import order.
//! The document is then handed to the [`Importer`], whose run yields one
//! result per entity.
//!
//! ```yaml
//! schema:
//!   Todo: !include resources/schema/todo.json
//! operation:
//!   todo.get:
//!     httpMethod: GET
//!     httpPath: /todo
//!     outgoing: Todo
//!     action: action://Todo-Get
//! ```

pub mod env;
pub mod include;
pub mod names;
pub mod transformer;
pub mod yaml;

use std::path::{Path, PathBuf};

use serde_yaml::Value;
use tracing::{debug, info};

use crate::builder::BuilderRegistry;
use crate::client::Transport;
use crate::error::Result;
use crate::import::{ImportRun, Importer};
use crate::model::ImportDocument;

use env::EnvSubstitutor;
use include::IncludeResolver;
use names::TypeRegistry;
use transformer::{transform_section, TransformContext, TRANSFORMERS};

/// Builds the import document for a deploy file.
///
/// An empty file, or one whose root is not a mapping, yields an empty
/// document. Includes are resolved against `base_path`, which defaults to
/// the current directory. Top-level keys that are not kinds are ignored.
///
/// # Errors
///
/// Returns an error if substitution, parsing, include resolution or any
/// transform fails. Nothing has been sent at that point.
pub fn build_document(
    yaml_text: &str,
    env: &EnvSubstitutor,
    base_path: Option<&Path>,
    builders: &BuilderRegistry,
    types: &TypeRegistry,
) -> Result<ImportDocument> {
    let mut document = ImportDocument::new();

    let substituted = env.substitute(yaml_text)?;
    let Value::Mapping(root) = yaml::parse(&substituted, None)? else {
        debug!("Deploy file holds no mapping, nothing to deploy");
        return Ok(document);
    };
    if root.is_empty() {
        return Ok(document);
    }

    let base_path: PathBuf = match base_path {
        Some(path) => path.to_path_buf(),
        None => std::env::current_dir()?,
    };

    let context = TransformContext {
        resolver: IncludeResolver::new(env, builders),
        types,
        base_path: &base_path,
    };

    for (kind, transform) in TRANSFORMERS {
        let Some(section) = root.get(kind.as_str()) else {
            continue;
        };

        let section = match section {
            Value::Tagged(_) => context.resolver.resolve(section, &base_path, kind)?,
            _ => section.clone(),
        };

        transform_section(&context, kind, transform, &section, &mut document)?;
    }

    info!("Deploy file declares {} entities", document.total());
    Ok(document)
}

/// Applies deploy files to the backend.
#[derive(Debug)]
pub struct Deployer<T: Transport> {
    importer: Importer<T>,
    builders: BuilderRegistry,
    types: TypeRegistry,
}

impl<T: Transport> Deployer<T> {
    /// Creates a deployer without builders or known types.
    #[must_use]
    pub fn new(importer: Importer<T>) -> Self {
        Self {
            importer,
            builders: BuilderRegistry::new(),
            types: TypeRegistry::new(),
        }
    }

    /// Sets the scripts run for `.builder` includes.
    #[must_use]
    pub fn with_builders(mut self, builders: BuilderRegistry) -> Self {
        self.builders = builders;
        self
    }

    /// Sets the types accepted as class-like schema references.
    #[must_use]
    pub fn with_types(mut self, types: TypeRegistry) -> Self {
        self.types = types;
        self
    }

    /// Builds the import document for a deploy file.
    ///
    /// # Errors
    ///
    /// See [`build_document`].
    pub fn build_document(
        &self,
        yaml_text: &str,
        env: &EnvSubstitutor,
        base_path: Option<&Path>,
    ) -> Result<ImportDocument> {
        build_document(yaml_text, env, base_path, &self.builders, &self.types)
    }

    /// Deploys a file, returning the run that reconciles its entities.
    ///
    /// All input errors surface here, before the first request.
    ///
    /// # Errors
    ///
    /// Returns an error if the document cannot be built.
    pub fn deploy(
        &self,
        yaml_text: &str,
        env: &EnvSubstitutor,
        base_path: Option<&Path>,
    ) -> Result<ImportRun<'_, T>> {
        let document = self.build_document(yaml_text, env, base_path)?;
        if document.is_empty() {
            return Ok(ImportRun::empty(self.importer.client()));
        }

        self.importer.import(&document.to_json()?)
    }
}
