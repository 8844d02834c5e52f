//! `!include` resolution.

use std::path::Path;

use serde_yaml::Value;
use tracing::debug;

use crate::builder::{BuilderContext, BuilderRegistry, BUILDER_EXTENSION};
use crate::error::InputError;
use crate::kind::Kind;

use super::env::EnvSubstitutor;
use super::yaml;

/// Replaces `!include path[#pointer]` values with the referenced content.
#[derive(Debug, Clone, Copy)]
pub struct IncludeResolver<'a> {
    env: &'a EnvSubstitutor,
    builders: &'a BuilderRegistry,
}

impl<'a> IncludeResolver<'a> {
    /// Creates a resolver using `env` for included files and `builders` for
    /// `.builder` includes.
    #[must_use]
    pub const fn new(env: &'a EnvSubstitutor, builders: &'a BuilderRegistry) -> Self {
        Self { env, builders }
    }

    /// Resolves a declaration of `kind`.
    ///
    /// Mappings and sequences are returned unchanged. Nested includes inside
    /// the result are left for the caller.
    ///
    /// # Errors
    ///
    /// Returns an error if the value is not a declaration, the tag is not
    /// `!include`, the file is missing or cannot be parsed, or the pointer
    /// does not exist.
    pub fn resolve(&self, value: &Value, base_path: &Path, kind: Kind) -> Result<Value, InputError> {
        match value {
            Value::Tagged(_) => {
                let payload = yaml::include_payload(value)?.unwrap_or_default();
                self.resolve_include(payload, base_path, kind)
            }
            Value::Mapping(_) | Value::Sequence(_) => Ok(value.clone()),
            _ => Err(InputError::InvalidDeclaration {
                kind: capitalize(kind.as_str()),
            }),
        }
    }

    fn resolve_include(&self, payload: &str, base_path: &Path, kind: Kind) -> Result<Value, InputError> {
        let (file, fragment) = yaml::split_fragment(payload);
        let path = base_path.join(file);

        if !path.is_file() {
            return Err(InputError::FileNotFound { path });
        }

        if path.extension().is_some_and(|ext| ext == BUILDER_EXTENSION) {
            let name = path
                .file_stem()
                .map(|stem| stem.to_string_lossy().into_owned())
                .unwrap_or_default();
            debug!("Running builder {name} for {kind}");

            let context = BuilderContext::new(self.env.vars());
            let built = self.builders.run(kind, &name, &context)?;
            return yaml::from_json(&built);
        }

        debug!("Including {}", path.display());
        let text = std::fs::read_to_string(&path).map_err(|e| {
            InputError::parse(
                format!("Failed to read file: {e}"),
                Some(path.display().to_string()),
            )
        })?;
        let data = yaml::parse(&self.env.substitute(&text)?, Some(&path))?;

        match fragment {
            Some(pointer) => yaml::pointer(&data, pointer)
                .cloned()
                .ok_or_else(|| InputError::PointerNotFound {
                    pointer: pointer.to_string(),
                    path,
                }),
            None => Ok(data),
        }
    }
}

fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    chars.next().map_or_else(String::new, |first| {
        first.to_uppercase().chain(chars).collect()
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    use crate::builder::{EntityBuilder, HttpMethod};

    fn env() -> EnvSubstitutor {
        EnvSubstitutor::new(BTreeMap::from([(String::from("HOST"), String::from("db.local"))]))
    }

    fn fixture() -> tempfile::TempDir {
        let dir = tempfile::tempdir().expect("tempdir");
        std::fs::write(
            dir.path().join("connection.yaml"),
            "Default:\n  class: Sql\n  config:\n    host: \"${env.host}\"\n",
        )
        .expect("write fixture");
        std::fs::write(
            dir.path().join("nested.yaml"),
            "a:\n  b:\n    - first\n    - {c: second}\n",
        )
        .expect("write fixture");
        dir
    }

    #[test]
    fn test_inline_declarations_are_identity() {
        let env = env();
        let builders = BuilderRegistry::new();
        let resolver = IncludeResolver::new(&env, &builders);

        let mapping = yaml::parse("class: Sql\nconfig: {}\n", None).expect("yaml");
        let sequence = yaml::parse("[1, 2]", None).expect("yaml");

        assert_eq!(resolver.resolve(&mapping, Path::new("."), Kind::Connection).expect("mapping"), mapping);
        assert_eq!(resolver.resolve(&sequence, Path::new("."), Kind::Connection).expect("sequence"), sequence);
    }

    #[test]
    fn test_scalars_are_rejected() {
        let env = env();
        let builders = BuilderRegistry::new();
        let resolver = IncludeResolver::new(&env, &builders);

        let err = resolver
            .resolve(&Value::String(String::from("foo")), Path::new("."), Kind::Connection)
            .unwrap_err();

        assert!(matches!(err, InputError::InvalidDeclaration { .. }));
        assert!(err.to_string().starts_with("Connection must be"));
        assert!(resolver.resolve(&Value::Null, Path::new("."), Kind::Action).is_err());
    }

    #[test]
    fn test_include_whole_file_with_substitution() {
        let dir = fixture();
        let env = env();
        let builders = BuilderRegistry::new();
        let resolver = IncludeResolver::new(&env, &builders);

        let value = yaml::parse("!include connection.yaml", None).expect("yaml");
        let resolved = resolver.resolve(&value, dir.path(), Kind::Connection).expect("resolve");

        assert_eq!(resolved["Default"]["config"]["host"].as_str(), Some("db.local"));
    }

    #[test]
    fn test_include_with_pointer() {
        let dir = fixture();
        let env = env();
        let builders = BuilderRegistry::new();
        let resolver = IncludeResolver::new(&env, &builders);

        let value = yaml::parse("!include nested.yaml#/a/b/1", None).expect("yaml");
        let resolved = resolver.resolve(&value, dir.path(), Kind::Schema).expect("resolve");
        assert_eq!(resolved["c"].as_str(), Some("second"));

        let missing = yaml::parse("!include nested.yaml#/a/x", None).expect("yaml");
        assert!(matches!(
            resolver.resolve(&missing, dir.path(), Kind::Schema),
            Err(InputError::PointerNotFound { .. })
        ));
    }

    #[test]
    fn test_missing_file_and_invalid_tag() {
        let dir = fixture();
        let env = env();
        let builders = BuilderRegistry::new();
        let resolver = IncludeResolver::new(&env, &builders);

        let missing = yaml::parse("!include missing.yaml", None).expect("yaml");
        assert!(matches!(
            resolver.resolve(&missing, dir.path(), Kind::Action),
            Err(InputError::FileNotFound { .. })
        ));

        let tagged = yaml::parse("!env FOO", None).expect("yaml");
        assert!(matches!(
            resolver.resolve(&tagged, dir.path(), Kind::Action),
            Err(InputError::InvalidTag { .. })
        ));
    }

    #[test]
    fn test_builder_include() {
        let dir = fixture();
        std::fs::write(dir.path().join("delete_todo.builder"), "").expect("write marker");

        let env = env();
        let mut builders = BuilderRegistry::new();
        builders.register("delete_todo", |builder: &mut EntityBuilder, _: &BuilderContext| {
            let EntityBuilder::Operation(operation) = builder;
            operation.set_http_method(HttpMethod::Delete).set_http_path("/todo/:id");
        });
        let resolver = IncludeResolver::new(&env, &builders);

        let value = yaml::parse("!include delete_todo.builder", None).expect("yaml");
        let resolved = resolver.resolve(&value, dir.path(), Kind::Operation).expect("resolve");
        assert_eq!(resolved["httpMethod"].as_str(), Some("DELETE"));

        assert!(matches!(
            resolver.resolve(&value, dir.path(), Kind::Schema),
            Err(InputError::UnsupportedBuilder { .. })
        ));
    }
}
