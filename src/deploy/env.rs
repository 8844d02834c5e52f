//! `${category.key}` placeholder substitution.
//!
//! Substitution runs on the raw text of a deploy file (and of every included
//! file) before it is parsed, so substituted strings are escaped the way they
//! would appear inside a double-quoted scalar.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::LazyLock;

use regex::Regex;
use serde_json::Value;
use tracing::trace;

use crate::error::InputError;

/// Category registered by default.
pub const ENV_CATEGORY: &str = "env";

static PLACEHOLDER: LazyLock<Regex> = LazyLock::new(|| {
    #[allow(clippy::unwrap_used)]
    Regex::new(r"\$\{([0-9A-Za-z_]+)\.([0-9A-Za-z_]+)\}").unwrap()
});

/// Produces the raw key/value snapshot of one category.
pub type Resolver = Box<dyn Fn() -> BTreeMap<String, Value> + Send + Sync>;

/// Materialized lookup table: lowercase category to lowercase key to scalar.
pub type Vars = BTreeMap<String, BTreeMap<String, Value>>;

/// Replaces `${category.key}` placeholders with values from named providers.
pub struct EnvSubstitutor {
    providers: BTreeMap<String, Resolver>,
}

impl fmt::Debug for EnvSubstitutor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EnvSubstitutor")
            .field("categories", &self.providers.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl EnvSubstitutor {
    /// Creates a substitutor whose `env` category serves the given snapshot.
    #[must_use]
    pub fn new(snapshot: BTreeMap<String, String>) -> Self {
        let mut substitutor = Self {
            providers: BTreeMap::new(),
        };
        substitutor.add_provider(ENV_CATEGORY, move || {
            snapshot
                .iter()
                .map(|(key, value)| (key.clone(), Value::String(value.clone())))
                .collect()
        });
        substitutor
    }

    /// Creates a substitutor over the current process environment.
    #[must_use]
    pub fn from_process_env() -> Self {
        Self::new(std::env::vars().collect())
    }

    /// Registers (or replaces) a category.
    pub fn add_provider<F>(&mut self, category: &str, resolver: F)
    where
        F: Fn() -> BTreeMap<String, Value> + Send + Sync + 'static,
    {
        self.providers
            .insert(category.to_lowercase(), Box::new(resolver));
    }

    /// Materializes every category once; non-scalar values are dropped.
    #[must_use]
    pub fn vars(&self) -> Vars {
        self.providers
            .iter()
            .map(|(category, resolver)| {
                let values = resolver()
                    .into_iter()
                    .filter(|(_, value)| is_scalar(value))
                    .map(|(key, value)| (key.to_lowercase(), value))
                    .collect();
                (category.clone(), values)
            })
            .collect()
    }

    /// Substitutes all placeholders in `text`, left to right.
    ///
    /// # Errors
    ///
    /// Returns an error if a placeholder names an unknown category or key.
    pub fn substitute(&self, text: &str) -> Result<String, InputError> {
        if !PLACEHOLDER.is_match(text) {
            return Ok(text.to_string());
        }

        let vars = self.vars();
        let mut output = String::with_capacity(text.len());
        let mut last = 0;

        for captures in PLACEHOLDER.captures_iter(text) {
            let (Some(whole), Some(category), Some(key)) =
                (captures.get(0), captures.get(1), captures.get(2))
            else {
                continue;
            };

            output.push_str(&text[last..whole.start()]);
            output.push_str(&lookup(&vars, category.as_str(), key.as_str())?);
            last = whole.end();
        }

        output.push_str(&text[last..]);
        Ok(output)
    }
}

fn lookup(vars: &Vars, category: &str, key: &str) -> Result<String, InputError> {
    let category = category.to_lowercase();
    let key = key.to_lowercase();

    let values = vars.get(&category).ok_or_else(|| InputError::UnknownCategory {
        category: category.clone(),
        known: vars.keys().cloned().collect(),
    })?;

    let value = values.get(&key).ok_or_else(|| InputError::UnknownKey {
        category: category.clone(),
        key: key.clone(),
        known: values.keys().cloned().collect(),
    })?;

    trace!("Substituting ${{{category}.{key}}}");
    Ok(render(value))
}

fn render(value: &Value) -> String {
    match value {
        Value::String(s) => escape(s),
        other => other.to_string(),
    }
}

/// JSON-escapes a string and drops the enclosing quotes.
fn escape(value: &str) -> String {
    let encoded = Value::String(value.to_string()).to_string();
    encoded
        .strip_prefix('"')
        .and_then(|s| s.strip_suffix('"'))
        .map_or_else(|| encoded.clone(), str::to_string)
}

const fn is_scalar(value: &Value) -> bool {
    matches!(value, Value::String(_) | Value::Number(_) | Value::Bool(_))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn substitutor() -> EnvSubstitutor {
        let mut env = BTreeMap::new();
        env.insert(String::from("FOO"), String::from("bar"));
        env.insert(String::from("Quoted"), String::from("foo\nbar\"test"));
        EnvSubstitutor::new(env)
    }

    #[test]
    fn test_case_insensitive_lookup() {
        let substitutor = substitutor();

        let lower = substitutor.substitute("a: ${env.foo}").expect("should substitute");
        let upper = substitutor.substitute("a: ${ENV.FOO}").expect("should substitute");

        assert_eq!(lower, "a: bar");
        assert_eq!(lower, upper);
    }

    #[test]
    fn test_escapes_quotes_and_newlines() {
        let substitutor = substitutor();

        let text = substitutor
            .substitute("value: \"${env.quoted}\"")
            .expect("should substitute");
        assert_eq!(text, r#"value: "foo\nbar\"test""#);

        let parsed: serde_yaml::Value = serde_yaml::from_str(&text).expect("should parse");
        assert_eq!(parsed["value"].as_str(), Some("foo\nbar\"test"));
    }

    #[test]
    fn test_unknown_category_lists_known() {
        let err = substitutor().substitute("${foo.bar}").unwrap_err();

        assert!(matches!(err, InputError::UnknownCategory { .. }));
        assert!(err.to_string().contains("(env)"));
    }

    #[test]
    fn test_unknown_key_lists_known() {
        let err = substitutor().substitute("${env.missing}").unwrap_err();

        assert!(matches!(err, InputError::UnknownKey { .. }));
        assert!(err.to_string().contains("foo"));
        assert!(err.to_string().contains("quoted"));
    }

    #[test]
    fn test_additional_provider_and_scalars_only() {
        let mut substitutor = substitutor();
        substitutor.add_provider("App", || {
            let mut values = BTreeMap::new();
            values.insert(String::from("port"), json!(8080));
            values.insert(String::from("debug"), json!(true));
            values.insert(String::from("hosts"), json!(["a", "b"]));
            values
        });

        let text = substitutor
            .substitute("${app.PORT} ${APP.debug}")
            .expect("should substitute");
        assert_eq!(text, "8080 true");

        let err = substitutor.substitute("${app.hosts}").unwrap_err();
        assert!(matches!(err, InputError::UnknownKey { .. }));
    }

    #[test]
    fn test_text_without_placeholders_is_untouched() {
        let text = "connection:\n  Default: {class: Sql}\n";
        assert_eq!(substitutor().substitute(text).expect("should pass"), text);
    }
}
