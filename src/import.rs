//! Import reconciler.
//!
//! An [`ImportRun`] walks the import document kind by kind (in
//! [`Kind::ALL`] order) and reconciles one entity per
//! [`ImportRun::next_result`] call: look the entity up by name, then create
//! or update it. A failing entity yields a `FAILED` result and never stops
//! the entities after it. Dropping the run stops processing.

use std::collections::VecDeque;

use serde_json::Value;
use tracing::{debug, warn};

use crate::client::{Client, ResponseParser, Transport};
use crate::error::{ApimanError, InputError, Result};
use crate::kind::Kind;
use crate::model::{entity_id, validate_entry, ImportResult, ResultAction};

/// Applies import documents to the backend.
#[derive(Debug)]
pub struct Importer<T: Transport> {
    client: Client<T>,
}

impl<T: Transport> Importer<T> {
    /// Creates an importer.
    #[must_use]
    pub const fn new(client: Client<T>) -> Self {
        Self { client }
    }

    /// The underlying client.
    #[must_use]
    pub const fn client(&self) -> &Client<T> {
        &self.client
    }

    /// Prepares a run over a JSON import document.
    ///
    /// No request is sent until the first result is pulled.
    ///
    /// # Errors
    ///
    /// Returns an error if the document is not a JSON object.
    pub fn import(&self, document: &str) -> Result<ImportRun<'_, T>> {
        let document = match serde_json::from_str::<Value>(document) {
            Ok(Value::Object(document)) => document,
            Ok(_) => {
                return Err(InputError::MalformedDocument {
                    message: String::from("import document must be a JSON object"),
                }
                .into());
            }
            Err(e) => {
                return Err(InputError::MalformedDocument {
                    message: e.to_string(),
                }
                .into());
            }
        };

        let mut pending = VecDeque::new();
        for kind in Kind::ALL {
            let Some(Value::Array(entries)) = document.get(kind.as_str()) else {
                continue;
            };

            pending.extend(
                entries
                    .iter()
                    .filter(|entry| entry.is_object())
                    .map(|entry| (kind, entry.clone())),
            );
        }

        debug!("Import document holds {} entities", pending.len());
        Ok(ImportRun {
            client: &self.client,
            pending,
        })
    }
}

/// A lazily reconciled import.
#[derive(Debug)]
pub struct ImportRun<'a, T: Transport> {
    client: &'a Client<T>,
    pending: VecDeque<(Kind, Value)>,
}

impl<'a, T: Transport> ImportRun<'a, T> {
    /// A run with nothing to reconcile.
    #[must_use]
    pub const fn empty(client: &'a Client<T>) -> Self {
        Self {
            client,
            pending: VecDeque::new(),
        }
    }

    /// Entities not reconciled yet.
    #[must_use]
    pub fn remaining(&self) -> usize {
        self.pending.len()
    }

    /// Reconciles the next entity. Returns `None` once all are done.
    pub async fn next_result(&mut self) -> Option<ImportResult> {
        let (kind, entry) = self.pending.pop_front()?;
        Some(self.reconcile(kind, &entry).await)
    }

    /// Reconciles all remaining entities.
    pub async fn collect(mut self) -> Vec<ImportResult> {
        let mut results = Vec::with_capacity(self.pending.len());
        while let Some(result) = self.next_result().await {
            results.push(result);
        }
        results
    }

    async fn reconcile(&self, kind: Kind, entry: &Value) -> ImportResult {
        let name = entry
            .get(kind.natural_key())
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();

        if let Err(e) = validate_entry(kind, entry) {
            return failed(kind, &name, &ApimanError::from(e));
        }

        let (action, outcome) = match self.client.get_by_name(kind, &name).await {
            Ok(existing) => {
                let Some(id) = entity_id(&existing) else {
                    return failed(
                        kind,
                        &name,
                        &ApimanError::internal("existing entity carries no id"),
                    );
                };
                debug!("Updating {kind} {name} ({id})");
                (ResultAction::Updated, self.client.update(kind, &id, entry).await)
            }
            Err(ApimanError::Transport(e)) if e.is_not_found() => {
                debug!("Creating {kind} {name}");
                (ResultAction::Created, self.client.create(kind, entry).await)
            }
            Err(e) => return failed(kind, &name, &e),
        };

        match outcome {
            Ok(body) => match ResponseParser::failure_message(&body) {
                Some(message) => {
                    warn!("{kind} {name} was rejected: {message}");
                    ImportResult::new(kind, ResultAction::Failed, format!("{name}: {message}"))
                }
                None => ImportResult::new(kind, action, name),
            },
            Err(e) => failed(kind, &name, &e),
        }
    }
}

fn failed(kind: Kind, name: &str, error: &ApimanError) -> ImportResult {
    warn!("{kind} {name} failed: {error}");

    let response = match error {
        ApimanError::Transport(e) => e.response().cloned(),
        _ => None,
    };

    ImportResult::new(kind, ResultAction::Failed, format!("{name}: {}", error.detail()))
        .with_response(response)
}
