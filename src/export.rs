//! Export of backend entities into an import document.

use serde_json::{Map, Value};
use tracing::{debug, info, warn};

use crate::client::{Client, ListQuery, Transport};
use crate::config::COLLECTION_SIZE;
use crate::error::{ApimanError, Result};
use crate::kind::Kind;
use crate::model::entity_id;

/// Reads all entities from the backend.
#[derive(Debug)]
pub struct Exporter<T: Transport> {
    client: Client<T>,
    page_size: u32,
}

impl<T: Transport> Exporter<T> {
    /// Creates an exporter using the default page size.
    #[must_use]
    pub const fn new(client: Client<T>) -> Self {
        Self {
            client,
            page_size: COLLECTION_SIZE,
        }
    }

    /// Sets the page size.
    #[must_use]
    pub const fn with_page_size(mut self, page_size: u32) -> Self {
        self.page_size = page_size;
        self
    }

    /// Exports every kind as a pretty printed JSON import document.
    ///
    /// Kinds without entities are omitted.
    ///
    /// # Errors
    ///
    /// Returns an error if any request fails.
    pub async fn export(&self) -> Result<String> {
        let mut document = Map::new();

        for kind in Kind::ALL {
            let entries = self.export_kind(kind).await?;
            info!("Exported {} {kind} entities", entries.len());

            if !entries.is_empty() {
                document.insert(kind.as_str().to_string(), Value::Array(entries));
            }
        }

        serde_json::to_string_pretty(&Value::Object(document))
            .map_err(|e| ApimanError::internal(format!("Failed to encode export: {e}")))
    }

    async fn export_kind(&self, kind: Kind) -> Result<Vec<Value>> {
        let mut entries = Vec::new();
        let mut start_index: u32 = 0;

        loop {
            let query = ListQuery {
                start_index: Some(start_index),
                count: Some(self.page_size),
                search: None,
                sort_by: Some(String::from("id")),
                sort_order: Some(0),
            };
            let page = self.client.get_all(kind, &query).await?;

            let total = page.get("totalResults").and_then(Value::as_u64).unwrap_or(0);
            let items = match page.get("entry") {
                Some(Value::Array(items)) if !items.is_empty() => items,
                _ => break,
            };

            for item in items.iter().filter_map(Value::as_object) {
                let Some(id) = entity_id(item) else {
                    warn!("Skipping {kind} entry without id");
                    continue;
                };

                let mut entity = self.client.get_by_id(kind, &id).await?;
                for field in kind.export_excluded_fields() {
                    entity.remove(*field);
                }
                entries.push(Value::Object(entity));
            }

            let fetched = u32::try_from(items.len()).unwrap_or(u32::MAX);
            start_index = start_index.saturating_add(fetched);
            debug!("Fetched {start_index} of {total} {kind} entities");

            if u64::from(start_index) >= total {
                break;
            }
        }

        Ok(entries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use serde_json::json;

    use crate::client::{ApiRequest, Credentials, MemoryTransport};
    use crate::error::RawResponse;

    fn exporter(transport: &Arc<MemoryTransport>) -> Exporter<Arc<MemoryTransport>> {
        Exporter::new(Client::new(
            Arc::clone(transport),
            Credentials::new("https://api.acme.com", "token"),
        ))
        .with_page_size(2)
    }

    fn query_value<'a>(request: &'a ApiRequest, key: &str) -> Option<&'a str> {
        request
            .query
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Three cronjobs, nothing else.
    fn backend(request: &ApiRequest) -> RawResponse {
        match request.path.as_str() {
            "backend/cronjob" => {
                let body = match query_value(request, "startIndex") {
                    Some("0") => r#"{"totalResults":3,"entry":[{"id":1},{"id":2}]}"#,
                    _ => r#"{"totalResults":3,"entry":[{"id":3}]}"#,
                };
                RawResponse::new(200, body)
            }
            path if path.starts_with("backend/cronjob/") => {
                let id = path.trim_start_matches("backend/cronjob/");
                RawResponse::new(
                    200,
                    format!(r#"{{"id":{id},"status":1,"name":"job{id}","cron":"0 * * * *","executeDate":"2024-01-01","exitCode":0}}"#),
                )
            }
            _ => RawResponse::new(200, r#"{"totalResults":0,"entry":[]}"#),
        }
    }

    #[tokio::test]
    async fn test_export_pages_and_strips_fields() {
        let transport = Arc::new(MemoryTransport::with_responder(backend));
        let exported = exporter(&transport).export().await.expect("export");

        let document: Value = serde_json::from_str(&exported).expect("json");
        assert_eq!(
            document,
            json!({
                "cronjob": [
                    {"name": "job1", "cron": "0 * * * *"},
                    {"name": "job2", "cron": "0 * * * *"},
                    {"name": "job3", "cron": "0 * * * *"},
                ]
            })
        );

        let pages: Vec<_> = transport
            .requests()
            .into_iter()
            .filter(|r| r.path == "backend/cronjob")
            .collect();
        assert_eq!(pages.len(), 2);
        assert_eq!(query_value(&pages[1], "startIndex"), Some("2"));
        assert_eq!(query_value(&pages[0], "sortBy"), Some("id"));
        assert_eq!(query_value(&pages[0], "count"), Some("2"));
    }

    #[tokio::test]
    async fn test_export_transport_error_is_fatal() {
        let transport = Arc::new(MemoryTransport::with_responder(|_: &ApiRequest| {
            RawResponse::new(401, r#"{"success":false,"message":"Invalid token"}"#)
        }));

        let result = exporter(&transport).export().await;
        assert!(matches!(result, Err(ApimanError::Transport(_))));
        assert_eq!(transport.requests().len(), 1);
    }
}
