//! Output formatting for CLI commands.
//!
//! This module provides formatting utilities for displaying
//! information to the user in various formats.

use colored::Colorize;
use serde_json::{json, Map, Value};
use std::fmt::Write;
use tabled::{Table, Tabled};

use crate::error::ApimanError;
use crate::kind::Kind;
use crate::model::{ImportResult, ResultAction};

use super::commands::OutputFormat;

/// Output formatter for CLI.
#[derive(Debug)]
pub struct OutputFormatter {
    /// Output format.
    format: OutputFormat,
}

/// Entity row for table display.
#[derive(Tabled)]
struct EntityRow {
    #[tabled(rename = "ID")]
    id: String,
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "Status")]
    status: String,
}

impl OutputFormatter {
    /// Creates a new output formatter.
    #[must_use]
    pub const fn new(format: OutputFormat) -> Self {
        Self { format }
    }

    /// Formats one reconciled entity.
    #[must_use]
    pub fn format_result(&self, result: &ImportResult) -> String {
        match self.format {
            OutputFormat::Json => serde_json::to_string(result).unwrap_or_default(),
            OutputFormat::Text => {
                let action = format!("[{}]", result.action);
                let action = match result.action {
                    ResultAction::Created => action.green(),
                    ResultAction::Updated => action.yellow(),
                    ResultAction::Failed => action.red(),
                };
                format!("- {action} {} {}", result.kind, result.message)
            }
        }
    }

    /// Formats the line printed after all results.
    #[must_use]
    pub fn format_summary(&self, errors: usize, total: usize) -> String {
        match self.format {
            OutputFormat::Json => json!({ "total": total, "errors": errors }).to_string(),
            OutputFormat::Text => {
                if errors > 0 {
                    format!("\n{} {errors} errors", "✗".red())
                } else if total == 0 {
                    String::from("\nNo entities declared")
                } else {
                    format!("\n{} Successful", "✓".green())
                }
            }
        }
    }

    /// Formats a collection page.
    #[must_use]
    pub fn format_list(&self, kind: Kind, page: &Map<String, Value>) -> String {
        if self.format == OutputFormat::Json {
            return serde_json::to_string_pretty(page).unwrap_or_default();
        }

        let entries = page
            .get("entry")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();
        let total = page
            .get("totalResults")
            .and_then(Value::as_u64)
            .unwrap_or_else(|| u64::try_from(entries.len()).unwrap_or(u64::MAX));

        let mut output = String::new();
        let _ = writeln!(output, "\n{} {kind} entities\n", total.to_string().bold());

        if entries.is_empty() {
            output.push_str("   No entries.\n");
            return output;
        }

        let rows: Vec<EntityRow> = entries
            .iter()
            .map(|entry| EntityRow {
                id: field(entry, "id"),
                name: Self::truncate(&field(entry, kind.natural_key()), 40),
                status: field(entry, "status"),
            })
            .collect();

        output.push_str(&Table::new(rows).to_string());
        output.push('\n');
        output
    }

    /// Formats a single entity.
    #[must_use]
    pub fn format_entity(&self, entity: &Map<String, Value>) -> String {
        serde_json::to_string_pretty(entity).unwrap_or_default()
    }

    /// Formats the `{success, message}` body of a create, update or delete.
    #[must_use]
    pub fn format_message(&self, body: &Map<String, Value>) -> String {
        match self.format {
            OutputFormat::Json => serde_json::to_string_pretty(body).unwrap_or_default(),
            OutputFormat::Text => {
                let message = body.get("message").and_then(Value::as_str).unwrap_or_default();
                if body.get("success").and_then(Value::as_bool) == Some(false) {
                    format!("{} {message}", "✗".red())
                } else {
                    format!("{} {message}", "✓".green())
                }
            }
        }
    }

    /// Formats a fatal error.
    ///
    /// A backend response carrying `{message, trace}` is shown as such,
    /// other responses as status code and raw body.
    #[must_use]
    pub fn render_error(&self, error: &ApimanError) -> String {
        let response = match error {
            ApimanError::Transport(e) => e.response(),
            _ => None,
        };

        let Some(response) = response else {
            return match self.format {
                OutputFormat::Json => json!({ "success": false, "message": error.to_string() }).to_string(),
                OutputFormat::Text => format!("{} {error}", "Error:".red()),
            };
        };

        let body = serde_json::from_str::<Value>(&response.body).ok();
        let message = body
            .as_ref()
            .and_then(|b| b.get("message"))
            .and_then(Value::as_str);
        let trace = body
            .as_ref()
            .and_then(|b| b.get("trace"))
            .and_then(Value::as_str);

        match self.format {
            OutputFormat::Json => json!({
                "success": false,
                "status": response.status,
                "message": message.map_or_else(|| error.detail(), String::from),
                "trace": trace,
            })
            .to_string(),
            OutputFormat::Text => {
                let mut output = String::new();
                if let Some(message) = message {
                    let _ = writeln!(output, "{} {message}", "Error:".red());
                    if let Some(trace) = trace {
                        let _ = write!(output, "\n{}", trace.dimmed());
                    }
                } else {
                    let _ = writeln!(output, "{} {}", "Error:".red(), error.detail());
                    let _ = writeln!(output, "Status: {}", response.status);
                    let _ = write!(output, "{}", response.body);
                }
                output
            }
        }
    }

    /// Truncates a string to a maximum number of characters.
    fn truncate(s: &str, max_len: usize) -> String {
        if s.chars().count() <= max_len {
            s.to_string()
        } else {
            let head: String = s.chars().take(max_len.saturating_sub(3)).collect();
            format!("{head}...")
        }
    }
}

/// Renders a field of a list entry for a table cell.
fn field(entry: &Value, key: &str) -> String {
    match entry.get(key) {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Null) | None => String::new(),
        Some(other) => other.to_string(),
    }
}
