// crates/portico-cli/src/output.rs
//
// Output formatting utilities for the Portico CLI.
// Supports table and JSON output modes.

use serde::Serialize;
use tabled::{Table, Tabled};

use portico_rpc::handlers::platform::User;

/// Output format for CLI commands.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutputFormat {
    /// Pretty-printed table output (default).
    Table,
    /// JSON output for machine consumption.
    Json,
}

/// Format a slice of Tabled items as a table string.
pub fn format_table<T: Tabled>(data: &[T]) -> String {
    Table::new(data).to_string()
}

/// Format a serializable value as a pretty-printed JSON string.
pub fn format_json<T: Serialize>(data: &T) -> String {
    serde_json::to_string_pretty(data).unwrap_or_else(|e| format!("JSON serialization error: {}", e))
}

/// One user as a table row.
#[derive(Debug, Tabled)]
pub struct UserRow {
    #[tabled(rename = "ID")]
    pub id: u64,
    #[tabled(rename = "Username")]
    pub username: String,
    #[tabled(rename = "Email")]
    pub email: String,
    #[tabled(rename = "Created")]
    pub created_at: String,
}

impl From<&User> for UserRow {
    fn from(user: &User) -> Self {
        Self {
            id: user.id,
            username: user.username.clone(),
            email: user.email.clone(),
            created_at: user.created_at.clone(),
        }
    }
}

/// Render a user in the requested format.
pub fn render_user(user: &User, format: &OutputFormat) -> String {
    match format {
        OutputFormat::Json => format_json(user),
        OutputFormat::Table => format_table(&[UserRow::from(user)]),
    }
}
