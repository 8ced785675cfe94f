// ABOUTME: Error taxonomy for the export engine
// ABOUTME: Distinguishes run-fatal failures from per-table and per-page ones

use thiserror::Error;

/// Errors raised while exporting a database.
///
/// The variant decides how far a failure reaches:
/// - `Connection`, `Sink` and `Config` abort the whole run
/// - `Introspection` skips the affected table
/// - `Query` and `Serialization` stop the affected table after the pages
///   already written
#[derive(Error, Debug)]
pub enum DumpError {
    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Failed to introspect table '{table}': {message}")]
    Introspection { table: String, message: String },

    #[error("Query failed on table '{table}': {message}")]
    Query { table: String, message: String },

    #[error("Failed to decode row from table '{table}': {message}")]
    Serialization { table: String, message: String },

    #[error("Failed to write dump output: {0}")]
    Sink(#[from] std::io::Error),

    #[error("Invalid configuration: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, DumpError>;

impl DumpError {
    pub fn connection(message: impl ToString) -> Self {
        Self::Connection(message.to_string())
    }

    pub fn introspection(table: &str, message: impl ToString) -> Self {
        Self::Introspection {
            table: table.to_string(),
            message: message.to_string(),
        }
    }

    pub fn query(table: &str, message: impl ToString) -> Self {
        Self::Query {
            table: table.to_string(),
            message: message.to_string(),
        }
    }

    pub fn serialization(table: &str, message: impl ToString) -> Self {
        Self::Serialization {
            table: table.to_string(),
            message: message.to_string(),
        }
    }

    pub fn config(message: impl ToString) -> Self {
        Self::Config(message.to_string())
    }

    /// Returns true if the error must abort the whole export run
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::Connection(_) | Self::Sink(_) | Self::Config(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fatal_classification() {
        assert!(DumpError::connection("refused").is_fatal());
        assert!(DumpError::config("page size").is_fatal());
        assert!(DumpError::Sink(std::io::Error::other("disk full")).is_fatal());

        assert!(!DumpError::introspection("users", "gone").is_fatal());
        assert!(!DumpError::query("users", "timeout").is_fatal());
        assert!(!DumpError::serialization("users", "bad row").is_fatal());
    }

    #[test]
    fn test_messages_name_the_table() {
        let err = DumpError::query("orders", "lock wait timeout");
        let msg = err.to_string();
        assert!(msg.contains("orders"));
        assert!(msg.contains("lock wait timeout"));
    }
}
