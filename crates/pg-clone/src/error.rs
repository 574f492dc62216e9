//! Error types for the cloning library.

use thiserror::Error;

/// Main error type for clone operations.
#[derive(Error, Debug)]
pub enum CloneError {
    /// Configuration error (missing connection strings, invalid values).
    #[error("Configuration error: {0}")]
    Config(String),

    /// Failure establishing or acquiring a database connection.
    #[error("Connection error: {message}\n  Context: {context}")]
    Connect { message: String, context: String },

    /// Schema inspection failed (tables, columns, foreign keys).
    #[error("Schema inspection failed: {0}")]
    Schema(String),

    /// Underlying database driver error.
    #[error("Database error: {0}")]
    Db(#[from] tokio_postgres::Error),

    /// Dropping a foreign-key constraint failed for a reason other than
    /// the constraint being absent.
    #[error("Failed to drop constraint {constraint}: {message}")]
    ConstraintDrop { constraint: String, message: String },

    /// Re-adding a foreign-key constraint failed, typically because the
    /// destination data violates it (orphans from skipped tables).
    #[error("Failed to restore constraint {constraint}: {message}")]
    ConstraintRestore { constraint: String, message: String },

    /// Row fetch or insert failed for a specific table.
    #[error("Transfer failed for table {table}: {message}")]
    Transfer { table: String, message: String },

    /// JSON serialization error (run reports).
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl CloneError {
    /// Create a Connect error with context about where it occurred.
    pub fn connect(message: impl Into<String>, context: impl Into<String>) -> Self {
        CloneError::Connect {
            message: message.into(),
            context: context.into(),
        }
    }

    /// Create a Transfer error.
    pub fn transfer(table: impl Into<String>, message: impl Into<String>) -> Self {
        CloneError::Transfer {
            table: table.into(),
            message: message.into(),
        }
    }

    /// Process exit code for this error. Configuration problems are
    /// distinguished so wrappers can tell "fix your .env" from "the run died".
    pub fn exit_code(&self) -> u8 {
        match self {
            CloneError::Config(_) => 2,
            _ => 1,
        }
    }

    /// Format the error with its full source chain.
    pub fn format_detailed(&self) -> String {
        let mut output = format!("Error: {}", self);

        let mut source = std::error::Error::source(self);
        let mut depth = 1;
        while let Some(err) = source {
            output.push_str(&format!("\n\nCaused by:\n  {}: {}", depth, err));
            source = err.source();
            depth += 1;
        }

        output
    }
}

/// Result type alias for clone operations.
pub type Result<T> = std::result::Result<T, CloneError>;
