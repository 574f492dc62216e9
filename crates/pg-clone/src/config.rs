//! Run configuration.
//!
//! Connection strings are resolved once, at the edge, and carried in an
//! explicit [`Config`] handed to the orchestrator. Nothing in the pipeline
//! reads process environment.

use crate::error::{CloneError, Result};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Environment variable naming the source (production) database.
pub const SOURCE_URL_VAR: &str = "PROD_DATABASE_URL";

/// Environment variable naming the destination (local) database.
pub const TARGET_URL_VAR: &str = "DATABASE_URL";

/// Default number of rows fetched and inserted per batch.
pub const DEFAULT_BATCH_SIZE: usize = 1000;

/// Table forced to the front of the processing order when present, since
/// most application schemas hang off it.
pub const DEFAULT_PRIORITY_TABLE: &str = "User";

/// Clone run configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Source database connection string.
    pub source_url: String,

    /// Destination database connection string.
    pub target_url: String,

    /// Schema to clone (both sides).
    pub schema: String,

    /// Rows per fetch/insert batch.
    pub batch_size: usize,

    /// Table moved to the front of the processing order, if present.
    pub priority_table: Option<String>,
}

impl Config {
    /// Build a configuration from two connection strings with default
    /// schema, batch size, and priority table.
    pub fn new(source_url: impl Into<String>, target_url: impl Into<String>) -> Self {
        Self {
            source_url: source_url.into(),
            target_url: target_url.into(),
            schema: "public".to_string(),
            batch_size: DEFAULT_BATCH_SIZE,
            priority_table: Some(DEFAULT_PRIORITY_TABLE.to_string()),
        }
    }

    /// Resolve configuration from the process environment
    /// (`PROD_DATABASE_URL` and `DATABASE_URL`).
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Resolve configuration through a variable lookup function. Split out
    /// from [`Config::from_env`] so resolution is testable without touching
    /// the real environment.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let source_url = lookup(SOURCE_URL_VAR)
            .filter(|v| !v.is_empty())
            .ok_or_else(|| CloneError::Config(format!("{} is not set", SOURCE_URL_VAR)))?;
        let target_url = lookup(TARGET_URL_VAR)
            .filter(|v| !v.is_empty())
            .ok_or_else(|| CloneError::Config(format!("{} is not set", TARGET_URL_VAR)))?;

        Ok(Self::new(source_url, target_url))
    }

    /// Validate the configuration before any connection is attempted.
    pub fn validate(&self) -> Result<()> {
        if self.schema.is_empty() {
            return Err(CloneError::Config("schema must not be empty".into()));
        }
        if self.batch_size == 0 {
            return Err(CloneError::Config("batch size must be at least 1".into()));
        }

        let source = parse_url(&self.source_url, SOURCE_URL_VAR)?;
        let target = parse_url(&self.target_url, TARGET_URL_VAR)?;

        // Refusing to truncate the database we are reading from.
        if source.get_hosts() == target.get_hosts()
            && source.get_ports() == target.get_ports()
            && source.get_dbname() == target.get_dbname()
        {
            return Err(CloneError::Config(
                "source and destination point at the same database".into(),
            ));
        }

        Ok(())
    }
}

fn parse_url(url: &str, which: &str) -> Result<tokio_postgres::Config> {
    tokio_postgres::Config::from_str(url)
        .map_err(|e| CloneError::Config(format!("invalid {}: {}", which, e)))
}
