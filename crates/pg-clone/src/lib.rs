//! # pg-clone
//!
//! Dependency-aware PostgreSQL database cloning.
//!
//! Copies all tables in a schema from a source database to a destination
//! database, preserving referential structure:
//!
//! - **Schema inspection** enumerates tables and foreign keys from the
//!   source catalog once per run
//! - **Constraint handling** drops destination foreign keys before the copy
//!   and restores them afterwards
//! - **Batched streaming** keeps memory bounded on arbitrarily large tables
//! - **Subset tolerance** skips tables the destination does not have
//!
//! ## Example
//!
//! ```rust,no_run
//! use pg_clone::{Config, Orchestrator};
//!
//! #[tokio::main]
//! async fn main() -> pg_clone::Result<()> {
//!     let config = Config::from_env()?;
//!     let report = Orchestrator::new(config).await?.run().await?;
//!     println!("Copied {} rows", report.rows_copied);
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod constraints;
pub mod db;
pub mod error;
pub mod ident;
pub mod orchestrator;
pub mod replicate;
pub mod schema;

// Re-exports for convenient access
pub use config::{Config, SOURCE_URL_VAR, TARGET_URL_VAR};
pub use constraints::ConstraintManager;
pub use db::{PgPool, RowScan, SourceDb, SqlValue, TargetDb};
pub use error::{CloneError, Result};
pub use orchestrator::{ClonePlan, CloneReport, Orchestrator};
pub use replicate::{CopyOutcome, TableReplicator};
pub use schema::{order_tables, ForeignKey, TableOrder};
