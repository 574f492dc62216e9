//! Database access traits and implementations.
//!
//! The pipeline talks to both databases through [`SourceDb`] and
//! [`TargetDb`] so it can run against a real PostgreSQL pair or an
//! in-memory double in tests. [`postgres::PgPool`] implements both sides;
//! which trait a pool is used through depends on which end of the clone it
//! was connected for.

mod postgres;
mod value;

#[cfg(test)]
pub(crate) mod mem;

pub use postgres::PgPool;
pub use value::SqlValue;

use crate::error::Result;
use crate::schema::ForeignKey;
use async_trait::async_trait;

/// Read-side operations against the source database.
#[async_trait]
pub trait SourceDb: Send + Sync {
    /// List base-table names in the given schema, in catalog order.
    async fn list_tables(&self, schema: &str) -> Result<Vec<String>>;

    /// List all single-column foreign-key constraints in the given schema.
    async fn list_foreign_keys(&self, schema: &str) -> Result<Vec<ForeignKey>>;

    /// Column names for a table, ordered by ordinal position.
    async fn column_list(&self, schema: &str, table: &str) -> Result<Vec<String>>;

    /// Open a streaming scan over all rows of a table, projecting exactly
    /// `columns` in order.
    async fn open_scan(
        &self,
        schema: &str,
        table: &str,
        columns: &[String],
    ) -> Result<Box<dyn RowScan>>;

    /// Close all connections.
    async fn close(&self);
}

/// A cursor-style scan over one table's rows.
#[async_trait]
pub trait RowScan: Send {
    /// Fetch up to `max_rows` further rows. An empty batch signals
    /// exhaustion.
    async fn next_batch(&mut self, max_rows: usize) -> Result<Vec<Vec<SqlValue>>>;
}

/// Write-side operations against the destination database. Every operation
/// commits independently and immediately; there is no enclosing transaction.
#[async_trait]
pub trait TargetDb: Send + Sync {
    /// Whether a table exists in the given schema.
    async fn table_exists(&self, schema: &str, table: &str) -> Result<bool>;

    /// Remove all rows and reset identity state.
    async fn truncate_table(&self, schema: &str, table: &str) -> Result<()>;

    /// Insert a batch of rows with one parameter set per row. Returns the
    /// number of rows written.
    async fn insert_rows(
        &self,
        schema: &str,
        table: &str,
        columns: &[String],
        rows: Vec<Vec<SqlValue>>,
    ) -> Result<u64>;

    /// Drop a foreign-key constraint if it exists. Absence is success.
    async fn drop_foreign_key(&self, schema: &str, fk: &ForeignKey) -> Result<()>;

    /// Re-create a foreign-key constraint.
    async fn create_foreign_key(&self, schema: &str, fk: &ForeignKey) -> Result<()>;

    /// Point any serial/identity sequences backing the given columns at the
    /// current maximum column value.
    async fn sync_sequences(&self, schema: &str, table: &str, columns: &[String]) -> Result<()>;

    /// Close all connections.
    async fn close(&self);
}
