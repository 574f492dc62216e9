//! In-memory database double used by the pipeline tests.
//!
//! One instance stands in for one database; tests build a source instance
//! and a target instance and hand them to the orchestrator. The target side
//! enforces referential integrity when a constraint is created, so restore
//! failures behave like the real thing.

use crate::db::{RowScan, SourceDb, SqlValue, TargetDb};
use crate::error::{CloneError, Result};
use crate::schema::ForeignKey;
use async_trait::async_trait;
use std::sync::Mutex;

#[derive(Debug, Clone)]
struct MemTable {
    name: String,
    columns: Vec<String>,
    rows: Vec<Vec<SqlValue>>,
}

#[derive(Debug, Default)]
struct MemState {
    tables: Vec<MemTable>,
    foreign_keys: Vec<ForeignKey>,
    constraints: Vec<ForeignKey>,
    insert_calls: usize,
    truncated: Vec<String>,
}

/// An in-memory stand-in for one PostgreSQL database.
#[derive(Debug, Default)]
pub struct MemDb {
    state: Mutex<MemState>,
}

impl MemDb {
    pub fn new() -> Self {
        Self::default()
    }

    /// Define a table with the given columns and rows.
    pub fn add_table(&self, name: &str, columns: &[&str], rows: Vec<Vec<SqlValue>>) {
        let mut state = self.state.lock().unwrap();
        state.tables.push(MemTable {
            name: name.to_string(),
            columns: columns.iter().map(|c| c.to_string()).collect(),
            rows,
        });
    }

    /// Register a foreign key on the source side (returned by
    /// `list_foreign_keys`).
    pub fn add_foreign_key(&self, fk: ForeignKey) {
        self.state.lock().unwrap().foreign_keys.push(fk);
    }

    /// Register an existing constraint on the target side (subject to
    /// `drop_foreign_key` / `create_foreign_key`).
    pub fn add_constraint(&self, fk: ForeignKey) {
        self.state.lock().unwrap().constraints.push(fk);
    }

    pub fn rows_of(&self, table: &str) -> Vec<Vec<SqlValue>> {
        let state = self.state.lock().unwrap();
        state
            .tables
            .iter()
            .find(|t| t.name == table)
            .map(|t| t.rows.clone())
            .unwrap_or_default()
    }

    pub fn constraint_names(&self) -> Vec<String> {
        let state = self.state.lock().unwrap();
        state.constraints.iter().map(|c| c.name.clone()).collect()
    }

    pub fn insert_calls(&self) -> usize {
        self.state.lock().unwrap().insert_calls
    }

    pub fn truncate_calls(&self) -> usize {
        self.state.lock().unwrap().truncated.len()
    }

    /// Tables in the order they were truncated; the processing order as the
    /// destination saw it.
    pub fn truncated_tables(&self) -> Vec<String> {
        self.state.lock().unwrap().truncated.clone()
    }
}

#[async_trait]
impl SourceDb for MemDb {
    async fn list_tables(&self, _schema: &str) -> Result<Vec<String>> {
        let state = self.state.lock().unwrap();
        Ok(state.tables.iter().map(|t| t.name.clone()).collect())
    }

    async fn list_foreign_keys(&self, _schema: &str) -> Result<Vec<ForeignKey>> {
        Ok(self.state.lock().unwrap().foreign_keys.clone())
    }

    async fn column_list(&self, _schema: &str, table: &str) -> Result<Vec<String>> {
        let state = self.state.lock().unwrap();
        state
            .tables
            .iter()
            .find(|t| t.name == table)
            .map(|t| t.columns.clone())
            .ok_or_else(|| CloneError::Schema(format!("no such table: {}", table)))
    }

    async fn open_scan(
        &self,
        _schema: &str,
        table: &str,
        columns: &[String],
    ) -> Result<Box<dyn RowScan>> {
        let state = self.state.lock().unwrap();
        let t = state
            .tables
            .iter()
            .find(|t| t.name == table)
            .ok_or_else(|| CloneError::Schema(format!("no such table: {}", table)))?;
        if columns != t.columns.as_slice() {
            return Err(CloneError::Schema(format!(
                "scan column list does not match table {}",
                table
            )));
        }
        Ok(Box::new(MemScan {
            rows: t.rows.clone(),
            pos: 0,
        }))
    }

    async fn close(&self) {}
}

struct MemScan {
    rows: Vec<Vec<SqlValue>>,
    pos: usize,
}

#[async_trait]
impl RowScan for MemScan {
    async fn next_batch(&mut self, max_rows: usize) -> Result<Vec<Vec<SqlValue>>> {
        let end = (self.pos + max_rows).min(self.rows.len());
        let batch = self.rows[self.pos..end].to_vec();
        self.pos = end;
        Ok(batch)
    }
}

#[async_trait]
impl TargetDb for MemDb {
    async fn table_exists(&self, _schema: &str, table: &str) -> Result<bool> {
        let state = self.state.lock().unwrap();
        Ok(state.tables.iter().any(|t| t.name == table))
    }

    async fn truncate_table(&self, _schema: &str, table: &str) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state.truncated.push(table.to_string());
        let t = state
            .tables
            .iter_mut()
            .find(|t| t.name == table)
            .ok_or_else(|| CloneError::Schema(format!("no such table: {}", table)))?;
        t.rows.clear();
        Ok(())
    }

    async fn insert_rows(
        &self,
        _schema: &str,
        table: &str,
        columns: &[String],
        rows: Vec<Vec<SqlValue>>,
    ) -> Result<u64> {
        let mut state = self.state.lock().unwrap();
        state.insert_calls += 1;
        let t = state
            .tables
            .iter_mut()
            .find(|t| t.name == table)
            .ok_or_else(|| CloneError::Schema(format!("no such table: {}", table)))?;
        for col in columns {
            if !t.columns.contains(col) {
                return Err(CloneError::Schema(format!(
                    "column {} does not exist on {}",
                    col, table
                )));
            }
        }
        let count = rows.len() as u64;
        t.rows.extend(rows);
        Ok(count)
    }

    async fn drop_foreign_key(&self, _schema: &str, fk: &ForeignKey) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state.constraints.retain(|c| c.name != fk.name);
        Ok(())
    }

    async fn create_foreign_key(&self, _schema: &str, fk: &ForeignKey) -> Result<()> {
        let mut state = self.state.lock().unwrap();

        let owning = state
            .tables
            .iter()
            .find(|t| t.name == fk.table)
            .ok_or_else(|| CloneError::Schema(format!("no such table: {}", fk.table)))?;
        let referenced = state
            .tables
            .iter()
            .find(|t| t.name == fk.ref_table)
            .ok_or_else(|| CloneError::Schema(format!("no such table: {}", fk.ref_table)))?;

        let col_idx = owning
            .columns
            .iter()
            .position(|c| *c == fk.column)
            .ok_or_else(|| CloneError::Schema(format!("no such column: {}", fk.column)))?;
        let ref_idx = referenced
            .columns
            .iter()
            .position(|c| *c == fk.ref_column)
            .ok_or_else(|| CloneError::Schema(format!("no such column: {}", fk.ref_column)))?;

        for row in &owning.rows {
            let value = &row[col_idx];
            if *value == SqlValue::Null {
                continue;
            }
            let referenced_exists = referenced.rows.iter().any(|r| r[ref_idx] == *value);
            if !referenced_exists {
                return Err(CloneError::Schema(format!(
                    "value in {}.{} violates foreign key {}",
                    fk.table, fk.column, fk.name
                )));
            }
        }

        state.constraints.push(fk.clone());
        Ok(())
    }

    async fn sync_sequences(&self, _schema: &str, _table: &str, _columns: &[String]) -> Result<()> {
        Ok(())
    }

    async fn close(&self) {}
}
