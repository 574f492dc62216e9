//! Clone orchestrator - sequences inspection, constraint handling, and
//! per-table replication.

use crate::config::Config;
use crate::constraints::ConstraintManager;
use crate::db::{PgPool, SourceDb, TargetDb};
use crate::error::Result;
use crate::replicate::{CopyOutcome, TableReplicator};
use crate::schema::{order_tables, ForeignKey};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, warn};

/// Clone orchestrator. Owns a connection to each side and runs the whole
/// pipeline front to back, fail-fast.
pub struct Orchestrator {
    config: Config,
    source: Arc<dyn SourceDb>,
    target: Arc<dyn TargetDb>,
}

/// What a run would do: the planned processing order and the constraint
/// set, with any ordering hazards called out.
#[derive(Debug, Clone, Serialize)]
pub struct ClonePlan {
    /// Tables in processing order.
    pub tables: Vec<String>,

    /// Foreign keys to drop before and restore after the copy.
    pub foreign_keys: Vec<ForeignKey>,

    /// Tables in a cross-table foreign-key cycle; no safe relative order
    /// exists for these.
    pub cyclic_tables: Vec<String>,

    /// Tables with self-referencing foreign keys.
    pub self_referencing_tables: Vec<String>,
}

/// Result of a completed clone run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CloneReport {
    /// When the run started.
    pub started_at: DateTime<Utc>,

    /// When the run completed.
    pub completed_at: DateTime<Utc>,

    /// Total duration in seconds.
    pub duration_seconds: f64,

    /// Tables enumerated on the source.
    pub tables_total: usize,

    /// Tables truncated and refilled.
    pub tables_copied: usize,

    /// Tables absent on the destination and left untouched.
    pub tables_skipped: usize,

    /// Names of the skipped tables.
    pub skipped_tables: Vec<String>,

    /// Rows written to the destination.
    pub rows_copied: u64,

    /// Foreign-key constraints dropped and restored.
    pub constraints_restored: usize,
}

impl Orchestrator {
    /// Validate the configuration and connect to both databases.
    pub async fn new(config: Config) -> Result<Self> {
        config.validate()?;

        let source = PgPool::connect(&config.source_url, "source").await?;
        let target = PgPool::connect(&config.target_url, "destination").await?;

        Ok(Self {
            config,
            source: Arc::new(source),
            target: Arc::new(target),
        })
    }

    /// Assemble an orchestrator from existing connections. This is how the
    /// pipeline runs against test doubles.
    pub fn from_parts(
        config: Config,
        source: Arc<dyn SourceDb>,
        target: Arc<dyn TargetDb>,
    ) -> Self {
        Self {
            config,
            source,
            target,
        }
    }

    /// Inspect the source and compute the processing order without touching
    /// the destination.
    pub async fn plan(&self) -> Result<ClonePlan> {
        let schema = &self.config.schema;

        let tables = self.source.list_tables(schema).await?;
        let foreign_keys = self.source.list_foreign_keys(schema).await?;
        info!(
            "Source schema '{}': {} tables, {} foreign keys",
            schema,
            tables.len(),
            foreign_keys.len()
        );

        let order = order_tables(
            &tables,
            &foreign_keys,
            self.config.priority_table.as_deref(),
        );

        Ok(ClonePlan {
            tables: order.tables,
            foreign_keys,
            cyclic_tables: order.cyclic,
            self_referencing_tables: order.self_referencing,
        })
    }

    /// Run the full clone: drop constraints, copy every table in order,
    /// restore constraints, close both connections.
    ///
    /// Earlier tables stay copied when a later step fails; the run is
    /// fail-fast, not fail-safe, and can simply be rerun.
    pub async fn run(self) -> Result<CloneReport> {
        let started_at = Utc::now();
        let schema = self.config.schema.clone();

        let plan = self.plan().await?;
        if !plan.cyclic_tables.is_empty() {
            warn!(
                "Foreign-key cycle among {:?}; processing them in catalog order",
                plan.cyclic_tables
            );
        }
        if !plan.self_referencing_tables.is_empty() {
            warn!(
                "Self-referencing foreign keys on {:?}",
                plan.self_referencing_tables
            );
        }

        let manager = ConstraintManager::new(plan.foreign_keys);
        manager.drop_all(self.target.as_ref(), &schema).await?;

        let replicator = TableReplicator::new(self.config.batch_size);
        let mut rows_copied = 0u64;
        let mut tables_copied = 0usize;
        let mut skipped_tables = Vec::new();

        for table in &plan.tables {
            info!("Processing table: {}", table);
            match replicator
                .copy_table(self.source.as_ref(), self.target.as_ref(), &schema, table)
                .await?
            {
                CopyOutcome::Copied { rows } => {
                    tables_copied += 1;
                    rows_copied += rows;
                }
                CopyOutcome::Skipped => {
                    warn!("Skipping table {}: not present on destination", table);
                    skipped_tables.push(table.clone());
                }
            }
        }

        let constraints_restored = manager.restore_all(self.target.as_ref(), &schema).await?;

        self.source.close().await;
        self.target.close().await;

        let completed_at = Utc::now();
        let report = CloneReport {
            started_at,
            completed_at,
            duration_seconds: (completed_at - started_at).num_milliseconds() as f64 / 1000.0,
            tables_total: plan.tables.len(),
            tables_copied,
            tables_skipped: skipped_tables.len(),
            skipped_tables,
            rows_copied,
            constraints_restored,
        };

        info!(
            "Data cloning completed: {}/{} tables, {} rows in {:.1}s",
            report.tables_copied,
            report.tables_total,
            report.rows_copied,
            report.duration_seconds
        );

        Ok(report)
    }

    /// Close both connections without running anything.
    pub async fn close(self) {
        self.source.close().await;
        self.target.close().await;
    }
}

impl CloneReport {
    /// Convert to a pretty-printed JSON string.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}
