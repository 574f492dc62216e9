//! Foreign-key constraint management on the destination.
//!
//! The constraint list is captured from the source once, before any data
//! moves, and held immutable for the whole run. Each drop and each add
//! commits on its own, so an interrupted run leaves a rerunnable state
//! rather than a rolled-back one.

use crate::db::TargetDb;
use crate::error::{CloneError, Result};
use crate::schema::ForeignKey;
use tracing::{debug, info};

/// Drops and restores the foreign keys enumerated from the source.
pub struct ConstraintManager {
    constraints: Vec<ForeignKey>,
}

impl ConstraintManager {
    pub fn new(constraints: Vec<ForeignKey>) -> Self {
        Self { constraints }
    }

    pub fn constraints(&self) -> &[ForeignKey] {
        &self.constraints
    }

    /// Drop every constraint from the destination. A constraint that is
    /// already absent counts as dropped, so this is safe to run again after
    /// a partial run.
    pub async fn drop_all(&self, target: &dyn TargetDb, schema: &str) -> Result<usize> {
        for fk in &self.constraints {
            target
                .drop_foreign_key(schema, fk)
                .await
                .map_err(|e| CloneError::ConstraintDrop {
                    constraint: fk.name.clone(),
                    message: e.to_string(),
                })?;
            debug!("Dropped {}", fk.name);
        }
        info!("Dropped {} foreign key constraints", self.constraints.len());
        Ok(self.constraints.len())
    }

    /// Re-create every constraint on the destination, in list order. Fails
    /// on the first constraint the destination data violates, leaving the
    /// remainder unrestored.
    pub async fn restore_all(&self, target: &dyn TargetDb, schema: &str) -> Result<usize> {
        for fk in &self.constraints {
            target
                .create_foreign_key(schema, fk)
                .await
                .map_err(|e| CloneError::ConstraintRestore {
                    constraint: fk.name.clone(),
                    message: e.to_string(),
                })?;
            debug!("Restored {}", fk.name);
        }
        info!(
            "Restored {} foreign key constraints",
            self.constraints.len()
        );
        Ok(self.constraints.len())
    }
}
