//! Migration runner
//!
//! Owns the registry and the store for one target database and drives the
//! apply-pending and revert-last operations. Each pending migration runs in
//! its own transaction together with its version bookkeeping; a failure
//! rolls back that single transaction and stops the batch.

use std::time::Instant;

use tracing::debug;

use crate::error::{MigrationError, MigrationResult};
use crate::observer::{MigrationObserver, ObserverSet};
use crate::registry::{MigrationDefinition, Registry};
use crate::schema::SchemaProc;
use crate::store::MigrationStore;
use crate::sync::{reconcile, SyncedVersion};

/// Result of a migrate call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrateOutcome {
    /// Versions applied by this call, in application order
    pub applied: Vec<i64>,
    /// Number of registered versions that were already applied
    pub already_applied: usize,
    /// Total execution time in milliseconds
    pub execution_time_ms: u128,
}

/// Result of a rollback call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RollbackOutcome {
    /// The version that was reverted, if any was applied
    pub rolled_back: Option<i64>,
    /// Total execution time in milliseconds
    pub execution_time_ms: u128,
}

/// Migration runner bound to one target database.
///
/// Construct one per database with its store; register every known
/// migration at startup, then call [`migrate`](Migrator::migrate) or
/// [`rollback`](Migrator::rollback).
pub struct Migrator<S: MigrationStore> {
    store: S,
    registry: Registry<S::Tx>,
    observers: ObserverSet,
}

impl<S: MigrationStore> Migrator<S> {
    pub fn new(store: S) -> Self {
        Self {
            store,
            registry: Registry::new(),
            observers: ObserverSet::new(),
        }
    }

    /// Register a migration version with its forward and backward procedures
    pub fn register(
        &mut self,
        version: i64,
        up: impl SchemaProc<S::Tx> + 'static,
        down: impl SchemaProc<S::Tx> + 'static,
    ) -> &mut Self {
        self.registry.register(version, up, down);
        self
    }

    /// Register an instrumentation observer
    pub fn observe(&mut self, observer: Box<dyn MigrationObserver>) -> &mut Self {
        self.observers.register(observer);
        self
    }

    /// The underlying store
    pub fn store(&self) -> &S {
        &self.store
    }

    /// The registered migrations
    pub fn registry(&self) -> &Registry<S::Tx> {
        &self.registry
    }

    /// Apply all pending migrations in ascending version order.
    ///
    /// Zero pending migrations is a successful no-op. On a step failure the
    /// failing version's transaction is rolled back and no later version is
    /// attempted.
    pub async fn migrate(&self) -> MigrationResult<MigrateOutcome> {
        self.observers.started("migrate").await;
        let result = self.migrate_inner().await;
        self.observers.finished("migrate", result.as_ref().err()).await;
        result
    }

    /// Revert the single most recently applied migration.
    ///
    /// No applied migrations is a successful no-op. On failure the version
    /// remains recorded as applied.
    pub async fn rollback(&self) -> MigrationResult<RollbackOutcome> {
        self.observers.started("rollback").await;
        let result = self.rollback_inner().await;
        self.observers
            .finished("rollback", result.as_ref().err())
            .await;
        result
    }

    /// Registered versions annotated with their applied state, ascending.
    /// Read-only: loads and reconciles without executing anything.
    pub async fn status(&self) -> MigrationResult<Vec<SyncedVersion>> {
        self.store.ensure_version_table().await?;
        let records = self.store.applied_versions().await?;
        reconcile(&self.registry, &records)
    }

    async fn migrate_inner(&self) -> MigrationResult<MigrateOutcome> {
        let start = Instant::now();
        self.store.ensure_version_table().await?;
        let records = self.store.applied_versions().await?;
        let synced = reconcile(&self.registry, &records)?;

        let mut applied = Vec::new();
        let mut already_applied = 0;
        for (entry, definition) in synced.iter().zip(self.registry.sorted()) {
            if entry.applied {
                already_applied += 1;
                continue;
            }
            debug!(version = definition.version, "applying migration");
            self.apply_up(definition).await?;
            applied.push(definition.version);
        }

        Ok(MigrateOutcome {
            applied,
            already_applied,
            execution_time_ms: start.elapsed().as_millis(),
        })
    }

    async fn rollback_inner(&self) -> MigrationResult<RollbackOutcome> {
        let start = Instant::now();
        self.store.ensure_version_table().await?;
        let records = self.store.applied_versions().await?;
        let synced = reconcile(&self.registry, &records)?;

        let target = match synced.iter().rev().find(|entry| entry.applied) {
            Some(entry) => *entry,
            None => {
                return Ok(RollbackOutcome {
                    rolled_back: None,
                    execution_time_ms: start.elapsed().as_millis(),
                })
            }
        };
        let definition = self
            .registry
            .sorted()
            .find(|d| d.version == target.version)
            .ok_or_else(|| {
                MigrationError::BrokenHistory(format!(
                    "applied version {} has no registered migration",
                    target.version
                ))
            })?;

        debug!(version = target.version, "reverting migration");
        self.apply_down(definition, target.id).await?;

        Ok(RollbackOutcome {
            rolled_back: Some(target.version),
            execution_time_ms: start.elapsed().as_millis(),
        })
    }

    async fn apply_up(&self, definition: &MigrationDefinition<S::Tx>) -> MigrationResult<()> {
        let version = definition.version;
        let mut tx = self.store.begin().await?;

        let result = async {
            let schema = definition.build_up();
            for op in schema.ops() {
                self.store.apply(&mut tx, op).await?;
            }
            self.store.insert_version(&mut tx, version).await?;
            Ok(())
        }
        .await;

        self.finish(tx, version, result).await
    }

    async fn apply_down(
        &self,
        definition: &MigrationDefinition<S::Tx>,
        record_id: i64,
    ) -> MigrationResult<()> {
        let version = definition.version;
        let mut tx = self.store.begin().await?;

        let result = async {
            let schema = definition.build_down();
            for op in schema.ops() {
                self.store.apply(&mut tx, op).await?;
            }
            self.store.delete_version(&mut tx, record_id).await?;
            Ok(())
        }
        .await;

        self.finish(tx, version, result).await
    }

    async fn finish(
        &self,
        tx: S::Tx,
        version: i64,
        result: MigrationResult<()>,
    ) -> MigrationResult<()> {
        match result {
            Ok(()) => self
                .store
                .commit(tx)
                .await
                .map_err(|e| MigrationError::step(version, e)),
            Err(e) => {
                self.store.rollback(tx).await.ok();
                Err(MigrationError::step(version, e))
            }
        }
    }
}
