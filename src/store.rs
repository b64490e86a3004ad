//! Database-access collaborator contract
//!
//! The engine drives everything through [`MigrationStore`]: loading the
//! persisted version records, transaction boundaries, executing declared
//! schema operations, and the version bookkeeping itself. A PostgreSQL
//! implementation ships in [`crate::postgres`]; tests use an in-memory one.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::MigrationResult;
use crate::schema::SchemaOp;

/// A persisted record of one applied migration version
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VersionRecord {
    /// Store-assigned identity, opaque to the engine
    pub id: i64,
    /// The migration version this record corresponds to; unique in the store
    pub version: i64,
    /// When the migration was applied
    pub applied_at: DateTime<Utc>,
}

/// Storage collaborator for the migration engine.
///
/// One implementation per target database kind. All mutation methods take
/// an open transaction; the engine guarantees that a migration's schema
/// operations and its version bookkeeping share one transaction.
#[async_trait]
pub trait MigrationStore: Send + Sync {
    /// Transaction handle type
    type Tx: Send;

    /// Create the version bookkeeping table if it does not exist
    async fn ensure_version_table(&self) -> MigrationResult<()>;

    /// All applied version records, sorted ascending by version
    async fn applied_versions(&self) -> MigrationResult<Vec<VersionRecord>>;

    /// Open a new transaction
    async fn begin(&self) -> MigrationResult<Self::Tx>;

    /// Commit a transaction
    async fn commit(&self, tx: Self::Tx) -> MigrationResult<()>;

    /// Roll back a transaction
    async fn rollback(&self, tx: Self::Tx) -> MigrationResult<()>;

    /// Execute one declared schema operation inside the transaction
    async fn apply(&self, tx: &mut Self::Tx, op: &SchemaOp<Self::Tx>) -> MigrationResult<()>;

    /// Record a version as applied, returning the stored record with its
    /// assigned identity
    async fn insert_version(&self, tx: &mut Self::Tx, version: i64)
        -> MigrationResult<VersionRecord>;

    /// Delete an applied-version record by its identity
    async fn delete_version(&self, tx: &mut Self::Tx, id: i64) -> MigrationResult<()>;
}
