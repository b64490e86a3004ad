//! Reconciliation of registered migrations against persisted history
//!
//! A two-pointer merge over two ascending-by-version sequences: the sorted
//! registry view and the persisted records. Any persisted version the
//! registry cannot account for is broken history, reported as a fatal error
//! before anything executes.

use crate::error::{MigrationError, MigrationResult};
use crate::registry::Registry;
use crate::store::VersionRecord;

/// One registered version annotated with its persisted state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncedVersion {
    /// Identity of the matching persisted record; 0 when not applied
    pub id: i64,
    /// The migration version
    pub version: i64,
    /// Whether a persisted record with this version exists
    pub applied: bool,
}

/// Merge the registry with the persisted records.
///
/// The output has exactly one entry per registered definition, strictly
/// ascending by version, with `applied` ground-truthed by the store.
pub fn reconcile<Tx>(
    registry: &Registry<Tx>,
    records: &[VersionRecord],
) -> MigrationResult<Vec<SyncedVersion>> {
    let mut synced = Vec::with_capacity(registry.len());
    let mut records = records.iter().peekable();
    let mut previous: Option<i64> = None;

    for definition in registry.sorted() {
        if previous == Some(definition.version) {
            return Err(MigrationError::BrokenHistory(format!(
                "version {} is registered more than once",
                definition.version
            )));
        }
        previous = Some(definition.version);

        if let Some(record) = records.peek() {
            if record.version < definition.version {
                return Err(MigrationError::BrokenHistory(format!(
                    "applied version {} has no registered migration",
                    record.version
                )));
            }
        }

        match records.peek() {
            Some(record) if record.version == definition.version => {
                synced.push(SyncedVersion {
                    id: record.id,
                    version: definition.version,
                    applied: true,
                });
                records.next();
            }
            _ => synced.push(SyncedVersion {
                id: 0,
                version: definition.version,
                applied: false,
            }),
        }
    }

    if let Some(record) = records.next() {
        return Err(MigrationError::BrokenHistory(format!(
            "applied version {} has no registered migration",
            record.version
        )));
    }

    Ok(synced)
}
