//! # milepost
//!
//! Versioned schema migration engine: register ordered pairs of up/down
//! procedures, reconcile them against the persisted migration history, and
//! apply or revert them inside per-version transactions.
//!
//! ## Features
//!
//! - **Linear, versioned history**: migrations are sorted and applied by
//!   version regardless of registration order
//! - **Divergence detection**: persisted versions with no registered
//!   migration abort loudly before anything executes
//! - **Per-version atomicity**: each migration's schema changes and its
//!   version record share one transaction
//! - **Pluggable storage**: the engine drives a [`MigrationStore`] trait; a
//!   PostgreSQL implementation over sqlx is included
//! - **Typed migration bodies**: up/down procedures are anything
//!   implementing [`SchemaProc`], closures included
//!
//! ## Quick Start
//!
//! ```no_run
//! use milepost::{Migrator, PostgresStore, Schema, PgTx};
//!
//! # async fn run() -> milepost::MigrationResult<()> {
//! let store = PostgresStore::connect("postgres://localhost/app").await?;
//! let mut migrator = Migrator::new(store);
//!
//! migrator.register(
//!     20200829084000,
//!     |schema: &mut Schema<PgTx>| {
//!         schema.create_table("users", |table| {
//!             table.id("id");
//!             table.string("name", Some(255));
//!             table.timestamps();
//!         });
//!     },
//!     |schema: &mut Schema<PgTx>| {
//!         schema.drop_table("users");
//!     },
//! );
//!
//! let outcome = migrator.migrate().await?;
//! println!("applied {} migrations", outcome.applied.len());
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod observer;
pub mod postgres;
pub mod registry;
pub mod runner;
pub mod schema;
pub mod store;
pub mod sync;

#[cfg(test)]
mod tests;

pub use error::{MigrationError, MigrationResult};
pub use observer::MigrationObserver;
pub use postgres::{PgTx, PostgresStore, StoreConfig};
pub use registry::{MigrationDefinition, Registry};
pub use runner::{MigrateOutcome, Migrator, RollbackOutcome};
pub use schema::{Column, ColumnType, Constraint, DataHook, Schema, SchemaOp, SchemaProc, Table};
pub use store::{MigrationStore, VersionRecord};
pub use sync::{reconcile, SyncedVersion};
