//! Runner tests against an in-memory store with staged-transaction
//! semantics: schema operations and bookkeeping stage into the open
//! transaction, commit publishes them, rollback discards them.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::Utc;

use crate::error::{MigrationError, MigrationResult};
use crate::observer::MigrationObserver;
use crate::runner::Migrator;
use crate::schema::{DataHook, Schema, SchemaOp};
use crate::store::{MigrationStore, VersionRecord};

#[derive(Default)]
struct StoreState {
    next_id: i64,
    records: Vec<VersionRecord>,
    committed_ops: Vec<String>,
    begun: usize,
    committed: usize,
    rolled_back: usize,
}

#[derive(Default)]
struct MockTx {
    ops: Vec<String>,
    inserts: Vec<VersionRecord>,
    deletes: Vec<i64>,
}

#[derive(Clone, Default)]
struct MockStore {
    state: Arc<Mutex<StoreState>>,
    fail_insert_for: Option<i64>,
}

impl MockStore {
    fn new() -> Self {
        Self::default()
    }

    fn failing_insert(version: i64) -> Self {
        Self {
            fail_insert_for: Some(version),
            ..Self::default()
        }
    }

    fn seed(&self, records: &[(i64, i64)]) {
        let mut state = self.state.lock().unwrap();
        for &(id, version) in records {
            state.records.push(VersionRecord {
                id,
                version,
                applied_at: Utc::now(),
            });
            state.next_id = state.next_id.max(id);
        }
        state.records.sort_by_key(|r| r.version);
    }

    fn recorded_versions(&self) -> Vec<i64> {
        self.state
            .lock()
            .unwrap()
            .records
            .iter()
            .map(|r| r.version)
            .collect()
    }
}

fn describe<Tx>(op: &SchemaOp<Tx>) -> String {
    match op {
        SchemaOp::CreateTable(table) => format!("create_table {}", table.name),
        SchemaOp::DropTable { name, .. } => format!("drop_table {}", name),
        SchemaOp::AddColumn { table, column } => format!("add_column {}.{}", table, column.name),
        SchemaOp::DropColumn { table, column } => format!("drop_column {}.{}", table, column),
        SchemaOp::CreateIndex { table, .. } => format!("create_index {}", table),
        SchemaOp::DropIndex { name } => format!("drop_index {}", name),
        SchemaOp::Exec(sql) => format!("exec {}", sql),
        SchemaOp::Run(_) => "run".to_string(),
    }
}

#[async_trait]
impl MigrationStore for MockStore {
    type Tx = MockTx;

    async fn ensure_version_table(&self) -> MigrationResult<()> {
        Ok(())
    }

    async fn applied_versions(&self) -> MigrationResult<Vec<VersionRecord>> {
        Ok(self.state.lock().unwrap().records.clone())
    }

    async fn begin(&self) -> MigrationResult<Self::Tx> {
        self.state.lock().unwrap().begun += 1;
        Ok(MockTx::default())
    }

    async fn commit(&self, tx: Self::Tx) -> MigrationResult<()> {
        let mut state = self.state.lock().unwrap();
        state.committed_ops.extend(tx.ops);
        state.records.extend(tx.inserts);
        state.records.retain(|r| !tx.deletes.contains(&r.id));
        state.records.sort_by_key(|r| r.version);
        state.committed += 1;
        Ok(())
    }

    async fn rollback(&self, tx: Self::Tx) -> MigrationResult<()> {
        drop(tx);
        self.state.lock().unwrap().rolled_back += 1;
        Ok(())
    }

    async fn apply(&self, tx: &mut Self::Tx, op: &SchemaOp<Self::Tx>) -> MigrationResult<()> {
        if let SchemaOp::Run(hook) = op {
            return hook.run(tx).await;
        }
        tx.ops.push(describe(op));
        Ok(())
    }

    async fn insert_version(
        &self,
        tx: &mut Self::Tx,
        version: i64,
    ) -> MigrationResult<VersionRecord> {
        if self.fail_insert_for == Some(version) {
            return Err(MigrationError::Store("induced insert failure".to_string()));
        }
        let mut state = self.state.lock().unwrap();
        state.next_id += 1;
        let record = VersionRecord {
            id: state.next_id,
            version,
            applied_at: Utc::now(),
        };
        tx.inserts.push(record.clone());
        Ok(record)
    }

    async fn delete_version(&self, tx: &mut Self::Tx, id: i64) -> MigrationResult<()> {
        tx.deletes.push(id);
        Ok(())
    }
}

fn register_table_migration(migrator: &mut Migrator<MockStore>, version: i64, table: &str) {
    let create = table.to_string();
    let drop = table.to_string();
    migrator.register(
        version,
        move |schema: &mut Schema<MockTx>| {
            schema.create_table(&create, |t| {
                t.id("id");
            });
        },
        move |schema: &mut Schema<MockTx>| {
            schema.drop_table(&drop);
        },
    );
}

#[tokio::test]
async fn test_migrate_applies_pending_in_version_order() {
    let store = MockStore::new();
    store.seed(&[(1, 20200829115100)]);
    let state = store.clone();

    let mut migrator = Migrator::new(store);
    register_table_migration(&mut migrator, 20200829084000, "users");
    register_table_migration(&mut migrator, 20200828100000, "tags");
    register_table_migration(&mut migrator, 20200829115100, "books");

    let outcome = migrator.migrate().await.unwrap();
    assert_eq!(outcome.applied, vec![20200828100000, 20200829084000]);
    assert_eq!(outcome.already_applied, 1);

    assert_eq!(
        state.recorded_versions(),
        vec![20200828100000, 20200829084000, 20200829115100]
    );
    let inner = state.state.lock().unwrap();
    assert_eq!(inner.begun, 2);
    assert_eq!(inner.committed, 2);
    assert_eq!(inner.rolled_back, 0);
    assert_eq!(
        inner.committed_ops,
        vec!["create_table tags", "create_table users"]
    );
}

#[tokio::test]
async fn test_migrate_with_nothing_pending_is_noop() {
    let store = MockStore::new();
    store.seed(&[(1, 1), (2, 2)]);
    let state = store.clone();

    let mut migrator = Migrator::new(store);
    register_table_migration(&mut migrator, 1, "users");
    register_table_migration(&mut migrator, 2, "tags");

    let outcome = migrator.migrate().await.unwrap();
    assert!(outcome.applied.is_empty());
    assert_eq!(outcome.already_applied, 2);
    assert_eq!(state.state.lock().unwrap().begun, 0);
}

#[tokio::test]
async fn test_migrate_stops_at_first_failing_step() {
    let store = MockStore::failing_insert(2);
    let state = store.clone();

    let mut migrator = Migrator::new(store);
    register_table_migration(&mut migrator, 1, "users");
    register_table_migration(&mut migrator, 2, "tags");
    register_table_migration(&mut migrator, 3, "books");

    let err = migrator.migrate().await.unwrap_err();
    assert_eq!(err.failed_version(), Some(2));
    assert!(!err.is_fatal());

    // Version 1 committed; version 2 rolled back; version 3 never started.
    assert_eq!(state.recorded_versions(), vec![1]);
    let inner = state.state.lock().unwrap();
    assert_eq!(inner.begun, 2);
    assert_eq!(inner.committed, 1);
    assert_eq!(inner.rolled_back, 1);
    assert_eq!(inner.committed_ops, vec!["create_table users"]);
}

#[tokio::test]
async fn test_migrate_aborts_on_broken_history() {
    let store = MockStore::new();
    store.seed(&[(1, 1), (2, 2), (3, 3)]);
    let state = store.clone();

    let mut migrator = Migrator::new(store);
    register_table_migration(&mut migrator, 1, "users");
    register_table_migration(&mut migrator, 2, "tags");

    let err = migrator.migrate().await.unwrap_err();
    assert!(err.is_fatal());
    assert_eq!(state.state.lock().unwrap().begun, 0);
}

#[tokio::test]
async fn test_duplicate_registration_is_broken_history() {
    let store = MockStore::new();
    let state = store.clone();

    let mut migrator = Migrator::new(store);
    register_table_migration(&mut migrator, 1, "users");
    register_table_migration(&mut migrator, 1, "tags");

    let err = migrator.migrate().await.unwrap_err();
    assert!(err.is_fatal());
    assert_eq!(state.state.lock().unwrap().begun, 0);
}

#[tokio::test]
async fn test_rollback_reverts_only_most_recent() {
    let store = MockStore::new();
    store.seed(&[(1, 1), (2, 2)]);
    let state = store.clone();

    let mut migrator = Migrator::new(store);
    register_table_migration(&mut migrator, 1, "users");
    register_table_migration(&mut migrator, 2, "tags");

    let outcome = migrator.rollback().await.unwrap();
    assert_eq!(outcome.rolled_back, Some(2));

    assert_eq!(state.recorded_versions(), vec![1]);
    let inner = state.state.lock().unwrap();
    assert_eq!(inner.begun, 1);
    assert_eq!(inner.committed, 1);
    assert_eq!(inner.committed_ops, vec!["drop_table tags"]);
}

#[tokio::test]
async fn test_rollback_with_nothing_applied_is_noop() {
    let store = MockStore::new();
    let state = store.clone();

    let mut migrator = Migrator::new(store);
    register_table_migration(&mut migrator, 1, "users");

    let outcome = migrator.rollback().await.unwrap();
    assert_eq!(outcome.rolled_back, None);
    assert_eq!(state.state.lock().unwrap().begun, 0);
}

struct FailingHook;

#[async_trait]
impl DataHook<MockTx> for FailingHook {
    async fn run(&self, _tx: &mut MockTx) -> MigrationResult<()> {
        Err(MigrationError::Store("hook failed".to_string()))
    }
}

#[tokio::test]
async fn test_rollback_failure_keeps_record() {
    let store = MockStore::new();
    store.seed(&[(1, 1)]);
    let state = store.clone();

    let mut migrator = Migrator::new(store);
    migrator.register(
        1,
        |schema: &mut Schema<MockTx>| {
            schema.create_table("users", |t| {
                t.id("id");
            });
        },
        |schema: &mut Schema<MockTx>| {
            schema.run(FailingHook);
        },
    );

    let err = migrator.rollback().await.unwrap_err();
    assert_eq!(err.failed_version(), Some(1));

    assert_eq!(state.recorded_versions(), vec![1]);
    let inner = state.state.lock().unwrap();
    assert_eq!(inner.committed, 0);
    assert_eq!(inner.rolled_back, 1);
}

struct MarkerHook(&'static str);

#[async_trait]
impl DataHook<MockTx> for MarkerHook {
    async fn run(&self, tx: &mut MockTx) -> MigrationResult<()> {
        tx.ops.push(format!("hook {}", self.0));
        Ok(())
    }
}

#[tokio::test]
async fn test_data_hook_runs_inside_migration_transaction() {
    let store = MockStore::new();
    let state = store.clone();

    let mut migrator = Migrator::new(store);
    migrator.register(
        1,
        |schema: &mut Schema<MockTx>| {
            schema.create_table("tags", |t| {
                t.id("id");
            });
            schema.run(MarkerHook("backfill"));
        },
        |schema: &mut Schema<MockTx>| {
            schema.drop_table("tags");
        },
    );

    migrator.migrate().await.unwrap();
    let inner = state.state.lock().unwrap();
    assert_eq!(inner.committed_ops, vec!["create_table tags", "hook backfill"]);
}

struct RecordingObserver {
    events: Arc<Mutex<Vec<String>>>,
}

#[async_trait]
impl MigrationObserver for RecordingObserver {
    async fn started(&self, operation: &str) {
        self.events
            .lock()
            .unwrap()
            .push(format!("started {}", operation));
    }

    async fn finished(&self, operation: &str, error: Option<&MigrationError>) {
        let result = if error.is_some() { "err" } else { "ok" };
        self.events
            .lock()
            .unwrap()
            .push(format!("finished {} {}", operation, result));
    }
}

#[tokio::test]
async fn test_observer_wraps_operations() {
    let events = Arc::new(Mutex::new(Vec::new()));
    let store = MockStore::new();

    let mut migrator = Migrator::new(store);
    register_table_migration(&mut migrator, 1, "users");
    migrator.observe(Box::new(RecordingObserver {
        events: events.clone(),
    }));

    migrator.migrate().await.unwrap();
    migrator.rollback().await.unwrap();

    assert_eq!(
        *events.lock().unwrap(),
        vec![
            "started migrate",
            "finished migrate ok",
            "started rollback",
            "finished rollback ok",
        ]
    );
}

#[tokio::test]
async fn test_observer_sees_failures() {
    let events = Arc::new(Mutex::new(Vec::new()));
    let store = MockStore::new();
    store.seed(&[(1, 99)]);

    let mut migrator = Migrator::new(store);
    register_table_migration(&mut migrator, 1, "users");
    migrator.observe(Box::new(RecordingObserver {
        events: events.clone(),
    }));

    assert!(migrator.migrate().await.is_err());
    assert_eq!(
        *events.lock().unwrap(),
        vec!["started migrate", "finished migrate err"]
    );
}

#[tokio::test]
async fn test_status_reports_synced_sequence() {
    let store = MockStore::new();
    store.seed(&[(7, 2)]);

    let mut migrator = Migrator::new(store);
    register_table_migration(&mut migrator, 1, "users");
    register_table_migration(&mut migrator, 2, "tags");

    let status = migrator.status().await.unwrap();
    assert_eq!(status.len(), 2);
    assert!(!status[0].applied);
    assert_eq!(status[0].version, 1);
    assert!(status[1].applied);
    assert_eq!(status[1].id, 7);
}
