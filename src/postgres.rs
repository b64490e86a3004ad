//! PostgreSQL store backed by sqlx
//!
//! Renders the declarative schema operations to PostgreSQL DDL and owns the
//! version bookkeeping table. Rendering is pure string building so it can be
//! tested without a database.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Postgres, Row, Transaction};

use crate::error::{MigrationError, MigrationResult};
use crate::schema::{Column, ColumnType, Constraint, SchemaOp, Table};
use crate::store::{MigrationStore, VersionRecord};

/// Transaction handle used by [`PostgresStore`]
pub type PgTx = Transaction<'static, Postgres>;

/// Configuration for the PostgreSQL store
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Name of the version bookkeeping table
    pub table: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            table: "schema_versions".to_string(),
        }
    }
}

/// PostgreSQL implementation of [`MigrationStore`]
pub struct PostgresStore {
    pool: PgPool,
    config: StoreConfig,
}

impl PostgresStore {
    /// Create a store over an existing pool with the default configuration
    pub fn new(pool: PgPool) -> Self {
        Self::with_config(pool, StoreConfig::default())
    }

    /// Create a store over an existing pool with a custom configuration
    pub fn with_config(pool: PgPool, config: StoreConfig) -> Self {
        Self { pool, config }
    }

    /// Connect to a database URL
    pub async fn connect(database_url: &str) -> MigrationResult<Self> {
        let pool = PgPool::connect(database_url)
            .await
            .map_err(|e| MigrationError::Store(format!("failed to connect: {}", e)))?;
        Ok(Self::new(pool))
    }

    /// The underlying pool
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

}

fn version_table_sql(table: &str) -> String {
    format!(
        "CREATE TABLE IF NOT EXISTS {} (\n    \
            id BIGSERIAL PRIMARY KEY,\n    \
            version BIGINT NOT NULL UNIQUE,\n    \
            applied_at TIMESTAMPTZ NOT NULL DEFAULT NOW()\n\
        );",
        table
    )
}

#[async_trait]
impl MigrationStore for PostgresStore {
    type Tx = PgTx;

    async fn ensure_version_table(&self) -> MigrationResult<()> {
        sqlx::query(&version_table_sql(&self.config.table))
            .execute(&self.pool)
            .await
            .map_err(|e| {
                MigrationError::Store(format!("failed to create version table: {}", e))
            })?;
        Ok(())
    }

    async fn applied_versions(&self) -> MigrationResult<Vec<VersionRecord>> {
        let sql = format!(
            "SELECT id, version, applied_at FROM {} ORDER BY version ASC",
            self.config.table
        );
        let rows = sqlx::query(&sql)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| MigrationError::Store(format!("failed to load versions: {}", e)))?;

        let mut records = Vec::with_capacity(rows.len());
        for row in rows {
            let id: i64 = row
                .try_get("id")
                .map_err(|e| MigrationError::Store(format!("failed to read id: {}", e)))?;
            let version: i64 = row
                .try_get("version")
                .map_err(|e| MigrationError::Store(format!("failed to read version: {}", e)))?;
            let applied_at: DateTime<Utc> = row
                .try_get("applied_at")
                .map_err(|e| MigrationError::Store(format!("failed to read applied_at: {}", e)))?;
            records.push(VersionRecord {
                id,
                version,
                applied_at,
            });
        }
        Ok(records)
    }

    async fn begin(&self) -> MigrationResult<Self::Tx> {
        self.pool
            .begin()
            .await
            .map_err(|e| MigrationError::Transaction(format!("failed to begin: {}", e)))
    }

    async fn commit(&self, tx: Self::Tx) -> MigrationResult<()> {
        tx.commit()
            .await
            .map_err(|e| MigrationError::Transaction(format!("failed to commit: {}", e)))
    }

    async fn rollback(&self, tx: Self::Tx) -> MigrationResult<()> {
        tx.rollback()
            .await
            .map_err(|e| MigrationError::Transaction(format!("failed to rollback: {}", e)))
    }

    async fn apply(&self, tx: &mut Self::Tx, op: &SchemaOp<Self::Tx>) -> MigrationResult<()> {
        let sql = match op {
            SchemaOp::CreateTable(table) => create_table_sql(table),
            SchemaOp::DropTable { name, if_exists } => {
                if *if_exists {
                    format!("DROP TABLE IF EXISTS {};", name)
                } else {
                    format!("DROP TABLE {};", name)
                }
            }
            SchemaOp::AddColumn { table, column } => {
                format!("ALTER TABLE {} ADD COLUMN {};", table, column_sql(column))
            }
            SchemaOp::DropColumn { table, column } => {
                format!("ALTER TABLE {} DROP COLUMN {};", table, column)
            }
            SchemaOp::CreateIndex {
                table,
                columns,
                name,
            } => index_sql(table, columns, name.as_deref()),
            SchemaOp::DropIndex { name } => format!("DROP INDEX IF EXISTS {};", name),
            SchemaOp::Exec(sql) => sql.clone(),
            SchemaOp::Run(hook) => return hook.run(tx).await,
        };

        sqlx::query(&sql)
            .execute(&mut **tx)
            .await
            .map_err(|e| MigrationError::Store(format!("failed to execute '{}': {}", sql, e)))?;
        Ok(())
    }

    async fn insert_version(
        &self,
        tx: &mut Self::Tx,
        version: i64,
    ) -> MigrationResult<VersionRecord> {
        let sql = format!(
            "INSERT INTO {} (version) VALUES ($1) RETURNING id, applied_at",
            self.config.table
        );
        let row = sqlx::query(&sql)
            .bind(version)
            .fetch_one(&mut **tx)
            .await
            .map_err(|e| MigrationError::Store(format!("failed to record version: {}", e)))?;

        let id: i64 = row
            .try_get("id")
            .map_err(|e| MigrationError::Store(format!("failed to read id: {}", e)))?;
        let applied_at: DateTime<Utc> = row
            .try_get("applied_at")
            .map_err(|e| MigrationError::Store(format!("failed to read applied_at: {}", e)))?;
        Ok(VersionRecord {
            id,
            version,
            applied_at,
        })
    }

    async fn delete_version(&self, tx: &mut Self::Tx, id: i64) -> MigrationResult<()> {
        let sql = format!("DELETE FROM {} WHERE id = $1", self.config.table);
        sqlx::query(&sql)
            .bind(id)
            .execute(&mut **tx)
            .await
            .map_err(|e| MigrationError::Store(format!("failed to delete version: {}", e)))?;
        Ok(())
    }
}

fn create_table_sql(table: &Table) -> String {
    let mut parts: Vec<String> = table.columns.iter().map(column_sql).collect();
    parts.extend(table.constraints.iter().map(constraint_sql));

    format!(
        "CREATE TABLE {} (\n    {}\n);",
        table.name,
        parts.join(",\n    ")
    )
}

fn column_sql(column: &Column) -> String {
    let mut sql = format!("{} {}", column.name, type_sql(&column.ty));
    if column.primary_key {
        sql.push_str(" PRIMARY KEY");
    }
    if column.not_null {
        sql.push_str(" NOT NULL");
    }
    if let Some(default) = &column.default {
        sql.push_str(&format!(" DEFAULT {}", default));
    }
    sql
}

fn type_sql(ty: &ColumnType) -> String {
    match ty {
        ColumnType::Serial => "SERIAL".to_string(),
        ColumnType::String(Some(length)) => format!("VARCHAR({})", length),
        ColumnType::String(None) | ColumnType::Text => "TEXT".to_string(),
        ColumnType::Integer => "INTEGER".to_string(),
        ColumnType::BigInteger => "BIGINT".to_string(),
        ColumnType::Boolean => "BOOLEAN".to_string(),
        ColumnType::Timestamp => "TIMESTAMP".to_string(),
        ColumnType::Raw(raw) => raw.clone(),
    }
}

fn constraint_sql(constraint: &Constraint) -> String {
    match constraint {
        Constraint::PrimaryKey(columns) => format!("PRIMARY KEY ({})", columns.join(", ")),
        Constraint::ForeignKey {
            column,
            references_table,
            references_column,
        } => format!(
            "FOREIGN KEY ({}) REFERENCES {} ({})",
            column, references_table, references_column
        ),
        Constraint::Unique(columns) => format!("UNIQUE ({})", columns.join(", ")),
    }
}

fn index_sql(table: &str, columns: &[String], name: Option<&str>) -> String {
    let default_name = format!("idx_{}_{}", table, columns.join("_"));
    let name = name.unwrap_or(&default_name);
    format!("CREATE INDEX {} ON {} ({});", name, table, columns.join(", "))
}
