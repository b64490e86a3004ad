//! Schema builder handle consumed by migration procedures
//!
//! Migration bodies describe their changes against a [`Schema`], which
//! collects declarative operations. Nothing here touches the database:
//! rendering and executing the operations is the store's job, which is what
//! keeps the declared changes and the version bookkeeping inside the same
//! transaction.

use async_trait::async_trait;

use crate::error::MigrationResult;

/// A migration body: anything that can describe its changes against a
/// schema builder. Implemented for plain closures, so bodies can be
/// functions, closures, or data-driven descriptor types.
pub trait SchemaProc<Tx>: Send + Sync {
    /// Describe the desired change by enqueueing operations
    fn build(&self, schema: &mut Schema<Tx>);
}

impl<Tx, F> SchemaProc<Tx> for F
where
    F: Fn(&mut Schema<Tx>) + Send + Sync,
{
    fn build(&self, schema: &mut Schema<Tx>) {
        self(schema)
    }
}

/// Escape hatch for data migrations: an arbitrary procedure executed
/// against the live transaction handle, atomically with the rest of the
/// migration's operations.
#[async_trait]
pub trait DataHook<Tx>: Send + Sync {
    /// Run the procedure inside the migration's transaction
    async fn run(&self, tx: &mut Tx) -> MigrationResult<()>;
}

/// Column types supported by the declarative builder
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ColumnType {
    /// Auto-incrementing integer, used for primary keys
    Serial,
    /// Variable-length string; `None` renders as unbounded text
    String(Option<u32>),
    Text,
    Integer,
    BigInteger,
    Boolean,
    Timestamp,
    /// Raw database type, passed through verbatim
    Raw(String),
}

/// A single column definition
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Column {
    pub name: String,
    pub ty: ColumnType,
    pub primary_key: bool,
    pub not_null: bool,
    pub default: Option<String>,
}

impl Column {
    pub fn new(name: &str, ty: ColumnType) -> Self {
        Self {
            name: name.to_string(),
            ty,
            primary_key: false,
            not_null: false,
            default: None,
        }
    }
}

/// Table-level constraints
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Constraint {
    PrimaryKey(Vec<String>),
    ForeignKey {
        column: String,
        references_table: String,
        references_column: String,
    },
    Unique(Vec<String>),
}

/// Table builder for create-table operations
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Table {
    pub name: String,
    pub columns: Vec<Column>,
    pub constraints: Vec<Constraint>,
}

impl Table {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            columns: Vec::new(),
            constraints: Vec::new(),
        }
    }

    /// Add a column with an explicit type
    pub fn column(&mut self, name: &str, ty: ColumnType) -> &mut Self {
        self.columns.push(Column::new(name, ty));
        self
    }

    /// Add an auto-increment primary key column
    pub fn id(&mut self, name: &str) -> &mut Self {
        let mut column = Column::new(name, ColumnType::Serial);
        column.primary_key = true;
        self.columns.push(column);
        self
    }

    /// Add a string column
    pub fn string(&mut self, name: &str, length: Option<u32>) -> &mut Self {
        self.column(name, ColumnType::String(length))
    }

    /// Add a text column
    pub fn text(&mut self, name: &str) -> &mut Self {
        self.column(name, ColumnType::Text)
    }

    /// Add an integer column
    pub fn integer(&mut self, name: &str) -> &mut Self {
        self.column(name, ColumnType::Integer)
    }

    /// Add a 64-bit integer column
    pub fn big_integer(&mut self, name: &str) -> &mut Self {
        self.column(name, ColumnType::BigInteger)
    }

    /// Add a boolean column
    pub fn boolean(&mut self, name: &str) -> &mut Self {
        self.column(name, ColumnType::Boolean)
    }

    /// Add a timestamp column
    pub fn timestamp(&mut self, name: &str) -> &mut Self {
        self.column(name, ColumnType::Timestamp)
    }

    /// Add `created_at`/`updated_at` timestamp columns
    pub fn timestamps(&mut self) -> &mut Self {
        for name in ["created_at", "updated_at"] {
            let mut column = Column::new(name, ColumnType::Timestamp);
            column.not_null = true;
            column.default = Some("CURRENT_TIMESTAMP".to_string());
            self.columns.push(column);
        }
        self
    }

    /// Add a primary key constraint
    pub fn primary_key(&mut self, columns: &[&str]) -> &mut Self {
        self.constraints.push(Constraint::PrimaryKey(
            columns.iter().map(|c| c.to_string()).collect(),
        ));
        self
    }

    /// Add a foreign key constraint
    pub fn foreign_key(
        &mut self,
        column: &str,
        references_table: &str,
        references_column: &str,
    ) -> &mut Self {
        self.constraints.push(Constraint::ForeignKey {
            column: column.to_string(),
            references_table: references_table.to_string(),
            references_column: references_column.to_string(),
        });
        self
    }

    /// Add a unique constraint
    pub fn unique(&mut self, columns: &[&str]) -> &mut Self {
        self.constraints.push(Constraint::Unique(
            columns.iter().map(|c| c.to_string()).collect(),
        ));
        self
    }
}

/// One declared schema operation
pub enum SchemaOp<Tx> {
    CreateTable(Table),
    DropTable {
        name: String,
        if_exists: bool,
    },
    AddColumn {
        table: String,
        column: Column,
    },
    DropColumn {
        table: String,
        column: String,
    },
    CreateIndex {
        table: String,
        columns: Vec<String>,
        name: Option<String>,
    },
    DropIndex {
        name: String,
    },
    /// Raw SQL statement, passed through verbatim
    Exec(String),
    /// Arbitrary procedure run against the live transaction
    Run(Box<dyn DataHook<Tx>>),
}

/// Ordered collector of schema operations for one migration direction
pub struct Schema<Tx> {
    ops: Vec<SchemaOp<Tx>>,
}

impl<Tx> Schema<Tx> {
    pub fn new() -> Self {
        Self { ops: Vec::new() }
    }

    /// Create a new table
    pub fn create_table<F>(&mut self, name: &str, build: F) -> &mut Self
    where
        F: FnOnce(&mut Table),
    {
        let mut table = Table::new(name);
        build(&mut table);
        self.ops.push(SchemaOp::CreateTable(table));
        self
    }

    /// Drop a table
    pub fn drop_table(&mut self, name: &str) -> &mut Self {
        self.ops.push(SchemaOp::DropTable {
            name: name.to_string(),
            if_exists: false,
        });
        self
    }

    /// Drop a table if it exists
    pub fn drop_table_if_exists(&mut self, name: &str) -> &mut Self {
        self.ops.push(SchemaOp::DropTable {
            name: name.to_string(),
            if_exists: true,
        });
        self
    }

    /// Add a column to an existing table
    pub fn add_column(&mut self, table: &str, name: &str, ty: ColumnType) -> &mut Self {
        self.ops.push(SchemaOp::AddColumn {
            table: table.to_string(),
            column: Column::new(name, ty),
        });
        self
    }

    /// Drop a column from an existing table
    pub fn drop_column(&mut self, table: &str, column: &str) -> &mut Self {
        self.ops.push(SchemaOp::DropColumn {
            table: table.to_string(),
            column: column.to_string(),
        });
        self
    }

    /// Create an index
    pub fn create_index(
        &mut self,
        table: &str,
        columns: &[&str],
        name: Option<&str>,
    ) -> &mut Self {
        self.ops.push(SchemaOp::CreateIndex {
            table: table.to_string(),
            columns: columns.iter().map(|c| c.to_string()).collect(),
            name: name.map(|n| n.to_string()),
        });
        self
    }

    /// Drop an index
    pub fn drop_index(&mut self, name: &str) -> &mut Self {
        self.ops.push(SchemaOp::DropIndex {
            name: name.to_string(),
        });
        self
    }

    /// Enqueue a raw SQL statement
    pub fn exec(&mut self, sql: &str) -> &mut Self {
        self.ops.push(SchemaOp::Exec(sql.to_string()));
        self
    }

    /// Enqueue an arbitrary procedure to run against the live transaction
    pub fn run<H>(&mut self, hook: H) -> &mut Self
    where
        H: DataHook<Tx> + 'static,
    {
        self.ops.push(SchemaOp::Run(Box::new(hook)));
        self
    }

    /// All operations declared so far, in declaration order
    pub fn ops(&self) -> &[SchemaOp<Tx>] {
        &self.ops
    }
}

impl<Tx> Default for Schema<Tx> {
    fn default() -> Self {
        Self::new()
    }
}
