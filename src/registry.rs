//! Migration registry
//!
//! Insertion-ordered collection of versioned migration definitions. The
//! order callers register in is preserved; every algorithm that reasons
//! about pending-vs-applied ranges goes through [`Registry::sorted`].

use crate::schema::{Schema, SchemaProc};

/// A registered migration: a version and its forward/backward procedures
pub struct MigrationDefinition<Tx> {
    /// Caller-chosen version, conventionally a timestamp-like identifier
    pub version: i64,
    up: Box<dyn SchemaProc<Tx>>,
    down: Box<dyn SchemaProc<Tx>>,
}

impl<Tx> MigrationDefinition<Tx> {
    pub fn new(
        version: i64,
        up: impl SchemaProc<Tx> + 'static,
        down: impl SchemaProc<Tx> + 'static,
    ) -> Self {
        Self {
            version,
            up: Box::new(up),
            down: Box::new(down),
        }
    }

    /// Build the forward schema plan
    pub fn build_up(&self) -> Schema<Tx> {
        let mut schema = Schema::new();
        self.up.build(&mut schema);
        schema
    }

    /// Build the backward schema plan
    pub fn build_down(&self) -> Schema<Tx> {
        let mut schema = Schema::new();
        self.down.build(&mut schema);
        schema
    }
}

/// Insertion-ordered migration definitions.
///
/// Duplicate versions are not rejected here; reconciliation reports them as
/// broken history before anything executes.
pub struct Registry<Tx> {
    definitions: Vec<MigrationDefinition<Tx>>,
}

impl<Tx> Registry<Tx> {
    pub fn new() -> Self {
        Self {
            definitions: Vec::new(),
        }
    }

    /// Append a migration definition, preserving registration order
    pub fn register(
        &mut self,
        version: i64,
        up: impl SchemaProc<Tx> + 'static,
        down: impl SchemaProc<Tx> + 'static,
    ) {
        self.definitions
            .push(MigrationDefinition::new(version, up, down));
    }

    /// Ascending-by-version view of the definitions. Restartable: each call
    /// yields a fresh pass; registration order is never mutated.
    pub fn sorted(&self) -> impl Iterator<Item = &MigrationDefinition<Tx>> + '_ {
        let mut order: Vec<usize> = (0..self.definitions.len()).collect();
        order.sort_by_key(|&i| self.definitions[i].version);
        order.into_iter().map(move |i| &self.definitions[i])
    }

    /// Versions in registration order
    pub fn versions(&self) -> impl Iterator<Item = i64> + '_ {
        self.definitions.iter().map(|d| d.version)
    }

    pub fn len(&self) -> usize {
        self.definitions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.definitions.is_empty()
    }
}

impl<Tx> Default for Registry<Tx> {
    fn default() -> Self {
        Self::new()
    }
}
