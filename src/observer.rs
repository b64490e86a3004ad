//! Instrumentation hooks
//!
//! Observers are invoked around the runner's named operations, purely for
//! observability. They never affect control flow and the operation's result
//! is surfaced to the caller unmodified.

use async_trait::async_trait;

use crate::error::MigrationError;

/// Observer invoked around a named runner operation ("migrate", "rollback")
#[async_trait]
pub trait MigrationObserver: Send + Sync {
    /// Called before the operation starts
    async fn started(&self, _operation: &str) {}

    /// Called after the operation finishes, with its error if it failed
    async fn finished(&self, _operation: &str, _error: Option<&MigrationError>) {}
}

pub(crate) struct ObserverSet {
    observers: Vec<Box<dyn MigrationObserver>>,
}

impl ObserverSet {
    pub(crate) fn new() -> Self {
        Self {
            observers: Vec::new(),
        }
    }

    pub(crate) fn register(&mut self, observer: Box<dyn MigrationObserver>) {
        self.observers.push(observer);
    }

    pub(crate) async fn started(&self, operation: &str) {
        for observer in &self.observers {
            observer.started(operation).await;
        }
    }

    pub(crate) async fn finished(&self, operation: &str, error: Option<&MigrationError>) {
        for observer in &self.observers {
            observer.finished(operation, error).await;
        }
    }
}
