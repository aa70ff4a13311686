use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, PoisonError, RwLock};

use async_trait::async_trait;
use serde_json::Value;
use tracing::debug;

use crate::error::{Result, SchedulerError};

/// A callable bound to a job type.
///
/// Receives the decoded argument sequence positionally; an empty `Vec` means
/// the job was scheduled without arguments.
#[async_trait]
pub trait JobHandler: Send + Sync {
    async fn run(&self, args: Vec<Value>) -> anyhow::Result<()>;
}

#[async_trait]
impl<F, Fut> JobHandler for F
where
    F: Fn(Vec<Value>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
{
    async fn run(&self, args: Vec<Value>) -> anyhow::Result<()> {
        (self)(args).await
    }
}

/// In-memory name → handler map. Only grows, except through [`JobRegistry::clear`].
#[derive(Default)]
pub struct JobRegistry {
    handlers: RwLock<HashMap<String, Arc<dyn JobHandler>>>,
}

impl JobRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind `name` to `handler`. Re-registering a name is an error, never an overwrite.
    pub fn register(&self, name: impl Into<String>, handler: Arc<dyn JobHandler>) -> Result<()> {
        let name = name.into();
        // Entries are inserted whole, so a poisoned map is still consistent.
        let mut handlers = self.handlers.write().unwrap_or_else(PoisonError::into_inner);
        if handlers.contains_key(&name) {
            return Err(SchedulerError::DuplicateRegistration { name });
        }
        debug!(job_type = %name, "job handler registered");
        handlers.insert(name, handler);
        Ok(())
    }

    pub fn resolve(&self, name: &str) -> Option<Arc<dyn JobHandler>> {
        let handlers = self.handlers.read().unwrap_or_else(PoisonError::into_inner);
        handlers.get(name).map(Arc::clone)
    }

    pub fn contains(&self, name: &str) -> bool {
        let handlers = self.handlers.read().unwrap_or_else(PoisonError::into_inner);
        handlers.contains_key(name)
    }

    /// Drop every registration. Meant for resetting between independent runs.
    pub fn clear(&self) {
        let mut handlers = self.handlers.write().unwrap_or_else(PoisonError::into_inner);
        let count = handlers.len();
        handlers.clear();
        debug!(count, "job registry cleared");
    }

    pub fn len(&self) -> usize {
        self.handlers.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Registered job type names, sorted.
    pub fn names(&self) -> Vec<String> {
        let handlers = self.handlers.read().unwrap_or_else(PoisonError::into_inner);
        let mut names: Vec<String> = handlers.keys().cloned().collect();
        names.sort();
        names
    }
}
