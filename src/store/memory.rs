//! In-memory `TaskStore`, optionally seeded from a JSON file.

use std::collections::HashMap;
use std::path::Path;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::error::{ConfigError, StoreError};
use crate::schedule::StandardCron;
use crate::store::traits::TaskStore;
use crate::task::{TaskId, TaskRecord};

/// Task store backed by a `HashMap`. Records are kept in insertion order for
/// `list`.
#[derive(Debug, Default)]
pub struct InMemoryTaskStore {
    inner: RwLock<Inner>,
}

#[derive(Debug, Default)]
struct Inner {
    tasks: HashMap<TaskId, TaskRecord>,
    order: Vec<TaskId>,
}

impl InMemoryTaskStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a store pre-populated with `tasks`. Later duplicates replace
    /// earlier ones.
    pub fn with_tasks(tasks: impl IntoIterator<Item = TaskRecord>) -> Self {
        let mut inner = Inner::default();
        for task in tasks {
            if !inner.tasks.contains_key(&task.id) {
                inner.order.push(task.id.clone());
            }
            inner.tasks.insert(task.id.clone(), task);
        }
        Self {
            inner: RwLock::new(inner),
        }
    }

    /// Load a JSON array of task records. Every record's schedule must be
    /// valid.
    pub async fn from_json_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let file_error = |reason: String| ConfigError::TaskFile {
            path: path.display().to_string(),
            reason,
        };

        let raw = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| file_error(e.to_string()))?;
        let tasks: Vec<TaskRecord> =
            serde_json::from_str(&raw).map_err(|e| file_error(e.to_string()))?;
        for task in &tasks {
            task.schedule
                .validate(&StandardCron)
                .map_err(|e| file_error(format!("task {}: {e}", task.id)))?;
        }

        tracing::info!(path = %path.display(), count = tasks.len(), "Loaded task file");
        Ok(Self::with_tasks(tasks))
    }
}

#[async_trait]
impl TaskStore for InMemoryTaskStore {
    async fn create(&self, task: &TaskRecord) -> Result<(), StoreError> {
        let mut inner = self.inner.write().await;
        if inner.tasks.contains_key(&task.id) {
            return Err(StoreError::Constraint(format!(
                "task {} already exists",
                task.id
            )));
        }
        inner.order.push(task.id.clone());
        inner.tasks.insert(task.id.clone(), task.clone());
        Ok(())
    }

    async fn get(&self, id: &TaskId) -> Result<Option<TaskRecord>, StoreError> {
        Ok(self.inner.read().await.tasks.get(id).cloned())
    }

    async fn update(&self, task: &TaskRecord) -> Result<(), StoreError> {
        let mut inner = self.inner.write().await;
        match inner.tasks.get_mut(&task.id) {
            Some(existing) => {
                *existing = task.clone();
                Ok(())
            }
            None => Err(StoreError::NotFound {
                entity: "task".to_string(),
                id: task.id.to_string(),
            }),
        }
    }

    async fn delete(&self, id: &TaskId) -> Result<bool, StoreError> {
        let mut inner = self.inner.write().await;
        let existed = inner.tasks.remove(id).is_some();
        if existed {
            inner.order.retain(|other| other != id);
        }
        Ok(existed)
    }

    async fn list(&self) -> Result<Vec<TaskRecord>, StoreError> {
        let inner = self.inner.read().await;
        Ok(inner
            .order
            .iter()
            .filter_map(|id| inner.tasks.get(id).cloned())
            .collect())
    }
}
