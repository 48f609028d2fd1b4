//! `TaskStore` trait: the async persistence seam for task records.

use async_trait::async_trait;

use crate::error::StoreError;
use crate::task::{TaskId, TaskRecord, TaskStatus};

/// Backend-agnostic task persistence.
///
/// The coordinator writes through this trait before committing a change to its
/// in-memory view, so a failing store leaves the view untouched.
#[async_trait]
pub trait TaskStore: Send + Sync {
    /// Insert a new task. Fails with `Constraint` if the id is taken.
    async fn create(&self, task: &TaskRecord) -> Result<(), StoreError>;

    /// Get a task by id.
    async fn get(&self, id: &TaskId) -> Result<Option<TaskRecord>, StoreError>;

    /// Replace a stored task. Fails with `NotFound` if it does not exist.
    async fn update(&self, task: &TaskRecord) -> Result<(), StoreError>;

    /// Delete a task. Returns whether it existed.
    async fn delete(&self, id: &TaskId) -> Result<bool, StoreError>;

    /// All stored tasks.
    async fn list(&self) -> Result<Vec<TaskRecord>, StoreError>;

    /// Tasks with the given status.
    async fn list_by_status(&self, status: TaskStatus) -> Result<Vec<TaskRecord>, StoreError> {
        Ok(self
            .list()
            .await?
            .into_iter()
            .filter(|t| t.status == status)
            .collect())
    }
}
