//! Task store: durable record of task identity, status and progress
//!
//! The store enforces the single-writer discipline: every status change is
//! a compare-and-swap against the expected current state, so two workers
//! racing to claim the same task cannot both win. Readers never mutate.

use super::{is_valid_transition, TaskRecord, TaskStatus};
use crate::catalog::AgentKind;
use crate::error::TaskFailure;
use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use thiserror::Error;
use tokio::sync::RwLock;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum TaskStoreError {
    #[error("Task not found: {0}")]
    NotFound(Uuid),

    #[error("Invalid transition from {from} to {to}")]
    InvalidTransition { from: TaskStatus, to: TaskStatus },

    #[error("Task {task_id} is {actual}, expected {expected}")]
    UnexpectedStatus {
        task_id: Uuid,
        expected: TaskStatus,
        actual: TaskStatus,
    },

    #[error("Progress may not decrease: {current} -> {requested}")]
    ProgressRegression { current: u8, requested: u8 },

    #[error("Task already exists: {0}")]
    AlreadyExists(Uuid),
}

/// Durable task record store
///
/// Implementations must serialize writes per task; the in-memory reference
/// does so with a single write lock, a database-backed store would use
/// row-level compare-and-swap.
#[async_trait]
pub trait TaskStore: Send + Sync {
    async fn insert(&self, record: TaskRecord) -> Result<(), TaskStoreError>;

    /// Pure read; safe to poll at any frequency
    async fn get(&self, task_id: Uuid) -> Result<TaskRecord, TaskStoreError>;

    /// Compare-and-swap status transition. Fails with `UnexpectedStatus` if
    /// the task is not currently in `from`, which is how a second worker
    /// loses the claim race.
    async fn transition(
        &self,
        task_id: Uuid,
        from: TaskStatus,
        to: TaskStatus,
    ) -> Result<TaskRecord, TaskStoreError>;

    /// Pin the resolved agent list before execution begins
    async fn set_agents(&self, task_id: Uuid, agents: Vec<AgentKind>)
        -> Result<(), TaskStoreError>;

    /// Update progress and the currently executing agent; PROCESSING only,
    /// and progress is monotonically non-decreasing
    async fn update_progress(
        &self,
        task_id: Uuid,
        progress: u8,
        current_agent: Option<AgentKind>,
    ) -> Result<(), TaskStoreError>;

    /// Move to FAILED from QUEUED or PROCESSING, recording the reason
    async fn fail(&self, task_id: Uuid, failure: TaskFailure) -> Result<(), TaskStoreError>;

    /// PROCESSING -> COMPLETED; progress pinned to 100, current agent cleared
    async fn complete(&self, task_id: Uuid) -> Result<(), TaskStoreError>;

    /// FAILED -> QUEUED, clearing error and progress. Billing history is
    /// untouched; re-billing is the ledger's concern.
    async fn retry(&self, task_id: Uuid) -> Result<TaskRecord, TaskStoreError>;

    /// CREATED/UPLOADING -> EXPIRED; called only by the retention sweep
    async fn expire(&self, task_id: Uuid) -> Result<(), TaskStoreError>;

    /// Snapshot of every record, for the retention sweep
    async fn list(&self) -> Result<Vec<TaskRecord>, TaskStoreError>;
}

/// In-memory reference implementation
///
/// A single RwLock over the map serializes all writes, which satisfies the
/// single-writer-per-task requirement without per-task locks.
#[derive(Debug, Default)]
pub struct InMemoryTaskStore {
    records: RwLock<HashMap<Uuid, TaskRecord>>,
}

impl InMemoryTaskStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl TaskStore for InMemoryTaskStore {
    async fn insert(&self, record: TaskRecord) -> Result<(), TaskStoreError> {
        let mut records = self.records.write().await;
        if records.contains_key(&record.task_id) {
            return Err(TaskStoreError::AlreadyExists(record.task_id));
        }
        records.insert(record.task_id, record);
        Ok(())
    }

    async fn get(&self, task_id: Uuid) -> Result<TaskRecord, TaskStoreError> {
        self.records
            .read()
            .await
            .get(&task_id)
            .cloned()
            .ok_or(TaskStoreError::NotFound(task_id))
    }

    async fn transition(
        &self,
        task_id: Uuid,
        from: TaskStatus,
        to: TaskStatus,
    ) -> Result<TaskRecord, TaskStoreError> {
        if !is_valid_transition(from, to) {
            return Err(TaskStoreError::InvalidTransition { from, to });
        }
        let mut records = self.records.write().await;
        let record = records
            .get_mut(&task_id)
            .ok_or(TaskStoreError::NotFound(task_id))?;
        if record.status != from {
            return Err(TaskStoreError::UnexpectedStatus {
                task_id,
                expected: from,
                actual: record.status,
            });
        }
        record.status = to;
        record.updated_at = Utc::now();
        Ok(record.clone())
    }

    async fn set_agents(
        &self,
        task_id: Uuid,
        agents: Vec<AgentKind>,
    ) -> Result<(), TaskStoreError> {
        let mut records = self.records.write().await;
        let record = records
            .get_mut(&task_id)
            .ok_or(TaskStoreError::NotFound(task_id))?;
        record.agents = agents;
        record.updated_at = Utc::now();
        Ok(())
    }

    async fn update_progress(
        &self,
        task_id: Uuid,
        progress: u8,
        current_agent: Option<AgentKind>,
    ) -> Result<(), TaskStoreError> {
        let mut records = self.records.write().await;
        let record = records
            .get_mut(&task_id)
            .ok_or(TaskStoreError::NotFound(task_id))?;
        if record.status != TaskStatus::Processing {
            return Err(TaskStoreError::UnexpectedStatus {
                task_id,
                expected: TaskStatus::Processing,
                actual: record.status,
            });
        }
        if progress < record.progress {
            return Err(TaskStoreError::ProgressRegression {
                current: record.progress,
                requested: progress,
            });
        }
        record.progress = progress.min(100);
        record.current_agent = current_agent;
        record.updated_at = Utc::now();
        Ok(())
    }

    async fn fail(&self, task_id: Uuid, failure: TaskFailure) -> Result<(), TaskStoreError> {
        let mut records = self.records.write().await;
        let record = records
            .get_mut(&task_id)
            .ok_or(TaskStoreError::NotFound(task_id))?;
        if !is_valid_transition(record.status, TaskStatus::Failed) {
            return Err(TaskStoreError::InvalidTransition {
                from: record.status,
                to: TaskStatus::Failed,
            });
        }
        record.status = TaskStatus::Failed;
        record.error = Some(failure);
        record.current_agent = None;
        record.updated_at = Utc::now();
        Ok(())
    }

    async fn complete(&self, task_id: Uuid) -> Result<(), TaskStoreError> {
        let mut records = self.records.write().await;
        let record = records
            .get_mut(&task_id)
            .ok_or(TaskStoreError::NotFound(task_id))?;
        if record.status != TaskStatus::Processing {
            return Err(TaskStoreError::UnexpectedStatus {
                task_id,
                expected: TaskStatus::Processing,
                actual: record.status,
            });
        }
        record.status = TaskStatus::Completed;
        record.progress = 100;
        record.current_agent = None;
        record.updated_at = Utc::now();
        Ok(())
    }

    async fn retry(&self, task_id: Uuid) -> Result<TaskRecord, TaskStoreError> {
        let mut records = self.records.write().await;
        let record = records
            .get_mut(&task_id)
            .ok_or(TaskStoreError::NotFound(task_id))?;
        if record.status != TaskStatus::Failed {
            return Err(TaskStoreError::UnexpectedStatus {
                task_id,
                expected: TaskStatus::Failed,
                actual: record.status,
            });
        }
        record.status = TaskStatus::Queued;
        record.error = None;
        record.progress = 0;
        record.current_agent = None;
        record.updated_at = Utc::now();
        Ok(record.clone())
    }

    async fn expire(&self, task_id: Uuid) -> Result<(), TaskStoreError> {
        let mut records = self.records.write().await;
        let record = records
            .get_mut(&task_id)
            .ok_or(TaskStoreError::NotFound(task_id))?;
        if !is_valid_transition(record.status, TaskStatus::Expired) {
            return Err(TaskStoreError::InvalidTransition {
                from: record.status,
                to: TaskStatus::Expired,
            });
        }
        record.status = TaskStatus::Expired;
        record.updated_at = Utc::now();
        Ok(())
    }

    async fn list(&self) -> Result<Vec<TaskRecord>, TaskStoreError> {
        Ok(self.records.read().await.values().cloned().collect())
    }
}
