//! Presigned upload coordinator
//!
//! Issues one time-limited write URL per requested logical file, with the
//! deterministic key each URL targets. URLs are single-use-intent: bytes
//! may be overwritten, and the orchestrator trusts whatever exists at
//! trigger time. URL expiry never deletes the task; only the retention
//! sweep produces EXPIRED.

use crate::catalog::Catalog;
use crate::storage::{keys, ObjectStore, PresignedUrl, StorageError};
use crate::task::{TaskStatus, TaskStore, TaskStoreError};
use chrono::Duration;
use serde::Serialize;
use std::sync::Arc;
use thiserror::Error;
use tracing::info;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum UploadError {
    #[error("Task not found: {0}")]
    TaskNotFound(Uuid),

    #[error("Task is {0}; upload URLs are only issued before processing")]
    WrongState(TaskStatus),

    #[error("Tool '{0}' is not in the catalog")]
    UnknownTool(String),

    #[error("Tool '{tool}' does not accept an input named '{name}'")]
    UnknownFile { tool: String, name: String },

    #[error("Empty file manifest")]
    EmptyManifest,

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Task store error: {0}")]
    Store(TaskStoreError),
}

/// One issued upload slot
#[derive(Debug, Clone, Serialize)]
pub struct IssuedUpload {
    pub logical_name: String,
    pub key: String,
    pub url: url::Url,
    pub expires_at: chrono::DateTime<chrono::Utc>,
}

pub struct UploadCoordinator {
    tasks: Arc<dyn TaskStore>,
    objects: Arc<dyn ObjectStore>,
    catalog: Arc<Catalog>,
    url_ttl: Duration,
}

impl UploadCoordinator {
    pub fn new(
        tasks: Arc<dyn TaskStore>,
        objects: Arc<dyn ObjectStore>,
        catalog: Arc<Catalog>,
        url_ttl: Duration,
    ) -> Self {
        Self {
            tasks,
            objects,
            catalog,
            url_ttl,
        }
    }

    /// Issue presigned PUT URLs for the requested manifest.
    ///
    /// Side effect: CREATED -> UPLOADING on first successful issuance. If
    /// the storage backend is unreachable the call fails outright and the
    /// task stays CREATED.
    pub async fn request_upload_urls(
        &self,
        task_id: Uuid,
        manifest: &[String],
    ) -> Result<Vec<IssuedUpload>, UploadError> {
        if manifest.is_empty() {
            return Err(UploadError::EmptyManifest);
        }

        let record = self.tasks.get(task_id).await.map_err(|e| match e {
            TaskStoreError::NotFound(id) => UploadError::TaskNotFound(id),
            other => UploadError::Store(other),
        })?;

        match record.status {
            TaskStatus::Created | TaskStatus::Uploading => {}
            other => return Err(UploadError::WrongState(other)),
        }

        let tool = self
            .catalog
            .tool(&record.tool_id)
            .ok_or_else(|| UploadError::UnknownTool(record.tool_id.clone()))?;

        for name in manifest {
            keys::validate_name(name)?;
            if !tool.accepts_input(name) {
                return Err(UploadError::UnknownFile {
                    tool: tool.id.clone(),
                    name: name.clone(),
                });
            }
        }

        // Presign everything before the state transition, so a backend
        // outage leaves the task in CREATED
        let mut issued = Vec::with_capacity(manifest.len());
        for name in manifest {
            let key = keys::input_key(&record.user_id, task_id, name);
            let PresignedUrl {
                key,
                url,
                expires_at,
            } = self.objects.presign_put(&key, self.url_ttl).await?;
            issued.push(IssuedUpload {
                logical_name: name.clone(),
                key,
                url,
                expires_at,
            });
        }

        if record.status == TaskStatus::Created {
            self.tasks
                .transition(task_id, TaskStatus::Created, TaskStatus::Uploading)
                .await
                .map_err(UploadError::Store)?;
        }

        info!(
            task_id = %task_id,
            files = issued.len(),
            ttl_secs = self.url_ttl.num_seconds(),
            "Issued upload URLs"
        );
        Ok(issued)
    }
}
