//! Task API
//!
//! The boundary exposing task creation, upload-URL issuance, process
//! trigger, status polling and download listing. A thin translation layer:
//! every operation delegates to the stores, the upload coordinator or the
//! orchestrator, and maps their errors to boundary errors. Transport lives
//! in `http`; authentication is outside this crate — callers supply the
//! user scope.

use crate::billing::BillingLedger;
use crate::catalog::{AgentKind, Catalog};
use crate::error::TaskFailure;
use crate::observability::metrics::metrics;
use crate::pipeline::{process, PipelineDeps, ProcessError};
use crate::storage::{keys, ObjectStore, StorageError};
use crate::task::{TaskRecord, TaskStatus, TaskStore, TaskStoreError};
use crate::upload::{IssuedUpload, UploadCoordinator, UploadError};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;
use tracing::info;
use uuid::Uuid;

pub mod http;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Task not found")]
    NotFound,

    #[error("Unknown tool: {0}")]
    UnknownTool(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Task is {actual}; {operation} is not valid in this state")]
    WrongState {
        actual: TaskStatus,
        operation: &'static str,
    },

    #[error("Missing required inputs: {0:?}")]
    MissingInputs(Vec<String>),

    #[error(transparent)]
    Upload(#[from] UploadError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Task store error: {0}")]
    Store(TaskStoreError),

    #[error("Processing error: {0}")]
    Process(#[from] ProcessError),
}

impl From<TaskStoreError> for ApiError {
    fn from(e: TaskStoreError) -> Self {
        match e {
            TaskStoreError::NotFound(_) => ApiError::NotFound,
            other => ApiError::Store(other),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateTaskRequest {
    pub tool_id: String,
    /// Explicit agent list; omitted means the tool's default list
    #[serde(default)]
    pub agents: Option<Vec<AgentKind>>,
}

/// Poller-facing view of a task; always well-formed, never an exception
#[derive(Debug, Clone, Serialize)]
pub struct TaskStatusView {
    pub task_id: Uuid,
    pub status: TaskStatus,
    pub progress: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_agent: Option<AgentKind>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<TaskFailure>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<TaskRecord> for TaskStatusView {
    fn from(record: TaskRecord) -> Self {
        Self {
            task_id: record.task_id,
            status: record.status,
            progress: record.progress,
            current_agent: record.current_agent,
            error: record.error,
            created_at: record.created_at,
            updated_at: record.updated_at,
        }
    }
}

/// One downloadable output artifact
#[derive(Debug, Clone, Serialize)]
pub struct DownloadEntry {
    pub name: String,
    pub url: url::Url,
    pub expires_at: DateTime<Utc>,
}

pub struct TaskApi {
    deps: PipelineDeps,
    uploads: UploadCoordinator,
    download_url_ttl: Duration,
}

impl TaskApi {
    pub fn new(deps: PipelineDeps, upload_url_ttl: Duration, download_url_ttl: Duration) -> Self {
        let uploads = UploadCoordinator::new(
            Arc::clone(&deps.tasks),
            Arc::clone(&deps.objects),
            Arc::clone(&deps.catalog),
            upload_url_ttl,
        );
        Self {
            deps,
            uploads,
            download_url_ttl,
        }
    }

    fn tasks(&self) -> &Arc<dyn TaskStore> {
        &self.deps.tasks
    }

    fn objects(&self) -> &Arc<dyn ObjectStore> {
        &self.deps.objects
    }

    fn catalog(&self) -> &Catalog {
        &self.deps.catalog
    }

    pub fn billing(&self) -> &Arc<dyn BillingLedger> {
        &self.deps.billing
    }

    /// Fetch a task, hiding other users' tasks behind not-found
    async fn owned_task(&self, user_id: &str, task_id: Uuid) -> Result<TaskRecord, ApiError> {
        let record = self.tasks().get(task_id).await?;
        if record.user_id != user_id {
            return Err(ApiError::NotFound);
        }
        Ok(record)
    }

    /// `CreateTask(tool_id, agent_ids?)`
    pub async fn create_task(
        &self,
        user_id: &str,
        request: CreateTaskRequest,
    ) -> Result<TaskStatusView, ApiError> {
        let tool = self
            .catalog()
            .tool(&request.tool_id)
            .ok_or_else(|| ApiError::UnknownTool(request.tool_id.clone()))?;

        let agents = match request.agents {
            Some(agents) if agents.is_empty() => {
                return Err(ApiError::InvalidRequest(
                    "explicit agent list must not be empty".to_string(),
                ));
            }
            Some(agents) => {
                for agent in &agents {
                    if self.catalog().agent(*agent).is_none() {
                        return Err(ApiError::InvalidRequest(format!(
                            "agent '{agent}' is not in the catalog"
                        )));
                    }
                }
                agents
            }
            None => Vec::new(), // resolved to the tool default at trigger time
        };

        let record = TaskRecord::new(user_id, tool.id.clone(), agents);
        let task_id = record.task_id;
        self.tasks().insert(record.clone()).await?;
        metrics().task_created();

        info!(task_id = %task_id, user_id, tool_id = %tool.id, "Task created");
        Ok(record.into())
    }

    /// `RequestUploadURLs(task_id, file_manifest)`
    pub async fn request_upload_urls(
        &self,
        user_id: &str,
        task_id: Uuid,
        manifest: &[String],
    ) -> Result<Vec<IssuedUpload>, ApiError> {
        self.owned_task(user_id, task_id).await?;
        let issued = self.uploads.request_upload_urls(task_id, manifest).await?;
        metrics().upload_urls_issued(issued.len() as u64);
        Ok(issued)
    }

    /// `TriggerProcessing(task_id)`
    ///
    /// Verifies every required input exists before the task may leave
    /// UPLOADING; a missing input fails the call with no state change and
    /// no billing attempted. Processing then runs synchronously within
    /// this call (the QUEUED hop is where a queue-backed worker would
    /// claim instead).
    pub async fn trigger_processing(
        &self,
        user_id: &str,
        task_id: Uuid,
    ) -> Result<TaskStatusView, ApiError> {
        let record = self.owned_task(user_id, task_id).await?;
        if record.status != TaskStatus::Uploading {
            return Err(ApiError::WrongState {
                actual: record.status,
                operation: "trigger",
            });
        }

        let tool = self
            .catalog()
            .tool(&record.tool_id)
            .ok_or_else(|| ApiError::UnknownTool(record.tool_id.clone()))?;

        let mut missing = Vec::new();
        for name in &tool.required_inputs {
            let key = keys::input_key(user_id, task_id, name);
            if !self.objects().exists(&key).await? {
                missing.push(name.clone());
            }
        }
        if !missing.is_empty() {
            return Err(ApiError::MissingInputs(missing));
        }

        self.tasks()
            .transition(task_id, TaskStatus::Uploading, TaskStatus::Queued)
            .await?;

        let record = process(task_id, &self.deps).await?;
        Ok(record.into())
    }

    /// `GetTask(task_id)` — pure read, safe to poll at any frequency
    pub async fn get_task(
        &self,
        user_id: &str,
        task_id: Uuid,
    ) -> Result<TaskStatusView, ApiError> {
        Ok(self.owned_task(user_id, task_id).await?.into())
    }

    /// `ListDownloads(task_id)` — valid only once the task is COMPLETED
    pub async fn list_downloads(
        &self,
        user_id: &str,
        task_id: Uuid,
    ) -> Result<Vec<DownloadEntry>, ApiError> {
        let record = self.owned_task(user_id, task_id).await?;
        if record.status != TaskStatus::Completed {
            return Err(ApiError::WrongState {
                actual: record.status,
                operation: "downloads",
            });
        }

        let prefix = keys::outputs_prefix(user_id, task_id);
        let mut entries = Vec::new();
        for key in self.objects().list(&prefix).await? {
            let name = key
                .strip_prefix(&prefix)
                .unwrap_or(key.as_str())
                .to_string();
            let presigned = self
                .objects()
                .presign_get(&key, self.download_url_ttl)
                .await?;
            entries.push(DownloadEntry {
                name,
                url: presigned.url,
                expires_at: presigned.expires_at,
            });
        }
        entries.sort_by(|a, b| a.name.cmp(&b.name));
        metrics().download_urls_issued(entries.len() as u64);
        Ok(entries)
    }

    /// Reset a FAILED task to QUEUED and run it again. Billing history is
    /// preserved; the new run reserves credits afresh.
    pub async fn retry(&self, user_id: &str, task_id: Uuid) -> Result<TaskStatusView, ApiError> {
        let record = self.owned_task(user_id, task_id).await?;
        if record.status != TaskStatus::Failed {
            return Err(ApiError::WrongState {
                actual: record.status,
                operation: "retry",
            });
        }
        self.tasks().retry(task_id).await?;
        info!(task_id = %task_id, user_id, "Task retried");
        let record = process(task_id, &self.deps).await?;
        Ok(record.into())
    }
}
