//! Task entity and lifecycle state machine
//!
//! A task is the unit of work, billing and artifact scoping. Status moves
//! strictly forward through the lifecycle; the only backward edge is the
//! explicit retry operation (FAILED back to QUEUED), which preserves the
//! task id and its billing history.

use crate::catalog::AgentKind;
use crate::error::TaskFailure;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub mod store;

pub use store::{InMemoryTaskStore, TaskStore, TaskStoreError};

/// Lifecycle states of a task
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TaskStatus {
    /// Task exists, no upload URLs requested yet
    Created,
    /// Presigned URLs issued; caller PUTs bytes directly to storage
    Uploading,
    /// Accepted for processing, not yet claimed by a worker
    Queued,
    /// Orchestrator is iterating the agent list
    Processing,
    /// All outputs persisted; downloads retrievable
    Completed,
    /// Pre-flight or post-flight failure; `error` is populated
    Failed,
    /// Abandoned before trigger; reached only by the retention sweep
    Expired,
}

impl TaskStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TaskStatus::Completed | TaskStatus::Failed | TaskStatus::Expired
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Created => "CREATED",
            TaskStatus::Uploading => "UPLOADING",
            TaskStatus::Queued => "QUEUED",
            TaskStatus::Processing => "PROCESSING",
            TaskStatus::Completed => "COMPLETED",
            TaskStatus::Failed => "FAILED",
            TaskStatus::Expired => "EXPIRED",
        }
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Legal forward transitions, including the explicit retry edge
///
/// EXPIRED is reachable only from the pre-processing states; the retention
/// sweep is the sole caller of that edge.
pub fn is_valid_transition(from: TaskStatus, to: TaskStatus) -> bool {
    use TaskStatus::*;
    matches!(
        (from, to),
        (Created, Uploading)
            | (Uploading, Queued)
            | (Queued, Processing)
            | (Processing, Completed)
            | (Processing, Failed)
            | (Queued, Failed)
            | (Created, Expired)
            | (Uploading, Expired)
            | (Failed, Queued) // retry
    )
}

/// Durable task record: identity, status, progress, minimal metadata
///
/// Input/output file references are never stored here; storage keys are
/// derived from `(user_id, task_id)` by the key convention.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskRecord {
    pub task_id: Uuid,
    pub user_id: String,
    pub tool_id: String,
    /// Ordered agent list; immutable once processing starts. Empty means
    /// "use the tool's default list", resolved at trigger time.
    pub agents: Vec<AgentKind>,
    pub status: TaskStatus,
    /// 0-100, monotonically non-decreasing while PROCESSING
    pub progress: u8,
    /// Only non-empty while PROCESSING
    pub current_agent: Option<AgentKind>,
    /// Only non-empty in FAILED
    pub error: Option<TaskFailure>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TaskRecord {
    pub fn new(user_id: impl Into<String>, tool_id: impl Into<String>, agents: Vec<AgentKind>) -> Self {
        let now = Utc::now();
        Self {
            task_id: Uuid::new_v4(),
            user_id: user_id.into(),
            tool_id: tool_id.into(),
            agents,
            status: TaskStatus::Created,
            progress: 0,
            current_agent: None,
            error: None,
            created_at: now,
            updated_at: now,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_happy_path_transitions_are_valid() {
        use TaskStatus::*;
        assert!(is_valid_transition(Created, Uploading));
        assert!(is_valid_transition(Uploading, Queued));
        assert!(is_valid_transition(Queued, Processing));
        assert!(is_valid_transition(Processing, Completed));
        assert!(is_valid_transition(Processing, Failed));
    }

    #[test]
    fn test_no_backward_transitions_except_retry() {
        use TaskStatus::*;
        assert!(is_valid_transition(Failed, Queued));
        assert!(!is_valid_transition(Completed, Queued));
        assert!(!is_valid_transition(Completed, Processing));
        assert!(!is_valid_transition(Processing, Queued));
        assert!(!is_valid_transition(Uploading, Created));
        assert!(!is_valid_transition(Expired, Queued));
    }

    #[test]
    fn test_expired_only_from_pre_processing_states() {
        use TaskStatus::*;
        assert!(is_valid_transition(Created, Expired));
        assert!(is_valid_transition(Uploading, Expired));
        assert!(!is_valid_transition(Queued, Expired));
        assert!(!is_valid_transition(Processing, Expired));
        assert!(!is_valid_transition(Completed, Expired));
    }

    #[test]
    fn test_terminal_states() {
        assert!(TaskStatus::Completed.is_terminal());
        assert!(TaskStatus::Failed.is_terminal());
        assert!(TaskStatus::Expired.is_terminal());
        assert!(!TaskStatus::Processing.is_terminal());
        assert!(!TaskStatus::Created.is_terminal());
    }

    #[test]
    fn test_status_serde_uppercase() {
        let json = serde_json::to_string(&TaskStatus::Processing).unwrap();
        assert_eq!(json, "\"PROCESSING\"");
        let status: TaskStatus = serde_json::from_str("\"UPLOADING\"").unwrap();
        assert_eq!(status, TaskStatus::Uploading);
    }

    #[test]
    fn test_new_record_starts_clean() {
        let record = TaskRecord::new("user-1", "quality-report", vec![]);
        assert_eq!(record.status, TaskStatus::Created);
        assert_eq!(record.progress, 0);
        assert!(record.current_agent.is_none());
        assert!(record.error.is_none());
        assert_eq!(record.created_at, record.updated_at);
    }
}
