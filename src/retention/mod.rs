//! Retention sweep
//!
//! A periodic process, separate from the orchestrator's synchronous
//! contract. Abandoned tasks (CREATED/UPLOADING past the abandonment
//! window) become EXPIRED; artifacts of old terminal tasks are deleted.
//! The sweep is the only writer of the EXPIRED state.

use crate::storage::{keys, ObjectStore};
use crate::task::{TaskStatus, TaskStore};
use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;
use tracing::{info, warn};

#[derive(Debug, Default, PartialEq, Eq)]
pub struct SweepReport {
    /// Tasks moved to EXPIRED this pass
    pub expired: usize,
    /// Terminal tasks whose artifacts were deleted this pass
    pub purged: usize,
}

pub struct RetentionSweeper {
    tasks: Arc<dyn TaskStore>,
    objects: Arc<dyn ObjectStore>,
    /// How long a task may sit in CREATED/UPLOADING before expiring
    abandoned_after: Duration,
    /// How long terminal tasks keep their artifacts
    purge_after: Duration,
}

impl RetentionSweeper {
    pub fn new(
        tasks: Arc<dyn TaskStore>,
        objects: Arc<dyn ObjectStore>,
        abandoned_after: Duration,
        purge_after: Duration,
    ) -> Self {
        Self {
            tasks,
            objects,
            abandoned_after,
            purge_after,
        }
    }

    /// One sweep pass at `now`. Errors on individual tasks are logged and
    /// skipped; one stuck record must not stall the whole sweep.
    pub async fn sweep(&self, now: DateTime<Utc>) -> SweepReport {
        let mut report = SweepReport::default();

        let records = match self.tasks.list().await {
            Ok(records) => records,
            Err(e) => {
                warn!(error = %e, "Sweep could not list tasks");
                return report;
            }
        };

        for record in records {
            match record.status {
                TaskStatus::Created | TaskStatus::Uploading => {
                    if now - record.updated_at > self.abandoned_after {
                        match self.tasks.expire(record.task_id).await {
                            Ok(()) => {
                                info!(task_id = %record.task_id, "Expired abandoned task");
                                crate::observability::metrics::metrics().task_expired();
                                report.expired += 1;
                            }
                            Err(e) => {
                                warn!(task_id = %record.task_id, error = %e, "Expire failed")
                            }
                        }
                    }
                }
                status if status.is_terminal() => {
                    if now - record.updated_at > self.purge_after {
                        let prefix = keys::task_prefix(&record.user_id, record.task_id);
                        match self.objects.delete_prefix(&prefix).await {
                            Ok(0) => {}
                            Ok(removed) => {
                                info!(
                                    task_id = %record.task_id,
                                    removed,
                                    "Purged artifacts of terminal task"
                                );
                                report.purged += 1;
                            }
                            Err(e) => {
                                warn!(task_id = %record.task_id, error = %e, "Purge failed")
                            }
                        }
                    }
                }
                _ => {}
            }
        }

        report
    }

    /// Periodic loop for the server process; runs until the task is aborted
    pub async fn run(self, interval: std::time::Duration) {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            let report = self.sweep(Utc::now()).await;
            if report.expired > 0 || report.purged > 0 {
                info!(
                    expired = report.expired,
                    purged = report.purged,
                    "Retention sweep pass done"
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::{InMemoryTaskStore, TaskRecord};
    use crate::testing::mocks::MockObjectStore;
    use bytes::Bytes;

    fn sweeper(
        tasks: Arc<InMemoryTaskStore>,
        objects: Arc<MockObjectStore>,
    ) -> RetentionSweeper {
        RetentionSweeper::new(tasks, objects, Duration::hours(24), Duration::days(7))
    }

    #[tokio::test]
    async fn test_expires_abandoned_uploading_task() {
        let tasks = Arc::new(InMemoryTaskStore::new());
        let objects = Arc::new(MockObjectStore::new());
        let record = TaskRecord::new("alice", "quality-report", vec![]);
        let task_id = record.task_id;
        tasks.insert(record).await.unwrap();
        tasks
            .transition(task_id, TaskStatus::Created, TaskStatus::Uploading)
            .await
            .unwrap();

        // Within the window: untouched
        let report = sweeper(tasks.clone(), objects.clone())
            .sweep(Utc::now() + Duration::hours(1))
            .await;
        assert_eq!(report.expired, 0);

        // Past the window: expired
        let report = sweeper(tasks.clone(), objects)
            .sweep(Utc::now() + Duration::hours(25))
            .await;
        assert_eq!(report.expired, 1);
        assert_eq!(
            tasks.get(task_id).await.unwrap().status,
            TaskStatus::Expired
        );
    }

    #[tokio::test]
    async fn test_leaves_active_tasks_alone() {
        let tasks = Arc::new(InMemoryTaskStore::new());
        let objects = Arc::new(MockObjectStore::new());
        let record = TaskRecord::new("alice", "quality-report", vec![]);
        let task_id = record.task_id;
        tasks.insert(record).await.unwrap();
        tasks
            .transition(task_id, TaskStatus::Created, TaskStatus::Uploading)
            .await
            .unwrap();
        tasks
            .transition(task_id, TaskStatus::Uploading, TaskStatus::Queued)
            .await
            .unwrap();
        tasks
            .transition(task_id, TaskStatus::Queued, TaskStatus::Processing)
            .await
            .unwrap();

        let report = sweeper(tasks.clone(), objects)
            .sweep(Utc::now() + Duration::days(30))
            .await;
        assert_eq!(report.expired, 0);
        assert_eq!(
            tasks.get(task_id).await.unwrap().status,
            TaskStatus::Processing
        );
    }

    #[tokio::test]
    async fn test_purges_artifacts_of_old_terminal_tasks() {
        let tasks = Arc::new(InMemoryTaskStore::new());
        let objects = Arc::new(MockObjectStore::new());
        let record = TaskRecord::new("alice", "quality-report", vec![]);
        let task_id = record.task_id;
        let output = keys::output_key("alice", task_id, "report.json");
        objects.put(&output, Bytes::from_static(b"{}")).await.unwrap();

        tasks.insert(record).await.unwrap();
        tasks
            .transition(task_id, TaskStatus::Created, TaskStatus::Uploading)
            .await
            .unwrap();
        tasks
            .transition(task_id, TaskStatus::Uploading, TaskStatus::Queued)
            .await
            .unwrap();
        tasks
            .transition(task_id, TaskStatus::Queued, TaskStatus::Processing)
            .await
            .unwrap();
        tasks.complete(task_id).await.unwrap();

        let report = sweeper(tasks.clone(), objects.clone())
            .sweep(Utc::now() + Duration::days(8))
            .await;
        assert_eq!(report.purged, 1);
        assert!(!objects.exists(&output).await.unwrap());

        // Second pass finds nothing left to purge
        let report = sweeper(tasks, objects)
            .sweep(Utc::now() + Duration::days(9))
            .await;
        assert_eq!(report.purged, 0);
    }
}
