//! dqflow - Task Lifecycle & Pipeline Orchestration Engine
//!
//! Backend core for a data-quality analysis service: users upload a
//! dataset, select a tool (an ordered bundle of analysis/cleaning agents),
//! and the engine runs the agents over the data with atomic billing,
//! per-agent failure isolation and object-storage-backed artifacts.
//!
//! # Overview
//!
//! The engine decouples upload from processing from result retrieval with
//! an explicit task state machine:
//!
//! ```text
//! CREATED -> UPLOADING -> QUEUED -> PROCESSING -> {COMPLETED | FAILED}
//! ```
//!
//! with `EXPIRED` reachable from the pre-processing states via the
//! retention sweep. The core pieces:
//!
//! - [`task`] — the task record, state machine and store
//! - [`storage`] — object store adapter with a deterministic key convention
//! - [`billing`] — all-or-nothing credit reservation ledger
//! - [`catalog`] — immutable tool/agent registry built at startup
//! - [`agents`] — the execution adapter and dispatch table
//! - [`pipeline`] — the orchestrator: `process(task_id, deps)`
//! - [`upload`] — presigned upload coordinator
//! - [`retention`] — expiry and artifact garbage collection
//! - [`api`] — the task API and its HTTP surface
//!
//! # Quick Start
//!
//! ```rust
//! use dqflow::catalog::Catalog;
//! use dqflow::task::{TaskRecord, TaskStatus};
//!
//! let catalog = Catalog::builtin();
//! let tool = catalog.tool("quality-report").unwrap();
//!
//! let task = TaskRecord::new("alice", tool.id.clone(), vec![]);
//! assert_eq!(task.status, TaskStatus::Created);
//! ```

pub mod agents;
pub mod api;
pub mod billing;
pub mod catalog;
pub mod config;
pub mod error;
pub mod observability;
pub mod pipeline;
pub mod retention;
pub mod storage;
pub mod task;
pub mod testing;
pub mod upload;

pub use api::{ApiError, TaskApi};
pub use billing::{BillingLedger, InMemoryLedger};
pub use catalog::{AgentKind, Catalog};
pub use config::EngineConfig;
pub use error::{FailureCode, TaskFailure};
pub use pipeline::{process, PipelineDeps};
pub use storage::{LocalObjectStore, ObjectStore};
pub use task::{InMemoryTaskStore, TaskRecord, TaskStatus, TaskStore};
