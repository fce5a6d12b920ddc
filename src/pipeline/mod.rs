//! Pipeline orchestration
//!
//! Turns a QUEUED task into a sequence of billed, chained, failure-isolated
//! agent executions and one aggregate result. The context is transient and
//! rebuilt from storage on every invocation, so a run can resume on any
//! process after a restart.

pub mod context;
pub mod orchestrator;
pub mod outcome;

pub use context::PipelineContext;
pub use orchestrator::{process, PipelineDeps, ProcessError};
pub use outcome::{AgentRunRecord, PipelineReport, SlotStatus};
