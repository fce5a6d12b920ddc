//! The orchestrator core: `process(task_id, deps)`
//!
//! Drives a QUEUED task to a terminal state: claim, load inputs, reserve
//! credits for the whole agent list, execute each agent in order with
//! per-slot failure isolation, persist outputs, and transition. The
//! function takes its entire environment as parameters, so it can be
//! invoked inline from the trigger call or by a worker pulling from a
//! queue without any change here.

use super::context::PipelineContext;
use super::outcome::{AgentRunRecord, PipelineReport, SlotStatus};
use crate::agents::ExecutorRegistry;
use crate::billing::{BillingError, BillingLedger};
use crate::catalog::{AgentKind, Catalog};
use crate::error::TaskFailure;
use crate::observability::metrics::metrics;
use crate::storage::{keys, ObjectStore, StorageError};
use crate::task::{TaskRecord, TaskStatus, TaskStore, TaskStoreError};
use bytes::Bytes;
use chrono::Utc;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Name of the consolidated report artifact
pub const REPORT_ARTIFACT: &str = "report.json";

/// Logical input carrying the run's parameter payload, when present
const PARAMETERS_INPUT: &str = "parameters";

/// Progress reserved for pre-flight work (claim, input load, billing)
const PROGRESS_BASE: u8 = 10;
/// Progress after the last agent, before outputs are persisted
const PROGRESS_AGENTS_DONE: u8 = 95;

/// Everything `process` needs; nothing is reached through globals
#[derive(Clone)]
pub struct PipelineDeps {
    pub tasks: Arc<dyn TaskStore>,
    pub objects: Arc<dyn ObjectStore>,
    pub billing: Arc<dyn BillingLedger>,
    pub executors: Arc<ExecutorRegistry>,
    pub catalog: Arc<Catalog>,
}

/// Errors for callers of `process`; task-level failures are not errors —
/// they land on the task record and `process` still returns the record
#[derive(Debug, Error)]
pub enum ProcessError {
    #[error("Task could not be claimed: {0}")]
    Claim(TaskStoreError),

    #[error("Task store error: {0}")]
    Store(#[from] TaskStoreError),
}

/// Linear progress over the agent list, mapped into the span the
/// execution phase owns
fn step_progress(completed: usize, total: usize) -> u8 {
    if total == 0 {
        return PROGRESS_AGENTS_DONE;
    }
    let span = (PROGRESS_AGENTS_DONE - PROGRESS_BASE) as usize;
    PROGRESS_BASE + (completed * span / total) as u8
}

/// Drive one QUEUED task to a terminal state
pub async fn process(task_id: Uuid, deps: &PipelineDeps) -> Result<TaskRecord, ProcessError> {
    // Claim: losing this CAS means another worker owns the task
    let record = deps
        .tasks
        .transition(task_id, TaskStatus::Queued, TaskStatus::Processing)
        .await
        .map_err(ProcessError::Claim)?;

    metrics().task_processing_started();
    let started = std::time::Instant::now();
    let result = run_pipeline(record, deps).await;
    match &result {
        Ok(record) if record.status == TaskStatus::Completed => {
            metrics().task_processing_completed(started.elapsed());
        }
        _ => metrics().task_processing_failed(started.elapsed()),
    }
    result
}

async fn run_pipeline(
    record: TaskRecord,
    deps: &PipelineDeps,
) -> Result<TaskRecord, ProcessError> {
    let task_id = record.task_id;
    let started_at = Utc::now();

    let tool = match deps.catalog.tool(&record.tool_id) {
        Some(tool) => tool.clone(),
        None => {
            // Tool validated at creation; losing it mid-flight means the
            // catalog changed under us
            return fail_task(
                deps,
                task_id,
                TaskFailure::internal(format!("tool '{}' is not in the catalog", record.tool_id)),
            )
            .await;
        }
    };

    // Resolve the ordered agent list and pin it before execution starts
    let agents: Vec<AgentKind> = if record.agents.is_empty() {
        tool.agents.clone()
    } else {
        record.agents.clone()
    };
    deps.tasks.set_agents(task_id, agents.clone()).await?;

    info!(
        task_id = %task_id,
        tool_id = %record.tool_id,
        agents = agents.len(),
        "Pipeline starting"
    );

    // Load every required input before any agent or billing call
    let mut context = match load_context(&record, &tool.required_inputs, &tool.optional_inputs, deps).await {
        Ok(context) => context,
        Err(failure) => return fail_task(deps, task_id, failure).await,
    };

    // All-or-nothing reservation for the whole list
    match deps
        .billing
        .reserve_and_charge(&record.user_id, task_id, &agents)
        .await
    {
        Ok(reservation) => {
            debug!(task_id = %task_id, credits = reservation.total_credits, "Credits reserved");
        }
        Err(BillingError::InsufficientCredits {
            required,
            available,
        }) => {
            return fail_task(
                deps,
                task_id,
                TaskFailure::insufficient_credits(format!(
                    "pipeline costs {required} credits, balance is {available}"
                )),
            )
            .await;
        }
        Err(BillingError::UnknownAgentCost(agent)) => {
            return fail_task(
                deps,
                task_id,
                TaskFailure::unknown_agent_cost(format!("agent '{agent}' has no declared cost")),
            )
            .await;
        }
        Err(e) => {
            return fail_task(deps, task_id, TaskFailure::internal(e.to_string())).await;
        }
    }

    deps.tasks
        .update_progress(task_id, PROGRESS_BASE, None)
        .await?;

    // Execute in list order; one agent's failure never aborts the run
    let total = agents.len();
    let mut slots: Vec<AgentRunRecord> = Vec::with_capacity(total);
    let mut artifacts: Vec<(usize, String, Bytes)> = Vec::new();

    for (index, kind) in agents.iter().copied().enumerate() {
        // Persist the step before executing, so a concurrent poller never
        // observes a stale current_agent
        deps.tasks
            .update_progress(task_id, step_progress(index, total), Some(kind))
            .await?;

        let slot = match deps.executors.get(kind) {
            Some(executor) => {
                let step_started = std::time::Instant::now();
                match executor.execute(&context.invocation()).await {
                    Ok(output) => {
                        metrics().agent_executed(kind.as_str(), step_started.elapsed(), true);
                        let mut slot = AgentRunRecord::succeeded(kind, output.findings);
                        if let Some(artifact) = output.artifact {
                            slot.artifact = Some(artifact.name.clone());
                            artifacts.push((index, artifact.name, artifact.bytes));
                        }
                        if let Some(transform) = output.transformed {
                            let is_transforming = deps
                                .catalog
                                .agent(kind)
                                .map(|spec| spec.transforming)
                                .unwrap_or(false);
                            if is_transforming {
                                context.apply_transform(&transform);
                                slot.transformed_input = Some(transform.logical_name);
                            } else {
                                warn!(
                                    task_id = %task_id,
                                    agent = %kind,
                                    "Analytical agent declared a transform; ignoring"
                                );
                            }
                        }
                        slot
                    }
                    Err(e) => {
                        metrics().agent_executed(kind.as_str(), step_started.elapsed(), false);
                        warn!(task_id = %task_id, agent = %kind, error = %e, "Agent failed; continuing");
                        AgentRunRecord::failed(kind, e.to_string())
                    }
                }
            }
            None => {
                // Startup validation makes this unreachable for catalog tools
                error!(task_id = %task_id, agent = %kind, "No executor registered");
                AgentRunRecord::failed(kind, format!("no executor registered for '{kind}'"))
            }
        };
        slots.push(slot);
    }

    deps.tasks
        .update_progress(task_id, PROGRESS_AGENTS_DONE, None)
        .await?;

    // Persist per-agent artifacts; a write failure counts against that
    // agent's slot but never stops the remaining writes
    for (index, name, bytes) in artifacts {
        let key = keys::output_key(&record.user_id, task_id, &name);
        if let Err(e) = deps.objects.put(&key, bytes).await {
            warn!(task_id = %task_id, key = %key, error = %e, "Artifact write failed");
            let slot = &mut slots[index];
            slot.status = SlotStatus::Failed;
            slot.artifact = None;
            slot.error = Some(format!("artifact write failed: {e}"));
        }
    }

    let report = PipelineReport {
        task_id,
        tool_id: record.tool_id.clone(),
        agents: slots,
        started_at,
        finished_at: Utc::now(),
    };

    // The consolidated report is persisted even for failing runs, so the
    // caller can always retrieve partial diagnostics
    let report_key = keys::output_key(&record.user_id, task_id, REPORT_ARTIFACT);
    if let Err(e) = deps.objects.put(&report_key, report.to_json_bytes()).await {
        error!(task_id = %task_id, error = %e, "Report write failed");
        return fail_task(
            deps,
            task_id,
            TaskFailure::storage_unavailable(format!("could not persist report: {e}")),
        )
        .await;
    }

    if report.meets_policy(tool.success_policy) {
        deps.tasks.complete(task_id).await?;
        info!(
            task_id = %task_id,
            succeeded = report.succeeded_count(),
            failed = report.failed_count(),
            "Pipeline completed"
        );
    } else {
        deps.tasks
            .fail(
                task_id,
                TaskFailure::no_agents_succeeded(format!(
                    "{} of {} agents succeeded; tool policy not met",
                    report.succeeded_count(),
                    report.agents.len()
                )),
            )
            .await?;
        info!(
            task_id = %task_id,
            succeeded = report.succeeded_count(),
            failed = report.failed_count(),
            "Pipeline failed success policy"
        );
    }

    Ok(deps.tasks.get(task_id).await?)
}

/// Build the context from storage: all required inputs, any optional ones
/// that exist, and the parameter payload if uploaded
async fn load_context(
    record: &TaskRecord,
    required: &[String],
    optional: &[String],
    deps: &PipelineDeps,
) -> Result<PipelineContext, TaskFailure> {
    let mut files = HashMap::new();

    for name in required {
        let key = keys::input_key(&record.user_id, record.task_id, name);
        match deps.objects.get(&key).await {
            Ok(bytes) => {
                files.insert(name.clone(), bytes);
            }
            Err(StorageError::NotFound(_)) => {
                return Err(TaskFailure::missing_input(format!(
                    "required input '{name}' was not uploaded"
                )));
            }
            Err(e) => {
                return Err(TaskFailure::storage_unavailable(format!(
                    "could not load input '{name}': {e}"
                )));
            }
        }
    }

    for name in optional {
        let key = keys::input_key(&record.user_id, record.task_id, name);
        match deps.objects.get(&key).await {
            Ok(bytes) => {
                files.insert(name.clone(), bytes);
            }
            Err(StorageError::NotFound(_)) => {}
            Err(e) => {
                return Err(TaskFailure::storage_unavailable(format!(
                    "could not load input '{name}': {e}"
                )));
            }
        }
    }

    let parameters = match files.get(PARAMETERS_INPUT) {
        Some(bytes) => serde_json::from_slice(bytes).unwrap_or_else(|e| {
            warn!(task_id = %record.task_id, error = %e, "Parameters payload is not JSON; ignoring");
            Value::Null
        }),
        None => Value::Null,
    };

    Ok(PipelineContext::new(files, parameters))
}

/// Record a task-level failure and return the terminal record
async fn fail_task(
    deps: &PipelineDeps,
    task_id: Uuid,
    failure: TaskFailure,
) -> Result<TaskRecord, ProcessError> {
    warn!(task_id = %task_id, code = failure.code.as_str(), "Pipeline aborted");
    deps.tasks.fail(task_id, failure).await?;
    Ok(deps.tasks.get(task_id).await?)
}
