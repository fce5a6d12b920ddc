//! Agent execution adapter
//!
//! The orchestrator treats agents as black boxes behind the
//! `AgentExecutor` trait: a file map and parameters go in, a structured
//! result comes out. Dispatch goes through an explicit registry keyed by
//! the closed `AgentKind` enum, built and validated at startup.

use crate::catalog::{AgentKind, Catalog};
use async_trait::async_trait;
use bytes::Bytes;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;

pub mod builtin;

#[derive(Debug, Error)]
pub enum AgentExecError {
    #[error("Missing input file '{0}'")]
    MissingFile(String),

    #[error("Invalid parameters: {0}")]
    InvalidParameters(String),

    #[error("Execution failed: {0}")]
    ExecutionFailed(String),
}

/// One invocation's view of the pipeline context: logical file names to
/// byte buffers, plus the run's parameter set. `Bytes` clones are
/// reference-counted, so handing each agent its own map is cheap.
#[derive(Debug, Clone)]
pub struct AgentInvocation {
    pub files: HashMap<String, Bytes>,
    pub parameters: Value,
}

impl AgentInvocation {
    pub fn file(&self, name: &str) -> Result<&Bytes, AgentExecError> {
        self.files
            .get(name)
            .ok_or_else(|| AgentExecError::MissingFile(name.to_string()))
    }
}

/// A transforming agent's replacement for one logical input
#[derive(Debug, Clone)]
pub struct TransformedFile {
    pub logical_name: String,
    pub bytes: Bytes,
}

/// A byte artifact to persist under the task's `outputs/` prefix
#[derive(Debug, Clone)]
pub struct NamedArtifact {
    pub name: String,
    pub bytes: Bytes,
}

/// Structured result of one agent execution
#[derive(Debug, Clone, Default)]
pub struct AgentOutput {
    /// Findings merged into the aggregate pipeline report
    pub findings: Value,
    /// Set only by transforming agents; replaces the named input for
    /// every downstream agent in the same run
    pub transformed: Option<TransformedFile>,
    /// Optional per-agent artifact for the `outputs/` prefix
    pub artifact: Option<NamedArtifact>,
}

#[async_trait]
pub trait AgentExecutor: Send + Sync {
    fn kind(&self) -> AgentKind;

    async fn execute(&self, invocation: &AgentInvocation) -> Result<AgentOutput, AgentExecError>;
}

/// Startup-validated dispatch table from agent kind to executor
#[derive(Clone, Default)]
pub struct ExecutorRegistry {
    executors: HashMap<AgentKind, Arc<dyn AgentExecutor>>,
}

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("No executor registered for agent '{0}'")]
    MissingExecutor(AgentKind),
    #[error("Executor for '{0}' registered twice")]
    DuplicateExecutor(AgentKind),
}

impl ExecutorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, executor: Arc<dyn AgentExecutor>) -> Result<(), RegistryError> {
        let kind = executor.kind();
        if self.executors.contains_key(&kind) {
            return Err(RegistryError::DuplicateExecutor(kind));
        }
        self.executors.insert(kind, executor);
        Ok(())
    }

    pub fn get(&self, kind: AgentKind) -> Option<Arc<dyn AgentExecutor>> {
        self.executors.get(&kind).cloned()
    }

    /// Every agent the catalog references must have an executor; making
    /// this a startup error keeps unknown identifiers out of the run path.
    pub fn validate_covers(&self, catalog: &Catalog) -> Result<(), RegistryError> {
        for id in catalog.tool_ids() {
            let tool = catalog.tool(id).expect("tool id from catalog");
            for agent in &tool.agents {
                if !self.executors.contains_key(agent) {
                    return Err(RegistryError::MissingExecutor(*agent));
                }
            }
        }
        Ok(())
    }

    /// Registry wired with the reference executors for every known kind
    pub fn with_builtin() -> Self {
        let mut registry = Self::new();
        for executor in builtin::all() {
            registry
                .register(executor)
                .expect("builtin kinds are distinct");
        }
        registry
    }
}
