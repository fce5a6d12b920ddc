//! Test helpers and utilities for integration tests

#![allow(dead_code)]

use bytes::Bytes;
use dqflow::agents::ExecutorRegistry;
use dqflow::billing::InMemoryLedger;
use dqflow::catalog::{AgentKind, AgentSpec, Catalog, SuccessPolicy, ToolSpec};
use dqflow::pipeline::PipelineDeps;
use dqflow::storage::{keys, ObjectStore};
use dqflow::task::{InMemoryTaskStore, TaskRecord, TaskStatus, TaskStore};
use dqflow::testing::mocks::MockObjectStore;
use std::sync::Arc;
use uuid::Uuid;

/// Everything an integration test needs, with the concrete types kept
/// alongside the trait-object deps
pub struct TestHarness {
    pub deps: PipelineDeps,
    pub tasks: Arc<InMemoryTaskStore>,
    pub objects: Arc<MockObjectStore>,
    pub ledger: Arc<InMemoryLedger>,
}

/// Harness over the builtin catalog and reference executors
#[allow(dead_code)]
pub fn harness() -> TestHarness {
    harness_with(Catalog::builtin(), ExecutorRegistry::with_builtin(), 500)
}

/// Harness with explicit catalog, registry and starting balance
pub fn harness_with(
    catalog: Catalog,
    registry: ExecutorRegistry,
    starting_credits: u32,
) -> TestHarness {
    let catalog = Arc::new(catalog);
    let tasks = Arc::new(InMemoryTaskStore::new());
    let objects = Arc::new(MockObjectStore::new());
    let ledger = Arc::new(InMemoryLedger::new(
        catalog.price_table(),
        starting_credits,
    ));
    let deps = PipelineDeps {
        tasks: tasks.clone(),
        objects: objects.clone(),
        billing: ledger.clone(),
        executors: Arc::new(registry),
        catalog,
    };
    TestHarness {
        deps,
        tasks,
        objects,
        ledger,
    }
}

/// A two-agent catalog for scripted-executor tests: `first` then `second`
/// over a required `primary` input
#[allow(dead_code)]
pub fn two_agent_catalog(
    first: AgentKind,
    second: AgentKind,
    first_transforming: bool,
    policy: SuccessPolicy,
) -> Catalog {
    Catalog::new(
        vec![
            AgentSpec {
                kind: first,
                credits: 10,
                transforming: first_transforming,
                description: String::new(),
            },
            AgentSpec {
                kind: second,
                credits: 10,
                transforming: false,
                description: String::new(),
            },
        ],
        vec![ToolSpec {
            id: "pair".to_string(),
            description: String::new(),
            agents: vec![first, second],
            required_inputs: vec!["primary".to_string()],
            optional_inputs: vec![],
            success_policy: policy,
        }],
    )
    .unwrap()
}

/// Insert a task and walk it to QUEUED with the given inputs uploaded
pub async fn queued_task(
    harness: &TestHarness,
    user: &str,
    tool_id: &str,
    inputs: &[(&str, &[u8])],
) -> Uuid {
    let record = TaskRecord::new(user, tool_id, vec![]);
    let task_id = record.task_id;
    harness.tasks.insert(record).await.unwrap();
    harness
        .tasks
        .transition(task_id, TaskStatus::Created, TaskStatus::Uploading)
        .await
        .unwrap();
    for (name, bytes) in inputs {
        harness
            .objects
            .put(
                &keys::input_key(user, task_id, name),
                Bytes::copy_from_slice(bytes),
            )
            .await
            .unwrap();
    }
    harness
        .tasks
        .transition(task_id, TaskStatus::Uploading, TaskStatus::Queued)
        .await
        .unwrap();
    task_id
}

/// Parse the consolidated report artifact of a finished task
#[allow(dead_code)]
pub async fn load_report(
    harness: &TestHarness,
    user: &str,
    task_id: Uuid,
) -> serde_json::Value {
    let bytes = harness
        .objects
        .get(&keys::output_key(user, task_id, "report.json"))
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

/// Registry from an explicit executor list
#[allow(dead_code)]
pub fn registry_of(
    executors: Vec<Arc<dyn dqflow::agents::AgentExecutor>>,
) -> ExecutorRegistry {
    let mut registry = ExecutorRegistry::new();
    for executor in executors {
        registry.register(executor).unwrap();
    }
    registry
}
