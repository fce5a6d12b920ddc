//! Billing gate integration tests
//!
//! The properties the ledger and orchestrator guarantee together: a task
//! that fails billing has exactly zero ledger entries and zero executed
//! agents, a task that starts processing is charged for its whole list,
//! and retry re-bills without touching history.

mod test_helpers;

use dqflow::billing::{BillingLedger, EntryOutcome, InMemoryLedger};
use dqflow::catalog::{AgentKind, AgentSpec, Catalog, SuccessPolicy, ToolSpec};
use dqflow::error::FailureCode;
use dqflow::pipeline::process;
use dqflow::task::{TaskStatus, TaskStore};
use dqflow::testing::mocks::ScriptedExecutor;
use std::collections::HashMap;
use std::sync::Arc;
use test_helpers::{harness_with, queued_task, registry_of, two_agent_catalog};

#[tokio::test]
async fn test_insufficient_credits_leaves_zero_entries() {
    let catalog = two_agent_catalog(
        AgentKind::SchemaProfiler,
        AgentKind::NullAuditor,
        false,
        SuccessPolicy::Any,
    );
    let a = Arc::new(ScriptedExecutor::succeeding(AgentKind::SchemaProfiler));
    let b = Arc::new(ScriptedExecutor::succeeding(AgentKind::NullAuditor));
    // Pipeline costs 20, user starts with 5
    let harness = harness_with(catalog, registry_of(vec![a.clone(), b.clone()]), 5);

    let task_id = queued_task(&harness, "bob", "pair", &[("primary", b"x\n")]).await;
    let record = process(task_id, &harness.deps).await.unwrap();

    assert_eq!(record.status, TaskStatus::Failed);
    assert_eq!(
        record.error.unwrap().code,
        FailureCode::InsufficientCredits
    );
    assert_eq!(harness.ledger.entries_for_task(task_id).await.len(), 0);
    assert_eq!(a.invocation_count().await, 0);
    assert_eq!(b.invocation_count().await, 0);
    assert_eq!(harness.ledger.balance("bob").await, 5);
}

#[tokio::test]
async fn test_unknown_cost_for_last_agent_charges_nothing() {
    // Three-agent tool [A, B, C]; the ledger knows prices for A and B only
    let agents = [
        AgentKind::SchemaProfiler,
        AgentKind::NullAuditor,
        AgentKind::OutlierScanner,
    ];
    let catalog = Catalog::new(
        agents
            .iter()
            .map(|kind| AgentSpec {
                kind: *kind,
                credits: 10,
                transforming: false,
                description: String::new(),
            })
            .collect(),
        vec![ToolSpec {
            id: "triple".to_string(),
            description: String::new(),
            agents: agents.to_vec(),
            required_inputs: vec!["primary".to_string()],
            optional_inputs: vec![],
            success_policy: SuccessPolicy::Any,
        }],
    )
    .unwrap();

    let executors: Vec<Arc<ScriptedExecutor>> = agents
        .iter()
        .map(|kind| Arc::new(ScriptedExecutor::succeeding(*kind)))
        .collect();
    let mut dyn_executors: Vec<Arc<dyn dqflow::agents::AgentExecutor>> = Vec::new();
    for executor in &executors {
        dyn_executors.push(executor.clone());
    }
    let mut harness = harness_with(catalog, registry_of(dyn_executors), 500);

    // Swap in a ledger missing OutlierScanner's price
    let partial_prices: HashMap<AgentKind, u32> = HashMap::from([
        (AgentKind::SchemaProfiler, 10),
        (AgentKind::NullAuditor, 10),
    ]);
    let ledger = Arc::new(InMemoryLedger::new(partial_prices, 500));
    harness.ledger = ledger.clone();
    harness.deps.billing = ledger.clone();

    let task_id = queued_task(&harness, "carol", "triple", &[("primary", b"x\n")]).await;
    let record = process(task_id, &harness.deps).await.unwrap();

    assert_eq!(record.status, TaskStatus::Failed);
    assert_eq!(record.error.unwrap().code, FailureCode::UnknownAgentCost);
    // Zero entries, and neither A nor B executed
    assert!(ledger.entries_for_task(task_id).await.is_empty());
    for executor in &executors {
        assert_eq!(executor.invocation_count().await, 0);
    }
}

#[tokio::test]
async fn test_processing_task_is_charged_for_whole_list() {
    let harness = test_helpers::harness();
    let task_id = queued_task(
        &harness,
        "alice",
        "quality-report",
        &[("primary", b"a,b\n1,2\n")],
    )
    .await;

    let record = process(task_id, &harness.deps).await.unwrap();
    assert_eq!(record.status, TaskStatus::Completed);

    let entries = harness.ledger.entries_for_task(task_id).await;
    let tool = harness.deps.catalog.tool("quality-report").unwrap();
    assert_eq!(entries.len(), tool.agents.len());

    let declared: u32 = tool
        .agents
        .iter()
        .map(|kind| harness.deps.catalog.agent(*kind).unwrap().credits)
        .sum();
    let charged: u32 = entries.iter().map(|e| e.credits).sum();
    assert_eq!(charged, declared);
    assert!(entries.iter().all(|e| e.outcome == EntryOutcome::Consumed));
}

#[tokio::test]
async fn test_agent_failures_do_not_refund() {
    // Isolation means a failed slot is still a consumed charge
    let catalog = two_agent_catalog(
        AgentKind::SchemaProfiler,
        AgentKind::NullAuditor,
        false,
        SuccessPolicy::Any,
    );
    let harness = harness_with(
        catalog,
        registry_of(vec![
            Arc::new(ScriptedExecutor::failing(AgentKind::SchemaProfiler, "x")),
            Arc::new(ScriptedExecutor::succeeding(AgentKind::NullAuditor)),
        ]),
        500,
    );

    let task_id = queued_task(&harness, "alice", "pair", &[("primary", b"x\n")]).await;
    process(task_id, &harness.deps).await.unwrap();

    let entries = harness.ledger.entries_for_task(task_id).await;
    assert_eq!(entries.len(), 2);
    assert!(entries.iter().all(|e| e.outcome == EntryOutcome::Consumed));
    assert_eq!(harness.ledger.balance("alice").await, 480);
}

#[tokio::test]
async fn test_retry_preserves_history_and_bills_again() {
    let catalog = two_agent_catalog(
        AgentKind::SchemaProfiler,
        AgentKind::NullAuditor,
        false,
        SuccessPolicy::All,
    );
    let harness = harness_with(
        catalog,
        registry_of(vec![
            Arc::new(ScriptedExecutor::failing(AgentKind::SchemaProfiler, "x")),
            Arc::new(ScriptedExecutor::succeeding(AgentKind::NullAuditor)),
        ]),
        500,
    );

    let task_id = queued_task(&harness, "alice", "pair", &[("primary", b"x\n")]).await;
    let record = process(task_id, &harness.deps).await.unwrap();
    assert_eq!(record.status, TaskStatus::Failed);
    assert_eq!(harness.ledger.entries_for_task(task_id).await.len(), 2);

    // Explicit retry resets to QUEUED with the same task id; the second
    // run reserves afresh on top of the preserved history
    harness.tasks.retry(task_id).await.unwrap();
    let record = process(task_id, &harness.deps).await.unwrap();
    assert_eq!(record.status, TaskStatus::Failed);
    assert_eq!(record.task_id, task_id);

    let entries = harness.ledger.entries_for_task(task_id).await;
    assert_eq!(entries.len(), 4);
    assert_eq!(harness.ledger.balance("alice").await, 460);
}
