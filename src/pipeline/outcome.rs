//! Aggregate pipeline result
//!
//! One record per agent slot, folded into a report that becomes the
//! consolidated `report.json` artifact. An agent failure is a value in its
//! slot, never an exception out of the orchestrator.

use crate::catalog::{AgentKind, SuccessPolicy};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SlotStatus {
    Succeeded,
    Failed,
}

/// Result slot for one agent in the executed list
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentRunRecord {
    pub agent: AgentKind,
    pub status: SlotStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub findings: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Artifact name under `outputs/`, if this agent produced one
    #[serde(skip_serializing_if = "Option::is_none")]
    pub artifact: Option<String>,
    /// Logical input this agent replaced for downstream agents
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transformed_input: Option<String>,
}

impl AgentRunRecord {
    pub fn succeeded(agent: AgentKind, findings: Value) -> Self {
        Self {
            agent,
            status: SlotStatus::Succeeded,
            findings: Some(findings),
            error: None,
            artifact: None,
            transformed_input: None,
        }
    }

    pub fn failed(agent: AgentKind, error: impl Into<String>) -> Self {
        Self {
            agent,
            status: SlotStatus::Failed,
            findings: None,
            error: Some(error.into()),
            artifact: None,
            transformed_input: None,
        }
    }
}

/// Aggregate result of one orchestration run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineReport {
    pub task_id: Uuid,
    pub tool_id: String,
    pub agents: Vec<AgentRunRecord>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl PipelineReport {
    pub fn succeeded_count(&self) -> usize {
        self.agents
            .iter()
            .filter(|slot| slot.status == SlotStatus::Succeeded)
            .count()
    }

    pub fn failed_count(&self) -> usize {
        self.agents.len() - self.succeeded_count()
    }

    /// Whether the executed slots satisfy the tool's success policy
    pub fn meets_policy(&self, policy: SuccessPolicy) -> bool {
        match policy {
            SuccessPolicy::Any => self.succeeded_count() > 0,
            SuccessPolicy::All => self.failed_count() == 0,
        }
    }

    /// Serialized form persisted as the consolidated report artifact
    pub fn to_json_bytes(&self) -> bytes::Bytes {
        bytes::Bytes::from(
            serde_json::to_vec_pretty(self).expect("report serialization is infallible"),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn report(slots: Vec<AgentRunRecord>) -> PipelineReport {
        let now = Utc::now();
        PipelineReport {
            task_id: Uuid::new_v4(),
            tool_id: "quality-report".to_string(),
            agents: slots,
            started_at: now,
            finished_at: now,
        }
    }

    #[test]
    fn test_policy_any_accepts_partial_success() {
        let report = report(vec![
            AgentRunRecord::failed(AgentKind::SchemaProfiler, "boom"),
            AgentRunRecord::succeeded(AgentKind::NullAuditor, json!({})),
        ]);
        assert!(report.meets_policy(SuccessPolicy::Any));
        assert!(!report.meets_policy(SuccessPolicy::All));
    }

    #[test]
    fn test_policy_any_rejects_total_failure() {
        let report = report(vec![AgentRunRecord::failed(
            AgentKind::SchemaProfiler,
            "boom",
        )]);
        assert!(!report.meets_policy(SuccessPolicy::Any));
    }

    #[test]
    fn test_policy_all_requires_every_slot() {
        let report = report(vec![
            AgentRunRecord::succeeded(AgentKind::SchemaProfiler, json!({})),
            AgentRunRecord::succeeded(AgentKind::PiiScanner, json!({})),
        ]);
        assert!(report.meets_policy(SuccessPolicy::All));
    }

    #[test]
    fn test_report_serializes_failed_slots() {
        let report = report(vec![AgentRunRecord::failed(
            AgentKind::OutlierScanner,
            "storage timeout",
        )]);
        let value: Value = serde_json::from_slice(&report.to_json_bytes()).unwrap();
        assert_eq!(value["agents"][0]["status"], "failed");
        assert_eq!(value["agents"][0]["error"], "storage timeout");
        assert!(value["agents"][0].get("findings").is_none());
    }
}
