//! Billing ledger: atomic credit reservation per agent pipeline
//!
//! The contract is all-or-nothing up front: one ledger entry per agent in
//! the resolved list, written as a single unit before any agent executes,
//! or nothing at all. Partial billing for a partially run pipeline is the
//! principal hazard this component guards against.

use crate::catalog::AgentKind;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

pub mod memory;

pub use memory::InMemoryLedger;

#[derive(Debug, Error)]
pub enum BillingError {
    #[error("Insufficient credits: required {required}, available {available}")]
    InsufficientCredits { required: u32, available: u32 },

    #[error("No declared cost for agent '{0}'")]
    UnknownAgentCost(AgentKind),

    #[error("No consumed entries to refund for task {0}")]
    NothingToRefund(Uuid),
}

/// Whether a charge still stands or was given back
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryOutcome {
    Consumed,
    Refunded,
}

/// One row per `(task_id, agent)` charge
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub user_id: String,
    pub task_id: Uuid,
    pub agent: AgentKind,
    pub credits: u32,
    pub outcome: EntryOutcome,
    pub timestamp: DateTime<Utc>,
}

/// Receipt for a successful reservation
#[derive(Debug, Clone, Serialize)]
pub struct Reservation {
    pub task_id: Uuid,
    pub total_credits: u32,
    pub agent_count: usize,
}

#[async_trait]
pub trait BillingLedger: Send + Sync {
    /// Validate and charge credits for every agent in the list as one unit.
    /// On any error no entries are written and the balance is untouched.
    async fn reserve_and_charge(
        &self,
        user_id: &str,
        task_id: Uuid,
        agents: &[AgentKind],
    ) -> Result<Reservation, BillingError>;

    /// Flip every consumed entry for the task to refunded, restoring the
    /// user's balance. Used when a reserved run is aborted before execution.
    async fn refund_task(&self, task_id: Uuid) -> Result<u32, BillingError>;

    /// All entries recorded against a task, in write order
    async fn entries_for_task(&self, task_id: Uuid) -> Vec<LedgerEntry>;

    /// Current credit balance for a user
    async fn balance(&self, user_id: &str) -> u32;
}
