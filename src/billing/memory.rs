//! In-memory billing ledger
//!
//! Balances and entries live behind one mutex, so a reservation's
//! validate-then-write is a single critical section: two concurrent
//! reservations for the same user can never both pass the balance check
//! and overdraw.

use super::{BillingError, BillingLedger, EntryOutcome, LedgerEntry, Reservation};
use crate::catalog::AgentKind;
use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use tokio::sync::Mutex;
use tracing::{debug, info};
use uuid::Uuid;

#[derive(Debug, Default)]
struct LedgerState {
    balances: HashMap<String, u32>,
    entries: Vec<LedgerEntry>,
}

pub struct InMemoryLedger {
    prices: HashMap<AgentKind, u32>,
    starting_credits: u32,
    state: Mutex<LedgerState>,
}

impl InMemoryLedger {
    /// `prices` comes from the catalog at startup; `starting_credits` is
    /// granted to a user on first contact.
    pub fn new(prices: HashMap<AgentKind, u32>, starting_credits: u32) -> Self {
        Self {
            prices,
            starting_credits,
            state: Mutex::new(LedgerState::default()),
        }
    }

    /// Grant a user a specific balance (admin/test setup)
    pub async fn set_balance(&self, user_id: &str, credits: u32) {
        let mut state = self.state.lock().await;
        state.balances.insert(user_id.to_string(), credits);
    }

    /// Total cost of the list, or the first agent with no declared price
    fn price_list(&self, agents: &[AgentKind]) -> Result<u32, BillingError> {
        let mut total = 0u32;
        for agent in agents {
            let price = self
                .prices
                .get(agent)
                .copied()
                .ok_or(BillingError::UnknownAgentCost(*agent))?;
            total = total.saturating_add(price);
        }
        Ok(total)
    }
}

#[async_trait]
impl BillingLedger for InMemoryLedger {
    async fn reserve_and_charge(
        &self,
        user_id: &str,
        task_id: Uuid,
        agents: &[AgentKind],
    ) -> Result<Reservation, BillingError> {
        // Price the whole list before touching any state
        let required = self.price_list(agents)?;

        let mut state = self.state.lock().await;
        let balance = state
            .balances
            .entry(user_id.to_string())
            .or_insert(self.starting_credits);
        let available = *balance;

        if required > available {
            debug!(user_id, task_id = %task_id, required, available, "Reservation rejected");
            return Err(BillingError::InsufficientCredits {
                required,
                available,
            });
        }

        // Balance decrement and all entries land under the same lock
        *balance = available - required;
        let now = Utc::now();
        for agent in agents {
            state.entries.push(LedgerEntry {
                user_id: user_id.to_string(),
                task_id,
                agent: *agent,
                credits: self.prices[agent],
                outcome: EntryOutcome::Consumed,
                timestamp: now,
            });
        }

        info!(
            user_id,
            task_id = %task_id,
            credits = required,
            agents = agents.len(),
            "Reserved credits for pipeline"
        );

        Ok(Reservation {
            task_id,
            total_credits: required,
            agent_count: agents.len(),
        })
    }

    async fn refund_task(&self, task_id: Uuid) -> Result<u32, BillingError> {
        let mut state = self.state.lock().await;
        let mut refunded = 0u32;
        let mut user: Option<String> = None;
        for entry in state
            .entries
            .iter_mut()
            .filter(|e| e.task_id == task_id && e.outcome == EntryOutcome::Consumed)
        {
            entry.outcome = EntryOutcome::Refunded;
            refunded += entry.credits;
            user = Some(entry.user_id.clone());
        }
        match user {
            Some(user_id) => {
                *state.balances.entry(user_id.clone()).or_insert(0) += refunded;
                info!(user_id = %user_id, task_id = %task_id, credits = refunded, "Refunded task charges");
                Ok(refunded)
            }
            None => Err(BillingError::NothingToRefund(task_id)),
        }
    }

    async fn entries_for_task(&self, task_id: Uuid) -> Vec<LedgerEntry> {
        self.state
            .lock()
            .await
            .entries
            .iter()
            .filter(|e| e.task_id == task_id)
            .cloned()
            .collect()
    }

    async fn balance(&self, user_id: &str) -> u32 {
        self.state
            .lock()
            .await
            .balances
            .get(user_id)
            .copied()
            .unwrap_or(self.starting_credits)
    }
}
