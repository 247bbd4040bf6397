//! Read-side aggregation over the ledger and redemption records.

use std::sync::Arc;

use tracing::debug;

use crate::domain::{BalanceSummary, HistoryEntry, HistoryKind, RewardView};
use crate::error::{EngineError, Result};
use crate::storage::LedgerStore;

/// Query facade.
pub struct LedgerQuery {
    store: Arc<dyn LedgerStore>,
}

impl LedgerQuery {
    pub fn new(store: Arc<dyn LedgerStore>) -> Self {
        Self { store }
    }

    /// Current balance plus lifetime earned and used totals.
    ///
    /// The used total is reported as a non-negative magnitude whatever
    /// sign convention the ledger rows carry.
    pub async fn get_balance_summary(&self, user_id: i64) -> Result<BalanceSummary> {
        let user = self
            .store
            .get_user(user_id)
            .await?
            .ok_or(EngineError::UserNotFound(user_id))?;

        let total_earned = self.store.sum_history(user_id, HistoryKind::Earned).await?;
        let total_used = self
            .store
            .sum_history(user_id, HistoryKind::Used)
            .await?
            .abs();

        debug!(user_id, current = user.points, "balance summary");

        Ok(BalanceSummary {
            current_points: user.points,
            total_earned,
            total_used,
        })
    }

    /// Full ledger for a user, newest first. Empty is fine; an unknown
    /// user is not. Entries are trimmed to the caller-facing fields.
    pub async fn get_history(&self, user_id: i64) -> Result<Vec<HistoryEntry>> {
        if self.store.get_user(user_id).await?.is_none() {
            return Err(EngineError::UserNotFound(user_id));
        }

        let entries = self.store.list_history(user_id).await?;
        Ok(entries.iter().map(HistoryEntry::from).collect())
    }

    /// All redemptions for a user, id order.
    pub async fn list_rewards(&self, user_id: i64) -> Result<Vec<RewardView>> {
        let rewards = self.store.list_rewards(user_id, None).await?;
        Ok(rewards.iter().map(RewardView::from).collect())
    }

    /// One redemption, readable only by its owner.
    ///
    /// A nonexistent id and someone else's id are distinct failures so
    /// the boundary layer can map them to different response codes.
    pub async fn get_reward_by_id(&self, user_id: i64, reward_id: i64) -> Result<RewardView> {
        let reward = self
            .store
            .get_reward(reward_id)
            .await?
            .ok_or(EngineError::RewardNotFound(reward_id))?;

        if reward.user_id != user_id {
            return Err(EngineError::Forbidden(reward_id));
        }

        Ok(RewardView::from(&reward))
    }
}
