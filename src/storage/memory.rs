//! In-memory LedgerStore implementation.
//!
//! Backs unit tests and doubles as a throwaway backend for embedders
//! that do not need persistence. Atomicity comes from holding the
//! state write lock across each whole operation.

use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;

use crate::domain::{HistoryKind, PointHistory, Reward, RewardPin, RewardStatus, User};
use crate::storage::{LedgerStore, NewReward, Result, StorageError};

#[derive(Default)]
struct MemoryState {
    users: HashMap<i64, i64>,
    history: Vec<PointHistory>,
    rewards: Vec<Reward>,
    pins: HashSet<String>,
    next_user_id: i64,
    next_history_id: i64,
    next_reward_id: i64,
    next_pin_id: i64,
}

/// In-memory ledger store.
#[derive(Default)]
pub struct MemoryLedgerStore {
    state: RwLock<MemoryState>,
    fail_on_commit: RwLock<bool>,
}

impl MemoryLedgerStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `commit_redemption` calls fail with a backend error.
    pub async fn set_fail_on_commit(&self, fail: bool) {
        *self.fail_on_commit.write().await = fail;
    }
}

#[async_trait]
impl LedgerStore for MemoryLedgerStore {
    async fn create_user(&self, initial_points: i64) -> Result<User> {
        let mut state = self.state.write().await;
        state.next_user_id += 1;
        let id = state.next_user_id;
        state.users.insert(id, initial_points);
        Ok(User {
            id,
            points: initial_points,
        })
    }

    async fn get_user(&self, user_id: i64) -> Result<Option<User>> {
        let state = self.state.read().await;
        Ok(state.users.get(&user_id).map(|points| User {
            id: user_id,
            points: *points,
        }))
    }

    async fn credit_user(
        &self,
        user_id: i64,
        points: i64,
        description: Option<&str>,
    ) -> Result<PointHistory> {
        let mut state = self.state.write().await;
        let balance = match state.users.get_mut(&user_id) {
            Some(balance) => balance,
            None => return Err(StorageError::UserMissing(user_id)),
        };
        *balance += points;

        state.next_history_id += 1;
        let entry = PointHistory {
            id: state.next_history_id,
            user_id,
            points,
            kind: HistoryKind::Earned,
            description: description.map(str::to_string),
            created_at: Utc::now(),
        };
        state.history.push(entry.clone());
        Ok(entry)
    }

    async fn sum_history(&self, user_id: i64, kind: HistoryKind) -> Result<i64> {
        let state = self.state.read().await;
        Ok(state
            .history
            .iter()
            .filter(|e| e.user_id == user_id && e.kind == kind)
            .map(|e| e.points)
            .sum())
    }

    async fn list_history(&self, user_id: i64) -> Result<Vec<PointHistory>> {
        let state = self.state.read().await;
        let mut entries: Vec<PointHistory> = state
            .history
            .iter()
            .filter(|e| e.user_id == user_id)
            .cloned()
            .collect();
        entries.sort_by(|a, b| {
            b.created_at
                .cmp(&a.created_at)
                .then_with(|| b.id.cmp(&a.id))
        });
        Ok(entries)
    }

    async fn commit_redemption(&self, reward: NewReward) -> Result<Reward> {
        if *self.fail_on_commit.read().await {
            return Err(StorageError::Unavailable(
                "injected commit failure".to_string(),
            ));
        }

        let mut state = self.state.write().await;

        let available = match state.users.get(&reward.user_id) {
            Some(points) => *points,
            None => return Err(StorageError::UserMissing(reward.user_id)),
        };
        if available < reward.points_used {
            return Err(StorageError::InsufficientBalance {
                available,
                required: reward.points_used,
            });
        }
        // Reject codes already persisted and codes repeated inside the
        // payload itself, matching the unique-constraint behaviour of the
        // durable backend.
        let mut incoming: HashSet<&str> = HashSet::with_capacity(reward.pin_numbers.len());
        for pin_number in &reward.pin_numbers {
            if state.pins.contains(pin_number) || !incoming.insert(pin_number.as_str()) {
                return Err(StorageError::DuplicatePin(pin_number.clone()));
            }
        }

        // All checks passed; mutate under the same write guard.
        state.users.insert(reward.user_id, available - reward.points_used);

        state.next_history_id += 1;
        let entry = PointHistory {
            id: state.next_history_id,
            user_id: reward.user_id,
            points: reward.points_used,
            kind: HistoryKind::Used,
            description: reward.note.clone(),
            created_at: reward.created_at,
        };
        state.history.push(entry);

        state.next_reward_id += 1;
        let reward_id = state.next_reward_id;

        let mut pins = Vec::with_capacity(reward.pin_numbers.len());
        for pin_number in &reward.pin_numbers {
            state.next_pin_id += 1;
            state.pins.insert(pin_number.clone());
            pins.push(RewardPin {
                id: state.next_pin_id,
                pin_number: pin_number.clone(),
                created_at: reward.created_at,
            });
        }

        let stored = Reward {
            id: reward_id,
            user_id: reward.user_id,
            points_used: reward.points_used,
            reward_type: reward.reward_type,
            quantity: reward.quantity,
            status: reward.status,
            created_at: reward.created_at,
            processed_at: reward.processed_at,
            pins,
        };
        state.rewards.push(stored.clone());
        Ok(stored)
    }

    async fn get_reward(&self, reward_id: i64) -> Result<Option<Reward>> {
        let state = self.state.read().await;
        Ok(state.rewards.iter().find(|r| r.id == reward_id).cloned())
    }

    async fn list_rewards(
        &self,
        user_id: i64,
        status: Option<RewardStatus>,
    ) -> Result<Vec<Reward>> {
        let state = self.state.read().await;
        let mut rewards: Vec<Reward> = state
            .rewards
            .iter()
            .filter(|r| r.user_id == user_id)
            .filter(|r| status.is_none_or(|s| r.status == s))
            .cloned()
            .collect();
        rewards.sort_by_key(|r| r.id);
        Ok(rewards)
    }

    async fn pin_exists(&self, pin_number: &str) -> Result<bool> {
        let state = self.state.read().await;
        Ok(state.pins.contains(pin_number))
    }
}
