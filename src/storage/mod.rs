//! Storage implementations.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::{error, info};

use crate::config::StorageConfig;
use crate::domain::{HistoryKind, PointHistory, Reward, RewardStatus, RewardType, User};

pub mod memory;
#[cfg(feature = "sqlite")]
pub mod schema;
#[cfg(feature = "sqlite")]
pub mod sqlite;

pub use memory::MemoryLedgerStore;
#[cfg(feature = "sqlite")]
pub use sqlite::SqliteLedgerStore;

/// Result type for storage operations.
pub type Result<T> = std::result::Result<T, StorageError>;

/// Errors that can occur during storage operations.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("User not found: {0}")]
    UserMissing(i64),

    #[error("Insufficient balance: available {available}, required {required}")]
    InsufficientBalance { available: i64, required: i64 },

    #[error("Duplicate pin: {0}")]
    DuplicatePin(String),

    #[error("Invalid timestamp: {0}")]
    InvalidTimestamp(String),

    #[error("Invalid column value: {0}")]
    InvalidColumn(String),

    #[error("Storage backend unavailable: {0}")]
    Unavailable(String),

    #[cfg(feature = "sqlite")]
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Insert payload for a redemption commit.
///
/// Built by the engine, persisted by the store in one atomic unit.
#[derive(Debug, Clone)]
pub struct NewReward {
    pub user_id: i64,
    pub points_used: i64,
    pub reward_type: RewardType,
    pub quantity: i64,
    pub status: RewardStatus,
    /// Description written on the USED ledger entry.
    pub note: Option<String>,
    pub created_at: DateTime<Utc>,
    pub processed_at: Option<DateTime<Utc>>,
    pub pin_numbers: Vec<String>,
}

impl NewReward {
    /// Create a redemption payload in the initial `Requested` state.
    pub fn requested(
        user_id: i64,
        points_used: i64,
        reward_type: RewardType,
        quantity: i64,
        pin_numbers: Vec<String>,
    ) -> Self {
        Self {
            user_id,
            points_used,
            reward_type,
            quantity,
            status: RewardStatus::Requested,
            note: None,
            created_at: Utc::now(),
            processed_at: None,
            pin_numbers,
        }
    }

    /// Set the ledger entry description.
    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.note = Some(note.into());
        self
    }

    /// Transition to `Approved`, stamping the processing time.
    pub fn approve(&mut self) {
        self.status = RewardStatus::Approved;
        self.processed_at = Some(Utc::now());
    }
}

/// Interface for ledger persistence.
///
/// Every method is an atomic unit: a failure leaves no partial write
/// behind. Balance mutation is only reachable through `credit_user`
/// and `commit_redemption`, both of which append the matching ledger
/// entry inside the same unit, so a balance can never drift from its
/// history.
///
/// Implementations:
/// - `SqliteLedgerStore`: SQLite storage
/// - `MemoryLedgerStore`: In-memory storage for tests and throwaway use
#[async_trait]
pub trait LedgerStore: Send + Sync {
    /// Provision a user row with a starting balance.
    async fn create_user(&self, initial_points: i64) -> Result<User>;

    /// Fetch a user by id.
    async fn get_user(&self, user_id: i64) -> Result<Option<User>>;

    /// Increment a balance and append the EARNED entry in one unit.
    async fn credit_user(
        &self,
        user_id: i64,
        points: i64,
        description: Option<&str>,
    ) -> Result<PointHistory>;

    /// Total magnitude of entries of the given kind. Zero when none exist.
    async fn sum_history(&self, user_id: i64, kind: HistoryKind) -> Result<i64>;

    /// All ledger entries for a user, newest first.
    async fn list_history(&self, user_id: i64) -> Result<Vec<PointHistory>>;

    /// Persist a redemption: re-verify the balance under the write lock,
    /// debit it, append the USED entry, and insert the reward with its
    /// pins. Either everything commits or nothing is visible.
    ///
    /// Fails with `InsufficientBalance` when a concurrent commit drained
    /// the balance after the caller's pre-check, and `DuplicatePin` when
    /// the unique pin constraint rejects a code.
    async fn commit_redemption(&self, reward: NewReward) -> Result<Reward>;

    /// Fetch a redemption with its pins, regardless of owner.
    async fn get_reward(&self, reward_id: i64) -> Result<Option<Reward>>;

    /// List a user's redemptions, optionally filtered by status.
    /// Ordered by id for stable repeated reads.
    async fn list_rewards(
        &self,
        user_id: i64,
        status: Option<RewardStatus>,
    ) -> Result<Vec<Reward>>;

    /// Whether a pin code is already persisted anywhere in the system.
    async fn pin_exists(&self, pin_number: &str) -> Result<bool>;
}

/// Initialize storage based on configuration.
///
/// Returns the [`LedgerStore`] implementation selected by the
/// configured backend.
pub async fn init_storage(
    config: &StorageConfig,
) -> std::result::Result<Arc<dyn LedgerStore>, Box<dyn std::error::Error>> {
    info!("Storage: {} at {}", config.backend, config.path);

    match config.backend.as_str() {
        #[cfg(feature = "sqlite")]
        "sqlite" => {
            if let Some(parent) = std::path::Path::new(&config.path).parent() {
                std::fs::create_dir_all(parent)?;
            }

            let pool =
                sqlx::SqlitePool::connect(&format!("sqlite:{}?mode=rwc", config.path)).await?;

            let store = Arc::new(SqliteLedgerStore::new(pool));
            store.init().await?;

            Ok(store)
        }
        #[cfg(not(feature = "sqlite"))]
        "sqlite" => {
            error!("SQLite storage requested but 'sqlite' feature is not enabled");
            Err("SQLite feature not enabled".into())
        }
        "memory" => Ok(Arc::new(MemoryLedgerStore::new())),
        other => {
            error!("Unknown storage backend: {}", other);
            Err(format!("Unknown storage backend: {}", other).into())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_reward_starts_requested() {
        let reward = NewReward::requested(1, 5000, RewardType::FiveThousand, 1, vec![]);
        assert_eq!(reward.status, RewardStatus::Requested);
        assert!(reward.processed_at.is_none());
    }

    #[test]
    fn test_approve_stamps_processed_at() {
        let mut reward = NewReward::requested(1, 5000, RewardType::FiveThousand, 1, vec![]);
        reward.approve();
        assert_eq!(reward.status, RewardStatus::Approved);
        assert!(reward.processed_at.is_some());
    }
}
