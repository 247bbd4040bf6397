//! Engine error types.

use crate::storage::StorageError;

/// Result type for engine operations.
pub type Result<T> = std::result::Result<T, EngineError>;

/// Errors surfaced by the redemption engine and query facade.
///
/// Every variant is detected before any mutation except `Storage`,
/// which wraps persistence failures; those abort the whole unit of
/// work, so a caller may retry the operation without observing
/// partial state.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("User not found: {0}")]
    UserNotFound(i64),

    #[error("{0}")]
    InvalidRewardType(String),

    #[error("{0}")]
    InvalidQuantity(&'static str),

    #[error("Insufficient points: available {available}, required {required}")]
    InsufficientPoints { available: i64, required: i64 },

    #[error("Reward not found: {0}")]
    RewardNotFound(i64),

    #[error("Reward {0} belongs to another user")]
    Forbidden(i64),

    #[error("Pin allocation exhausted after {attempts} attempts")]
    PinAllocationExhausted { attempts: u32 },

    #[error("Credit amount must be positive, got {0}")]
    InvalidCredit(i64),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
}
