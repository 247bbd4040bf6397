//! Redemption engine.
//!
//! Validates a redemption request, debits the ledger, and produces
//! voucher records. Also ingests credit instructions from the upstream
//! activity system.

use std::sync::Arc;

use tracing::{info, warn};

use crate::config::PinConfig;
use crate::domain::{PointHistory, RedemptionOutcome, RedemptionRequest, RewardType};
use crate::error::{EngineError, Result};
use crate::services::pins::PinAllocator;
use crate::storage::{LedgerStore, NewReward, StorageError};

/// Quantity limits for a single redemption.
pub mod limits {
    /// Minimum vouchers per redemption.
    pub const MIN_QUANTITY: i64 = 1;
    /// Maximum vouchers per redemption.
    pub const MAX_QUANTITY: i64 = 50;
}

/// Error constants for validation failures.
pub mod errmsg {
    pub const REWARD_TYPE_MISSING: &str = "reward type is required";
    pub const QUANTITY_MISSING: &str = "quantity is required";
    pub const QUANTITY_NOT_POSITIVE: &str = "quantity must be at least 1";
    pub const QUANTITY_OVER_LIMIT: &str = "quantity may not exceed 50";
}

/// Normalize and resolve a caller-supplied reward type code.
fn parse_reward_type(raw: Option<&str>) -> Result<RewardType> {
    let raw = raw.map(str::trim).unwrap_or_default();
    if raw.is_empty() {
        return Err(EngineError::InvalidRewardType(
            errmsg::REWARD_TYPE_MISSING.to_string(),
        ));
    }
    RewardType::parse(raw).ok_or_else(|| {
        EngineError::InvalidRewardType(format!(
            "unsupported reward type: {raw} (accepted: {})",
            RewardType::accepted()
        ))
    })
}

/// Validate the voucher count. One error kind, message varies by cause.
fn validate_quantity(quantity: Option<i64>) -> Result<i64> {
    let quantity = quantity.ok_or(EngineError::InvalidQuantity(errmsg::QUANTITY_MISSING))?;
    if quantity < limits::MIN_QUANTITY {
        return Err(EngineError::InvalidQuantity(errmsg::QUANTITY_NOT_POSITIVE));
    }
    if quantity > limits::MAX_QUANTITY {
        return Err(EngineError::InvalidQuantity(errmsg::QUANTITY_OVER_LIMIT));
    }
    Ok(quantity)
}

/// Redemption engine.
///
/// Validates input, checks the balance, allocates pins, and hands the
/// assembled redemption to the store for an all-or-nothing commit.
pub struct RedemptionEngine {
    store: Arc<dyn LedgerStore>,
    pins: PinAllocator,
}

impl RedemptionEngine {
    /// Create an engine with default pin allocation settings.
    pub fn new(store: Arc<dyn LedgerStore>) -> Self {
        Self {
            store,
            pins: PinAllocator::new(),
        }
    }

    /// Create an engine with configurable pin allocation.
    pub fn with_config(store: Arc<dyn LedgerStore>, config: &PinConfig) -> Self {
        Self {
            store,
            pins: PinAllocator::with_config(config),
        }
    }

    /// Redeem points for vouchers.
    ///
    /// Validation is fail-fast with no side effects: reward type, then
    /// quantity, then user resolution, then a sufficiency check against
    /// the current balance. The store re-verifies sufficiency under its
    /// write lock, so two concurrent calls can never jointly overdraw;
    /// the loser of that race surfaces here as `InsufficientPoints`.
    pub async fn redeem(
        &self,
        user_id: i64,
        request: &RedemptionRequest,
    ) -> Result<RedemptionOutcome> {
        let reward_type = parse_reward_type(request.reward_type.as_deref())?;
        let quantity = validate_quantity(request.quantity)?;

        let user = self
            .store
            .get_user(user_id)
            .await?
            .ok_or(EngineError::UserNotFound(user_id))?;

        let required = reward_type.unit_cost() * quantity;
        if user.points < required {
            return Err(EngineError::InsufficientPoints {
                available: user.points,
                required,
            });
        }

        let mut commit_attempt = 0;
        loop {
            commit_attempt += 1;

            let pin_numbers = self.pins.allocate(self.store.as_ref(), quantity).await?;

            let mut reward =
                NewReward::requested(user_id, required, reward_type, quantity, pin_numbers)
                    .with_note(format!("redeemed {} x {}", reward_type.as_str(), quantity));
            reward.approve();

            match self.store.commit_redemption(reward).await {
                Ok(stored) => {
                    info!(
                        user_id,
                        reward_id = stored.id,
                        points_used = stored.points_used,
                        quantity,
                        "redemption committed"
                    );
                    return Ok(RedemptionOutcome::from(&stored));
                }
                Err(StorageError::InsufficientBalance {
                    available,
                    required,
                }) => {
                    return Err(EngineError::InsufficientPoints {
                        available,
                        required,
                    });
                }
                Err(StorageError::UserMissing(id)) => {
                    return Err(EngineError::UserNotFound(id));
                }
                // The allocator pre-checked uniqueness, but another commit
                // may have claimed a code in between. Regenerate and retry.
                Err(StorageError::DuplicatePin(pin)) => {
                    if commit_attempt >= self.pins.max_attempts() {
                        return Err(EngineError::PinAllocationExhausted {
                            attempts: commit_attempt,
                        });
                    }
                    warn!(pin = %pin, attempt = commit_attempt, "pin collided at commit, regenerating");
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    /// Ingest an already-validated credit instruction: increment the
    /// balance and append the EARNED ledger entry in one unit.
    pub async fn credit(
        &self,
        user_id: i64,
        points: i64,
        description: Option<&str>,
    ) -> Result<PointHistory> {
        if points <= 0 {
            return Err(EngineError::InvalidCredit(points));
        }

        match self.store.credit_user(user_id, points, description).await {
            Ok(entry) => {
                info!(user_id, points, "credit applied");
                Ok(entry)
            }
            Err(StorageError::UserMissing(id)) => Err(EngineError::UserNotFound(id)),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_reward_type_missing() {
        for raw in [None, Some(""), Some("   ")] {
            let err = parse_reward_type(raw).unwrap_err();
            match err {
                EngineError::InvalidRewardType(msg) => {
                    assert_eq!(msg, errmsg::REWARD_TYPE_MISSING)
                }
                other => panic!("unexpected error: {other:?}"),
            }
        }
    }

    #[test]
    fn test_parse_reward_type_unsupported_names_offender() {
        let err = parse_reward_type(Some("fifty_thousand")).unwrap_err();
        match err {
            EngineError::InvalidRewardType(msg) => {
                assert!(msg.contains("fifty_thousand"));
                assert!(msg.contains("FIVE_THOUSAND"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_parse_reward_type_normalizes() {
        assert_eq!(
            parse_reward_type(Some(" ten_thousand ")).unwrap(),
            RewardType::TenThousand
        );
    }

    #[test]
    fn test_validate_quantity_bounds() {
        assert_eq!(validate_quantity(Some(1)).unwrap(), 1);
        assert_eq!(validate_quantity(Some(50)).unwrap(), 50);

        for (quantity, expected) in [
            (None, errmsg::QUANTITY_MISSING),
            (Some(0), errmsg::QUANTITY_NOT_POSITIVE),
            (Some(-3), errmsg::QUANTITY_NOT_POSITIVE),
            (Some(51), errmsg::QUANTITY_OVER_LIMIT),
        ] {
            match validate_quantity(quantity).unwrap_err() {
                EngineError::InvalidQuantity(msg) => assert_eq!(msg, expected),
                other => panic!("unexpected error: {other:?}"),
            }
        }
    }
}
