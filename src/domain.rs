//! Core ledger and redemption types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Balance holder. Owned by the identity subsystem; the ledger only
/// reads and mutates `points`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct User {
    pub id: i64,
    /// Current redeemable balance. Never negative.
    pub points: i64,
}

/// Ledger entry discriminator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum HistoryKind {
    Earned,
    Used,
}

impl HistoryKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            HistoryKind::Earned => "EARNED",
            HistoryKind::Used => "USED",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "EARNED" => Some(HistoryKind::Earned),
            "USED" => Some(HistoryKind::Used),
            _ => None,
        }
    }
}

/// One immutable record of a point gain or spend. Never updated or
/// deleted once written.
///
/// `points` holds a positive magnitude for both kinds; `kind` carries
/// the direction. Display-side sign derivation happens at the query
/// boundary, not here.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PointHistory {
    pub id: i64,
    pub user_id: i64,
    pub points: i64,
    #[serde(rename = "type")]
    pub kind: HistoryKind,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Voucher denomination. Each variant maps to a fixed point cost per unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RewardType {
    FiveThousand,
    TenThousand,
    ThirtyThousand,
}

impl RewardType {
    /// Point cost of a single voucher of this denomination.
    pub fn unit_cost(&self) -> i64 {
        match self {
            RewardType::FiveThousand => 5000,
            RewardType::TenThousand => 10_000,
            RewardType::ThirtyThousand => 30_000,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RewardType::FiveThousand => "FIVE_THOUSAND",
            RewardType::TenThousand => "TEN_THOUSAND",
            RewardType::ThirtyThousand => "THIRTY_THOUSAND",
        }
    }

    /// Parse a caller-supplied type code. Case-insensitive, surrounding
    /// whitespace ignored.
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_uppercase().as_str() {
            "FIVE_THOUSAND" => Some(RewardType::FiveThousand),
            "TEN_THOUSAND" => Some(RewardType::TenThousand),
            "THIRTY_THOUSAND" => Some(RewardType::ThirtyThousand),
            _ => None,
        }
    }

    /// Accepted type codes, for error messages.
    pub fn accepted() -> &'static str {
        "FIVE_THOUSAND, TEN_THOUSAND, THIRTY_THOUSAND"
    }
}

/// Redemption lifecycle state.
///
/// `Requested` exists only inside the commit unit; every persisted
/// redemption is observed as `Approved`. `Rejected` is reserved for a
/// manual review flow that is not wired up in the current scope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RewardStatus {
    Requested,
    Approved,
    Rejected,
}

impl RewardStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RewardStatus::Requested => "REQUESTED",
            RewardStatus::Approved => "APPROVED",
            RewardStatus::Rejected => "REJECTED",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "REQUESTED" => Some(RewardStatus::Requested),
            "APPROVED" => Some(RewardStatus::Approved),
            "REJECTED" => Some(RewardStatus::Rejected),
            _ => None,
        }
    }
}

/// Voucher code attached to a redemption. Pins have no lifecycle of
/// their own; they are deleted iff the owning reward is deleted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RewardPin {
    pub id: i64,
    pub pin_number: String,
    pub created_at: DateTime<Utc>,
}

/// Persisted redemption record with its owned pins.
#[derive(Debug, Clone, Serialize)]
pub struct Reward {
    pub id: i64,
    pub user_id: i64,
    pub points_used: i64,
    pub reward_type: RewardType,
    pub quantity: i64,
    pub status: RewardStatus,
    pub created_at: DateTime<Utc>,
    pub processed_at: Option<DateTime<Utc>>,
    pub pins: Vec<RewardPin>,
}

/// Caller-supplied redemption parameters. Both fields arrive from an
/// untrusted boundary and may be absent; validation rejects them with
/// typed errors rather than panicking.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RedemptionRequest {
    pub reward_type: Option<String>,
    pub quantity: Option<i64>,
}

impl RedemptionRequest {
    pub fn new(reward_type: impl Into<String>, quantity: i64) -> Self {
        Self {
            reward_type: Some(reward_type.into()),
            quantity: Some(quantity),
        }
    }
}

/// Redemption confirmation returned to the caller.
///
/// Deliberately omits status and timestamps; the confirmation surfaces
/// only identity, cost, type, quantity, and the issued pin codes. The
/// list/detail views expose the full record.
#[derive(Debug, Clone, Serialize)]
pub struct RedemptionOutcome {
    pub reward_id: i64,
    pub points_used: i64,
    pub reward_type: RewardType,
    pub quantity: i64,
    pub pin_numbers: Vec<String>,
}

/// Aggregated balance view.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BalanceSummary {
    pub current_points: i64,
    pub total_earned: i64,
    /// Always a non-negative magnitude, whatever the ledger stores.
    pub total_used: i64,
}

/// Ledger entry view for history reads. Carries only what callers see;
/// row identity stays internal to the store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HistoryEntry {
    pub points: i64,
    #[serde(rename = "type")]
    pub kind: HistoryKind,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl From<&PointHistory> for HistoryEntry {
    fn from(entry: &PointHistory) -> Self {
        Self {
            points: entry.points,
            kind: entry.kind,
            description: entry.description.clone(),
            created_at: entry.created_at,
        }
    }
}

/// Full redemption view for listing and detail reads.
#[derive(Debug, Clone, Serialize)]
pub struct RewardView {
    pub id: i64,
    pub points_used: i64,
    pub reward_type: RewardType,
    pub quantity: i64,
    pub status: RewardStatus,
    pub created_at: DateTime<Utc>,
    pub processed_at: Option<DateTime<Utc>>,
    pub pin_numbers: Vec<String>,
}

impl From<&Reward> for RewardView {
    fn from(reward: &Reward) -> Self {
        Self {
            id: reward.id,
            points_used: reward.points_used,
            reward_type: reward.reward_type,
            quantity: reward.quantity,
            status: reward.status,
            created_at: reward.created_at,
            processed_at: reward.processed_at,
            pin_numbers: reward.pins.iter().map(|p| p.pin_number.clone()).collect(),
        }
    }
}

impl From<&Reward> for RedemptionOutcome {
    fn from(reward: &Reward) -> Self {
        Self {
            reward_id: reward.id,
            points_used: reward.points_used,
            reward_type: reward.reward_type,
            quantity: reward.quantity,
            pin_numbers: reward.pins.iter().map(|p| p.pin_number.clone()).collect(),
        }
    }
}
