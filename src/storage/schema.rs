//! Database schema definitions using sea-query.
//!
//! These define the table and column identifiers for type-safe query building.

use sea_query::Iden;

/// Users table schema.
#[derive(Iden)]
pub enum Users {
    Table,
    #[iden = "id"]
    Id,
    #[iden = "points"]
    Points,
}

/// Point history table schema.
#[derive(Iden)]
pub enum History {
    #[iden = "point_history"]
    Table,
    #[iden = "id"]
    Id,
    #[iden = "user_id"]
    UserId,
    #[iden = "points"]
    Points,
    #[iden = "kind"]
    Kind,
    #[iden = "description"]
    Description,
    #[iden = "created_at"]
    CreatedAt,
}

/// Rewards table schema.
#[derive(Iden)]
pub enum Rewards {
    Table,
    #[iden = "id"]
    Id,
    #[iden = "user_id"]
    UserId,
    #[iden = "points_used"]
    PointsUsed,
    #[iden = "reward_type"]
    RewardType,
    #[iden = "quantity"]
    Quantity,
    #[iden = "status"]
    Status,
    #[iden = "created_at"]
    CreatedAt,
    #[iden = "processed_at"]
    ProcessedAt,
}

/// Reward pins table schema.
#[derive(Iden)]
pub enum RewardPins {
    Table,
    #[iden = "id"]
    Id,
    #[iden = "reward_id"]
    RewardId,
    #[iden = "pin_number"]
    PinNumber,
    #[iden = "created_at"]
    CreatedAt,
}

/// SQL for creating the users table.
pub const CREATE_USERS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS users (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    points INTEGER NOT NULL DEFAULT 0 CHECK (points >= 0)
);
"#;

/// SQL for creating the point history table.
pub const CREATE_HISTORY_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS point_history (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    user_id INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
    points INTEGER NOT NULL,
    kind TEXT NOT NULL,
    description TEXT,
    created_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_point_history_user ON point_history(user_id);
"#;

/// SQL for creating the rewards table.
pub const CREATE_REWARDS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS rewards (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    user_id INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
    points_used INTEGER NOT NULL,
    reward_type TEXT NOT NULL,
    quantity INTEGER NOT NULL,
    status TEXT NOT NULL,
    created_at TEXT NOT NULL,
    processed_at TEXT
);

CREATE INDEX IF NOT EXISTS idx_rewards_user ON rewards(user_id);
"#;

/// SQL for creating the reward pins table.
pub const CREATE_REWARD_PINS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS reward_pins (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    reward_id INTEGER NOT NULL REFERENCES rewards(id) ON DELETE CASCADE,
    pin_number TEXT NOT NULL UNIQUE,
    created_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_reward_pins_reward ON reward_pins(reward_id);
"#;
