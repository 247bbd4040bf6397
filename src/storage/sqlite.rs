//! SQLite LedgerStore implementation.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sea_query::{Expr, Order, Query, SqliteQueryBuilder};
use sqlx::{Row, SqliteConnection, SqlitePool};

use crate::domain::{HistoryKind, PointHistory, Reward, RewardPin, RewardStatus, RewardType, User};
use crate::storage::schema::{
    History, RewardPins, Rewards, Users, CREATE_HISTORY_TABLE, CREATE_REWARDS_TABLE,
    CREATE_REWARD_PINS_TABLE, CREATE_USERS_TABLE,
};
use crate::storage::{LedgerStore, NewReward, Result, StorageError};

/// SQLite implementation of LedgerStore.
pub struct SqliteLedgerStore {
    pool: SqlitePool,
}

impl SqliteLedgerStore {
    /// Create a new SQLite ledger store.
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Create tables if they do not exist.
    pub async fn init(&self) -> Result<()> {
        sqlx::query(CREATE_USERS_TABLE).execute(&self.pool).await?;
        sqlx::query(CREATE_HISTORY_TABLE)
            .execute(&self.pool)
            .await?;
        sqlx::query(CREATE_REWARDS_TABLE)
            .execute(&self.pool)
            .await?;
        sqlx::query(CREATE_REWARD_PINS_TABLE)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>> {
        DateTime::parse_from_rfc3339(raw)
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(|e| StorageError::InvalidTimestamp(format!("{raw}: {e}")))
    }

    fn row_to_history(row: &sqlx::sqlite::SqliteRow) -> Result<PointHistory> {
        let kind_raw: String = row.get("kind");
        let kind = HistoryKind::parse(&kind_raw)
            .ok_or_else(|| StorageError::InvalidColumn(format!("kind: {kind_raw}")))?;
        let created_raw: String = row.get("created_at");

        Ok(PointHistory {
            id: row.get("id"),
            user_id: row.get("user_id"),
            points: row.get("points"),
            kind,
            description: row.get("description"),
            created_at: Self::parse_timestamp(&created_raw)?,
        })
    }

    fn row_to_reward(row: &sqlx::sqlite::SqliteRow) -> Result<Reward> {
        let type_raw: String = row.get("reward_type");
        let reward_type = RewardType::parse(&type_raw)
            .ok_or_else(|| StorageError::InvalidColumn(format!("reward_type: {type_raw}")))?;
        let status_raw: String = row.get("status");
        let status = RewardStatus::parse(&status_raw)
            .ok_or_else(|| StorageError::InvalidColumn(format!("status: {status_raw}")))?;
        let created_raw: String = row.get("created_at");
        let processed_raw: Option<String> = row.get("processed_at");
        let processed_at = match processed_raw {
            Some(raw) => Some(Self::parse_timestamp(&raw)?),
            None => None,
        };

        Ok(Reward {
            id: row.get("id"),
            user_id: row.get("user_id"),
            points_used: row.get("points_used"),
            reward_type,
            quantity: row.get("quantity"),
            status,
            created_at: Self::parse_timestamp(&created_raw)?,
            processed_at,
            pins: Vec::new(),
        })
    }

    /// Load the pins owned by a reward, oldest first.
    async fn load_pins(&self, reward_id: i64) -> Result<Vec<RewardPin>> {
        let query = Query::select()
            .columns([RewardPins::Id, RewardPins::PinNumber, RewardPins::CreatedAt])
            .from(RewardPins::Table)
            .and_where(Expr::col(RewardPins::RewardId).eq(reward_id))
            .order_by(RewardPins::Id, Order::Asc)
            .to_string(SqliteQueryBuilder);

        let rows = sqlx::query(&query).fetch_all(&self.pool).await?;

        let mut pins = Vec::with_capacity(rows.len());
        for row in rows {
            let created_raw: String = row.get("created_at");
            pins.push(RewardPin {
                id: row.get("id"),
                pin_number: row.get("pin_number"),
                created_at: Self::parse_timestamp(&created_raw)?,
            });
        }

        Ok(pins)
    }

    /// Apply a credit within an already-started transaction.
    async fn insert_credit(
        conn: &mut SqliteConnection,
        user_id: i64,
        points: i64,
        description: Option<&str>,
    ) -> Result<PointHistory> {
        let query = Query::select()
            .column(Users::Points)
            .from(Users::Table)
            .and_where(Expr::col(Users::Id).eq(user_id))
            .to_string(SqliteQueryBuilder);

        let row = sqlx::query(&query).fetch_optional(&mut *conn).await?;
        let available: i64 = match row {
            Some(row) => row.get(0),
            None => return Err(StorageError::UserMissing(user_id)),
        };

        let query = Query::update()
            .table(Users::Table)
            .value(Users::Points, available + points)
            .and_where(Expr::col(Users::Id).eq(user_id))
            .to_string(SqliteQueryBuilder);

        sqlx::query(&query).execute(&mut *conn).await?;

        let created_at = Utc::now();
        let query = Query::insert()
            .into_table(History::Table)
            .columns([
                History::UserId,
                History::Points,
                History::Kind,
                History::Description,
                History::CreatedAt,
            ])
            .values_panic([
                user_id.into(),
                points.into(),
                HistoryKind::Earned.as_str().into(),
                description.map(str::to_string).into(),
                created_at.to_rfc3339().into(),
            ])
            .to_string(SqliteQueryBuilder);

        let result = sqlx::query(&query).execute(&mut *conn).await?;

        Ok(PointHistory {
            id: result.last_insert_rowid(),
            user_id,
            points,
            kind: HistoryKind::Earned,
            description: description.map(str::to_string),
            created_at,
        })
    }

    /// Persist a redemption within an already-started transaction.
    ///
    /// The balance is re-read here so the sufficiency check and the
    /// debit happen under the same write lock.
    async fn insert_redemption(conn: &mut SqliteConnection, reward: NewReward) -> Result<Reward> {
        let query = Query::select()
            .column(Users::Points)
            .from(Users::Table)
            .and_where(Expr::col(Users::Id).eq(reward.user_id))
            .to_string(SqliteQueryBuilder);

        let row = sqlx::query(&query).fetch_optional(&mut *conn).await?;
        let available: i64 = match row {
            Some(row) => row.get(0),
            None => return Err(StorageError::UserMissing(reward.user_id)),
        };

        if available < reward.points_used {
            return Err(StorageError::InsufficientBalance {
                available,
                required: reward.points_used,
            });
        }

        let query = Query::update()
            .table(Users::Table)
            .value(Users::Points, available - reward.points_used)
            .and_where(Expr::col(Users::Id).eq(reward.user_id))
            .to_string(SqliteQueryBuilder);

        sqlx::query(&query).execute(&mut *conn).await?;

        let created_at_str = reward.created_at.to_rfc3339();

        let query = Query::insert()
            .into_table(History::Table)
            .columns([
                History::UserId,
                History::Points,
                History::Kind,
                History::Description,
                History::CreatedAt,
            ])
            .values_panic([
                reward.user_id.into(),
                reward.points_used.into(),
                HistoryKind::Used.as_str().into(),
                reward.note.clone().into(),
                created_at_str.clone().into(),
            ])
            .to_string(SqliteQueryBuilder);

        sqlx::query(&query).execute(&mut *conn).await?;

        let query = Query::insert()
            .into_table(Rewards::Table)
            .columns([
                Rewards::UserId,
                Rewards::PointsUsed,
                Rewards::RewardType,
                Rewards::Quantity,
                Rewards::Status,
                Rewards::CreatedAt,
                Rewards::ProcessedAt,
            ])
            .values_panic([
                reward.user_id.into(),
                reward.points_used.into(),
                reward.reward_type.as_str().into(),
                reward.quantity.into(),
                reward.status.as_str().into(),
                created_at_str.clone().into(),
                reward.processed_at.map(|dt| dt.to_rfc3339()).into(),
            ])
            .to_string(SqliteQueryBuilder);

        let result = sqlx::query(&query).execute(&mut *conn).await?;
        let reward_id = result.last_insert_rowid();

        let mut pins = Vec::with_capacity(reward.pin_numbers.len());
        for pin_number in &reward.pin_numbers {
            let query = Query::insert()
                .into_table(RewardPins::Table)
                .columns([
                    RewardPins::RewardId,
                    RewardPins::PinNumber,
                    RewardPins::CreatedAt,
                ])
                .values_panic([
                    reward_id.into(),
                    pin_number.as_str().into(),
                    created_at_str.clone().into(),
                ])
                .to_string(SqliteQueryBuilder);

            match sqlx::query(&query).execute(&mut *conn).await {
                Ok(result) => pins.push(RewardPin {
                    id: result.last_insert_rowid(),
                    pin_number: pin_number.clone(),
                    created_at: reward.created_at,
                }),
                Err(sqlx::Error::Database(db)) if db.is_unique_violation() => {
                    return Err(StorageError::DuplicatePin(pin_number.clone()));
                }
                Err(e) => return Err(e.into()),
            }
        }

        Ok(Reward {
            id: reward_id,
            user_id: reward.user_id,
            points_used: reward.points_used,
            reward_type: reward.reward_type,
            quantity: reward.quantity,
            status: reward.status,
            created_at: reward.created_at,
            processed_at: reward.processed_at,
            pins,
        })
    }
}

#[async_trait]
impl LedgerStore for SqliteLedgerStore {
    async fn create_user(&self, initial_points: i64) -> Result<User> {
        let query = Query::insert()
            .into_table(Users::Table)
            .columns([Users::Points])
            .values_panic([initial_points.into()])
            .to_string(SqliteQueryBuilder);

        let result = sqlx::query(&query).execute(&self.pool).await?;

        Ok(User {
            id: result.last_insert_rowid(),
            points: initial_points,
        })
    }

    async fn get_user(&self, user_id: i64) -> Result<Option<User>> {
        let query = Query::select()
            .columns([Users::Id, Users::Points])
            .from(Users::Table)
            .and_where(Expr::col(Users::Id).eq(user_id))
            .to_string(SqliteQueryBuilder);

        let row = sqlx::query(&query).fetch_optional(&self.pool).await?;

        Ok(row.map(|row| User {
            id: row.get("id"),
            points: row.get("points"),
        }))
    }

    async fn credit_user(
        &self,
        user_id: i64,
        points: i64,
        description: Option<&str>,
    ) -> Result<PointHistory> {
        // BEGIN IMMEDIATE acquires the write lock upfront, preventing deadlocks
        // when concurrent DEFERRED transactions race to upgrade from shared to exclusive.
        let mut conn = self.pool.acquire().await?;
        sqlx::query("BEGIN IMMEDIATE").execute(&mut *conn).await?;

        let result = Self::insert_credit(&mut conn, user_id, points, description).await;

        match result {
            Ok(entry) => {
                sqlx::query("COMMIT").execute(&mut *conn).await?;
                Ok(entry)
            }
            Err(e) => {
                let _ = sqlx::query("ROLLBACK").execute(&mut *conn).await;
                Err(e)
            }
        }
    }

    async fn sum_history(&self, user_id: i64, kind: HistoryKind) -> Result<i64> {
        let query = Query::select()
            .expr(Expr::col(History::Points).sum())
            .from(History::Table)
            .and_where(Expr::col(History::UserId).eq(user_id))
            .and_where(Expr::col(History::Kind).eq(kind.as_str()))
            .to_string(SqliteQueryBuilder);

        let row = sqlx::query(&query).fetch_one(&self.pool).await?;

        let sum: Option<i64> = row.get(0);
        Ok(sum.unwrap_or(0))
    }

    async fn list_history(&self, user_id: i64) -> Result<Vec<PointHistory>> {
        let query = Query::select()
            .columns([
                History::Id,
                History::UserId,
                History::Points,
                History::Kind,
                History::Description,
                History::CreatedAt,
            ])
            .from(History::Table)
            .and_where(Expr::col(History::UserId).eq(user_id))
            .order_by(History::CreatedAt, Order::Desc)
            .order_by(History::Id, Order::Desc)
            .to_string(SqliteQueryBuilder);

        let rows = sqlx::query(&query).fetch_all(&self.pool).await?;

        let mut entries = Vec::with_capacity(rows.len());
        for row in rows {
            entries.push(Self::row_to_history(&row)?);
        }

        Ok(entries)
    }

    async fn commit_redemption(&self, reward: NewReward) -> Result<Reward> {
        // BEGIN IMMEDIATE acquires the write lock upfront, preventing deadlocks
        // when concurrent DEFERRED transactions race to upgrade from shared to exclusive.
        let mut conn = self.pool.acquire().await?;
        sqlx::query("BEGIN IMMEDIATE").execute(&mut *conn).await?;

        let result = Self::insert_redemption(&mut conn, reward).await;

        match result {
            Ok(reward) => {
                sqlx::query("COMMIT").execute(&mut *conn).await?;
                Ok(reward)
            }
            Err(e) => {
                let _ = sqlx::query("ROLLBACK").execute(&mut *conn).await;
                Err(e)
            }
        }
    }

    async fn get_reward(&self, reward_id: i64) -> Result<Option<Reward>> {
        let query = Query::select()
            .columns([
                Rewards::Id,
                Rewards::UserId,
                Rewards::PointsUsed,
                Rewards::RewardType,
                Rewards::Quantity,
                Rewards::Status,
                Rewards::CreatedAt,
                Rewards::ProcessedAt,
            ])
            .from(Rewards::Table)
            .and_where(Expr::col(Rewards::Id).eq(reward_id))
            .to_string(SqliteQueryBuilder);

        let row = sqlx::query(&query).fetch_optional(&self.pool).await?;

        match row {
            Some(row) => {
                let mut reward = Self::row_to_reward(&row)?;
                reward.pins = self.load_pins(reward.id).await?;
                Ok(Some(reward))
            }
            None => Ok(None),
        }
    }

    async fn list_rewards(
        &self,
        user_id: i64,
        status: Option<RewardStatus>,
    ) -> Result<Vec<Reward>> {
        let sql = {
            let mut query = Query::select();
            query
                .columns([
                    Rewards::Id,
                    Rewards::UserId,
                    Rewards::PointsUsed,
                    Rewards::RewardType,
                    Rewards::Quantity,
                    Rewards::Status,
                    Rewards::CreatedAt,
                    Rewards::ProcessedAt,
                ])
                .from(Rewards::Table)
                .and_where(Expr::col(Rewards::UserId).eq(user_id))
                .order_by(Rewards::Id, Order::Asc);

            if let Some(status) = status {
                query.and_where(Expr::col(Rewards::Status).eq(status.as_str()));
            }

            query.to_string(SqliteQueryBuilder)
        };
        let rows = sqlx::query(&sql).fetch_all(&self.pool).await?;

        let mut rewards = Vec::with_capacity(rows.len());
        for row in rows {
            let mut reward = Self::row_to_reward(&row)?;
            reward.pins = self.load_pins(reward.id).await?;
            rewards.push(reward);
        }

        Ok(rewards)
    }

    async fn pin_exists(&self, pin_number: &str) -> Result<bool> {
        let query = Query::select()
            .column(RewardPins::Id)
            .from(RewardPins::Table)
            .and_where(Expr::col(RewardPins::PinNumber).eq(pin_number))
            .limit(1)
            .to_string(SqliteQueryBuilder);

        let row = sqlx::query(&query).fetch_optional(&self.pool).await?;

        Ok(row.is_some())
    }
}
