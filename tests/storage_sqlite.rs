//! SQLite ledger store integration tests.
//!
//! Run with: cargo test --test storage_sqlite --features sqlite
//!
//! Uses file-backed databases in temp directories. The in-memory driver
//! hands every pooled connection a private database, which would defeat
//! the cross-connection transaction tests below.

use std::collections::HashSet;
use std::sync::Arc;

use futures::future::join_all;
use tempfile::TempDir;

use tally::config::StorageConfig;
use tally::domain::{HistoryKind, RedemptionRequest, RewardStatus, RewardType};
use tally::error::EngineError;
use tally::services::{LedgerQuery, RedemptionEngine};
use tally::storage::{init_storage, LedgerStore, NewReward, SqliteLedgerStore, StorageError};

async fn temp_store() -> (Arc<SqliteLedgerStore>, TempDir) {
    let dir = tempfile::tempdir().expect("create temp dir");
    let path = dir.path().join("ledger.db");
    let pool = sqlx::SqlitePool::connect(&format!("sqlite:{}?mode=rwc", path.display()))
        .await
        .expect("Failed to connect to SQLite");
    let store = SqliteLedgerStore::new(pool);
    store.init().await.expect("Failed to create schema");
    (Arc::new(store), dir)
}

fn approved(user_id: i64, reward_type: RewardType, quantity: i64, pins: &[&str]) -> NewReward {
    let mut payload = NewReward::requested(
        user_id,
        reward_type.unit_cost() * quantity,
        reward_type,
        quantity,
        pins.iter().map(|p| p.to_string()).collect(),
    );
    payload.approve();
    payload
}

#[tokio::test]
async fn test_user_provisioning() {
    let (store, _dir) = temp_store().await;

    let user = store.create_user(1500).await.unwrap();
    assert_eq!(user.points, 1500);

    let fetched = store.get_user(user.id).await.unwrap().unwrap();
    assert_eq!(fetched, user);

    assert!(store.get_user(user.id + 1).await.unwrap().is_none());
}

#[tokio::test]
async fn test_credit_updates_balance_and_ledger() {
    let (store, _dir) = temp_store().await;
    let user = store.create_user(100).await.unwrap();

    let entry = store
        .credit_user(user.id, 250, Some("survey bonus"))
        .await
        .unwrap();
    assert_eq!(entry.points, 250);
    assert_eq!(entry.kind, HistoryKind::Earned);
    assert_eq!(entry.description.as_deref(), Some("survey bonus"));

    let fetched = store.get_user(user.id).await.unwrap().unwrap();
    assert_eq!(fetched.points, 350);

    // Timestamps survive the text round trip unchanged.
    let history = store.list_history(user.id).await.unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].created_at, entry.created_at);

    let err = store.credit_user(999, 100, None).await.unwrap_err();
    assert!(matches!(err, StorageError::UserMissing(999)));
}

#[tokio::test]
async fn test_history_sums_and_ordering() {
    let (store, _dir) = temp_store().await;
    let user = store.create_user(0).await.unwrap();

    assert_eq!(
        store.sum_history(user.id, HistoryKind::Earned).await.unwrap(),
        0
    );

    store.credit_user(user.id, 6000, Some("first")).await.unwrap();
    store.credit_user(user.id, 4000, Some("second")).await.unwrap();
    store
        .commit_redemption(
            approved(user.id, RewardType::FiveThousand, 1, &["1000-2000-3000-4000"])
                .with_note("spend"),
        )
        .await
        .unwrap();

    assert_eq!(
        store.sum_history(user.id, HistoryKind::Earned).await.unwrap(),
        10_000
    );
    assert_eq!(
        store.sum_history(user.id, HistoryKind::Used).await.unwrap(),
        5000
    );

    let history = store.list_history(user.id).await.unwrap();
    let descriptions: Vec<_> = history
        .iter()
        .map(|e| e.description.as_deref().unwrap())
        .collect();
    assert_eq!(descriptions, ["spend", "second", "first"]);
}

#[tokio::test]
async fn test_commit_persists_reward_with_pins() {
    let (store, _dir) = temp_store().await;
    let user = store.create_user(20_000).await.unwrap();

    let pins = ["1111-2222-3333-4444", "5555-6666-7777-8888"];
    let stored = store
        .commit_redemption(approved(user.id, RewardType::TenThousand, 2, &pins))
        .await
        .unwrap();

    assert_eq!(stored.points_used, 20_000);
    assert_eq!(stored.status, RewardStatus::Approved);
    assert!(stored.processed_at.is_some());

    let fetched = store.get_reward(stored.id).await.unwrap().unwrap();
    assert_eq!(fetched.user_id, user.id);
    assert_eq!(fetched.reward_type, RewardType::TenThousand);
    assert_eq!(fetched.status, RewardStatus::Approved);
    let fetched_pins: Vec<_> = fetched.pins.iter().map(|p| p.pin_number.as_str()).collect();
    assert_eq!(fetched_pins, pins, "pins keep their insertion order");

    assert_eq!(store.get_user(user.id).await.unwrap().unwrap().points, 0);
    assert!(store.pin_exists(pins[0]).await.unwrap());
    assert!(!store.pin_exists("9999-9999-9999-9999").await.unwrap());

    assert!(store.get_reward(stored.id + 1).await.unwrap().is_none());
}

#[tokio::test]
async fn test_commit_refuses_overdraw() {
    let (store, _dir) = temp_store().await;
    let user = store.create_user(4999).await.unwrap();

    let err = store
        .commit_redemption(approved(user.id, RewardType::FiveThousand, 1, &["1234-1234-1234-1234"]))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        StorageError::InsufficientBalance {
            available: 4999,
            required: 5000
        }
    ));

    assert_eq!(store.get_user(user.id).await.unwrap().unwrap().points, 4999);
    assert!(store.list_history(user.id).await.unwrap().is_empty());
    assert!(store.list_rewards(user.id, None).await.unwrap().is_empty());

    let err = store
        .commit_redemption(approved(999, RewardType::FiveThousand, 1, &["1234-1234-1234-1234"]))
        .await
        .unwrap_err();
    assert!(matches!(err, StorageError::UserMissing(999)));
}

#[tokio::test]
async fn test_duplicate_pin_rolls_back_whole_commit() {
    let (store, _dir) = temp_store().await;
    let user = store.create_user(20_000).await.unwrap();

    store
        .commit_redemption(approved(user.id, RewardType::FiveThousand, 1, &["1111-2222-3333-4444"]))
        .await
        .unwrap();

    // Second commit debits, writes history, inserts the reward and one
    // fresh pin before the reused code trips the unique constraint.
    // Every one of those writes must disappear with the rollback.
    let err = store
        .commit_redemption(approved(
            user.id,
            RewardType::FiveThousand,
            2,
            &["5555-6666-7777-8888", "1111-2222-3333-4444"],
        ))
        .await
        .unwrap_err();
    match err {
        StorageError::DuplicatePin(pin) => assert_eq!(pin, "1111-2222-3333-4444"),
        other => panic!("unexpected error: {other:?}"),
    }

    assert_eq!(store.get_user(user.id).await.unwrap().unwrap().points, 15_000);
    assert_eq!(store.list_history(user.id).await.unwrap().len(), 1);
    assert_eq!(store.list_rewards(user.id, None).await.unwrap().len(), 1);
    assert!(!store.pin_exists("5555-6666-7777-8888").await.unwrap());
}

#[tokio::test]
async fn test_list_rewards_scoping_and_status_filter() {
    let (store, _dir) = temp_store().await;
    let user = store.create_user(50_000).await.unwrap();
    let other = store.create_user(50_000).await.unwrap();

    store
        .commit_redemption(approved(user.id, RewardType::FiveThousand, 1, &["1000-1000-1000-1000"]))
        .await
        .unwrap();
    store
        .commit_redemption(NewReward::requested(
            user.id,
            10_000,
            RewardType::TenThousand,
            1,
            vec!["2000-2000-2000-2000".to_string()],
        ))
        .await
        .unwrap();
    store
        .commit_redemption(approved(other.id, RewardType::FiveThousand, 1, &["3000-3000-3000-3000"]))
        .await
        .unwrap();

    let all = store.list_rewards(user.id, None).await.unwrap();
    assert_eq!(all.len(), 2);
    assert!(all[0].id < all[1].id, "rewards listed in id order");

    let approved_only = store
        .list_rewards(user.id, Some(RewardStatus::Approved))
        .await
        .unwrap();
    assert_eq!(approved_only.len(), 1);
    assert_eq!(approved_only[0].reward_type, RewardType::FiveThousand);

    let requested_only = store
        .list_rewards(user.id, Some(RewardStatus::Requested))
        .await
        .unwrap();
    assert_eq!(requested_only.len(), 1);
    assert!(requested_only[0].processed_at.is_none());

    assert!(store
        .list_rewards(user.id, Some(RewardStatus::Rejected))
        .await
        .unwrap()
        .is_empty());
}

#[tokio::test]
async fn test_engine_round_trip_on_sqlite() {
    let (store, _dir) = temp_store().await;
    let user = store.create_user(0).await.unwrap();
    let engine = RedemptionEngine::new(store.clone());
    let query = LedgerQuery::new(store.clone());

    engine.credit(user.id, 35_000, Some("import")).await.unwrap();

    let outcome = engine
        .redeem(user.id, &RedemptionRequest::new("TEN_THOUSAND", 3))
        .await
        .unwrap();
    assert_eq!(outcome.points_used, 30_000);
    assert_eq!(outcome.pin_numbers.len(), 3);

    let summary = query.get_balance_summary(user.id).await.unwrap();
    assert_eq!(summary.current_points, 5000);
    assert_eq!(summary.total_earned, 35_000);
    assert_eq!(summary.total_used, 30_000);

    let view = query.get_reward_by_id(user.id, outcome.reward_id).await.unwrap();
    assert_eq!(view.pin_numbers, outcome.pin_numbers);
    assert_eq!(view.status, RewardStatus::Approved);

    let history = query.get_history(user.id).await.unwrap();
    assert_eq!(history[0].kind, HistoryKind::Used);
    assert_eq!(history[0].points, 30_000);
}

#[tokio::test]
async fn test_concurrent_redemptions_elect_single_winner() {
    let (store, _dir) = temp_store().await;
    let user = store.create_user(8000).await.unwrap();
    let engine = Arc::new(RedemptionEngine::new(store.clone()));

    // Each redemption alone fits the balance; together they overdraw.
    let tasks: Vec<_> = (0..2)
        .map(|_| {
            let engine = engine.clone();
            let user_id = user.id;
            tokio::spawn(async move {
                engine
                    .redeem(user_id, &RedemptionRequest::new("FIVE_THOUSAND", 1))
                    .await
            })
        })
        .collect();

    let results: Vec<_> = join_all(tasks)
        .await
        .into_iter()
        .map(|joined| joined.expect("task panicked"))
        .collect();

    let successes = results.iter().filter(|r| r.is_ok()).count();
    assert_eq!(successes, 1, "exactly one concurrent redeem may win");
    for result in &results {
        if let Err(err) = result {
            assert!(matches!(err, EngineError::InsufficientPoints { .. }));
        }
    }

    let remaining = store.get_user(user.id).await.unwrap().unwrap().points;
    assert_eq!(remaining, 3000);
    assert_eq!(
        store.sum_history(user.id, HistoryKind::Used).await.unwrap(),
        5000
    );
}

#[tokio::test]
async fn test_concurrent_redemptions_issue_distinct_pins() {
    let (store, _dir) = temp_store().await;
    let user = store.create_user(100_000).await.unwrap();
    let engine = Arc::new(RedemptionEngine::new(store.clone()));

    let tasks: Vec<_> = (0..4)
        .map(|_| {
            let engine = engine.clone();
            let user_id = user.id;
            tokio::spawn(async move {
                engine
                    .redeem(user_id, &RedemptionRequest::new("FIVE_THOUSAND", 5))
                    .await
            })
        })
        .collect();

    let mut all_pins = HashSet::new();
    for joined in join_all(tasks).await {
        let outcome = joined.expect("task panicked").expect("redeem succeeds");
        for pin in outcome.pin_numbers {
            assert!(all_pins.insert(pin), "pin reused across redemptions");
        }
    }
    assert_eq!(all_pins.len(), 20);
    assert_eq!(store.get_user(user.id).await.unwrap().unwrap().points, 0);
}

#[tokio::test]
async fn test_init_storage_backends() {
    let dir = tempfile::tempdir().unwrap();

    // The sqlite backend creates missing parent directories.
    let config = StorageConfig {
        backend: "sqlite".to_string(),
        path: format!("{}/data/ledger.db", dir.path().display()),
    };
    let store = init_storage(&config).await.expect("sqlite backend");
    let user = store.create_user(100).await.unwrap();
    assert_eq!(store.get_user(user.id).await.unwrap().unwrap().points, 100);

    let config = StorageConfig {
        backend: "memory".to_string(),
        path: String::new(),
    };
    let store = init_storage(&config).await.expect("memory backend");
    assert!(store.get_user(1).await.unwrap().is_none());

    let config = StorageConfig {
        backend: "papertape".to_string(),
        path: String::new(),
    };
    assert!(init_storage(&config).await.is_err());
}
