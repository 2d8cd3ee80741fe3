/// Integration tests for task completion and reward crediting
///
/// Run against the in-memory store, so no database is required:
/// cargo test -p taskreward-shared --test completion_tests

use futures::future::join_all;
use std::sync::Arc;
use std::time::Duration;
use taskreward_shared::engine::CompletionConfig;
use taskreward_shared::models::task::TaskStatus;
use taskreward_shared::models::user::{NewUser, User};
use taskreward_shared::service::{RewardError, RewardService, LEADERBOARD_SIZE};
use taskreward_shared::store::memory::{CommitFault, MemoryRewardStore};
use taskreward_shared::store::{TaskStore, UserLedger};
use tokio_util::sync::CancellationToken;

/// Inserts a user directly, skipping password hashing
async fn seed_user(store: &MemoryRewardStore, login: &str) -> User {
    store
        .insert_user(NewUser {
            login: login.to_string(),
            password_hash: "unused".to_string(),
            refer_id: None,
        })
        .await
        .expect("Failed to seed user")
}

fn setup() -> (MemoryRewardStore, RewardService) {
    let store = MemoryRewardStore::new();
    let service = RewardService::new(Arc::new(store.clone()), CompletionConfig::default());
    (store, service)
}

#[tokio::test]
async fn test_end_to_end_completion() {
    let (store, service) = setup();
    let user = service.register_user("alice", "pw", 0).await.unwrap();

    let task = service.add_task("d0", 10).await.unwrap();
    assert_eq!(task.status, TaskStatus::Open);

    let active = service.get_active_tasks().await.unwrap();
    assert_eq!(active.len(), 1);
    assert_eq!(active[0].id, task.id);
    assert_eq!(active[0].status, TaskStatus::Open);

    let closed = service.complete_task(task.id, user.id).await.unwrap();
    assert_eq!(closed.status, TaskStatus::Closed);
    assert_eq!(closed.user_id, Some(user.id));
    assert!(closed.is_consistent());
    assert_eq!(service.get_user_status(user.id).await.unwrap().balance, 10);
    assert!(service.get_active_tasks().await.unwrap().is_empty());

    let again = service.complete_task(task.id, user.id).await;
    assert!(matches!(again, Err(RewardError::TaskAlreadyCompleted(id)) if id == task.id));
    assert_eq!(store.get_user_by_id(user.id).await.unwrap().balance, 10);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_completion_credits_once() {
    let (store, service) = setup();
    let user = seed_user(&store, "alice").await;
    let task = service.add_task("race", 25).await.unwrap();

    let attempts = (0..8).map(|_| {
        let service = service.clone();
        let (task_id, user_id) = (task.id, user.id);
        tokio::spawn(async move { service.complete_task(task_id, user_id).await })
    });

    let results: Vec<_> = join_all(attempts)
        .await
        .into_iter()
        .map(|joined| joined.expect("Task panicked"))
        .collect();

    let successes = results.iter().filter(|r| r.is_ok()).count();
    let already = results
        .iter()
        .filter(|r| matches!(r, Err(RewardError::TaskAlreadyCompleted(_))))
        .count();

    assert_eq!(successes, 1);
    assert_eq!(already, 7);
    assert_eq!(store.get_user_by_id(user.id).await.unwrap().balance, 25);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_completion_by_different_users() {
    let (store, service) = setup();
    let task = service.add_task("race", 7).await.unwrap();

    let mut user_ids = Vec::new();
    for i in 0..4 {
        let user = seed_user(&store, &format!("user{}", i)).await;
        user_ids.push(user.id);
    }

    let attempts = user_ids.iter().map(|&user_id| {
        let service = service.clone();
        let task_id = task.id;
        tokio::spawn(async move { service.complete_task(task_id, user_id).await })
    });
    let results: Vec<_> = join_all(attempts).await.into_iter().map(|r| r.unwrap()).collect();

    let winner = results
        .iter()
        .find_map(|r| r.as_ref().ok())
        .and_then(|task| task.user_id)
        .expect("One completion should succeed");

    let mut total = 0;
    for user_id in user_ids {
        let balance = store.get_user_by_id(user_id).await.unwrap().balance;
        if user_id == winner {
            assert_eq!(balance, 7);
        } else {
            assert_eq!(balance, 0);
        }
        total += balance;
    }
    assert_eq!(total, 7);
}

#[tokio::test]
async fn test_unknown_task_leaves_ledger_unchanged() {
    let (store, service) = setup();
    let user = seed_user(&store, "alice").await;

    let result = service.complete_task(999, user.id).await;
    assert!(matches!(result, Err(RewardError::TaskNotFound(999))));
    assert_eq!(store.get_user_by_id(user.id).await.unwrap().balance, 0);
}

#[tokio::test]
async fn test_unknown_user_leaves_task_open() {
    let (store, service) = setup();
    let task = service.add_task("d0", 10).await.unwrap();

    let result = service.complete_task(task.id, 999).await;
    assert!(matches!(result, Err(RewardError::UserNotFound)));

    let stored = store.get_task(task.id).await.unwrap();
    assert_eq!(stored.status, TaskStatus::Open);
    assert_eq!(stored.user_id, None);
    assert_eq!(stored.completed_at, None);
}

#[tokio::test]
async fn test_failed_credit_reopens_closed_task() {
    let (store, service) = setup();
    let user = seed_user(&store, "alice").await;
    let task = service.add_task("d0", 10).await.unwrap();

    // the close succeeds inside the transaction, then the credit misses the user
    store.fail_next_credit();
    let result = service.complete_task(task.id, user.id).await;
    assert!(matches!(result, Err(RewardError::UserNotFound)));

    let stored = store.get_task(task.id).await.unwrap();
    assert_eq!(stored.status, TaskStatus::Open);
    assert_eq!(stored.user_id, None);
    assert_eq!(stored.completed_at, None);
    assert_eq!(store.get_user_by_id(user.id).await.unwrap().balance, 0);

    let closed = service.complete_task(task.id, user.id).await.unwrap();
    assert_eq!(closed.user_id, Some(user.id));
    assert_eq!(store.get_user_by_id(user.id).await.unwrap().balance, 10);
}

#[tokio::test]
async fn test_invalid_ids_rejected() {
    let (_, service) = setup();

    for (task_id, user_id) in [(0, 1), (1, 0), (-1, 1), (1, -1)] {
        assert!(matches!(
            service.complete_task(task_id, user_id).await,
            Err(RewardError::InvalidArgument(_))
        ));
    }
}

#[tokio::test]
async fn test_zero_bonus_task_completes() {
    let (store, service) = setup();
    let user = seed_user(&store, "alice").await;
    let task = service.add_task("free", 0).await.unwrap();

    let closed = service.complete_task(task.id, user.id).await.unwrap();
    assert_eq!(closed.status, TaskStatus::Closed);
    assert_eq!(store.get_user_by_id(user.id).await.unwrap().balance, 0);
}

#[tokio::test]
async fn test_rejected_commit_is_retryable() {
    let (store, service) = setup();
    let user = seed_user(&store, "alice").await;
    let task = service.add_task("d0", 10).await.unwrap();

    store.fail_next_commit(CommitFault::Reject);
    assert!(matches!(
        service.complete_task(task.id, user.id).await,
        Err(RewardError::Internal(_))
    ));
    assert_eq!(store.get_task(task.id).await.unwrap().status, TaskStatus::Open);

    service.complete_task(task.id, user.id).await.unwrap();
    assert_eq!(store.get_user_by_id(user.id).await.unwrap().balance, 10);
}

#[tokio::test]
async fn test_ambiguous_commit_retry_never_double_credits() {
    let (store, service) = setup();
    let user = seed_user(&store, "alice").await;
    let task = service.add_task("d0", 10).await.unwrap();

    // the commit lands but the caller only sees an error
    store.fail_next_commit(CommitFault::ApplyThenFail);
    assert!(matches!(
        service.complete_task(task.id, user.id).await,
        Err(RewardError::Internal(_))
    ));

    assert!(matches!(
        service.complete_task(task.id, user.id).await,
        Err(RewardError::TaskAlreadyCompleted(_))
    ));
    assert_eq!(store.get_user_by_id(user.id).await.unwrap().balance, 10);
}

#[tokio::test(start_paused = true)]
async fn test_completion_timeout_is_internal_and_rolls_back() {
    let store = MemoryRewardStore::new();
    let service = RewardService::new(
        Arc::new(store.clone()),
        CompletionConfig::from_timeout_secs(Some(2)),
    );
    let user = seed_user(&store, "alice").await;
    let task = service.add_task("slow", 10).await.unwrap();

    store.set_close_latency(Some(Duration::from_secs(10)));
    assert!(matches!(
        service.complete_task(task.id, user.id).await,
        Err(RewardError::Internal(_))
    ));
    store.set_close_latency(None);

    assert_eq!(store.get_task(task.id).await.unwrap().status, TaskStatus::Open);
    assert_eq!(store.get_user_by_id(user.id).await.unwrap().balance, 0);
}

#[tokio::test(start_paused = true)]
async fn test_cancelled_completion_rolls_back() {
    let (store, service) = setup();
    let user = seed_user(&store, "alice").await;
    let task = service.add_task("slow", 10).await.unwrap();
    store.set_close_latency(Some(Duration::from_secs(3)));

    let shutdown = CancellationToken::new();
    let child = shutdown.child_token();

    let pending = {
        let service = service.clone();
        let task_id = task.id;
        let user_id = user.id;
        tokio::spawn(async move { service.complete_task_with_cancel(task_id, user_id, &child).await })
    };

    tokio::time::sleep(Duration::from_secs(1)).await;
    shutdown.cancel();

    let result = pending.await.unwrap();
    assert!(matches!(result, Err(RewardError::Internal(_))));

    store.set_close_latency(None);
    assert_eq!(store.get_task(task.id).await.unwrap().status, TaskStatus::Open);
    assert_eq!(store.get_user_by_id(user.id).await.unwrap().balance, 0);
}

#[tokio::test]
async fn test_leaderboard_is_bounded_and_sorted() {
    let (store, service) = setup();

    let mut users = Vec::new();
    for i in 0..12 {
        users.push(seed_user(&store, &format!("user{:02}", i)).await);
    }

    // user i earns (i % 5 + 1) * 10; several ties
    for (i, user) in users.iter().enumerate() {
        let bonus = (i as i64 % 5 + 1) * 10;
        let task = service.add_task(&format!("task{}", i), bonus).await.unwrap();
        service.complete_task(task.id, user.id).await.unwrap();
    }

    let board = service.get_leaderboard().await.unwrap();
    assert_eq!(board.len() as i64, LEADERBOARD_SIZE);

    for pair in board.windows(2) {
        assert!(pair[0].balance >= pair[1].balance);
        if pair[0].balance == pair[1].balance {
            assert!(pair[0].id < pair[1].id, "ties should be ordered by id");
        }
    }
    assert_eq!(board[0].balance, 50);
}

#[tokio::test]
async fn test_leaderboard_with_few_users() {
    let (store, service) = setup();
    seed_user(&store, "alice").await;
    seed_user(&store, "bob").await;

    let board = service.get_leaderboard().await.unwrap();
    assert_eq!(board.len(), 2);
}

#[tokio::test]
async fn test_missing_referrer_creates_no_user() {
    let (store, service) = setup();

    let result = service.register_user("alice", "pw", 42).await;
    assert!(matches!(result, Err(RewardError::ReferrerNotFound(42))));
    assert_eq!(store.user_count().await, 0);
    assert!(matches!(
        store.get_user_by_login("alice").await,
        Err(taskreward_shared::store::StoreError::UserNotFound)
    ));
}
