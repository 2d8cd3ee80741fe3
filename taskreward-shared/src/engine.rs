/// Completion engine
///
/// Runs the one operation in the system with a real correctness hazard:
/// closing a task and crediting its bonus to the completing user, exactly
/// once, with no partial writes.
///
/// # Transaction
///
/// ```text
/// validate ids ──> begin
///                    ├─> attempt_close(task, user)   conditional UPDATE ... RETURNING
///                    │     ├─ TaskNotFound          ─> rollback
///                    │     ├─ TaskAlreadyCompleted  ─> rollback
///                    │     └─ UserNotFound          ─> rollback
///                    ├─> increase_balance(user, bonus)
///                    │     └─ UserNotFound          ─> rollback (task reopens)
///                    └─> commit ──> closed task snapshot
/// ```
///
/// `attempt_close` both checks eligibility and claims the task in a single
/// statement, so no application-level lock is needed: of N concurrent
/// completions of one task exactly one commits, the rest see
/// `TaskAlreadyCompleted`. For the same reason a completion whose outcome is
/// unknown (commit error, timeout, cancellation) can simply be retried; a
/// second attempt on a task that did close fails with `TaskAlreadyCompleted`
/// instead of crediting again.
///
/// # Timeouts and Cancellation
///
/// Every attempt runs under [`CompletionConfig::transaction_timeout`] and can
/// also be aborted through a [`CancellationToken`]. Either way the in-flight
/// transaction future is dropped, which rolls the transaction back.
///
/// # Example
///
/// ```no_run
/// use std::sync::Arc;
/// use taskreward_shared::engine::{CompletionConfig, CompletionEngine};
/// use taskreward_shared::store::memory::MemoryRewardStore;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let engine = CompletionEngine::new(Arc::new(MemoryRewardStore::new()), CompletionConfig::default());
/// let task = engine.complete(1, 42).await?;
/// println!("task {} closed by {:?}", task.id, task.user_id);
/// # Ok(())
/// # }
/// ```

use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::models::task::Task;
use crate::store::{RewardStore, RewardTransaction, StoreError};

/// Default bound on one completion transaction (5 seconds)
pub const DEFAULT_TRANSACTION_TIMEOUT: Duration = Duration::from_secs(5);

/// Smallest accepted transaction bound (1 second)
pub const MIN_TRANSACTION_TIMEOUT: Duration = Duration::from_secs(1);

/// Largest accepted transaction bound (60 seconds)
pub const MAX_TRANSACTION_TIMEOUT: Duration = Duration::from_secs(60);

/// Completion failures
#[derive(Debug, thiserror::Error)]
pub enum CompletionError {
    /// Malformed identifiers or amounts; never retried
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("task {0} not found")]
    TaskNotFound(i64),

    #[error("task {0} already completed")]
    TaskAlreadyCompleted(i64),

    #[error("user {0} not found")]
    UserNotFound(i64),

    /// The transaction did not finish within the configured bound
    #[error("completion timed out after {0:?}")]
    TimedOut(Duration),

    /// The caller cancelled the completion
    #[error("completion cancelled")]
    Cancelled,

    /// Begin/commit or other storage failure; outcome may be unknown
    #[error("storage failure: {0}")]
    Store(StoreError),
}

impl CompletionError {
    /// Whether retrying the whole completion is meaningful
    ///
    /// True for outcomes that may or may not have been applied. Retrying
    /// them is safe: an applied completion turns into `TaskAlreadyCompleted`.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            CompletionError::TimedOut(_) | CompletionError::Cancelled | CompletionError::Store(_)
        )
    }

    fn from_store(err: StoreError, user_id: i64) -> Self {
        match err {
            StoreError::TaskNotFound(id) => CompletionError::TaskNotFound(id),
            StoreError::TaskAlreadyCompleted(id) => CompletionError::TaskAlreadyCompleted(id),
            StoreError::UserNotFound => CompletionError::UserNotFound(user_id),
            StoreError::InvalidAmount(amount) => {
                CompletionError::InvalidArgument(format!("amount must be positive, got {}", amount))
            }
            other => CompletionError::Store(other),
        }
    }
}

/// Engine configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletionConfig {
    /// Upper bound on one completion transaction, begin to commit
    pub transaction_timeout: Duration,
}

impl Default for CompletionConfig {
    fn default() -> Self {
        Self {
            transaction_timeout: DEFAULT_TRANSACTION_TIMEOUT,
        }
    }
}

impl CompletionConfig {
    /// Builds a config from a timeout in seconds, clamped to
    /// [`MIN_TRANSACTION_TIMEOUT`]..=[`MAX_TRANSACTION_TIMEOUT`]
    pub fn from_timeout_secs(timeout_secs: Option<u64>) -> Self {
        let timeout = timeout_secs
            .map(Duration::from_secs)
            .unwrap_or(DEFAULT_TRANSACTION_TIMEOUT)
            .clamp(MIN_TRANSACTION_TIMEOUT, MAX_TRANSACTION_TIMEOUT);

        Self {
            transaction_timeout: timeout,
        }
    }
}

/// Closes tasks and credits rewards in one transaction
#[derive(Clone)]
pub struct CompletionEngine {
    store: Arc<dyn RewardStore>,
    config: CompletionConfig,
}

impl CompletionEngine {
    pub fn new(store: Arc<dyn RewardStore>, config: CompletionConfig) -> Self {
        Self { store, config }
    }

    /// Completes `task_id` on behalf of `user_id`
    ///
    /// On success the task is closed and the user's balance has grown by the
    /// task's bonus. On any error neither was changed, except that for
    /// [`CompletionError::is_retryable`] errors the outcome is unknown.
    pub async fn complete(&self, task_id: i64, user_id: i64) -> Result<Task, CompletionError> {
        self.complete_with_cancel(task_id, user_id, &CancellationToken::new())
            .await
    }

    /// Like [`CompletionEngine::complete`], aborting when `cancel` fires
    pub async fn complete_with_cancel(
        &self,
        task_id: i64,
        user_id: i64,
        cancel: &CancellationToken,
    ) -> Result<Task, CompletionError> {
        validate_ids(task_id, user_id)?;

        let limit = self.config.transaction_timeout;
        let attempt = tokio::time::timeout(limit, self.run_transaction(task_id, user_id));

        tokio::select! {
            biased;

            _ = cancel.cancelled() => {
                warn!(task_id, user_id, "Completion cancelled, transaction rolled back");
                Err(CompletionError::Cancelled)
            }
            outcome = attempt => match outcome {
                Ok(result) => result,
                Err(_) => {
                    warn!(task_id, user_id, timeout = ?limit, "Completion timed out, transaction rolled back");
                    Err(CompletionError::TimedOut(limit))
                }
            },
        }
    }

    async fn run_transaction(&self, task_id: i64, user_id: i64) -> Result<Task, CompletionError> {
        let mut tx = self.store.begin().await.map_err(CompletionError::Store)?;

        let task = match tx.attempt_close(task_id, user_id).await {
            Ok(task) => task,
            Err(e) => {
                debug!(task_id, user_id, error = %e, "Task not closable");
                abort(tx).await;
                return Err(CompletionError::from_store(e, user_id));
            }
        };
        debug_assert!(task.is_consistent());

        // zero-bonus tasks close without touching the ledger
        if task.bonus > 0 {
            if let Err(e) = tx.increase_balance(user_id, task.bonus).await {
                warn!(task_id, user_id, error = %e, "Balance credit failed, reopening task");
                abort(tx).await;
                return Err(CompletionError::from_store(e, user_id));
            }
        }

        tx.commit().await.map_err(|e| {
            error!(task_id, user_id, error = %e, "Commit failed, completion outcome unknown");
            CompletionError::Store(e)
        })?;

        info!(
            task_id,
            user_id,
            bonus = task.bonus,
            status = task.status.as_str(),
            "Task completed and reward credited"
        );
        Ok(task)
    }
}

fn validate_ids(task_id: i64, user_id: i64) -> Result<(), CompletionError> {
    if task_id <= 0 {
        return Err(CompletionError::InvalidArgument(format!(
            "task id must be positive, got {}",
            task_id
        )));
    }
    if user_id <= 0 {
        return Err(CompletionError::InvalidArgument(format!(
            "user id must be positive, got {}",
            user_id
        )));
    }
    Ok(())
}

async fn abort(tx: Box<dyn RewardTransaction>) {
    if let Err(e) = tx.rollback().await {
        // the backend discards the transaction anyway once the handle is gone
        warn!(error = %e, "Rollback failed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::task::{NewTask, TaskStatus};
    use crate::models::user::NewUser;
    use crate::store::memory::MemoryRewardStore;
    use crate::store::{TaskStore, UserLedger};

    async fn seeded(bonus: i64) -> (MemoryRewardStore, CompletionEngine, i64, i64) {
        let store = MemoryRewardStore::new();
        let task = store.insert_task(NewTask::new("d0", bonus)).await.unwrap();
        let user = store
            .insert_user(NewUser {
                login: "alice".to_string(),
                password_hash: "hash".to_string(),
                refer_id: None,
            })
            .await
            .unwrap();
        let engine = CompletionEngine::new(Arc::new(store.clone()), CompletionConfig::default());
        (store, engine, task.id, user.id)
    }

    #[test]
    fn test_config_clamping() {
        assert_eq!(
            CompletionConfig::from_timeout_secs(None).transaction_timeout,
            DEFAULT_TRANSACTION_TIMEOUT
        );
        assert_eq!(
            CompletionConfig::from_timeout_secs(Some(3)).transaction_timeout,
            Duration::from_secs(3)
        );
        assert_eq!(
            CompletionConfig::from_timeout_secs(Some(0)).transaction_timeout,
            MIN_TRANSACTION_TIMEOUT
        );
        assert_eq!(
            CompletionConfig::from_timeout_secs(Some(3600)).transaction_timeout,
            MAX_TRANSACTION_TIMEOUT
        );
    }

    #[test]
    fn test_retryable_classification() {
        assert!(CompletionError::Cancelled.is_retryable());
        assert!(CompletionError::TimedOut(Duration::from_secs(1)).is_retryable());
        assert!(CompletionError::Store(StoreError::Unavailable("x".into())).is_retryable());
        assert!(!CompletionError::TaskAlreadyCompleted(1).is_retryable());
        assert!(!CompletionError::InvalidArgument("x".into()).is_retryable());
    }

    #[tokio::test]
    async fn test_invalid_ids_rejected_before_transaction() {
        let (store, engine, task_id, user_id) = seeded(10).await;

        // Holding the only transaction slot proves validation never reaches begin()
        let _held = store.begin().await.unwrap();

        assert!(matches!(
            engine.complete(0, user_id).await,
            Err(CompletionError::InvalidArgument(_))
        ));
        assert!(matches!(
            engine.complete(task_id, 0).await,
            Err(CompletionError::InvalidArgument(_))
        ));
        assert!(matches!(
            engine.complete(-4, user_id).await,
            Err(CompletionError::InvalidArgument(_))
        ));
    }

    #[tokio::test]
    async fn test_complete_closes_and_credits() {
        let (store, engine, task_id, user_id) = seeded(10).await;

        let task = engine.complete(task_id, user_id).await.unwrap();

        assert_eq!(task.status, TaskStatus::Closed);
        assert_eq!(task.user_id, Some(user_id));
        assert!(task.completed_at.is_some());
        assert_eq!(store.get_user_by_id(user_id).await.unwrap().balance, 10);
    }

    #[tokio::test]
    async fn test_zero_bonus_task_closes_without_credit() {
        let (store, engine, task_id, user_id) = seeded(0).await;

        let task = engine.complete(task_id, user_id).await.unwrap();

        assert_eq!(task.status, TaskStatus::Closed);
        assert_eq!(store.get_user_by_id(user_id).await.unwrap().balance, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_rolls_back() {
        let (store, engine, task_id, user_id) = seeded(10).await;
        store.set_close_latency(Some(Duration::from_secs(30)));

        let result = engine.complete(task_id, user_id).await;
        assert!(matches!(result, Err(CompletionError::TimedOut(d)) if d == DEFAULT_TRANSACTION_TIMEOUT));

        store.set_close_latency(None);
        assert_eq!(store.get_task(task_id).await.unwrap().status, TaskStatus::Open);

        // retry after the timeout succeeds exactly once
        engine.complete(task_id, user_id).await.unwrap();
        assert_eq!(store.get_user_by_id(user_id).await.unwrap().balance, 10);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancellation_rolls_back() {
        let (store, engine, task_id, user_id) = seeded(10).await;
        store.set_close_latency(Some(Duration::from_secs(3)));

        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(1)).await;
            trigger.cancel();
        });

        let result = engine.complete_with_cancel(task_id, user_id, &cancel).await;
        assert!(matches!(result, Err(CompletionError::Cancelled)));

        assert_eq!(store.get_task(task_id).await.unwrap().status, TaskStatus::Open);
        assert_eq!(store.get_user_by_id(user_id).await.unwrap().balance, 0);
    }

    #[tokio::test]
    async fn test_already_cancelled_token_short_circuits() {
        let (store, engine, task_id, user_id) = seeded(10).await;

        let cancel = CancellationToken::new();
        cancel.cancel();

        let result = engine.complete_with_cancel(task_id, user_id, &cancel).await;
        assert!(matches!(result, Err(CompletionError::Cancelled)));
        assert_eq!(store.get_task(task_id).await.unwrap().status, TaskStatus::Open);
    }
}
