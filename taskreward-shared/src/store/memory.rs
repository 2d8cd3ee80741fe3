/// In-memory reward store for tests and local runs
///
/// Behaves like the Postgres store for everything the reward core relies on:
///
/// - IDs are assigned sequentially starting at 1
/// - logins are unique, `refer_id` and a closing `user_id` must reference an
///   existing user, bonuses must be non-negative
/// - transactions are all-or-nothing: writes go to a staged copy that replaces
///   the live state only on commit
///
/// Transactions are fully serialized: [`RewardStore::begin`] holds the state
/// lock until the transaction is committed, rolled back or dropped. That is
/// stricter than Postgres row locking but yields the same observable outcomes
/// for the completion path.
///
/// Faults can be injected to exercise the failure paths of callers:
///
/// - [`MemoryRewardStore::fail_next_commit`] makes the next commit fail, either
///   before applying anything or after applying everything (the "connection
///   dropped while committing" case)
/// - [`MemoryRewardStore::fail_next_credit`] makes the next balance credit
///   miss its user after the task was already closed in the transaction
/// - [`MemoryRewardStore::set_close_latency`] delays `attempt_close`, which is
///   how timeout and cancellation tests hold a transaction open
///
/// # Example
///
/// ```
/// use taskreward_shared::models::task::NewTask;
/// use taskreward_shared::store::{memory::MemoryRewardStore, TaskStore};
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let store = MemoryRewardStore::new();
/// let task = store.insert_task(NewTask::new("d0", 10)).await?;
/// assert_eq!(task.id, 1);
/// # Ok(())
/// # }
/// ```

use async_trait::async_trait;
use chrono::Utc;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::debug;

use super::{check_amount, RewardStore, RewardTransaction, StoreError, StoreResult, TaskStore, UserLedger};
use crate::models::task::{NewTask, Task, TaskStatus};
use crate::models::user::{NewUser, User};

/// How the next commit should fail
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommitFault {
    /// Nothing is applied and the commit reports an error
    Reject,

    /// Everything is applied, but the commit still reports an error
    ApplyThenFail,
}

#[derive(Debug, Default)]
struct FaultPlan {
    next_commit: Option<CommitFault>,
    next_credit_missing: bool,
    close_latency: Option<Duration>,
}

#[derive(Debug, Clone, Default)]
struct MemoryState {
    tasks: BTreeMap<i64, Task>,
    users: BTreeMap<i64, User>,
    last_task_id: i64,
    last_user_id: i64,
}

/// In-process store; clones share the same data
#[derive(Debug, Clone, Default)]
pub struct MemoryRewardStore {
    state: Arc<Mutex<MemoryState>>,
    faults: Arc<StdMutex<FaultPlan>>,
}

impl MemoryRewardStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes the next commit fail the given way
    pub fn fail_next_commit(&self, fault: CommitFault) {
        self.faults_mut().next_commit = Some(fault);
    }

    /// Makes the next `increase_balance` report the user as missing, as if it
    /// was deleted after the task closed
    pub fn fail_next_credit(&self) {
        self.faults_mut().next_credit_missing = true;
    }

    /// Delays every `attempt_close` by `latency` (None to clear)
    pub fn set_close_latency(&self, latency: Option<Duration>) {
        self.faults_mut().close_latency = latency;
    }

    /// Number of stored users
    pub async fn user_count(&self) -> usize {
        self.state.lock().await.users.len()
    }

    fn faults_mut(&self) -> std::sync::MutexGuard<'_, FaultPlan> {
        // a poisoned plan only means a test panicked mid-update; the data is still usable
        self.faults.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl TaskStore for MemoryRewardStore {
    async fn insert_task(&self, task: NewTask) -> StoreResult<Task> {
        if task.bonus < 0 {
            return Err(StoreError::Constraint(format!(
                "bonus must be non-negative, got {}",
                task.bonus
            )));
        }

        let mut state = self.state.lock().await;
        state.last_task_id += 1;

        let row = Task {
            id: state.last_task_id,
            description: task.description,
            bonus: task.bonus,
            status: TaskStatus::Open,
            user_id: None,
            created_at: Utc::now(),
            completed_at: None,
        };
        state.tasks.insert(row.id, row.clone());

        Ok(row)
    }

    async fn find_active_tasks(&self) -> StoreResult<Vec<Task>> {
        let state = self.state.lock().await;
        Ok(state
            .tasks
            .values()
            .filter(|t| t.status == TaskStatus::Open)
            .cloned()
            .collect())
    }

    async fn get_task(&self, id: i64) -> StoreResult<Task> {
        let state = self.state.lock().await;
        state.tasks.get(&id).cloned().ok_or(StoreError::TaskNotFound(id))
    }
}

#[async_trait]
impl UserLedger for MemoryRewardStore {
    async fn insert_user(&self, user: NewUser) -> StoreResult<User> {
        let mut state = self.state.lock().await;

        if state.users.values().any(|u| u.login == user.login) {
            return Err(StoreError::UserAlreadyExists(user.login));
        }

        if let Some(refer_id) = user.refer_id {
            if !state.users.contains_key(&refer_id) {
                return Err(StoreError::ReferrerNotFound(refer_id));
            }
        }

        state.last_user_id += 1;
        let row = User {
            id: state.last_user_id,
            login: user.login,
            password_hash: user.password_hash,
            refer_id: user.refer_id,
            balance: 0,
            created_at: Utc::now(),
        };
        state.users.insert(row.id, row.clone());

        Ok(row)
    }

    async fn get_user_by_id(&self, id: i64) -> StoreResult<User> {
        let state = self.state.lock().await;
        state.users.get(&id).cloned().ok_or(StoreError::UserNotFound)
    }

    async fn get_user_by_login(&self, login: &str) -> StoreResult<User> {
        let state = self.state.lock().await;
        state
            .users
            .values()
            .find(|u| u.login == login)
            .cloned()
            .ok_or(StoreError::UserNotFound)
    }

    async fn top_by_balance(&self, limit: i64) -> StoreResult<Vec<User>> {
        let state = self.state.lock().await;

        // users iterate in ID order and the sort is stable, so ties stay ID-ascending
        let mut users: Vec<User> = state.users.values().cloned().collect();
        users.sort_by(|a, b| b.balance.cmp(&a.balance));
        users.truncate(usize::try_from(limit).unwrap_or(0));

        Ok(users)
    }
}

#[async_trait]
impl RewardStore for MemoryRewardStore {
    async fn begin(&self) -> StoreResult<Box<dyn RewardTransaction>> {
        let guard = self.state.clone().lock_owned().await;
        let staged = guard.clone();

        Ok(Box::new(MemoryRewardTransaction {
            guard,
            staged,
            faults: self.faults.clone(),
        }))
    }

    async fn ping(&self) -> StoreResult<()> {
        Ok(())
    }
}

/// Serialized transaction over a staged copy of the store
pub struct MemoryRewardTransaction {
    guard: OwnedMutexGuard<MemoryState>,
    staged: MemoryState,
    faults: Arc<StdMutex<FaultPlan>>,
}

impl MemoryRewardTransaction {
    fn plan(&self) -> std::sync::MutexGuard<'_, FaultPlan> {
        self.faults.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl RewardTransaction for MemoryRewardTransaction {
    async fn attempt_close(&mut self, task_id: i64, user_id: i64) -> StoreResult<Task> {
        let latency = self.plan().close_latency;
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }

        let task = self
            .staged
            .tasks
            .get_mut(&task_id)
            .ok_or(StoreError::TaskNotFound(task_id))?;

        if !task.status.can_transition_to(TaskStatus::Closed) {
            return Err(StoreError::TaskAlreadyCompleted(task_id));
        }

        if !self.staged.users.contains_key(&user_id) {
            return Err(StoreError::UserNotFound);
        }

        task.status = TaskStatus::Closed;
        task.user_id = Some(user_id);
        task.completed_at = Some(Utc::now());

        Ok(task.clone())
    }

    async fn increase_balance(&mut self, user_id: i64, amount: i64) -> StoreResult<()> {
        check_amount(amount)?;

        if std::mem::take(&mut self.plan().next_credit_missing) {
            debug!("Injected missing user on credit");
            return Err(StoreError::UserNotFound);
        }

        let user = self
            .staged
            .users
            .get_mut(&user_id)
            .ok_or(StoreError::UserNotFound)?;

        user.balance = user
            .balance
            .checked_add(amount)
            .ok_or_else(|| StoreError::Constraint(format!("balance overflow for user {}", user_id)))?;

        Ok(())
    }

    async fn commit(self: Box<Self>) -> StoreResult<()> {
        let fault = self.plan().next_commit.take();
        let MemoryRewardTransaction {
            mut guard, staged, ..
        } = *self;

        match fault {
            None => {
                *guard = staged;
                Ok(())
            }
            Some(CommitFault::Reject) => {
                debug!("Injected commit failure, nothing applied");
                Err(StoreError::Unavailable("commit rejected".to_string()))
            }
            Some(CommitFault::ApplyThenFail) => {
                *guard = staged;
                debug!("Injected commit failure after apply");
                Err(StoreError::Unavailable(
                    "connection lost while committing".to_string(),
                ))
            }
        }
    }

    async fn rollback(self: Box<Self>) -> StoreResult<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_user(login: &str, refer_id: Option<i64>) -> NewUser {
        NewUser {
            login: login.to_string(),
            password_hash: "hash".to_string(),
            refer_id,
        }
    }

    #[tokio::test]
    async fn test_insert_task_assigns_sequential_ids() {
        let store = MemoryRewardStore::new();

        let first = store.insert_task(NewTask::new("a", 1)).await.unwrap();
        let second = store.insert_task(NewTask::new("b", 2)).await.unwrap();

        assert_eq!(first.id, 1);
        assert_eq!(second.id, 2);
        assert_eq!(first.status, TaskStatus::Open);
        assert!(first.is_consistent());
    }

    #[tokio::test]
    async fn test_insert_task_rejects_negative_bonus() {
        let store = MemoryRewardStore::new();
        let result = store.insert_task(NewTask::new("bad", -1)).await;
        assert!(matches!(result, Err(StoreError::Constraint(_))));
        assert!(store.find_active_tasks().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_insert_user_enforces_unique_login_and_referrer() {
        let store = MemoryRewardStore::new();

        store.insert_user(new_user("alice", None)).await.unwrap();

        let dup = store.insert_user(new_user("alice", None)).await;
        assert!(matches!(dup, Err(StoreError::UserAlreadyExists(ref l)) if l == "alice"));

        let orphan = store.insert_user(new_user("bob", Some(99))).await;
        assert!(matches!(orphan, Err(StoreError::ReferrerNotFound(99))));

        assert_eq!(store.user_count().await, 1);
    }

    #[tokio::test]
    async fn test_dropped_transaction_leaves_no_trace() {
        let store = MemoryRewardStore::new();
        let task = store.insert_task(NewTask::new("d0", 10)).await.unwrap();
        let user = store.insert_user(new_user("alice", None)).await.unwrap();

        {
            let mut tx = store.begin().await.unwrap();
            tx.attempt_close(task.id, user.id).await.unwrap();
            tx.increase_balance(user.id, 10).await.unwrap();
        }

        assert_eq!(store.get_task(task.id).await.unwrap().status, TaskStatus::Open);
        assert_eq!(store.get_user_by_id(user.id).await.unwrap().balance, 0);
    }

    #[tokio::test]
    async fn test_rejected_commit_applies_nothing() {
        let store = MemoryRewardStore::new();
        let task = store.insert_task(NewTask::new("d0", 10)).await.unwrap();
        let user = store.insert_user(new_user("alice", None)).await.unwrap();

        store.fail_next_commit(CommitFault::Reject);
        let mut tx = store.begin().await.unwrap();
        tx.attempt_close(task.id, user.id).await.unwrap();
        tx.increase_balance(user.id, 10).await.unwrap();
        assert!(tx.commit().await.is_err());

        assert_eq!(store.get_task(task.id).await.unwrap().status, TaskStatus::Open);

        // the fault is one-shot
        let mut tx = store.begin().await.unwrap();
        tx.attempt_close(task.id, user.id).await.unwrap();
        tx.commit().await.unwrap();
        assert_eq!(store.get_task(task.id).await.unwrap().status, TaskStatus::Closed);
    }

    #[tokio::test]
    async fn test_failed_credit_is_one_shot() {
        let store = MemoryRewardStore::new();
        let user = store.insert_user(new_user("alice", None)).await.unwrap();

        store.fail_next_credit();
        let mut tx = store.begin().await.unwrap();
        assert!(matches!(
            tx.increase_balance(user.id, 5).await,
            Err(StoreError::UserNotFound)
        ));
        tx.increase_balance(user.id, 5).await.unwrap();
        tx.commit().await.unwrap();

        assert_eq!(store.get_user_by_id(user.id).await.unwrap().balance, 5);
    }

    #[tokio::test]
    async fn test_top_by_balance_orders_and_limits() {
        let store = MemoryRewardStore::new();
        for i in 0..4 {
            store.insert_user(new_user(&format!("u{}", i), None)).await.unwrap();
        }

        let mut tx = store.begin().await.unwrap();
        tx.increase_balance(2, 5).await.unwrap();
        tx.increase_balance(3, 5).await.unwrap();
        tx.increase_balance(4, 9).await.unwrap();
        tx.commit().await.unwrap();

        let top = store.top_by_balance(3).await.unwrap();
        let ids: Vec<i64> = top.iter().map(|u| u.id).collect();
        assert_eq!(ids, vec![4, 2, 3]);
    }

    #[tokio::test]
    async fn test_increase_balance_unknown_user() {
        let store = MemoryRewardStore::new();
        let mut tx = store.begin().await.unwrap();
        assert!(matches!(
            tx.increase_balance(42, 1).await,
            Err(StoreError::UserNotFound)
        ));
    }
}
