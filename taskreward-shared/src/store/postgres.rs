/// PostgreSQL implementation of the reward store
///
/// Thin adapter over the model queries: it maps "no row" results and
/// constraint violations onto [`StoreError`] sentinels, and wraps an sqlx
/// transaction so the engine can drive it through [`RewardTransaction`].
///
/// # Example
///
/// ```no_run
/// use taskreward_shared::db::pool::{create_pool, DatabaseConfig};
/// use taskreward_shared::store::{postgres::PgRewardStore, RewardStore};
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let pool = create_pool(DatabaseConfig::from_url(std::env::var("DATABASE_URL")?)).await?;
/// let store = PgRewardStore::new(pool);
///
/// let mut tx = store.begin().await?;
/// let task = tx.attempt_close(1, 42).await?;
/// tx.increase_balance(42, task.bonus).await?;
/// tx.commit().await?;
/// # Ok(())
/// # }
/// ```

use async_trait::async_trait;
use sqlx::{PgPool, Postgres, Transaction};
use tracing::debug;

use super::{check_amount, RewardStore, RewardTransaction, StoreError, StoreResult, TaskStore, UserLedger};
use crate::models::task::{NewTask, Task};
use crate::models::user::{NewUser, User};

/// Reward store backed by a shared `PgPool`
#[derive(Debug, Clone)]
pub struct PgRewardStore {
    pool: PgPool,
}

impl PgRewardStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(db) if db.is_unique_violation())
}

fn is_foreign_key_violation(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(db) if db.is_foreign_key_violation())
}

#[async_trait]
impl TaskStore for PgRewardStore {
    async fn insert_task(&self, task: NewTask) -> StoreResult<Task> {
        Task::create(&self.pool, task).await.map_err(|e| match e {
            sqlx::Error::Database(db) if db.is_check_violation() => {
                StoreError::Constraint(db.message().to_string())
            }
            other => StoreError::Database(other),
        })
    }

    async fn find_active_tasks(&self) -> StoreResult<Vec<Task>> {
        Ok(Task::list_open(&self.pool).await?)
    }

    async fn get_task(&self, id: i64) -> StoreResult<Task> {
        Task::find_by_id(&self.pool, id)
            .await?
            .ok_or(StoreError::TaskNotFound(id))
    }
}

#[async_trait]
impl UserLedger for PgRewardStore {
    async fn insert_user(&self, user: NewUser) -> StoreResult<User> {
        let login = user.login.clone();
        let refer_id = user.refer_id;

        User::create(&self.pool, user).await.map_err(|e| {
            if is_unique_violation(&e) {
                StoreError::UserAlreadyExists(login)
            } else if is_foreign_key_violation(&e) {
                // the referrer row vanished between the check and the insert
                StoreError::ReferrerNotFound(refer_id.unwrap_or_default())
            } else {
                StoreError::Database(e)
            }
        })
    }

    async fn get_user_by_id(&self, id: i64) -> StoreResult<User> {
        User::find_by_id(&self.pool, id)
            .await?
            .ok_or(StoreError::UserNotFound)
    }

    async fn get_user_by_login(&self, login: &str) -> StoreResult<User> {
        User::find_by_login(&self.pool, login)
            .await?
            .ok_or(StoreError::UserNotFound)
    }

    async fn top_by_balance(&self, limit: i64) -> StoreResult<Vec<User>> {
        Ok(User::top_by_balance(&self.pool, limit).await?)
    }
}

#[async_trait]
impl RewardStore for PgRewardStore {
    async fn begin(&self) -> StoreResult<Box<dyn RewardTransaction>> {
        let tx = self.pool.begin().await?;
        Ok(Box::new(PgRewardTransaction { tx }))
    }

    async fn ping(&self) -> StoreResult<()> {
        Ok(crate::db::pool::health_check(&self.pool).await?)
    }
}

/// Open Postgres transaction; rolls back on drop unless committed
pub struct PgRewardTransaction {
    tx: Transaction<'static, Postgres>,
}

#[async_trait]
impl RewardTransaction for PgRewardTransaction {
    async fn attempt_close(&mut self, task_id: i64, user_id: i64) -> StoreResult<Task> {
        let closed = Task::close_if_open(&mut *self.tx, task_id, user_id)
            .await
            .map_err(|e| {
                if is_foreign_key_violation(&e) {
                    StoreError::UserNotFound
                } else {
                    StoreError::Database(e)
                }
            })?;

        if let Some(task) = closed {
            return Ok(task);
        }

        // The guard did not match. Status only moves forward, so a row that
        // exists here has already been closed.
        if Task::exists(&mut *self.tx, task_id).await? {
            debug!(task_id, "Task already closed");
            Err(StoreError::TaskAlreadyCompleted(task_id))
        } else {
            Err(StoreError::TaskNotFound(task_id))
        }
    }

    async fn increase_balance(&mut self, user_id: i64, amount: i64) -> StoreResult<()> {
        check_amount(amount)?;

        if User::increase_balance(&mut *self.tx, user_id, amount).await? {
            Ok(())
        } else {
            Err(StoreError::UserNotFound)
        }
    }

    async fn commit(self: Box<Self>) -> StoreResult<()> {
        Ok(self.tx.commit().await?)
    }

    async fn rollback(self: Box<Self>) -> StoreResult<()> {
        Ok(self.tx.rollback().await?)
    }
}
