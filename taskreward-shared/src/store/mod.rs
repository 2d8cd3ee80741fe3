/// Persistence contracts of the reward core
///
/// The completion engine and the reward service never talk to a database
/// directly. They use the traits in this module:
///
/// - [`TaskStore`]: task insertion and the open-task listing
/// - [`UserLedger`]: user lookups, insertion and the leaderboard
/// - [`RewardStore`]: both of the above plus [`RewardStore::begin`], which
///   opens a [`RewardTransaction`]
/// - [`RewardTransaction`]: the two writes that must happen together
///   (`attempt_close` and `increase_balance`) and `commit`/`rollback`
///
/// Dropping a transaction without committing rolls it back. The engine relies
/// on this when a completion times out or is cancelled.
///
/// # Backends
///
/// - [`postgres::PgRewardStore`]: sqlx/PostgreSQL, used in production
/// - [`memory::MemoryRewardStore`]: in-process, used by tests and local runs

pub mod memory;
pub mod postgres;

use async_trait::async_trait;

use crate::models::task::{NewTask, Task};
use crate::models::user::{NewUser, User};

/// Storage-level failures
///
/// These are sentinels for the layers above; the reward service translates
/// them into [`crate::service::RewardError`].
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// No task row has this ID
    #[error("task {0} not found")]
    TaskNotFound(i64),

    /// The task row exists but is already closed
    #[error("task {0} already completed")]
    TaskAlreadyCompleted(i64),

    /// No user row has this ID or login
    #[error("user not found")]
    UserNotFound,

    /// A user with this login already exists
    #[error("login '{0}' already exists")]
    UserAlreadyExists(String),

    /// `refer_id` does not reference an existing user
    #[error("referrer {0} not found")]
    ReferrerNotFound(i64),

    /// Balance increments must be strictly positive
    #[error("invalid amount {0}: must be positive")]
    InvalidAmount(i64),

    /// Row rejected by a schema constraint
    #[error("constraint violated: {0}")]
    Constraint(String),

    /// Underlying database failure
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Backend unavailable or transaction outcome unknown
    #[error("storage unavailable: {0}")]
    Unavailable(String),
}

/// Store result type alias
pub type StoreResult<T> = Result<T, StoreError>;

/// Durable record of tasks
#[async_trait]
pub trait TaskStore: Send + Sync {
    /// Inserts an open task and returns the stored row
    async fn insert_task(&self, task: NewTask) -> StoreResult<Task>;

    /// All open tasks, in no particular order
    async fn find_active_tasks(&self) -> StoreResult<Vec<Task>>;

    /// Point lookup by ID
    async fn get_task(&self, id: i64) -> StoreResult<Task>;
}

/// Durable record of users and their balances
#[async_trait]
pub trait UserLedger: Send + Sync {
    /// Inserts a user with a zero balance
    ///
    /// Fails with [`StoreError::UserAlreadyExists`] on login collision.
    async fn insert_user(&self, user: NewUser) -> StoreResult<User>;

    async fn get_user_by_id(&self, id: i64) -> StoreResult<User>;

    async fn get_user_by_login(&self, login: &str) -> StoreResult<User>;

    /// Highest balances first, at most `limit` users
    async fn top_by_balance(&self, limit: i64) -> StoreResult<Vec<User>>;
}

/// A backend that can run the completion transaction
#[async_trait]
pub trait RewardStore: TaskStore + UserLedger {
    /// Opens a transaction
    async fn begin(&self) -> StoreResult<Box<dyn RewardTransaction>>;

    /// Cheap liveness probe for health checks
    async fn ping(&self) -> StoreResult<()>;
}

/// An open transaction spanning the task store and the user ledger
#[async_trait]
pub trait RewardTransaction: Send {
    /// Closes an open task on behalf of `user_id` in one conditional write
    ///
    /// Returns the closed row, [`StoreError::TaskNotFound`] when no row has
    /// this ID, [`StoreError::TaskAlreadyCompleted`] when the row is already
    /// closed, or [`StoreError::UserNotFound`] when the backend enforces the
    /// user reference and it is dangling.
    async fn attempt_close(&mut self, task_id: i64, user_id: i64) -> StoreResult<Task>;

    /// Adds `amount` to the user's balance in place
    ///
    /// `amount` must be positive ([`StoreError::InvalidAmount`] otherwise).
    /// Returns [`StoreError::UserNotFound`] when the user does not exist.
    async fn increase_balance(&mut self, user_id: i64, amount: i64) -> StoreResult<()>;

    async fn commit(self: Box<Self>) -> StoreResult<()>;

    async fn rollback(self: Box<Self>) -> StoreResult<()>;
}

pub(crate) fn check_amount(amount: i64) -> StoreResult<()> {
    if amount <= 0 {
        return Err(StoreError::InvalidAmount(amount));
    }
    Ok(())
}
