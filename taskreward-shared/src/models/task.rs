/// Task model and database operations
///
/// A task is a unit of work with a fixed reward (`bonus`). It is created open
/// and closed exactly once, by the user who completes it.
///
/// # State Machine
///
/// ```text
/// open → closed
/// ```
///
/// There is no way back: a closed task keeps its `user_id` and `completed_at`
/// forever.
///
/// # Schema
///
/// ```sql
/// CREATE TYPE task_status AS ENUM ('open', 'closed');
///
/// CREATE TABLE tasks (
///     id           BIGSERIAL PRIMARY KEY,
///     description  TEXT NOT NULL,
///     bonus        BIGINT NOT NULL CHECK (bonus >= 0),
///     status       task_status NOT NULL DEFAULT 'open',
///     user_id      BIGINT REFERENCES users(id),
///     created_at   TIMESTAMPTZ NOT NULL DEFAULT NOW(),
///     completed_at TIMESTAMPTZ
/// );
/// ```
///
/// # Example
///
/// ```no_run
/// use taskreward_shared::models::task::{NewTask, Task};
/// use taskreward_shared::db::pool::{create_pool, DatabaseConfig};
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let pool = create_pool(DatabaseConfig::default()).await?;
///
/// let task = Task::create(&pool, NewTask::new("Follow us on X", 10)).await?;
///
/// let mut tx = pool.begin().await?;
/// let closed = Task::close_if_open(&mut *tx, task.id, 7).await?;
/// tx.commit().await?;
/// assert!(closed.is_some());
/// # Ok(())
/// # }
/// ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgExecutor;

/// Task lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "task_status", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    /// Task can still be completed
    Open,

    /// Task has been completed and rewarded
    Closed,
}

impl TaskStatus {
    /// Converts status to string for database storage
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Open => "open",
            TaskStatus::Closed => "closed",
        }
    }

    /// Checks if transition to target status is valid
    pub fn can_transition_to(&self, target: TaskStatus) -> bool {
        matches!((self, target), (TaskStatus::Open, TaskStatus::Closed))
    }
}

/// Task model representing a rewardable unit of work
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Task {
    /// Unique task ID
    pub id: i64,

    /// Free-text description, immutable after creation
    pub description: String,

    /// Reward credited to the completing user
    pub bonus: i64,

    /// Current lifecycle state
    pub status: TaskStatus,

    /// Completing user (None while open)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<i64>,

    /// When the task was created
    pub created_at: DateTime<Utc>,

    /// When the task was completed (None while open)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

impl Task {
    /// Whether the closed-state fields agree with the status
    pub fn is_consistent(&self) -> bool {
        match self.status {
            TaskStatus::Open => self.user_id.is_none() && self.completed_at.is_none(),
            TaskStatus::Closed => self.user_id.is_some() && self.completed_at.is_some(),
        }
    }
}

/// Input for creating a new task
///
/// Status is not part of the input: new tasks are always open.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewTask {
    /// Task description
    pub description: String,

    /// Reward amount (must be >= 0)
    pub bonus: i64,
}

impl NewTask {
    pub fn new(description: impl Into<String>, bonus: i64) -> Self {
        Self {
            description: description.into(),
            bonus,
        }
    }
}

impl Task {
    /// Inserts a new open task
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails or a constraint is
    /// violated (e.g. negative bonus).
    pub async fn create<'e, E>(executor: E, data: NewTask) -> Result<Self, sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        let task = sqlx::query_as::<_, Task>(
            r#"
            INSERT INTO tasks (description, bonus, status)
            VALUES ($1, $2, 'open')
            RETURNING id, description, bonus, status, user_id, created_at, completed_at
            "#,
        )
        .bind(data.description)
        .bind(data.bonus)
        .fetch_one(executor)
        .await?;

        Ok(task)
    }

    /// Finds a task by ID
    pub async fn find_by_id<'e, E>(executor: E, id: i64) -> Result<Option<Self>, sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        let task = sqlx::query_as::<_, Task>(
            r#"
            SELECT id, description, bonus, status, user_id, created_at, completed_at
            FROM tasks
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(executor)
        .await?;

        Ok(task)
    }

    /// Lists all open tasks
    pub async fn list_open<'e, E>(executor: E) -> Result<Vec<Self>, sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        let tasks = sqlx::query_as::<_, Task>(
            r#"
            SELECT id, description, bonus, status, user_id, created_at, completed_at
            FROM tasks
            WHERE status = 'open'
            "#,
        )
        .fetch_all(executor)
        .await?;

        Ok(tasks)
    }

    /// Closes the task on behalf of `user_id` if, and only if, it is still open
    ///
    /// This is one statement: the `status = 'open'` guard and the write happen
    /// atomically under the row lock, so of any number of concurrent callers
    /// exactly one gets `Some(task)`. Everyone else gets `None`, which means
    /// either the task does not exist or it is already closed (see
    /// [`Task::exists`]).
    ///
    /// # Errors
    ///
    /// Fails with a foreign-key violation when `user_id` does not reference an
    /// existing user.
    pub async fn close_if_open<'e, E>(
        executor: E,
        id: i64,
        user_id: i64,
    ) -> Result<Option<Self>, sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        let task = sqlx::query_as::<_, Task>(
            r#"
            UPDATE tasks
            SET status = 'closed',
                user_id = $2,
                completed_at = NOW()
            WHERE id = $1 AND status = 'open'
            RETURNING id, description, bonus, status, user_id, created_at, completed_at
            "#,
        )
        .bind(id)
        .bind(user_id)
        .fetch_optional(executor)
        .await?;

        Ok(task)
    }

    /// Checks whether a task row exists, regardless of status
    pub async fn exists<'e, E>(executor: E, id: i64) -> Result<bool, sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        let (exists,): (bool,) = sqlx::query_as("SELECT EXISTS (SELECT 1 FROM tasks WHERE id = $1)")
            .bind(id)
            .fetch_one(executor)
            .await?;

        Ok(exists)
    }
}
