/// User model and database operations
///
/// Users hold the reward balance. The balance is only ever increased, and only
/// through [`User::increase_balance`], which does the arithmetic in SQL so that
/// concurrent credits from different tasks never lose an update.
///
/// # Schema
///
/// ```sql
/// CREATE TABLE users (
///     id            BIGSERIAL PRIMARY KEY,
///     login         VARCHAR(64) NOT NULL UNIQUE,
///     password_hash VARCHAR(255) NOT NULL,
///     refer_id      BIGINT REFERENCES users(id),
///     balance       BIGINT NOT NULL DEFAULT 0 CHECK (balance >= 0),
///     created_at    TIMESTAMPTZ NOT NULL DEFAULT NOW()
/// );
/// ```
///
/// # Example
///
/// ```no_run
/// use taskreward_shared::models::user::{NewUser, User};
/// use taskreward_shared::db::pool::{create_pool, DatabaseConfig};
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let pool = create_pool(DatabaseConfig::default()).await?;
///
/// let user = User::create(&pool, NewUser {
///     login: "alice".to_string(),
///     password_hash: "$argon2id$...".to_string(),
///     refer_id: None,
/// }).await?;
///
/// let top = User::top_by_balance(&pool, 10).await?;
/// # Ok(())
/// # }
/// ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgExecutor;

/// User account with its reward balance
///
/// The password hash never leaves the process: it is skipped on serialization.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct User {
    /// Unique user ID
    pub id: i64,

    /// Login, unique across all users
    pub login: String,

    /// Argon2id password hash
    #[serde(skip_serializing, default)]
    pub password_hash: String,

    /// Referring user, if any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub refer_id: Option<i64>,

    /// Accumulated reward balance
    pub balance: i64,

    /// When the account was created
    pub created_at: DateTime<Utc>,
}

/// Input for creating a new user
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewUser {
    /// Login (must be unique)
    pub login: String,

    /// Argon2id password hash (NOT the plaintext password)
    pub password_hash: String,

    /// Referring user ID
    pub refer_id: Option<i64>,
}

impl User {
    /// Creates a new user with a zero balance
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The login already exists (unique constraint violation)
    /// - `refer_id` does not reference an existing user (foreign key violation)
    /// - Database connection fails
    pub async fn create<'e, E>(executor: E, data: NewUser) -> Result<Self, sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        let user = sqlx::query_as::<_, User>(
            r#"
            INSERT INTO users (login, password_hash, refer_id)
            VALUES ($1, $2, $3)
            RETURNING id, login, password_hash, refer_id, balance, created_at
            "#,
        )
        .bind(data.login)
        .bind(data.password_hash)
        .bind(data.refer_id)
        .fetch_one(executor)
        .await?;

        Ok(user)
    }

    /// Finds a user by ID
    pub async fn find_by_id<'e, E>(executor: E, id: i64) -> Result<Option<Self>, sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        let user = sqlx::query_as::<_, User>(
            r#"
            SELECT id, login, password_hash, refer_id, balance, created_at
            FROM users
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(executor)
        .await?;

        Ok(user)
    }

    /// Finds a user by login
    pub async fn find_by_login<'e, E>(executor: E, login: &str) -> Result<Option<Self>, sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        let user = sqlx::query_as::<_, User>(
            r#"
            SELECT id, login, password_hash, refer_id, balance, created_at
            FROM users
            WHERE login = $1
            "#,
        )
        .bind(login)
        .fetch_optional(executor)
        .await?;

        Ok(user)
    }

    /// Lists users with the highest balances
    ///
    /// Equal balances are ordered by ID so the result is stable between calls.
    pub async fn top_by_balance<'e, E>(executor: E, limit: i64) -> Result<Vec<Self>, sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        let users = sqlx::query_as::<_, User>(
            r#"
            SELECT id, login, password_hash, refer_id, balance, created_at
            FROM users
            ORDER BY balance DESC, id ASC
            LIMIT $1
            "#,
        )
        .bind(limit)
        .fetch_all(executor)
        .await?;

        Ok(users)
    }

    /// Adds `amount` to the user's balance in place
    ///
    /// # Returns
    ///
    /// True if the user row was updated, false if no such user exists
    pub async fn increase_balance<'e, E>(
        executor: E,
        id: i64,
        amount: i64,
    ) -> Result<bool, sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        let result = sqlx::query(
            r#"
            UPDATE users
            SET balance = balance + $2
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(amount)
        .execute(executor)
        .await?;

        Ok(result.rows_affected() > 0)
    }
}
