/// Database models for TaskReward
///
/// Each model owns its table and exposes its queries as associated functions
/// that accept any Postgres executor (pool, connection or open transaction).
///
/// # Models
///
/// - `task`: Rewardable tasks and their open → closed lifecycle
/// - `user`: User accounts and reward balances
///
/// # Example
///
/// ```no_run
/// use taskreward_shared::models::task::{NewTask, Task};
/// use taskreward_shared::db::pool::{create_pool, DatabaseConfig};
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let pool = create_pool(DatabaseConfig::default()).await?;
/// let task = Task::create(&pool, NewTask::new("Invite a friend", 25)).await?;
/// # Ok(())
/// # }
/// ```

pub mod task;
pub mod user;
