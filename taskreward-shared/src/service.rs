/// Reward service
///
/// The domain facade used by the HTTP layer. It validates arguments,
/// delegates task completion to the [`CompletionEngine`], and translates
/// storage and engine failures into one closed taxonomy, [`RewardError`].
///
/// # Operations
///
/// | Operation | Errors |
/// |-----------|--------|
/// | [`add_task`](RewardService::add_task) | `InvalidArgument` |
/// | [`complete_task`](RewardService::complete_task) | `InvalidArgument`, `TaskNotFound`, `TaskAlreadyCompleted`, `UserNotFound`, `Internal` |
/// | [`get_active_tasks`](RewardService::get_active_tasks) | `Internal` |
/// | [`get_leaderboard`](RewardService::get_leaderboard) | `Internal` |
/// | [`get_user_status`](RewardService::get_user_status) | `InvalidArgument`, `UserNotFound` |
/// | [`register_user`](RewardService::register_user) | `InvalidArgument`, `ReferrerNotFound`, `UserAlreadyExists` |
/// | [`authenticate_user`](RewardService::authenticate_user) | `UserNotFound`, `InvalidCredentials` |

use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::auth::password::{hash_password, validate_password, verify_password};
use crate::engine::{CompletionConfig, CompletionEngine, CompletionError};
use crate::models::task::{NewTask, Task};
use crate::models::user::{NewUser, User};
use crate::store::{RewardStore, StoreError};

/// Number of users returned by the leaderboard
pub const LEADERBOARD_SIZE: i64 = 10;

/// Longest accepted login, matching the `users.login` column
pub const MAX_LOGIN_LEN: usize = 64;

/// Domain errors
#[derive(Debug, thiserror::Error)]
pub enum RewardError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("task {0} not found")]
    TaskNotFound(i64),

    #[error("task {0} already completed")]
    TaskAlreadyCompleted(i64),

    #[error("user not found")]
    UserNotFound,

    #[error("user '{0}' already exists")]
    UserAlreadyExists(String),

    #[error("referrer {0} not found")]
    ReferrerNotFound(i64),

    #[error("invalid credentials")]
    InvalidCredentials,

    /// Storage failure, timeout or cancellation; details are logged, not shown
    #[error("internal error: {0}")]
    Internal(String),
}

impl From<StoreError> for RewardError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::TaskNotFound(id) => RewardError::TaskNotFound(id),
            StoreError::TaskAlreadyCompleted(id) => RewardError::TaskAlreadyCompleted(id),
            StoreError::UserNotFound => RewardError::UserNotFound,
            StoreError::UserAlreadyExists(login) => RewardError::UserAlreadyExists(login),
            StoreError::ReferrerNotFound(id) => RewardError::ReferrerNotFound(id),
            StoreError::InvalidAmount(amount) => {
                RewardError::InvalidArgument(format!("amount must be positive, got {}", amount))
            }
            StoreError::Constraint(msg) => RewardError::InvalidArgument(msg),
            e @ (StoreError::Database(_) | StoreError::Unavailable(_)) => {
                error!(error = %e, "Storage failure");
                RewardError::Internal(e.to_string())
            }
        }
    }
}

impl From<CompletionError> for RewardError {
    fn from(err: CompletionError) -> Self {
        match err {
            CompletionError::InvalidArgument(msg) => RewardError::InvalidArgument(msg),
            CompletionError::TaskNotFound(id) => RewardError::TaskNotFound(id),
            CompletionError::TaskAlreadyCompleted(id) => RewardError::TaskAlreadyCompleted(id),
            CompletionError::UserNotFound(_) => RewardError::UserNotFound,
            e @ (CompletionError::TimedOut(_) | CompletionError::Cancelled) => {
                RewardError::Internal(e.to_string())
            }
            CompletionError::Store(e) => RewardError::from(e),
        }
    }
}

/// Domain facade over a [`RewardStore`]
#[derive(Clone)]
pub struct RewardService {
    store: Arc<dyn RewardStore>,
    engine: CompletionEngine,
}

impl RewardService {
    pub fn new(store: Arc<dyn RewardStore>, config: CompletionConfig) -> Self {
        let engine = CompletionEngine::new(store.clone(), config);
        Self { store, engine }
    }

    /// Probes the backing store
    pub async fn ping(&self) -> Result<(), RewardError> {
        Ok(self.store.ping().await?)
    }

    /// Creates an open task
    pub async fn add_task(&self, description: &str, bonus: i64) -> Result<Task, RewardError> {
        let description = description.trim();
        if description.is_empty() {
            return Err(RewardError::InvalidArgument(
                "description must not be empty".to_string(),
            ));
        }
        if bonus < 0 {
            return Err(RewardError::InvalidArgument(format!(
                "bonus must not be negative, got {}",
                bonus
            )));
        }

        let task = self.store.insert_task(NewTask::new(description, bonus)).await?;
        info!(task_id = task.id, bonus, "Task created");
        Ok(task)
    }

    /// Closes a task and credits its bonus to `user_id`
    pub async fn complete_task(&self, task_id: i64, user_id: i64) -> Result<Task, RewardError> {
        Ok(self.engine.complete(task_id, user_id).await?)
    }

    /// Like [`RewardService::complete_task`], aborting when `cancel` fires
    pub async fn complete_task_with_cancel(
        &self,
        task_id: i64,
        user_id: i64,
        cancel: &CancellationToken,
    ) -> Result<Task, RewardError> {
        Ok(self
            .engine
            .complete_with_cancel(task_id, user_id, cancel)
            .await?)
    }

    pub async fn get_active_tasks(&self) -> Result<Vec<Task>, RewardError> {
        Ok(self.store.find_active_tasks().await?)
    }

    /// Top [`LEADERBOARD_SIZE`] users by balance, ties by ascending ID
    pub async fn get_leaderboard(&self) -> Result<Vec<User>, RewardError> {
        Ok(self.store.top_by_balance(LEADERBOARD_SIZE).await?)
    }

    pub async fn get_user_status(&self, user_id: i64) -> Result<User, RewardError> {
        if user_id <= 0 {
            return Err(RewardError::InvalidArgument(format!(
                "user id must be positive, got {}",
                user_id
            )));
        }
        Ok(self.store.get_user_by_id(user_id).await?)
    }

    /// Registers a user, optionally referred by `refer_id`
    ///
    /// `refer_id == 0` means "no referrer". A non-zero referrer must exist,
    /// otherwise nothing is inserted.
    pub async fn register_user(
        &self,
        login: &str,
        password: &str,
        refer_id: i64,
    ) -> Result<User, RewardError> {
        let login = validate_login(login)?;
        validate_password(password).map_err(RewardError::InvalidArgument)?;

        let refer_id = match refer_id {
            0 => None,
            id if id < 0 => {
                return Err(RewardError::InvalidArgument(format!(
                    "referrer id must not be negative, got {}",
                    id
                )))
            }
            id => {
                match self.store.get_user_by_id(id).await {
                    Ok(_) => Some(id),
                    Err(StoreError::UserNotFound) => {
                        debug!(refer_id = id, "Referrer does not exist");
                        return Err(RewardError::ReferrerNotFound(id));
                    }
                    Err(e) => return Err(e.into()),
                }
            }
        };

        let password = password.to_string();
        let password_hash = tokio::task::spawn_blocking(move || hash_password(&password))
            .await
            .map_err(|e| RewardError::Internal(format!("hashing task failed: {}", e)))?
            .map_err(|e| RewardError::Internal(e.to_string()))?;

        let user = self
            .store
            .insert_user(NewUser {
                login: login.to_string(),
                password_hash,
                refer_id,
            })
            .await?;

        info!(user_id = user.id, refer_id = ?user.refer_id, "User registered");
        Ok(user)
    }

    /// Checks `password` against the stored hash for `login`
    pub async fn authenticate_user(&self, login: &str, password: &str) -> Result<User, RewardError> {
        let user = self.store.get_user_by_login(login.trim()).await?;

        let candidate = password.to_string();
        let stored = user.password_hash.clone();
        let matches = tokio::task::spawn_blocking(move || verify_password(&candidate, &stored))
            .await
            .map_err(|e| RewardError::Internal(format!("verification task failed: {}", e)))?
            .map_err(|e| {
                error!(user_id = user.id, error = %e, "Stored password hash unusable");
                RewardError::Internal(e.to_string())
            })?;

        if !matches {
            warn!(user_id = user.id, "Password mismatch");
            return Err(RewardError::InvalidCredentials);
        }

        debug!(user_id = user.id, "User authenticated");
        Ok(user)
    }
}

fn validate_login(login: &str) -> Result<&str, RewardError> {
    let login = login.trim();
    if login.is_empty() {
        return Err(RewardError::InvalidArgument(
            "login must not be empty".to_string(),
        ));
    }
    if login.chars().count() > MAX_LOGIN_LEN {
        return Err(RewardError::InvalidArgument(format!(
            "login must be at most {} characters",
            MAX_LOGIN_LEN
        )));
    }
    Ok(login)
}
