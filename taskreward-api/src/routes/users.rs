/// User endpoints (authenticated)
///
/// # Endpoints
///
/// - `GET /users/:user_id/status` - User with current balance
/// - `POST /users/:user_id/tasks/:task_id/complete` - Complete a task, credit its bonus
/// - `GET /users/leaderboard` - Top users by balance
/// - `GET /users/tasks/activetasks` - Open tasks

use crate::{
    app::{AppState, AuthUser},
    error::{ApiError, ApiResult},
};
use axum::{
    extract::{Path, State},
    Extension, Json,
};
use taskreward_shared::models::{task::Task, user::User};
use tracing::{info, warn};

pub async fn status(
    State(state): State<AppState>,
    Path(user_id): Path<i64>,
) -> ApiResult<Json<User>> {
    let user = state.service.get_user_status(user_id).await?;
    Ok(Json(user))
}

/// Completes a task on behalf of the authenticated user
///
/// The path user must be the token's subject.
///
/// # Errors
///
/// - `400 Bad Request`: Non-positive IDs
/// - `403 Forbidden`: Path user is not the caller
/// - `404 Not Found`: Unknown task or user
/// - `409 Conflict`: Task already completed
pub async fn complete_task(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    Path((user_id, task_id)): Path<(i64, i64)>,
) -> ApiResult<Json<Task>> {
    if auth.user_id != user_id {
        warn!(
            caller = auth.user_id,
            user_id, task_id, "Completion attempted for another user"
        );
        return Err(ApiError::Forbidden(
            "Tasks can only be completed by the authenticated user".to_string(),
        ));
    }

    let cancel = state.shutdown.child_token();
    let task = state
        .service
        .complete_task_with_cancel(task_id, user_id, &cancel)
        .await?;

    info!(user_id, task_id, bonus = task.bonus, "Completion request served");
    Ok(Json(task))
}

pub async fn leaderboard(State(state): State<AppState>) -> ApiResult<Json<Vec<User>>> {
    Ok(Json(state.service.get_leaderboard().await?))
}

pub async fn active_tasks(State(state): State<AppState>) -> ApiResult<Json<Vec<Task>>> {
    Ok(Json(state.service.get_active_tasks().await?))
}
