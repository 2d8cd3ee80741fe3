/// Task endpoints (authenticated)
///
/// - `POST /tasks` - Create an open task

use crate::{app::AppState, error::ApiResult};
use axum::{extract::State, http::StatusCode, Json};
use serde::Deserialize;
use taskreward_shared::models::task::Task;
use validator::Validate;

/// Create task request
#[derive(Debug, Deserialize, Validate)]
pub struct CreateTaskRequest {
    #[validate(length(min = 1, max = 1000, message = "Description must be 1 to 1000 characters"))]
    pub description: String,

    /// Reward credited on completion
    #[validate(range(min = 0, message = "Bonus must not be negative"))]
    pub bonus: i64,
}

/// Create a task
///
/// ```text
/// POST /tasks
/// Content-Type: application/json
///
/// { "description": "write docs", "bonus": 10 }
/// ```
///
/// Responds `201 Created` with the open task.
pub async fn create_task(
    State(state): State<AppState>,
    Json(req): Json<CreateTaskRequest>,
) -> ApiResult<(StatusCode, Json<Task>)> {
    req.validate()?;

    let task = state.service.add_task(&req.description, req.bonus).await?;
    Ok((StatusCode::CREATED, Json(task)))
}
