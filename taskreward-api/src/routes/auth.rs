/// Authentication endpoints
///
/// # Endpoints
///
/// - `POST /auth/register?referID=<id>` - Register new user
/// - `POST /auth/login` - Login and get an access token

use crate::{app::AppState, error::ApiResult};
use axum::{
    extract::{Query, State},
    http::StatusCode,
    Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use taskreward_shared::models::user::User;
use tracing::info;
use validator::Validate;

/// Register request
#[derive(Debug, Deserialize, Validate)]
pub struct RegisterRequest {
    #[validate(length(min = 1, max = 64, message = "Login must be 1 to 64 characters"))]
    pub login: String,

    #[validate(length(min = 1, max = 256, message = "Password must be 1 to 256 characters"))]
    pub password: String,
}

/// Query string of the register endpoint
#[derive(Debug, Default, Deserialize)]
pub struct RegisterParams {
    /// Referring user; 0 or absent for none
    #[serde(rename = "referID", default)]
    pub refer_id: i64,
}

/// Login request
#[derive(Debug, Deserialize, Validate)]
pub struct LoginRequest {
    #[validate(length(min = 1, message = "Login is required"))]
    pub login: String,

    #[validate(length(min = 1, message = "Password is required"))]
    pub password: String,
}

/// Login response
#[derive(Debug, Serialize, Deserialize)]
pub struct LoginResponse {
    /// Access token
    pub token: String,

    pub user_id: i64,

    /// When `token` stops being accepted
    pub expires_at: DateTime<Utc>,
}

/// Register a new user
///
/// ```text
/// POST /auth/register?referID=3
/// Content-Type: application/json
///
/// { "login": "alice", "password": "hunter2" }
/// ```
///
/// # Response
///
/// `201 Created` with the user (balance 0, no password hash).
///
/// # Errors
///
/// - `400 Bad Request`: Invalid arguments or unknown referrer
/// - `409 Conflict`: Login already exists
/// - `422 Unprocessable Entity`: Body validation failed
pub async fn register(
    State(state): State<AppState>,
    Query(params): Query<RegisterParams>,
    Json(req): Json<RegisterRequest>,
) -> ApiResult<(StatusCode, Json<User>)> {
    req.validate()?;

    let user = state
        .service
        .register_user(&req.login, &req.password, params.refer_id)
        .await?;

    Ok((StatusCode::CREATED, Json(user)))
}

/// Login endpoint
///
/// ```text
/// POST /auth/login
/// Content-Type: application/json
///
/// { "login": "alice", "password": "hunter2" }
/// ```
///
/// # Response
///
/// ```json
/// { "token": "eyJ...", "user_id": 1, "expires_at": "2025-01-02T00:00:00Z" }
/// ```
///
/// # Errors
///
/// - `401 Unauthorized`: Wrong password
/// - `404 Not Found`: Unknown login
/// - `422 Unprocessable Entity`: Body validation failed
pub async fn login(
    State(state): State<AppState>,
    Json(req): Json<LoginRequest>,
) -> ApiResult<Json<LoginResponse>> {
    req.validate()?;

    let user = state
        .service
        .authenticate_user(&req.login, &req.password)
        .await?;

    let (token, expires_at) = state.tokens.issue_with_expiry(&user)?;
    info!(user_id = user.id, "Access token issued");

    Ok(Json(LoginResponse {
        token,
        user_id: user.id,
        expires_at,
    }))
}
