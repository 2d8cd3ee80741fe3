/// Application state and router builder
///
/// This module defines the shared application state and provides
/// a function to build the Axum router with all routes and middleware.
///
/// # Example
///
/// ```no_run
/// use std::sync::Arc;
/// use taskreward_api::{app::AppState, config::Config};
/// use taskreward_shared::db::pool::create_pool;
/// use taskreward_shared::service::RewardService;
/// use taskreward_shared::store::postgres::PgRewardStore;
///
/// # async fn example() -> anyhow::Result<()> {
/// let config = Config::from_env()?;
/// let pool = create_pool(config.pool_config()).await?;
/// let service = RewardService::new(Arc::new(PgRewardStore::new(pool)), config.completion_config());
/// let state = AppState::new(service, config);
/// let app = taskreward_api::app::build_router(state);
/// # Ok(())
/// # }
/// ```

use crate::{config::Config, error::ApiError};
use axum::{
    extract::{Request, State},
    http::{header, HeaderValue, Method},
    middleware::Next,
    response::Response,
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use taskreward_shared::auth::jwt::TokenIssuer;
use taskreward_shared::service::RewardService;
use tokio_util::sync::CancellationToken;
use tower_http::{
    cors::CorsLayer,
    trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer},
};
use tracing::Level;

/// Shared application state
///
/// Cloned for each request handler via Axum's `State` extractor.
#[derive(Clone)]
pub struct AppState {
    /// Domain facade over the configured store
    pub service: RewardService,

    /// Signs and verifies access tokens
    pub tokens: Arc<TokenIssuer>,

    /// Application configuration
    pub config: Arc<Config>,

    /// Cancelled when the server shuts down; completions run on child tokens
    pub shutdown: CancellationToken,
}

impl AppState {
    /// Creates state whose token issuer is built from `config`
    pub fn new(service: RewardService, config: Config) -> Self {
        let tokens = config.token_issuer();
        Self {
            service,
            tokens: Arc::new(tokens),
            config: Arc::new(config),
            shutdown: CancellationToken::new(),
        }
    }

    /// Replaces the shutdown token
    pub fn with_shutdown(mut self, shutdown: CancellationToken) -> Self {
        self.shutdown = shutdown;
        self
    }
}

/// Identity of the caller, inserted by [`jwt_auth_layer`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthUser {
    pub user_id: i64,
    pub login: String,
}

/// Builds the complete Axum router with all routes and middleware
///
/// ```text
/// /
/// ├── GET  /health
/// ├── /auth/                                      (public)
/// │   ├── POST /register?referID=<id>
/// │   └── POST /login
/// ├── /users/                                     (JWT)
/// │   ├── GET  /leaderboard
/// │   ├── GET  /tasks/activetasks
/// │   ├── GET  /:user_id/status
/// │   └── POST /:user_id/tasks/:task_id/complete
/// └── POST /tasks                                 (JWT)
/// ```
///
/// Middleware, outermost first: CORS, request tracing, then JWT
/// authentication on the protected routes.
pub fn build_router(state: AppState) -> Router {
    use crate::routes;

    let health_routes = Router::new().route("/health", get(routes::health::health_check));

    let auth_routes = Router::new()
        .route("/register", post(routes::auth::register))
        .route("/login", post(routes::auth::login));

    let user_routes = Router::new()
        .route("/leaderboard", get(routes::users::leaderboard))
        .route("/tasks/activetasks", get(routes::users::active_tasks))
        .route("/:user_id/status", get(routes::users::status))
        .route(
            "/:user_id/tasks/:task_id/complete",
            post(routes::users::complete_task),
        );

    let task_routes = Router::new().route("/", post(routes::tasks::create_task));

    let protected = Router::new()
        .nest("/users", user_routes)
        .nest("/tasks", task_routes)
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            jwt_auth_layer,
        ));

    Router::new()
        .merge(health_routes)
        .nest("/auth", auth_routes)
        .merge(protected)
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
        .layer(cors_layer(&state.config))
        .with_state(state)
}

fn cors_layer(config: &Config) -> CorsLayer {
    if config.cors_permissive() {
        return CorsLayer::permissive();
    }

    let origins: Vec<HeaderValue> = config
        .api
        .cors_origins
        .iter()
        .filter_map(|origin| origin.parse().ok())
        .collect();

    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE])
        .max_age(std::time::Duration::from_secs(3600))
}

/// JWT authentication middleware layer
///
/// Validates the `Authorization: Bearer <token>` header and inserts an
/// [`AuthUser`] into the request extensions.
async fn jwt_auth_layer(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let auth_header = req
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| ApiError::Unauthorized("Missing authorization header".to_string()))?;

    let token = auth_header
        .strip_prefix("Bearer ")
        .ok_or_else(|| ApiError::Unauthorized("Expected Bearer token".to_string()))?;

    let claims = state.tokens.validate(token)?;

    req.extensions_mut().insert(AuthUser {
        user_id: claims.sub,
        login: claims.login,
    });

    Ok(next.run(req).await)
}
