//! Common test utilities for integration tests
//!
//! Builds the full router over an in-memory store, so these tests need no
//! database. Users can be seeded directly (skipping password hashing) and
//! tokens are minted with the same issuer the app validates against.

#![allow(dead_code)]

use axum::body::Body;
use axum::http::{Request, StatusCode};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use taskreward_api::app::{build_router, AppState};
use taskreward_api::config::Config;
use taskreward_shared::auth::jwt::TokenIssuer;
use taskreward_shared::models::user::{NewUser, User};
use taskreward_shared::service::RewardService;
use taskreward_shared::store::memory::MemoryRewardStore;
use taskreward_shared::store::UserLedger;
use tower::ServiceExt;

pub const TEST_JWT_SECRET: &str = "test-secret-key-at-least-32-bytes-long";

/// Test context containing all necessary resources
pub struct TestContext {
    pub store: MemoryRewardStore,
    pub state: AppState,
    pub app: axum::Router,
}

impl TestContext {
    pub fn new() -> Self {
        let vars: HashMap<&str, &str> = [
            ("DATABASE_URL", "postgresql://unused/unused"),
            ("JWT_SECRET", TEST_JWT_SECRET),
            ("COMPLETION_TIMEOUT_SECS", "5"),
        ]
        .into_iter()
        .collect();
        let config = Config::from_lookup(|key| vars.get(key).map(|v| v.to_string()))
            .expect("Test configuration should be valid");

        let store = MemoryRewardStore::new();
        let service = RewardService::new(Arc::new(store.clone()), config.completion_config());
        let state = AppState::new(service, config);
        let app = build_router(state.clone());

        Self { store, state, app }
    }

    pub fn tokens(&self) -> &TokenIssuer {
        &self.state.tokens
    }

    /// Inserts a user without going through registration
    pub async fn seed_user(&self, login: &str) -> User {
        self.store
            .insert_user(NewUser {
                login: login.to_string(),
                password_hash: "unused".to_string(),
                refer_id: None,
            })
            .await
            .expect("Failed to seed user")
    }

    /// Seeds a user and returns it with a valid bearer header value
    pub async fn seed_user_with_token(&self, login: &str) -> (User, String) {
        let user = self.seed_user(login).await;
        let token = self.tokens().issue(&user).expect("Failed to issue token");
        (user, format!("Bearer {}", token))
    }

    /// Sends one request through the router and decodes the JSON body
    pub async fn send(
        &self,
        method: &str,
        uri: &str,
        auth: Option<&str>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(auth) = auth {
            builder = builder.header("authorization", auth);
        }

        let request = match body {
            Some(json) => builder
                .header("content-type", "application/json")
                .body(Body::from(json.to_string())),
            None => builder.body(Body::empty()),
        }
        .expect("Failed to build request");

        let response = self.app.clone().oneshot(request).await.expect("Router failed");
        let status = response.status();

        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("Failed to read body");
        let json = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or_else(|_| {
                Value::String(String::from_utf8_lossy(&bytes).into_owned())
            })
        };

        (status, json)
    }
}
