//! # TaskReward Shared Library
//!
//! Core of the TaskReward system: users complete open tasks and are credited
//! the task's bonus, exactly once, atomically with closing the task.
//!
//! ## Module Organization
//!
//! - `models`: Database models (`Task`, `User`) and their queries
//! - `db`: Connection pool and embedded migrations
//! - `store`: Storage traits with PostgreSQL and in-memory backends
//! - `engine`: The completion transaction (timeouts, cancellation)
//! - `service`: Domain facade and error taxonomy used by the API
//! - `auth`: Password hashing and JWT issuance

pub mod auth;
pub mod db;
pub mod engine;
pub mod models;
pub mod service;
pub mod store;

/// Current version of the TaskReward shared library
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_is_set() {
        assert!(!VERSION.is_empty());
    }
}
