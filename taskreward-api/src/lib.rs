//! # TaskReward API Server Library
//!
//! HTTP boundary of the TaskReward system.
//!
//! ## Modules
//!
//! - `app`: Application state, router builder and JWT middleware
//! - `config`: Configuration from environment variables
//! - `error`: Error handling and HTTP response mapping
//! - `routes`: API route handlers

pub mod app;
pub mod config;
pub mod error;
pub mod routes;
