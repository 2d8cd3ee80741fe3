/// API route handlers
///
/// Handlers are organized by resource:
///
/// - `health`: Health check endpoint
/// - `auth`: Registration and login
/// - `users`: User status, task completion, leaderboard, open tasks
/// - `tasks`: Task creation

pub mod auth;
pub mod health;
pub mod tasks;
pub mod users;
