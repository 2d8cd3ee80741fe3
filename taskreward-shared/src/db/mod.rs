/// Database layer for TaskReward
///
/// # Modules
///
/// - `pool`: PostgreSQL connection pool with health checks
/// - `migrations`: Embedded schema migrations
///
/// Models are in the `models` module at crate root level; the transactional
/// store built on top of them is in `store::postgres`.

pub mod migrations;
pub mod pool;
