//! PostgreSQL persistence module.
//!
//! Provides connection pooling for the PostgreSQL conversation store.

pub mod pool;

pub use pool::{PostgresPool, PostgresPoolError};
