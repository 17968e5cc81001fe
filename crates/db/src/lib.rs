//! `db` crate: pure persistence layer for workflow instances, steps,
//! executions and logs.
//!
//! Provides typed row structs, the [`WorkflowStore`] trait the engine talks
//! to, and two backends: [`MemoryStore`] and the Postgres-backed [`PgStore`]
//! (connection pool + repository functions).  No business logic lives here.

pub mod error;
pub mod memory;
pub mod models;
pub mod pool;
pub mod postgres;
pub mod repository;
pub mod store;

pub use error::DbError;
pub use memory::MemoryStore;
pub use pool::DbPool;
pub use postgres::PgStore;
pub use store::{InstanceFilter, LogFilter, StepCompletion, WorkflowStore};
