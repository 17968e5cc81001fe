//! Engine-level error types.
//!
//! Addressing a missing id is *not* an error: lookups and transitions return
//! `Ok(None)` instead.

use thiserror::Error;
use uuid::Uuid;

/// Errors produced by the workflow engine.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Persistence error from the db crate.  Never retried by the engine.
    #[error("database error: {0}")]
    Database(#[from] db::DbError),

    /// An opaque payload could not be (de)serialised.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A stored column holds a value the domain model does not recognise.
    #[error("corrupt value in column '{column}': '{value}'")]
    CorruptRow { column: &'static str, value: String },

    /// Caller-supplied input is out of range.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// The instance changed since the caller read it.
    #[error("workflow {id} changed concurrently (expected version {expected}, found {actual})")]
    VersionConflict { id: Uuid, expected: i64, actual: i64 },
}
