//! Task-level error type.

use thiserror::Error;

/// Errors raised inside a task body.
///
/// Task bodies never return these to their caller: every failure is folded
/// into the `errors`/`warnings` of the [`crate::WorkflowResult`] they produce.
/// Capability implementations use them to report collaborator failures.
#[derive(Debug, Error)]
pub enum TaskError {
    /// The opaque config could not be parsed into the body's typed config.
    #[error("invalid task config: {0}")]
    InvalidConfig(#[from] serde_json::Error),

    /// An external collaborator (browser, store, AI endpoint) failed.
    #[error("{capability} failed: {message}")]
    Capability {
        capability: &'static str,
        message: String,
    },

    /// A requested content snapshot does not exist.
    #[error("snapshot '{0}' not found")]
    MissingSnapshot(String),
}

impl TaskError {
    pub fn capability(capability: &'static str, message: impl Into<String>) -> Self {
        Self::Capability {
            capability,
            message: message.into(),
        }
    }
}
