//! The `TaskBody` trait: the contract every workflow body must fulfil.

use async_trait::async_trait;
use serde_json::Value;

use crate::WorkflowResult;

/// A pluggable unit of business logic.
///
/// A body consumes the opaque config stored on a workflow instance and
/// produces a [`WorkflowResult`].  It never touches persisted workflow state;
/// the caller reports the result to the engine.
#[async_trait]
pub trait TaskBody: Send + Sync {
    /// Short name used in logs.
    fn name(&self) -> &'static str;

    async fn execute(&self, config: &Value) -> WorkflowResult;
}
