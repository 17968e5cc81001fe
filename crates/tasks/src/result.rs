//! `WorkflowResult`: what every task body hands back to its caller.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Counters a task body reports about its own run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkflowMetrics {
    pub duration_ms: u64,
    pub steps_completed: u32,
    pub steps_failed: u32,
    /// External calls made (page fetches, store reads, AI calls).
    pub resources_used: u32,
}

/// Outcome of one task-body run.
///
/// Failure is data: `success = false` plus `errors`.  The caller decides
/// whether to complete or fail the owning workflow instance.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WorkflowResult {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
    #[serde(default)]
    pub metrics: WorkflowMetrics,
}

impl WorkflowResult {
    /// A successful result carrying `data` and zeroed metrics.
    pub fn ok(data: Value) -> Self {
        Self {
            success: true,
            data: Some(data),
            ..Self::default()
        }
    }

    /// A failed result with a single error message.
    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            success: false,
            errors: vec![error.into()],
            ..Self::default()
        }
    }

    /// All errors joined into one message, for `failWorkflow`.
    pub fn error_summary(&self) -> String {
        if self.errors.is_empty() {
            "task reported failure without an error message".to_string()
        } else {
            self.errors.join("; ")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn metrics_default_when_absent() {
        let result: WorkflowResult =
            serde_json::from_value(json!({ "success": true, "data": { "hasChanges": false } }))
                .unwrap();
        assert!(result.success);
        assert_eq!(result.metrics, WorkflowMetrics::default());
        assert!(result.errors.is_empty());
    }

    #[test]
    fn error_summary_joins_messages() {
        let mut result = WorkflowResult::failure("fetch failed");
        result.errors.push("parse failed".into());
        assert_eq!(result.error_summary(), "fetch failed; parse failed");
        assert!(!WorkflowResult::default().error_summary().is_empty());
    }
}
