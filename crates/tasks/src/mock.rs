//! `MockTask`: a test double for `TaskBody`.
//!
//! Useful in engine and runner tests where a real body (and its external
//! collaborators) is either unavailable or irrelevant.

use async_trait::async_trait;
use serde_json::Value;
use std::sync::{Arc, Mutex};

use crate::{TaskBody, WorkflowResult};

/// A mock body that records every config it receives and returns a
/// programmer-specified result.
pub struct MockTask {
    /// Label returned from `name()`.
    pub name: &'static str,
    /// What the body returns when `execute` is called.
    pub result: WorkflowResult,
    /// All configs seen by this body (in call order).
    pub calls: Arc<Mutex<Vec<Value>>>,
}

impl MockTask {
    /// Create a mock that always succeeds with the given data.
    pub fn succeeding(name: &'static str, data: Value) -> Self {
        Self {
            name,
            result: WorkflowResult::ok(data),
            calls: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Create a mock that always reports failure with the given errors.
    pub fn failing(name: &'static str, errors: &[&str]) -> Self {
        Self {
            name,
            result: WorkflowResult {
                success: false,
                errors: errors.iter().map(|e| e.to_string()).collect(),
                ..WorkflowResult::default()
            },
            calls: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Number of times this body has been executed.
    pub fn call_count(&self) -> usize {
        self.calls.lock().map(|c| c.len()).unwrap_or(0)
    }
}

#[async_trait]
impl TaskBody for MockTask {
    fn name(&self) -> &'static str {
        self.name
    }

    async fn execute(&self, config: &Value) -> WorkflowResult {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(config.clone());
        }
        self.result.clone()
    }
}
