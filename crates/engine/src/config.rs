//! Tuning knobs for the workflow engine.

/// Defaults and limits applied by [`crate::WorkflowEngine`].
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Page size used by `list_workflows` when the caller passes none.
    pub default_page_size: u32,
    /// Upper bound on any requested page size.
    pub max_page_size: u32,
    /// Default `limit` for `get_logs`.
    pub default_log_limit: u32,
    /// Upper bound on any requested log page.
    pub max_log_limit: u32,
    /// Window used by `get_stats` when the caller passes none.
    pub default_stats_period_days: u32,
    /// Age threshold used by `cleanup_old_data` when the caller passes none.
    pub default_retention_days: u32,
    /// `max_retries` stamped on new steps.  Recorded only; nothing retries.
    pub default_max_retries: u32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            default_page_size: 20,
            max_page_size: 100,
            default_log_limit: 100,
            max_log_limit: 1000,
            default_stats_period_days: 30,
            default_retention_days: 30,
            default_max_retries: 3,
        }
    }
}
