use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::AppTask;

/// Outcome of one task attempt. Written once, never updated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AutomationLogEntry {
    pub id: Option<i64>,
    pub run_id: String,
    pub timestamp: DateTime<Utc>,
    pub package_id: String,
    pub display_name: String,
    pub duration_ms: u64,
    pub succeeded: bool,
    pub error_message: Option<String>,
}

impl AutomationLogEntry {
    pub fn success(run_id: &str, task: &AppTask) -> Self {
        Self {
            id: None,
            run_id: run_id.to_string(),
            timestamp: Utc::now(),
            package_id: task.package_id.clone(),
            display_name: task.display_name.clone(),
            duration_ms: task.duration_ms,
            succeeded: true,
            error_message: None,
        }
    }

    /// A failed attempt records zero run time.
    pub fn failure(run_id: &str, task: &AppTask, message: impl Into<String>) -> Self {
        Self {
            id: None,
            run_id: run_id.to_string(),
            timestamp: Utc::now(),
            package_id: task.package_id.clone(),
            display_name: task.display_name.clone(),
            duration_ms: 0,
            succeeded: false,
            error_message: Some(message.into()),
        }
    }
}
