use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::AppTask;

/// Top-level state of the automation engine. Exactly one value is current
/// at any time; every change is published to subscribers in order.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "camelCase")]
pub enum AutomationState {
    #[default]
    Idle,
    #[serde(rename_all = "camelCase")]
    Running {
        current_task: AppTask,
        remaining_ms: u64,
        elapsed_session_ms: u64,
        remaining_queue: Vec<AppTask>,
        completed_count: usize,
        total_count: usize,
    },
    #[serde(rename_all = "camelCase")]
    Paused {
        saved_task: AppTask,
        saved_remaining_ms: u64,
        saved_session_started_at: DateTime<Utc>,
    },
    #[serde(rename_all = "camelCase")]
    Completed { completed_count: usize },
    #[serde(rename_all = "camelCase")]
    Error { message: String },
}

impl AutomationState {
    pub fn is_running(&self) -> bool {
        matches!(self, AutomationState::Running { .. })
    }

    pub fn is_idle(&self) -> bool {
        matches!(self, AutomationState::Idle)
    }

    /// Fraction of the current task already run, in `[0, 1]`. `None` unless running.
    pub fn progress(&self) -> Option<f32> {
        match self {
            AutomationState::Running {
                current_task,
                remaining_ms,
                ..
            } => {
                if current_task.duration_ms == 0 {
                    return Some(1.0);
                }
                let left = *remaining_ms as f32 / current_task.duration_ms as f32;
                Some((1.0 - left).clamp(0.0, 1.0))
            }
            _ => None,
        }
    }
}

/// What `resume()` runs after a pause.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ResumePolicy {
    /// Only the interrupted task, for its remaining time. Tasks queued after
    /// it are dropped.
    #[default]
    CurrentTaskOnly,
    /// The interrupted task followed by everything that had not started yet.
    RemainingQueue,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn running(duration_ms: u64, remaining_ms: u64) -> AutomationState {
        AutomationState::Running {
            current_task: AppTask::new("com.example.app", "Example", duration_ms).unwrap(),
            remaining_ms,
            elapsed_session_ms: 0,
            remaining_queue: Vec::new(),
            completed_count: 0,
            total_count: 1,
        }
    }

    #[test]
    fn test_progress_is_clamped() {
        assert_eq!(running(4_000, 4_000).progress(), Some(0.0));
        assert_eq!(running(4_000, 1_000).progress(), Some(0.75));
        assert_eq!(running(4_000, 9_000).progress(), Some(0.0));
        assert_eq!(running(4_000, 0).progress(), Some(1.0));
        assert_eq!(AutomationState::Idle.progress(), None);
    }

    #[test]
    fn test_state_serializes_with_status_tag() {
        let json = serde_json::to_value(AutomationState::Completed { completed_count: 3 }).unwrap();
        assert_eq!(json["status"], "completed");
        assert_eq!(json["completedCount"], 3);

        let json = serde_json::to_value(running(5_000, 2_000)).unwrap();
        assert_eq!(json["status"], "running");
        assert_eq!(json["remainingMs"], 2_000);
        assert_eq!(json["currentTask"]["packageId"], "com.example.app");

        let json = serde_json::to_value(AutomationState::default()).unwrap();
        assert_eq!(json["status"], "idle");
    }

    #[test]
    fn test_default_resume_policy_is_current_task_only() {
        assert_eq!(ResumePolicy::default(), ResumePolicy::CurrentTaskOnly);
        let policy: ResumePolicy = serde_json::from_str("\"remainingQueue\"").unwrap();
        assert_eq!(policy, ResumePolicy::RemainingQueue);
    }
}
