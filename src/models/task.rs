use serde::{Deserialize, Serialize};

use crate::error::{AutomationError, AutomationResult};

/// Default per-app run length when the selection does not specify one.
pub const DEFAULT_DURATION_MS: u64 = 60 * 1000;
pub const MIN_DURATION_MINUTES: u64 = 1;
pub const MAX_DURATION_MINUTES: u64 = 60;

/// One (application, duration) unit of automated execution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppTask {
    pub package_id: String,
    pub display_name: String,
    pub duration_ms: u64,
}

impl AppTask {
    pub fn new(
        package_id: impl Into<String>,
        display_name: impl Into<String>,
        duration_ms: u64,
    ) -> AutomationResult<Self> {
        let package_id = package_id.into();
        if duration_ms == 0 {
            return Err(AutomationError::InvalidDuration(package_id));
        }

        Ok(Self {
            package_id,
            display_name: display_name.into(),
            duration_ms,
        })
    }

    /// Copy of this task that runs for `duration_ms` instead, used when a
    /// paused task is picked up again.
    pub fn with_duration(&self, duration_ms: u64) -> Self {
        Self {
            duration_ms,
            ..self.clone()
        }
    }
}
