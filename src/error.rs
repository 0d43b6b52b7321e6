use thiserror::Error;

/// Failures that reach the caller of the automation engine.
///
/// Focus escapes are corrected by the watchdog and never show up here; a
/// user-initiated pause or stop is not an error either.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum AutomationError {
    #[error("Failed to launch {package} after {attempts} attempts")]
    LaunchFailure { package: String, attempts: u32 },

    #[error("Foreground query capability not granted")]
    CapabilityMissing,

    #[error("Screen interaction provider is unavailable")]
    ProviderUnavailable,

    #[error("No apps to automate")]
    EmptyTaskList,

    #[error("Batch size must be greater than zero")]
    InvalidBatchSize,

    #[error("Task duration for {0} must be greater than zero")]
    InvalidDuration(String),
}

pub type AutomationResult<T> = Result<T, AutomationError>;
