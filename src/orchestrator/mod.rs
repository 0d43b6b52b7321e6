pub mod controller;
pub mod launcher;
pub mod sink;
pub mod state;

pub use controller::{AutomationManager, RunOutcome};
pub use launcher::{launch_with_retry, LaunchOutcome, MAX_LAUNCH_RETRIES};
pub use sink::LogSink;
pub use state::{AutomationState, ResumePolicy};
