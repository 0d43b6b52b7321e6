pub mod controller;
pub mod focus;
pub mod poller;

pub use controller::{FocusEvent, FocusEventSender, FocusWatchdog};
pub use focus::{DisallowedSurfaces, FocusClass, FocusGuard, WatchdogFocusState};
pub use poller::ForegroundPoller;
