use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard};

use tokio::time::Instant;

/// Prefix of the platform's own overlay surfaces (status bar, shade, recents).
/// Focus moving there is transient and never corrected.
pub const SYSTEM_OVERLAY_PREFIX: &str = "com.android.systemui";

/// Browsers and other external-navigation surfaces that must be left at once.
pub const DEFAULT_DISALLOWED_PACKAGES: &[&str] = &[
    "com.android.chrome",
    "com.chrome.beta",
    "com.chrome.dev",
    "org.mozilla.firefox",
    "com.opera.browser",
    "com.opera.mini.native",
    "com.brave.browser",
    "com.microsoft.emmx",
    "com.UCMobile.intl",
    "com.kiwibrowser.browser",
    "com.duckduckgo.mobile.android",
    "org.chromium.chrome",
    "com.sec.android.app.sbrowser",
    "mark.via.gp",
    "com.amazon.cloud9",
    "com.android.browser",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FocusClass {
    Disallowed,
    Target,
    SystemOverlay,
    Other,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DisallowedSurfaces(HashSet<String>);

impl DisallowedSurfaces {
    pub fn new<I, S>(packages: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self(packages.into_iter().map(Into::into).collect())
    }

    pub fn contains(&self, package: &str) -> bool {
        self.0.contains(package)
    }
}

impl Default for DisallowedSurfaces {
    fn default() -> Self {
        Self::new(DEFAULT_DISALLOWED_PACKAGES.iter().copied())
    }
}

/// Disallowed wins over everything, including a target that happens to be
/// on the list.
pub fn classify(package: &str, target: Option<&str>, disallowed: &DisallowedSurfaces) -> FocusClass {
    if disallowed.contains(package) {
        FocusClass::Disallowed
    } else if target == Some(package) {
        FocusClass::Target
    } else if package.starts_with(SYSTEM_OVERLAY_PREFIX) {
        FocusClass::SystemOverlay
    } else {
        FocusClass::Other
    }
}

/// Point-in-time copy of the watchdog's view of focus.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct WatchdogFocusState {
    pub target_package: Option<String>,
    pub last_observed_package: Option<String>,
    pub interactions_suppressed: bool,
    pub last_corrective_action: Option<Instant>,
}

#[derive(Debug, Default)]
struct FocusFields {
    target_package: Option<String>,
    last_observed_package: Option<String>,
    last_corrective_action: Option<Instant>,
}

/// State shared between the orchestrator (writes the target), the watchdog
/// (writes suppression) and the interaction generator (reads both).
#[derive(Debug, Default)]
pub struct FocusGuard {
    suppressed: AtomicBool,
    fields: Mutex<FocusFields>,
}

impl FocusGuard {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, FocusFields> {
        match self.fields.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    pub fn is_suppressed(&self) -> bool {
        self.suppressed.load(Ordering::SeqCst)
    }

    pub fn set_suppressed(&self, suppressed: bool) {
        self.suppressed.store(suppressed, Ordering::SeqCst);
    }

    pub fn target(&self) -> Option<String> {
        self.lock().target_package.clone()
    }

    /// Whether the generator may fire right now for `package`.
    pub fn allows_interaction_for(&self, package: &str) -> bool {
        !self.is_suppressed() && self.lock().target_package.as_deref() == Some(package)
    }

    /// Clears everything and designates `target` (or nothing).
    pub fn reset(&self, target: Option<String>) {
        let mut fields = self.lock();
        *fields = FocusFields {
            target_package: target,
            ..FocusFields::default()
        };
        self.set_suppressed(false);
    }

    /// Records `package` as the latest foreground and returns the current target.
    pub(crate) fn observe(&self, package: &str) -> Option<String> {
        let mut fields = self.lock();
        fields.last_observed_package = Some(package.to_string());
        fields.target_package.clone()
    }

    /// Claims the corrective-action slot if more than `debounce` has passed
    /// since the last claim.
    pub(crate) fn try_claim_corrective(&self, now: Instant, debounce: std::time::Duration) -> bool {
        let mut fields = self.lock();
        let due = fields
            .last_corrective_action
            .map(|last| now.duration_since(last) > debounce)
            .unwrap_or(true);
        if due {
            fields.last_corrective_action = Some(now);
        }
        due
    }

    pub fn snapshot(&self) -> WatchdogFocusState {
        let fields = self.lock();
        WatchdogFocusState {
            target_package: fields.target_package.clone(),
            last_observed_package: fields.last_observed_package.clone(),
            interactions_suppressed: self.is_suppressed(),
            last_corrective_action: fields.last_corrective_action,
        }
    }
}
