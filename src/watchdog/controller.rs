use std::sync::{Arc, Mutex, MutexGuard};

use log::info;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{sleep, Duration, Instant};
use tokio_util::sync::CancellationToken;

use crate::provider::ScreenInteractionProvider;

use super::focus::{classify, DisallowedSurfaces, FocusClass, FocusGuard, WatchdogFocusState};

// Set to true to enable verbose logging in this module
const ENABLE_LOGS: bool = true;

use crate::{log_debug, log_error, log_info, log_warn};

/// Wait after backing out of a disallowed surface before relaunching.
pub const DISALLOWED_SETTLE_MS: u64 = 200;
/// Wait after the relaunch before interactions may resume.
pub const RELAUNCH_SETTLE_MS: u64 = 500;
/// Minimum spacing between corrective actions for ordinary app switches.
pub const CORRECTIVE_DEBOUNCE_MS: u64 = 1000;
/// Wait after the back press before deciding whether to relaunch.
pub const ESCAPE_SETTLE_MS: u64 = 800;

/// A foreground-window change reported by the platform.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FocusEvent {
    pub package: Option<String>,
}

/// Cloneable handle the platform (or a poller) uses to push focus events.
#[derive(Debug, Clone)]
pub struct FocusEventSender {
    tx: mpsc::UnboundedSender<FocusEvent>,
}

impl FocusEventSender {
    pub fn notify(&self, package: Option<String>) {
        if self.tx.send(FocusEvent { package }).is_err() {
            log_debug!("focus event dropped, watchdog is shut down");
        }
    }
}

struct Corrections {
    /// Parent of every spawned corrective task for the current target.
    session: CancellationToken,
    /// The pending back-then-relaunch for an ordinary app switch, if any.
    relaunch: Option<CancellationToken>,
}

struct WatchdogInner {
    provider: Arc<dyn ScreenInteractionProvider>,
    guard: Arc<FocusGuard>,
    disallowed: DisallowedSurfaces,
    corrections: Mutex<Corrections>,
}

impl WatchdogInner {
    fn corrections(&self) -> MutexGuard<'_, Corrections> {
        match self.corrections.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

/// Keeps the target app in the foreground.
///
/// Events are drained from a single channel by one task, so each event is
/// handled completely before the next one is looked at. Corrective actions
/// run as child tasks of the current observation session and die with it.
pub struct FocusWatchdog {
    inner: Arc<WatchdogInner>,
    events_tx: mpsc::UnboundedSender<FocusEvent>,
    handle: Mutex<Option<JoinHandle<()>>>,
    shutdown: CancellationToken,
}

impl FocusWatchdog {
    /// Creates the watchdog and spawns its event loop. Must be called from
    /// within a tokio runtime.
    pub fn spawn(
        provider: Arc<dyn ScreenInteractionProvider>,
        guard: Arc<FocusGuard>,
        disallowed: DisallowedSurfaces,
    ) -> Self {
        let inner = Arc::new(WatchdogInner {
            provider,
            guard,
            disallowed,
            corrections: Mutex::new(Corrections {
                session: CancellationToken::new(),
                relaunch: None,
            }),
        });

        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let shutdown = CancellationToken::new();
        let handle = tokio::spawn(event_loop(inner.clone(), events_rx, shutdown.clone()));

        Self {
            inner,
            events_tx,
            handle: Mutex::new(Some(handle)),
            shutdown,
        }
    }

    pub fn sender(&self) -> FocusEventSender {
        FocusEventSender {
            tx: self.events_tx.clone(),
        }
    }

    pub fn focus_state(&self) -> WatchdogFocusState {
        self.inner.guard.snapshot()
    }

    /// Starts guarding `target`, discarding any state from a previous task.
    pub fn observe(&self, target: &str) {
        self.cancel_corrections();
        self.inner.guard.reset(Some(target.to_string()));
        log_info!("watchdog observing {target}");
    }

    /// Stops guarding. Pending corrective timers are cancelled and never fire.
    pub fn release(&self) {
        self.cancel_corrections();
        self.inner.guard.reset(None);
        log_debug!("watchdog released");
    }

    fn cancel_corrections(&self) {
        let mut corrections = self.inner.corrections();
        corrections.session.cancel();
        corrections.session = CancellationToken::new();
        corrections.relaunch = None;
    }

    /// Handles one foreground change synchronously; corrective actions are
    /// spawned, but suppression is already in effect when this returns.
    pub fn handle_event(&self, package: Option<&str>) {
        handle_event(&self.inner, package);
    }

    pub async fn shutdown(&self) {
        self.release();
        self.shutdown.cancel();
        let handle = match self.handle.lock() {
            Ok(mut guard) => guard.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        };
        if let Some(handle) = handle {
            if let Err(err) = handle.await {
                log_error!("watchdog event loop failed to join: {err}");
            }
        }
    }
}

async fn event_loop(
    inner: Arc<WatchdogInner>,
    mut events_rx: mpsc::UnboundedReceiver<FocusEvent>,
    shutdown: CancellationToken,
) {
    loop {
        tokio::select! {
            event = events_rx.recv() => match event {
                Some(event) => handle_event(&inner, event.package.as_deref()),
                None => break,
            },
            _ = shutdown.cancelled() => break,
        }
    }
    info!("watchdog event loop shutting down");
}

fn handle_event(inner: &Arc<WatchdogInner>, package: Option<&str>) {
    let Some(package) = package.filter(|p| !p.is_empty()) else {
        return;
    };

    let target = inner.guard.observe(package);
    let class = classify(package, target.as_deref(), &inner.disallowed);
    log_debug!("window changed: {package} (target: {target:?}) -> {class:?}");

    match class {
        FocusClass::Disallowed => {
            // Suppress before anything is spawned so no further tick can fire.
            inner.guard.set_suppressed(true);
            log_warn!("disallowed surface {package} in foreground, backing out");

            let token = inner.corrections().session.child_token();
            tokio::spawn(escape_disallowed(inner.clone(), token));
        }
        FocusClass::Target => {
            if inner.guard.is_suppressed() {
                log_info!("back in target app {package}, resuming interactions");
            }
            inner.guard.set_suppressed(false);
            if let Some(relaunch) = inner.corrections().relaunch.take() {
                relaunch.cancel();
            }
        }
        FocusClass::SystemOverlay => {}
        FocusClass::Other => {
            if target.is_none() {
                return;
            }
            if !inner.guard.is_suppressed() {
                log_warn!("focus escaped to {package}");
            }
            inner.guard.set_suppressed(true);

            let debounce = Duration::from_millis(CORRECTIVE_DEBOUNCE_MS);
            if !inner.guard.try_claim_corrective(Instant::now(), debounce) {
                log_debug!("corrective action debounced for {package}");
                return;
            }

            let token = {
                let mut corrections = inner.corrections();
                if let Some(previous) = corrections.relaunch.take() {
                    previous.cancel();
                }
                let token = corrections.session.child_token();
                corrections.relaunch = Some(token.clone());
                token
            };
            tokio::spawn(correct_escape(inner.clone(), token));
        }
    }
}

/// Sleeps unless cancelled first; `false` means the caller must stop.
async fn settle(token: &CancellationToken, ms: u64) -> bool {
    tokio::select! {
        _ = sleep(Duration::from_millis(ms)) => true,
        _ = token.cancelled() => false,
    }
}

async fn escape_disallowed(inner: Arc<WatchdogInner>, token: CancellationToken) {
    if token.is_cancelled() {
        return;
    }
    inner.provider.dispatch_back().await;

    if !settle(&token, DISALLOWED_SETTLE_MS).await {
        return;
    }

    let Some(target) = inner.guard.target() else {
        return;
    };
    log_warn!("relaunching {target} after disallowed surface");
    if !inner.provider.launch(&target).await {
        log_error!("relaunch of {target} was rejected");
    }

    if !settle(&token, RELAUNCH_SETTLE_MS).await {
        return;
    }
    inner.guard.set_suppressed(false);
    log_info!("interactions resumed after relaunching {target}");
}

async fn correct_escape(inner: Arc<WatchdogInner>, token: CancellationToken) {
    if token.is_cancelled() {
        return;
    }
    inner.provider.dispatch_back().await;

    if !settle(&token, ESCAPE_SETTLE_MS).await {
        return;
    }

    let focus = inner.guard.snapshot();
    let Some(target) = focus.target_package else {
        return;
    };
    if focus.last_observed_package.as_deref() != Some(target.as_str()) {
        log_warn!("still away from {target}, relaunching");
        if !inner.provider.launch(&target).await {
            log_error!("relaunch of {target} was rejected");
        }
    }
}
