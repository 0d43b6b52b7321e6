use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::{Duration, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::error::{AutomationError, AutomationResult};
use crate::provider::ScreenInteractionProvider;
use crate::watchdog::{FocusEventSender, FocusGuard};

use super::discovery::Category;
use super::gestures::{fallback_gesture, FallbackKind, Gesture};

// Set to true to enable verbose logging in this module
const ENABLE_LOGS: bool = true;

use crate::{log_debug, log_error, log_info};

pub const DEFAULT_INTERVAL_MS: u64 = 500;

struct ActiveLoop {
    target: String,
    handle: JoinHandle<()>,
    cancel_token: CancellationToken,
}

#[derive(Clone)]
struct TickContext {
    provider: Arc<dyn ScreenInteractionProvider>,
    guard: Arc<FocusGuard>,
    focus_events: Option<FocusEventSender>,
    gesture_count: Arc<AtomicU64>,
}

/// Fires one synthetic interaction per tick at the foreground app, never
/// while the watchdog has interactions suppressed.
pub struct InteractionGenerator {
    ctx: TickContext,
    interval: Duration,
    seed: Option<u64>,
    active: Mutex<Option<ActiveLoop>>,
}

impl InteractionGenerator {
    pub fn new(
        provider: Arc<dyn ScreenInteractionProvider>,
        guard: Arc<FocusGuard>,
        interval_ms: u64,
    ) -> Self {
        Self {
            ctx: TickContext {
                provider,
                guard,
                focus_events: None,
                gesture_count: Arc::new(AtomicU64::new(0)),
            },
            interval: Duration::from_millis(interval_ms.max(1)),
            seed: None,
            active: Mutex::new(None),
        }
    }

    /// Foreground mismatches seen by a tick are forwarded to the watchdog.
    pub fn with_focus_events(mut self, events: FocusEventSender) -> Self {
        self.ctx.focus_events = Some(events);
        self
    }

    /// Deterministic gesture choice, for reproducing a run.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn gesture_count(&self) -> u64 {
        self.ctx.gesture_count.load(Ordering::SeqCst)
    }

    pub async fn is_active(&self) -> bool {
        self.active.lock().await.is_some()
    }

    /// Starts ticking at `target`; a running loop is replaced.
    pub async fn start(&self, target: &str) -> AutomationResult<()> {
        if !self.ctx.provider.is_available() {
            log_error!("screen interaction provider unavailable, no gestures for {target}");
            return Err(AutomationError::ProviderUnavailable);
        }

        let mut active = self.active.lock().await;
        if let Some(previous) = active.take() {
            log_debug!("restarting interactions, was targeting {}", previous.target);
            shutdown_loop(previous).await;
        }

        let rng = match self.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        let cancel_token = CancellationToken::new();
        let handle = tokio::spawn(tick_loop(
            self.ctx.clone(),
            target.to_string(),
            self.interval,
            rng,
            cancel_token.clone(),
        ));

        log_info!(
            "interactions started for {target} (every {}ms)",
            self.interval.as_millis()
        );
        *active = Some(ActiveLoop {
            target: target.to_string(),
            handle,
            cancel_token,
        });
        Ok(())
    }

    /// Stops ticking. Once this returns no further gesture is dispatched.
    pub async fn stop(&self) {
        let Some(active) = self.active.lock().await.take() else {
            return;
        };
        let target = active.target.clone();
        shutdown_loop(active).await;

        let performed = self.ctx.gesture_count.swap(0, Ordering::SeqCst);
        log_info!("interactions stopped for {target} ({performed} gestures)");
    }
}

async fn shutdown_loop(active: ActiveLoop) {
    active.cancel_token.cancel();
    if let Err(err) = active.handle.await {
        log_error!("interaction loop failed to join: {err}");
    }
}

async fn tick_loop(
    ctx: TickContext,
    target: String,
    interval: Duration,
    mut rng: StdRng,
    cancel_token: CancellationToken,
) {
    // The first tick of a tokio interval completes immediately.
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            biased;
            _ = cancel_token.cancelled() => break,
            _ = ticker.tick() => {
                let started = Instant::now();
                tokio::select! {
                    biased;
                    _ = cancel_token.cancelled() => break,
                    _ = tick(&ctx, &target, &mut rng) => {}
                }
                log_debug!("tick took {}ms", started.elapsed().as_millis());
            }
        }
    }
}

async fn tick(ctx: &TickContext, target: &str, rng: &mut StdRng) {
    if !ctx.guard.allows_interaction_for(target) {
        log_debug!("gesture blocked, interactions suppressed");
        return;
    }

    if let Some(foreground) = ctx.provider.query_foreground_package().await {
        if foreground != target {
            log_debug!("gesture blocked, {foreground} is in front of {target}");
            if let Some(events) = &ctx.focus_events {
                events.notify(Some(foreground));
            }
            return;
        }
    }

    let screen = ctx.provider.screen_size().await;
    let category = Category::from_roll(rng.gen_range(0..100));

    let mut chosen: Option<(Gesture, String)> = None;
    if let Some(filter) = category.filter() {
        let elements = ctx.provider.list_interactable_elements(&filter).await;
        if let Some(element) = category.pick(&elements, rng) {
            let (x, y) = element.bounds.center();
            chosen = Some((Gesture::Tap { x, y }, format!("{category:?} '{}'", element.label())));
        }
    }

    let (gesture, description) = match chosen {
        Some(found) => found,
        None => {
            let kind = FallbackKind::from_roll(rng.gen_range(0..10));
            (fallback_gesture(kind, screen, rng), format!("{kind:?}"))
        }
    };

    // Discovery can take a while; the watchdog may have stepped in meanwhile.
    if !ctx.guard.allows_interaction_for(target) {
        log_debug!("gesture dropped, suppressed during discovery");
        return;
    }

    if gesture.dispatch(ctx.provider.as_ref()).await {
        let count = ctx.gesture_count.fetch_add(1, Ordering::SeqCst) + 1;
        log_debug!("gesture #{count}: {description}");
    } else {
        log_debug!("gesture rejected: {description}");
    }
}
