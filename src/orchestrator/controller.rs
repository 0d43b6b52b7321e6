use std::collections::VecDeque;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use log::{error, info, warn};
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tokio::time::{sleep_until, Duration, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::error::{AutomationError, AutomationResult};
use crate::interaction::InteractionGenerator;
use crate::models::{AppTask, AutomationLogEntry};
use crate::provider::ScreenInteractionProvider;
use crate::watchdog::FocusWatchdog;

use super::launcher::{launch_with_retry, wait, LaunchOutcome};
use super::sink::LogSink;
use super::state::{AutomationState, ResumePolicy};

/// Countdown publishing granularity.
const COUNTDOWN_TICK_MS: u64 = 1000;
/// Pause between one task's end and the next task's launch.
const INTER_TASK_GAP_MS: u64 = 1000;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    Completed(usize),
    Failed,
    Cancelled,
}

/// Everything a run needs to pick up where it left off.
#[derive(Debug, Clone)]
struct RunPlan {
    queue: VecDeque<AppTask>,
    completed_count: usize,
    total_count: usize,
    session_started_at: DateTime<Utc>,
    elapsed_before_ms: u64,
}

impl RunPlan {
    fn fresh(tasks: Vec<AppTask>) -> Self {
        Self {
            total_count: tasks.len(),
            queue: tasks.into(),
            completed_count: 0,
            session_started_at: Utc::now(),
            elapsed_before_ms: 0,
        }
    }

    fn first_state(&self) -> Option<AutomationState> {
        let current_task = self.queue.front()?.clone();
        Some(AutomationState::Running {
            remaining_ms: current_task.duration_ms,
            current_task,
            elapsed_session_ms: self.elapsed_before_ms,
            remaining_queue: self.queue.iter().skip(1).cloned().collect(),
            completed_count: self.completed_count,
            total_count: self.total_count,
        })
    }
}

/// The part of a pause that is not published in `AutomationState::Paused`.
#[derive(Debug, Clone)]
struct PauseSnapshot {
    task: AppTask,
    remaining_ms: u64,
    remaining_queue: Vec<AppTask>,
    completed_count: usize,
    total_count: usize,
    session_started_at: DateTime<Utc>,
    elapsed_session_ms: u64,
}

struct ActiveRun {
    run_id: String,
    handle: JoinHandle<RunOutcome>,
    cancel_token: CancellationToken,
}

#[derive(Default)]
struct Control {
    run: Option<ActiveRun>,
    paused: Option<PauseSnapshot>,
    session_started_at: Option<DateTime<Utc>>,
}

#[derive(Clone)]
struct RunContext {
    provider: Arc<dyn ScreenInteractionProvider>,
    watchdog: Arc<FocusWatchdog>,
    generator: Arc<InteractionGenerator>,
    sink: Arc<dyn LogSink>,
    state_tx: Arc<watch::Sender<AutomationState>>,
}

impl RunContext {
    fn publish(&self, state: AutomationState) {
        self.state_tx.send_replace(state);
    }

    async fn record(&self, entry: AutomationLogEntry) {
        let package = entry.package_id.clone();
        if let Err(err) = self.sink.record(entry).await {
            error!("failed to record automation log for {package}: {err:#}");
        }
    }

    async fn stop_interactions(&self) {
        self.generator.stop().await;
        self.watchdog.release();
    }
}

/// Runs a list of tasks one at a time: launch, keep in front, interact,
/// count down, log, next.
pub struct AutomationManager {
    ctx: RunContext,
    resume_policy: ResumePolicy,
    control: Mutex<Control>,
}

impl AutomationManager {
    pub fn new(
        provider: Arc<dyn ScreenInteractionProvider>,
        watchdog: Arc<FocusWatchdog>,
        generator: Arc<InteractionGenerator>,
        sink: Arc<dyn LogSink>,
    ) -> Self {
        let (state_tx, _) = watch::channel(AutomationState::Idle);
        Self {
            ctx: RunContext {
                provider,
                watchdog,
                generator,
                sink,
                state_tx: Arc::new(state_tx),
            },
            resume_policy: ResumePolicy::default(),
            control: Mutex::new(Control::default()),
        }
    }

    pub fn with_resume_policy(mut self, policy: ResumePolicy) -> Self {
        self.resume_policy = policy;
        self
    }

    pub fn state(&self) -> AutomationState {
        self.ctx.state_tx.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<AutomationState> {
        self.ctx.state_tx.subscribe()
    }

    pub fn is_running(&self) -> bool {
        self.ctx.state_tx.borrow().is_running()
    }

    /// Starts a new run over `tasks`, replacing any run or pause in progress.
    pub async fn start(&self, tasks: Vec<AppTask>) -> AutomationResult<()> {
        if tasks.is_empty() {
            warn!("start rejected: no apps to automate");
            return Err(AutomationError::EmptyTaskList);
        }

        let mut control = self.control.lock().await;
        control.paused = None;
        self.launch_run(&mut control, RunPlan::fresh(tasks)).await
    }

    /// Pauses the current task. Does nothing unless running.
    pub async fn pause(&self) {
        let mut control = self.control.lock().await;
        if !self.is_running() {
            return;
        }

        if let Some(run) = control.run.take() {
            cancel_run(run).await;
        }
        self.ctx.generator.stop().await;
        self.ctx.watchdog.release();

        // The loop may have finished on its own while we waited for the lock.
        let AutomationState::Running {
            mut current_task,
            mut remaining_ms,
            elapsed_session_ms,
            mut remaining_queue,
            mut completed_count,
            total_count,
        } = self.state()
        else {
            return;
        };

        // A countdown that already ran out counts as done; hold the next task instead.
        if remaining_ms == 0 {
            completed_count += 1;
            if remaining_queue.is_empty() {
                self.ctx.publish(AutomationState::Completed { completed_count });
                return;
            }
            current_task = remaining_queue.remove(0);
            remaining_ms = current_task.duration_ms;
        }

        let snapshot = PauseSnapshot {
            task: current_task,
            remaining_ms,
            remaining_queue,
            completed_count,
            total_count,
            session_started_at: control.session_started_at.unwrap_or_else(Utc::now),
            elapsed_session_ms,
        };
        info!(
            "paused {} with {}ms remaining",
            snapshot.task.package_id, snapshot.remaining_ms
        );

        self.ctx.publish(AutomationState::Paused {
            saved_task: snapshot.task.clone(),
            saved_remaining_ms: snapshot.remaining_ms,
            saved_session_started_at: snapshot.session_started_at,
        });
        control.paused = Some(snapshot);
    }

    /// Picks a paused run back up. Does nothing unless paused.
    pub async fn resume(&self) -> AutomationResult<()> {
        let mut control = self.control.lock().await;
        let Some(snapshot) = control.paused.take() else {
            return Ok(());
        };

        let resumed = snapshot.task.with_duration(snapshot.remaining_ms.max(1));
        let plan = match self.resume_policy {
            ResumePolicy::CurrentTaskOnly => {
                if !snapshot.remaining_queue.is_empty() {
                    warn!(
                        "resuming {} only, {} queued task(s) dropped",
                        resumed.package_id,
                        snapshot.remaining_queue.len()
                    );
                }
                RunPlan {
                    queue: VecDeque::from([resumed]),
                    completed_count: snapshot.completed_count,
                    total_count: snapshot.completed_count + 1,
                    session_started_at: snapshot.session_started_at,
                    elapsed_before_ms: snapshot.elapsed_session_ms,
                }
            }
            ResumePolicy::RemainingQueue => {
                let mut queue = VecDeque::from([resumed]);
                queue.extend(snapshot.remaining_queue);
                RunPlan {
                    queue,
                    completed_count: snapshot.completed_count,
                    total_count: snapshot.total_count,
                    session_started_at: snapshot.session_started_at,
                    elapsed_before_ms: snapshot.elapsed_session_ms,
                }
            }
        };

        info!("resuming with {} task(s)", plan.queue.len());
        self.launch_run(&mut control, plan).await
    }

    /// Stops everything and returns to `Idle`.
    pub async fn stop(&self) {
        let mut control = self.control.lock().await;
        if let Some(run) = control.run.take() {
            info!("stopping run {}", run.run_id);
            cancel_run(run).await;
        }
        control.paused = None;
        control.session_started_at = None;
        self.ctx.stop_interactions().await;

        if !self.state().is_idle() {
            self.ctx.publish(AutomationState::Idle);
        }
    }

    async fn launch_run(&self, control: &mut Control, plan: RunPlan) -> AutomationResult<()> {
        if let Some(run) = control.run.take() {
            cancel_run(run).await;
            self.ctx.stop_interactions().await;
        }

        if !self.ctx.provider.is_available() {
            let err = AutomationError::ProviderUnavailable;
            self.ctx.publish(AutomationState::Error {
                message: err.to_string(),
            });
            return Err(err);
        }

        if !self.ctx.provider.has_foreground_query_capability().await {
            let err = AutomationError::CapabilityMissing;
            error!("cannot start automation: {err}");
            self.ctx.publish(AutomationState::Error {
                message: err.to_string(),
            });
            return Err(err);
        }

        let Some(first) = plan.first_state() else {
            return Err(AutomationError::EmptyTaskList);
        };

        let run_id = Uuid::new_v4().to_string();
        let cancel_token = CancellationToken::new();
        info!("starting run {run_id} with {} task(s)", plan.queue.len());
        // Callers see Running as soon as start returns.
        self.ctx.publish(first);

        let session_started_at = plan.session_started_at;
        let handle = tokio::spawn(run_loop(
            self.ctx.clone(),
            run_id.clone(),
            plan,
            cancel_token.clone(),
        ));

        control.run = Some(ActiveRun {
            run_id,
            handle,
            cancel_token,
        });
        control.session_started_at = Some(session_started_at);
        Ok(())
    }
}

async fn cancel_run(run: ActiveRun) {
    run.cancel_token.cancel();
    match run.handle.await {
        Ok(outcome) => info!("run {} ended: {outcome:?}", run.run_id),
        Err(err) => error!("run {} failed to join: {err}", run.run_id),
    }
}

async fn run_loop(
    ctx: RunContext,
    run_id: String,
    plan: RunPlan,
    cancel: CancellationToken,
) -> RunOutcome {
    let RunPlan {
        mut queue,
        mut completed_count,
        total_count,
        elapsed_before_ms,
        ..
    } = plan;
    let run_started = Instant::now();
    let elapsed_ms = move || elapsed_before_ms + run_started.elapsed().as_millis() as u64;

    while let Some(task) = queue.pop_front() {
        let remaining_queue: Vec<AppTask> = queue.iter().cloned().collect();
        let running = |remaining_ms: u64| AutomationState::Running {
            current_task: task.clone(),
            remaining_ms,
            elapsed_session_ms: elapsed_ms(),
            remaining_queue: remaining_queue.clone(),
            completed_count,
            total_count,
        };
        ctx.publish(running(task.duration_ms));

        match launch_with_retry(ctx.provider.as_ref(), &task.package_id, &cancel).await {
            LaunchOutcome::Launched { attempts } => {
                info!("{} in foreground after {attempts} attempt(s)", task.package_id);
            }
            LaunchOutcome::Cancelled => return RunOutcome::Cancelled,
            LaunchOutcome::Failed(err) => {
                error!("{err}");
                ctx.record(AutomationLogEntry::failure(&run_id, &task, err.to_string()))
                    .await;
                ctx.publish(AutomationState::Error {
                    message: err.to_string(),
                });
                return RunOutcome::Failed;
            }
        }

        ctx.watchdog.observe(&task.package_id);
        if let Err(err) = ctx.generator.start(&task.package_id).await {
            warn!("running {} without interactions: {err}", task.package_id);
        }

        let deadline = Instant::now() + Duration::from_millis(task.duration_ms);
        let mut ticker = tokio::time::interval(Duration::from_millis(COUNTDOWN_TICK_MS));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => return RunOutcome::Cancelled,
                _ = sleep_until(deadline) => break,
                _ = ticker.tick() => {
                    let remaining = deadline.saturating_duration_since(Instant::now());
                    ctx.publish(running(remaining.as_millis() as u64));
                }
            }
        }

        ctx.stop_interactions().await;
        ctx.record(AutomationLogEntry::success(&run_id, &task)).await;
        completed_count += 1;
        info!("{} finished ({completed_count}/{total_count})", task.package_id);

        // The next task is current through the inter-task gap.
        if let Some(next) = queue.front() {
            ctx.publish(AutomationState::Running {
                current_task: next.clone(),
                remaining_ms: next.duration_ms,
                elapsed_session_ms: elapsed_ms(),
                remaining_queue: queue.iter().skip(1).cloned().collect(),
                completed_count,
                total_count,
            });
        }

        if !queue.is_empty() && !wait(&cancel, INTER_TASK_GAP_MS).await {
            return RunOutcome::Cancelled;
        }
    }

    ctx.publish(AutomationState::Completed { completed_count });
    RunOutcome::Completed(completed_count)
}
