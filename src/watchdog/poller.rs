use std::sync::Arc;

use anyhow::{bail, Context, Result};
use log::info;
use tokio::task::JoinHandle;
use tokio::time::{Duration, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::provider::ScreenInteractionProvider;

use super::FocusEventSender;

pub const DEFAULT_POLL_INTERVAL_MS: u64 = 250;

/// Turns foreground polling into focus-change events for providers that
/// cannot push window changes themselves.
pub struct ForegroundPoller {
    handle: Option<JoinHandle<()>>,
    cancel_token: Option<CancellationToken>,
    interval: Duration,
}

impl ForegroundPoller {
    pub fn new(interval_ms: u64) -> Self {
        Self {
            handle: None,
            cancel_token: None,
            interval: Duration::from_millis(interval_ms.max(1)),
        }
    }

    pub fn start(
        &mut self,
        provider: Arc<dyn ScreenInteractionProvider>,
        events: FocusEventSender,
    ) -> Result<()> {
        if self.handle.is_some() {
            bail!("foreground poller already active");
        }

        let cancel_token = CancellationToken::new();
        let handle = tokio::spawn(poll_loop(
            provider,
            events,
            self.interval,
            cancel_token.clone(),
        ));

        self.handle = Some(handle);
        self.cancel_token = Some(cancel_token);
        Ok(())
    }

    pub async fn stop(&mut self) -> Result<()> {
        if let Some(token) = self.cancel_token.take() {
            token.cancel();
        }

        if let Some(handle) = self.handle.take() {
            handle
                .await
                .context("foreground poller task failed to join")
        } else {
            Ok(())
        }
    }
}

async fn poll_loop(
    provider: Arc<dyn ScreenInteractionProvider>,
    events: FocusEventSender,
    interval: Duration,
    cancel_token: CancellationToken,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut last_seen: Option<String> = None;

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let current = provider.query_foreground_package().await;
                if current.is_some() && current != last_seen {
                    events.notify(current.clone());
                    last_seen = current;
                }
            }
            _ = cancel_token.cancelled() => {
                info!("foreground poller shutting down");
                break;
            }
        }
    }
}
