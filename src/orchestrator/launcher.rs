use tokio::time::{sleep, Duration};
use tokio_util::sync::CancellationToken;

use crate::error::AutomationError;
use crate::provider::ScreenInteractionProvider;

// Set to true to enable verbose logging in this module
const ENABLE_LOGS: bool = true;

use crate::{log_info, log_warn};

pub const MAX_LAUNCH_RETRIES: u32 = 3;
/// Time a freshly launched app gets to reach the foreground.
pub const LAUNCH_GRACE_MS: u64 = 3000;
/// Backoff before retry `n` is `n * LAUNCH_BACKOFF_MS`.
pub const LAUNCH_BACKOFF_MS: u64 = 1000;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LaunchOutcome {
    Launched { attempts: u32 },
    Cancelled,
    Failed(AutomationError),
}

/// Sleeps `ms` unless cancelled first. Returns false on cancellation.
pub(super) async fn wait(cancel: &CancellationToken, ms: u64) -> bool {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => false,
        _ = sleep(Duration::from_millis(ms)) => true,
    }
}

/// Launches `package` and waits for it to show up in the foreground, retrying
/// with a linear backoff. Every wait gives way to `cancel`.
pub async fn launch_with_retry(
    provider: &dyn ScreenInteractionProvider,
    package: &str,
    cancel: &CancellationToken,
) -> LaunchOutcome {
    for attempt in 1..=MAX_LAUNCH_RETRIES {
        if cancel.is_cancelled() {
            return LaunchOutcome::Cancelled;
        }

        log_info!("launching {package} (attempt {attempt}/{MAX_LAUNCH_RETRIES})");
        if !provider.launch(package).await {
            log_warn!("launch request for {package} was rejected");
        }

        if !wait(cancel, LAUNCH_GRACE_MS).await {
            return LaunchOutcome::Cancelled;
        }

        let foreground = provider.query_foreground_package().await;
        if foreground.as_deref() == Some(package) {
            return LaunchOutcome::Launched { attempts: attempt };
        }
        log_warn!("{package} not in foreground after attempt {attempt} (saw {foreground:?})");

        if attempt < MAX_LAUNCH_RETRIES && !wait(cancel, LAUNCH_BACKOFF_MS * attempt as u64).await {
            return LaunchOutcome::Cancelled;
        }
    }

    LaunchOutcome::Failed(AutomationError::LaunchFailure {
        package: package.to_string(),
        attempts: MAX_LAUNCH_RETRIES,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{MockProvider, ProviderCall};
    use tokio::time::Instant;

    const TARGET: &str = "com.example.target";

    #[tokio::test(start_paused = true)]
    async fn test_launch_succeeds_first_attempt() {
        let provider = MockProvider::new();
        let started = Instant::now();

        let outcome = launch_with_retry(&provider, TARGET, &CancellationToken::new()).await;

        assert_eq!(outcome, LaunchOutcome::Launched { attempts: 1 });
        assert_eq!(started.elapsed(), Duration::from_millis(LAUNCH_GRACE_MS));
    }

    #[tokio::test(start_paused = true)]
    async fn test_stuck_app_gets_three_attempts_with_linear_backoff() {
        let provider = MockProvider::new().stuck(TARGET);
        let started = Instant::now();

        let outcome = launch_with_retry(&provider, TARGET, &CancellationToken::new()).await;

        assert_eq!(
            outcome,
            LaunchOutcome::Failed(AutomationError::LaunchFailure {
                package: TARGET.into(),
                attempts: 3
            })
        );

        let offsets: Vec<u128> = provider
            .timed_calls()
            .into_iter()
            .filter(|(_, call)| matches!(call, ProviderCall::Launch(_)))
            .map(|(at, _)| at.duration_since(started).as_millis())
            .collect();
        // grace 3000, then backoffs of 1000 and 2000 between attempts
        assert_eq!(offsets, vec![0, 4_000, 9_000]);
        // no backoff after the last attempt
        assert_eq!(started.elapsed(), Duration::from_millis(12_000));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_during_backoff_stops_retries() {
        let provider = std::sync::Arc::new(MockProvider::new().stuck(TARGET));
        let cancel = CancellationToken::new();

        let task = {
            let provider = provider.clone();
            let cancel = cancel.clone();
            tokio::spawn(async move { launch_with_retry(provider.as_ref(), TARGET, &cancel).await })
        };

        sleep(Duration::from_millis(3_500)).await;
        cancel.cancel();
        assert_eq!(task.await.unwrap(), LaunchOutcome::Cancelled);

        sleep(Duration::from_millis(10_000)).await;
        assert_eq!(provider.launches().len(), 1);
    }
}
