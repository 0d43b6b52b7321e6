use anyhow::Result;
use async_trait::async_trait;

use crate::models::AutomationLogEntry;

/// Append-only destination for per-task outcomes.
#[async_trait]
pub trait LogSink: Send + Sync {
    async fn record(&self, entry: AutomationLogEntry) -> Result<()>;
}
