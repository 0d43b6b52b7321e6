pub mod cli;
pub mod db;
pub mod error;
pub mod interaction;
pub mod models;
pub mod orchestrator;
pub mod provider;
pub mod settings;
pub mod utils;
pub mod watchdog;

#[cfg(test)]
pub(crate) mod testing;

use clap::Parser;

pub use error::{AutomationError, AutomationResult};
pub use models::{total_batches, AppTask, AutomationLogEntry, TaskBatch};
pub use orchestrator::{AutomationManager, AutomationState, LogSink, ResumePolicy};
pub use provider::ScreenInteractionProvider;

pub fn run() -> anyhow::Result<()> {
    utils::init_logging();

    let cli = cli::Cli::parse();
    log::info!("appdriver starting up...");

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;
    runtime.block_on(cli::execute(cli))
}
