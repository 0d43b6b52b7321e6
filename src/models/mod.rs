pub mod batch;
pub mod log_entry;
pub mod task;

pub use batch::{next_batch_index, total_batches, TaskBatch};
pub use log_entry::AutomationLogEntry;
pub use task::AppTask;
