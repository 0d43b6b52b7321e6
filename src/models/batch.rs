//! Batch slicing over a larger ordered task selection.
//!
//! Pure helpers consumed by whoever picks the tasks for a run; the
//! orchestrator itself only ever sees the resulting task list.

use crate::error::{AutomationError, AutomationResult};

use super::AppTask;

pub const DEFAULT_BATCH_SIZE: usize = 20;
pub const MIN_BATCH_SIZE: usize = 1;
pub const MAX_BATCH_SIZE: usize = 50;

/// `ceil(selection_len / batch_size)`.
pub fn total_batches(selection_len: usize, batch_size: usize) -> AutomationResult<usize> {
    if batch_size == 0 {
        return Err(AutomationError::InvalidBatchSize);
    }
    Ok(selection_len.div_ceil(batch_size))
}

/// Index of the batch after `current`, wrapping back to the first batch once
/// the selection has been covered.
pub fn next_batch_index(current: usize, total: usize) -> usize {
    let next = current.saturating_add(1);
    if next >= total {
        0
    } else {
        next
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskBatch {
    pub batch_index: usize,
    pub batch_size: usize,
    pub total_batches: usize,
    tasks: Vec<AppTask>,
}

impl TaskBatch {
    /// Cuts batch `batch_index` out of `selection`. An index past the last
    /// batch yields an empty batch, which must not be started.
    pub fn slice(
        selection: &[AppTask],
        batch_index: usize,
        batch_size: usize,
    ) -> AutomationResult<Self> {
        let total = total_batches(selection.len(), batch_size)?;

        let tasks = if batch_index >= total {
            Vec::new()
        } else {
            let start = batch_index * batch_size;
            let end = (start + batch_size).min(selection.len());
            selection[start..end].to_vec()
        };

        Ok(Self {
            batch_index,
            batch_size,
            total_batches: total,
            tasks,
        })
    }

    pub fn tasks(&self) -> &[AppTask] {
        &self.tasks
    }

    pub fn into_tasks(self) -> Vec<AppTask> {
        self.tasks
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }
}
