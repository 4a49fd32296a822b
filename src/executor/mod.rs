use async_trait::async_trait;

use crate::error::{Error, Result};
use crate::runtime::task::Task;

pub mod recording;
pub mod tree;

pub use recording::Recording;
pub use tree::{CHILD_ID_BASE, KindProfile, TreeExecutor};

/// The result of running one task.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Execution {
    pub output: u32,
    /// New tasks to schedule. Their ids must be fresh.
    pub children: Vec<Task>,
}

/// Turns a task into its output and any follow-up tasks.
///
/// The scheduler never looks inside a task, so kinds, seeds, dependencies
/// and masks are entirely the executor's business.
#[async_trait]
pub trait Executor: Send + Sync {
    async fn execute(&self, task: &Task) -> anyhow::Result<Execution>;
}

/// Runs `task` and enforces the batch capacity on what it produced.
pub(crate) async fn run_task(
    executor: &dyn Executor,
    task: &Task,
    max_batch: usize,
) -> Result<Execution> {
    let execution = executor
        .execute(task)
        .await
        .map_err(|source| Error::Execute {
            task_id: task.id,
            generation: task.generation,
            source: source.into(),
        })?;
    if execution.children.len() > max_batch {
        return Err(Error::BatchOverflow {
            task_id: task.id,
            produced: execution.children.len(),
            capacity: max_batch,
        });
    }
    Ok(execution)
}
