use async_trait::async_trait;
use dashmap::DashMap;
use std::collections::HashMap;

use crate::executor::{Execution, Executor};
use crate::runtime::task::{Task, TaskId};

/// Counts how often each `(id, generation)` pair was executed.
///
/// Shared between the coordinator and in-process workers, so the map is
/// concurrent.
#[derive(Debug, Default)]
pub struct Recording<E> {
    inner: E,
    executions: DashMap<(TaskId, u32), usize>,
}

impl<E> Recording<E> {
    pub fn new(inner: E) -> Self {
        Self {
            inner,
            executions: DashMap::new(),
        }
    }

    pub fn total(&self) -> usize {
        self.executions.iter().map(|entry| *entry.value()).sum()
    }

    pub fn count(&self, id: TaskId, generation: u32) -> usize {
        self.executions
            .get(&(id, generation))
            .map(|entry| *entry.value())
            .unwrap_or(0)
    }

    /// Pairs executed more than once, with their counts.
    pub fn duplicates(&self) -> Vec<((TaskId, u32), usize)> {
        let mut duplicates: Vec<_> = self
            .executions
            .iter()
            .filter(|entry| *entry.value() > 1)
            .map(|entry| (*entry.key(), *entry.value()))
            .collect();
        duplicates.sort_unstable();
        duplicates
    }

    pub fn snapshot(&self) -> HashMap<(TaskId, u32), usize> {
        self.executions
            .iter()
            .map(|entry| (*entry.key(), *entry.value()))
            .collect()
    }

    pub fn clear(&self) {
        self.executions.clear();
    }
}

#[async_trait]
impl<E: Executor> Executor for Recording<E> {
    async fn execute(&self, task: &Task) -> anyhow::Result<Execution> {
        let execution = self.inner.execute(task).await?;
        *self.executions.entry((task.id, task.generation)).or_insert(0) += 1;
        Ok(execution)
    }
}
