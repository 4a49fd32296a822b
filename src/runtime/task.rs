use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

pub type TaskId = u32;

/// Number of dependency slots carried by every task record.
pub const MAX_DEPENDENCIES: usize = 4;

/// Tag selecting the execution routine. Opaque to the scheduler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskKind(pub i32);

impl fmt::Display for TaskKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("dependency list is full ({MAX_DEPENDENCIES} entries)")]
pub struct CapacityError;

/// Up to four `(task id, mask)` pairs, paired by position.
///
/// Slots past `len` are kept as received so that a record decoded from the
/// wire encodes back to the same bytes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Dependencies {
    ids: [TaskId; MAX_DEPENDENCIES],
    masks: [u32; MAX_DEPENDENCIES],
    len: usize,
}

impl Dependencies {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuilds a list from its raw slots, as found in a task record.
    pub fn from_slots(
        ids: [TaskId; MAX_DEPENDENCIES],
        masks: [u32; MAX_DEPENDENCIES],
        len: usize,
    ) -> Result<Self, CapacityError> {
        if len > MAX_DEPENDENCIES {
            return Err(CapacityError);
        }
        Ok(Self { ids, masks, len })
    }

    pub fn push(&mut self, id: TaskId, mask: u32) -> Result<(), CapacityError> {
        if self.len == MAX_DEPENDENCIES {
            return Err(CapacityError);
        }
        self.ids[self.len] = id;
        self.masks[self.len] = mask;
        self.len += 1;
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn ids(&self) -> &[TaskId] {
        &self.ids[..self.len]
    }

    pub fn masks(&self) -> &[u32] {
        &self.masks[..self.len]
    }

    pub fn iter(&self) -> impl Iterator<Item = (TaskId, u32)> + '_ {
        self.ids().iter().copied().zip(self.masks().iter().copied())
    }

    /// All slots including the unused tail.
    pub fn slots(&self) -> (&[TaskId; MAX_DEPENDENCIES], &[u32; MAX_DEPENDENCIES]) {
        (&self.ids, &self.masks)
    }
}

/// The unit of work exchanged between the coordinator and workers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Task {
    pub id: TaskId,
    pub generation: u32,
    pub kind: TaskKind,
    pub seed: u32,
    /// Only meaningful once the task has been executed.
    pub output: u32,
    pub dependencies: Dependencies,
}

impl Task {
    /// A workload task: its id is its seed.
    pub fn root(kind: TaskKind, seed: u32) -> Self {
        Self {
            id: seed,
            generation: 0,
            kind,
            seed,
            output: 0,
            dependencies: Dependencies::new(),
        }
    }

    /// A task spawned by executing `parent`, one generation deeper.
    pub fn child(parent: &Task, id: TaskId, kind: TaskKind, seed: u32) -> Self {
        Self {
            id,
            generation: parent.generation + 1,
            kind,
            seed,
            output: 0,
            dependencies: Dependencies::new(),
        }
    }
}

/// What the coordinator sends to a worker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Dispatch {
    Run(Task),
    /// No more work; the worker exits without replying.
    Terminate,
}
