use serde::{Deserialize, Serialize};
use std::collections::{HashSet, VecDeque};
use std::fmt;

use crate::error::ProtocolViolation;

/// Logical address of a worker. Workers are numbered from 1; the
/// coordinator itself has no id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WorkerId(pub u32);

impl fmt::Display for WorkerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Tracks which workers are idle and which hold a task.
///
/// Idle workers are handed out in the order they became idle, so finished
/// workers are reused round-robin.
#[derive(Debug)]
pub struct WorkerPool {
    size: u32,
    idle: VecDeque<WorkerId>,
    busy: HashSet<WorkerId>,
}

impl WorkerPool {
    /// A pool of workers `1..=size`, all idle.
    pub fn new(size: usize) -> Self {
        let size = size as u32;
        Self {
            size,
            idle: (1..=size).map(WorkerId).collect(),
            busy: HashSet::new(),
        }
    }

    pub fn size(&self) -> usize {
        self.size as usize
    }

    /// Every worker id in ascending order.
    pub fn ids(&self) -> impl Iterator<Item = WorkerId> + use<> {
        (1..=self.size).map(WorkerId)
    }

    pub fn contains(&self, worker: WorkerId) -> bool {
        (1..=self.size).contains(&worker.0)
    }

    pub fn acquire(&mut self) -> Option<WorkerId> {
        let worker = self.idle.pop_front()?;
        self.busy.insert(worker);
        Some(worker)
    }

    /// Marks a specific idle worker busy, for fixed positional assignment.
    pub fn claim(&mut self, worker: WorkerId) -> Result<(), ProtocolViolation> {
        if !self.contains(worker) {
            return Err(ProtocolViolation::UnknownWorker { worker });
        }
        let position = self
            .idle
            .iter()
            .position(|&w| w == worker)
            .ok_or(ProtocolViolation::NotIdle { worker })?;
        self.idle.remove(position);
        self.busy.insert(worker);
        Ok(())
    }

    /// Returns a busy worker to the tail of the idle set.
    pub fn release(&mut self, worker: WorkerId) -> Result<(), ProtocolViolation> {
        if !self.contains(worker) {
            return Err(ProtocolViolation::UnknownWorker { worker });
        }
        if !self.busy.remove(&worker) {
            return Err(ProtocolViolation::NotInFlight { worker });
        }
        self.idle.push_back(worker);
        Ok(())
    }

    pub fn is_busy(&self, worker: WorkerId) -> bool {
        self.busy.contains(&worker)
    }

    pub fn idle_count(&self) -> usize {
        self.idle.len()
    }

    /// Number of dispatched tasks whose reply has not been received.
    pub fn in_flight(&self) -> usize {
        self.busy.len()
    }
}
