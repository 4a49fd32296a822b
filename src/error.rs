use thiserror::Error;

use crate::runtime::registry::WorkerId;
use crate::runtime::task::TaskId;
use crate::transport::LinkError;
use crate::wire::WireError;

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Errors that abort a run. None of them is retried.
#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Wire(#[from] WireError),

    #[error(transparent)]
    Link(#[from] LinkError),

    #[error("protocol violation: {0}")]
    Protocol(#[from] ProtocolViolation),

    #[error("task {task_id} (generation {generation}) failed: {source}")]
    Execute {
        task_id: TaskId,
        generation: u32,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("task {task_id} produced {produced} children, batch capacity is {capacity}")]
    BatchOverflow {
        task_id: TaskId,
        produced: usize,
        capacity: usize,
    },

    #[error("worker {worker} failed: {source}")]
    Worker {
        worker: WorkerId,
        #[source]
        source: Box<Error>,
    },

    #[error("worker task crashed: {0}")]
    WorkerCrashed(String),
}

/// A peer broke the dispatch/reply contract.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtocolViolation {
    #[error("worker {worker} announced {count} children, batch capacity is {capacity}")]
    CountExceedsCapacity {
        worker: WorkerId,
        count: u32,
        capacity: usize,
    },

    #[error("worker {worker} sent {received} records after announcing {announced}")]
    BatchMismatch {
        worker: WorkerId,
        announced: u32,
        received: usize,
    },

    #[error("expected a child count from worker {worker}, got a batch")]
    UnexpectedBatch { worker: WorkerId },

    #[error("expected a batch from worker {worker}, got a child count")]
    UnexpectedCount { worker: WorkerId },

    #[error("worker {worker} replied without a task in flight")]
    NotInFlight { worker: WorkerId },

    #[error("worker {worker} is not idle")]
    NotIdle { worker: WorkerId },

    #[error("worker {worker} is not part of the pool")]
    UnknownWorker { worker: WorkerId },
}
