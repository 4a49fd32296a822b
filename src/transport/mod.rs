//! Addressed, ordered point-to-point links between the coordinator and its
//! workers. Transports move opaque frames; [`Mailbox`] gives them protocol
//! meaning on the coordinator side.

use async_trait::async_trait;
use std::fmt;
use thiserror::Error;

use crate::runtime::registry::WorkerId;

mod mailbox;
pub mod memory;
pub mod redis;

pub use mailbox::Mailbox;

/// Which step of the protocol a link operation belonged to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Connect,
    Dispatch,
    AwaitCount,
    AwaitBatch,
    Terminate,
    ReceiveTask,
    SendCount,
    SendBatch,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Phase::Connect => "connect",
            Phase::Dispatch => "dispatch",
            Phase::AwaitCount => "await-count",
            Phase::AwaitBatch => "await-batch",
            Phase::Terminate => "terminate",
            Phase::ReceiveTask => "receive-task",
            Phase::SendCount => "send-count",
            Phase::SendBatch => "send-batch",
        };
        f.write_str(name)
    }
}

/// The side of a link that failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endpoint {
    Worker(WorkerId),
    Replies,
    Broker,
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Endpoint::Worker(id) => write!(f, "link of worker {id}"),
            Endpoint::Replies => f.write_str("reply channel"),
            Endpoint::Broker => f.write_str("broker connection"),
        }
    }
}

#[derive(Debug, Error)]
pub enum LinkError {
    #[error("{endpoint} closed during {phase}")]
    Closed { endpoint: Endpoint, phase: Phase },

    #[error("no link to worker {worker} during {phase}")]
    UnknownWorker { worker: WorkerId, phase: Phase },

    #[error("redis failure on {endpoint} during {phase}: {source}")]
    Redis {
        endpoint: Endpoint,
        phase: Phase,
        #[source]
        source: ::redis::RedisError,
    },

    #[error("malformed envelope during {phase}: {reason}")]
    Envelope { phase: Phase, reason: String },
}

/// A reply frame together with the worker it came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Envelope {
    pub from: WorkerId,
    pub payload: Vec<u8>,
}

/// The coordinator's end: one outbound link per worker, one inbound link
/// shared by all of them.
#[async_trait]
pub trait CoordinatorTransport: Send {
    /// Workers are addressed `1..=worker_count()`.
    fn worker_count(&self) -> usize;

    async fn send(
        &mut self,
        to: WorkerId,
        payload: Vec<u8>,
        phase: Phase,
    ) -> Result<(), LinkError>;

    /// Waits for the next frame from any worker.
    async fn recv(&mut self, phase: Phase) -> Result<Envelope, LinkError>;

    /// Returns immediately when nothing has arrived yet.
    async fn try_recv(&mut self, phase: Phase) -> Result<Option<Envelope>, LinkError>;
}

/// A worker's end of its link to the coordinator.
#[async_trait]
pub trait WorkerTransport: Send {
    fn worker_id(&self) -> WorkerId;

    async fn recv(&mut self) -> Result<Vec<u8>, LinkError>;

    async fn send(&mut self, payload: Vec<u8>, phase: Phase) -> Result<(), LinkError>;
}
