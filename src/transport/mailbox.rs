use std::collections::VecDeque;

use crate::error::{ProtocolViolation, Result};
use crate::runtime::registry::WorkerId;
use crate::runtime::task::{Dispatch, Task};
use crate::transport::{CoordinatorTransport, Envelope, Phase};
use crate::wire::{self, ReplyLeg};

/// Typed, selective receive on top of a [`CoordinatorTransport`].
///
/// Waiting on one worker may pull frames from others off the shared inbound
/// link. Those are stashed in arrival order and served before anything new,
/// so frames from one worker stay in send order.
pub struct Mailbox<T> {
    transport: T,
    stash: VecDeque<Envelope>,
}

impl<T: CoordinatorTransport> Mailbox<T> {
    pub fn new(transport: T) -> Self {
        Self {
            transport,
            stash: VecDeque::new(),
        }
    }

    pub async fn dispatch(&mut self, to: WorkerId, dispatch: &Dispatch) -> Result<()> {
        let phase = match dispatch {
            Dispatch::Run(_) => Phase::Dispatch,
            Dispatch::Terminate => Phase::Terminate,
        };
        let frame = wire::encode_dispatch(dispatch)?;
        self.transport.send(to, frame, phase).await?;
        Ok(())
    }

    /// Next child count from whichever worker replies first.
    pub async fn recv_count(&mut self) -> Result<(WorkerId, u32)> {
        let envelope = match self.stash.pop_front() {
            Some(envelope) => envelope,
            None => self.transport.recv(Phase::AwaitCount).await?,
        };
        expect_count(envelope)
    }

    pub async fn try_recv_count(&mut self) -> Result<Option<(WorkerId, u32)>> {
        let envelope = match self.stash.pop_front() {
            Some(envelope) => envelope,
            None => match self.transport.try_recv(Phase::AwaitCount).await? {
                Some(envelope) => envelope,
                None => return Ok(None),
            },
        };
        expect_count(envelope).map(Some)
    }

    /// Next child count from one specific worker.
    pub async fn recv_count_from(&mut self, from: WorkerId) -> Result<u32> {
        let envelope = self.recv_from(from, Phase::AwaitCount).await?;
        expect_count(envelope).map(|(_, count)| count)
    }

    /// The batch leg that follows a non-zero count from `from`.
    pub async fn recv_batch(&mut self, from: WorkerId) -> Result<Vec<Task>> {
        let envelope = self.recv_from(from, Phase::AwaitBatch).await?;
        match wire::decode_reply(&envelope.payload)? {
            ReplyLeg::Batch(tasks) => Ok(tasks),
            ReplyLeg::Count(_) => Err(ProtocolViolation::UnexpectedCount { worker: from }.into()),
        }
    }

    async fn recv_from(&mut self, from: WorkerId, phase: Phase) -> Result<Envelope> {
        if let Some(position) = self.stash.iter().position(|e| e.from == from) {
            if let Some(envelope) = self.stash.remove(position) {
                return Ok(envelope);
            }
        }
        loop {
            let envelope = self.transport.recv(phase).await?;
            if envelope.from == from {
                return Ok(envelope);
            }
            self.stash.push_back(envelope);
        }
    }
}

fn expect_count(envelope: Envelope) -> Result<(WorkerId, u32)> {
    match wire::decode_reply(&envelope.payload)? {
        ReplyLeg::Count(count) => Ok((envelope.from, count)),
        ReplyLeg::Batch(_) => Err(ProtocolViolation::UnexpectedBatch {
            worker: envelope.from,
        }
        .into()),
    }
}
