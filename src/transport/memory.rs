use async_trait::async_trait;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender, error::TryRecvError};

use crate::runtime::registry::WorkerId;
use crate::transport::{
    CoordinatorTransport, Endpoint, Envelope, LinkError, Phase, WorkerTransport,
};

/// Coordinator end of an in-process link set.
pub struct MemoryCoordinator {
    outbound: Vec<UnboundedSender<Vec<u8>>>,
    replies: UnboundedReceiver<Envelope>,
}

/// Worker end of an in-process link.
pub struct MemoryWorker {
    id: WorkerId,
    inbound: UnboundedReceiver<Vec<u8>>,
    replies: UnboundedSender<Envelope>,
}

/// Builds links for `workers` workers, numbered from 1.
pub fn channel(workers: usize) -> (MemoryCoordinator, Vec<MemoryWorker>) {
    let (reply_tx, reply_rx) = mpsc::unbounded_channel();
    let mut outbound = Vec::with_capacity(workers);
    let mut ends = Vec::with_capacity(workers);

    for index in 0..workers {
        let (tx, rx) = mpsc::unbounded_channel();
        outbound.push(tx);
        ends.push(MemoryWorker {
            id: WorkerId(index as u32 + 1),
            inbound: rx,
            replies: reply_tx.clone(),
        });
    }

    let coordinator = MemoryCoordinator {
        outbound,
        replies: reply_rx,
    };
    (coordinator, ends)
}

#[async_trait]
impl CoordinatorTransport for MemoryCoordinator {
    fn worker_count(&self) -> usize {
        self.outbound.len()
    }

    async fn send(
        &mut self,
        to: WorkerId,
        payload: Vec<u8>,
        phase: Phase,
    ) -> Result<(), LinkError> {
        let link = (to.0 as usize)
            .checked_sub(1)
            .and_then(|index| self.outbound.get(index))
            .ok_or(LinkError::UnknownWorker { worker: to, phase })?;
        link.send(payload).map_err(|_| LinkError::Closed {
            endpoint: Endpoint::Worker(to),
            phase,
        })
    }

    async fn recv(&mut self, phase: Phase) -> Result<Envelope, LinkError> {
        self.replies.recv().await.ok_or(LinkError::Closed {
            endpoint: Endpoint::Replies,
            phase,
        })
    }

    async fn try_recv(&mut self, phase: Phase) -> Result<Option<Envelope>, LinkError> {
        match self.replies.try_recv() {
            Ok(envelope) => Ok(Some(envelope)),
            Err(TryRecvError::Empty) => Ok(None),
            Err(TryRecvError::Disconnected) => Err(LinkError::Closed {
                endpoint: Endpoint::Replies,
                phase,
            }),
        }
    }
}

#[async_trait]
impl WorkerTransport for MemoryWorker {
    fn worker_id(&self) -> WorkerId {
        self.id
    }

    async fn recv(&mut self) -> Result<Vec<u8>, LinkError> {
        self.inbound.recv().await.ok_or(LinkError::Closed {
            endpoint: Endpoint::Worker(self.id),
            phase: Phase::ReceiveTask,
        })
    }

    async fn send(&mut self, payload: Vec<u8>, phase: Phase) -> Result<(), LinkError> {
        self.replies
            .send(Envelope {
                from: self.id,
                payload,
            })
            .map_err(|_| LinkError::Closed {
                endpoint: Endpoint::Replies,
                phase,
            })
    }
}
