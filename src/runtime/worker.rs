use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info};

use crate::error::Result;
use crate::executor::{self, Executor};
use crate::runtime::registry::WorkerId;
use crate::runtime::task::Dispatch;
use crate::transport::{Phase, WorkerTransport};
use crate::wire::{self, ReplyLeg};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct WorkerStats {
    pub executed: u64,
    pub children_sent: u64,
}

/// Receive, execute, reply; until the coordinator says stop.
pub struct Worker<T> {
    transport: T,
    executor: Arc<dyn Executor>,
    max_batch: usize,
}

impl<T: WorkerTransport> Worker<T> {
    pub fn new(transport: T, executor: Arc<dyn Executor>, max_batch: usize) -> Self {
        Self {
            transport,
            executor,
            max_batch,
        }
    }

    pub fn id(&self) -> WorkerId {
        self.transport.worker_id()
    }

    pub async fn run(mut self) -> Result<WorkerStats> {
        let worker = self.transport.worker_id();
        let mut stats = WorkerStats::default();
        debug!(%worker, "Worker waiting for tasks");

        loop {
            let frame = self.transport.recv().await?;
            let mut task = match wire::decode_dispatch(&frame)? {
                Dispatch::Run(task) => task,
                Dispatch::Terminate => {
                    info!(%worker, executed = stats.executed, "Worker terminated");
                    return Ok(stats);
                }
            };

            let execution = executor::run_task(&*self.executor, &task, self.max_batch).await?;
            task.output = execution.output;
            let count = execution.children.len();
            debug!(
                %worker,
                task_id = task.id,
                generation = task.generation,
                output = task.output,
                count,
                "Task executed"
            );

            let frame = wire::encode_reply(&ReplyLeg::Count(count as u32))?;
            self.transport.send(frame, Phase::SendCount).await?;
            if count > 0 {
                let frame = wire::encode_reply(&ReplyLeg::Batch(execution.children))?;
                self.transport.send(frame, Phase::SendBatch).await?;
            }

            stats.executed += 1;
            stats.children_sent += count as u64;
        }
    }
}
