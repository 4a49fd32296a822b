use std::sync::Arc;
use std::time::Instant;
use tracing::{Instrument, debug, info, info_span, warn};

use crate::error::{ProtocolViolation, Result};
use crate::executor::{self, Executor};
use crate::runtime::queue::WorkQueue;
use crate::runtime::registry::{WorkerId, WorkerPool};
use crate::runtime::task::{Dispatch, Task};
use crate::scheduler::{RunSummary, Strategy};
use crate::transport::{CoordinatorTransport, Mailbox};

/// Owns the work queue and the worker pool for one run.
///
/// Everything here happens on one logical thread: message handling and
/// local execution interleave but never overlap.
pub struct Coordinator<T> {
    pub(super) mailbox: Mailbox<T>,
    pub(super) pool: WorkerPool,
    pub(super) queue: WorkQueue,
    pub(super) executor: Arc<dyn Executor>,
    pub(super) max_batch: usize,
    pub(super) summary: RunSummary,
}

impl<T: CoordinatorTransport> Coordinator<T> {
    pub fn new(transport: T, executor: Arc<dyn Executor>, max_batch: usize) -> Self {
        let workers = transport.worker_count();
        Self {
            mailbox: Mailbox::new(transport),
            pool: WorkerPool::new(workers),
            queue: WorkQueue::new(),
            executor,
            max_batch,
            summary: RunSummary::new(Strategy::default(), workers),
        }
    }

    /// Runs `tasks` and everything they spawn to completion, then sends one
    /// termination to every worker.
    pub async fn run(
        mut self,
        strategy: Strategy,
        tasks: impl IntoIterator<Item = Task>,
    ) -> Result<RunSummary> {
        let workers = self.pool.size();
        let strategy = if workers == 0 && strategy != Strategy::Sequential {
            warn!(requested = %strategy, "No workers available, running sequentially");
            Strategy::Sequential
        } else {
            strategy
        };
        self.summary.strategy = strategy;

        self.queue.extend(tasks);
        self.summary.roots = self.queue.len() as u64;

        let span = info_span!("run", run_id = %self.summary.run_id, %strategy, workers);
        async move {
            let started = Instant::now();
            info!(roots = self.summary.roots, "Run started");

            match strategy {
                Strategy::Blocking => self.run_blocking().await?,
                Strategy::Overlapped => self.run_overlapped().await?,
                Strategy::RoundRobin => self.run_round_robin().await?,
                Strategy::Sequential => self.run_sequential().await?,
            }
            self.terminate().await?;

            self.summary.elapsed_ms = started.elapsed().as_millis() as u64;
            info!(
                executed = self.summary.executed(),
                dispatched = self.summary.dispatched,
                executed_locally = self.summary.executed_locally,
                elapsed_ms = self.summary.elapsed_ms,
                "Run finished"
            );
            Ok(self.summary)
        }
        .instrument(span)
        .await
    }

    pub(super) fn is_done(&self) -> bool {
        self.queue.is_empty() && self.pool.in_flight() == 0
    }

    /// Pairs queued tasks with idle workers until one side runs out.
    pub(super) async fn dispatch_ready(&mut self) -> Result<()> {
        while !self.queue.is_empty() {
            let Some(worker) = self.pool.acquire() else {
                break;
            };
            match self.queue.pop() {
                Some(task) => self.send_task(worker, task).await?,
                None => {
                    self.pool.release(worker)?;
                    break;
                }
            }
        }
        Ok(())
    }

    pub(super) async fn send_task(&mut self, worker: WorkerId, task: Task) -> Result<()> {
        debug!(%worker, task_id = task.id, generation = task.generation, "Dispatching task");
        self.mailbox.dispatch(worker, &Dispatch::Run(task)).await?;
        self.summary.dispatched += 1;
        Ok(())
    }

    /// Handles a count from `worker`, pulling the batch that follows it.
    pub(super) async fn complete(&mut self, worker: WorkerId, count: u32) -> Result<()> {
        self.pool.release(worker)?;
        self.summary.replies += 1;

        if count as usize > self.max_batch {
            return Err(ProtocolViolation::CountExceedsCapacity {
                worker,
                count,
                capacity: self.max_batch,
            }
            .into());
        }
        if count == 0 {
            debug!(%worker, "Reply without children");
            return Ok(());
        }

        let batch = self.mailbox.recv_batch(worker).await?;
        if batch.len() != count as usize {
            return Err(ProtocolViolation::BatchMismatch {
                worker,
                announced: count,
                received: batch.len(),
            }
            .into());
        }
        debug!(%worker, count, "Reply with children");
        self.summary.children += batch.len() as u64;
        self.queue.extend(batch);
        Ok(())
    }

    /// Executes a task on the coordinator without touching the pool.
    pub(super) async fn execute_locally(&mut self, task: Task) -> Result<()> {
        let execution = executor::run_task(&*self.executor, &task, self.max_batch).await?;
        debug!(
            task_id = task.id,
            generation = task.generation,
            output = execution.output,
            count = execution.children.len(),
            "Task executed locally"
        );
        self.summary.executed_locally += 1;
        self.summary.children += execution.children.len() as u64;
        self.queue.extend(execution.children);
        Ok(())
    }

    async fn terminate(&mut self) -> Result<()> {
        for worker in self.pool.ids() {
            self.mailbox.dispatch(worker, &Dispatch::Terminate).await?;
            self.summary.terminations += 1;
        }
        debug!(workers = self.summary.terminations, "Terminations sent");
        Ok(())
    }
}
