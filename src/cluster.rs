//! Coordinator plus workers inside one process, one tokio task per worker.

use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::task::JoinSet;
use tracing::{error, info};

use crate::error::{Error, Result};
use crate::executor::Executor;
use crate::runtime::registry::WorkerId;
use crate::runtime::task::Task;
use crate::runtime::worker::{Worker, WorkerStats};
use crate::scheduler::{Coordinator, RunSummary, Strategy};
use crate::transport::memory;

#[derive(Debug, Clone, Serialize)]
pub struct ClusterReport {
    pub summary: RunSummary,
    pub workers: BTreeMap<WorkerId, WorkerStats>,
}

/// Runs workloads on the in-memory transport.
///
/// Unlike the bare protocol, the cluster watches its workers: if one of
/// them fails, the run is aborted with that worker's error instead of
/// waiting for a reply that will never come.
#[derive(Clone)]
pub struct Cluster {
    workers: usize,
    max_batch: usize,
    executor: Arc<dyn Executor>,
}

impl Cluster {
    pub fn new(workers: usize, executor: Arc<dyn Executor>) -> Self {
        Self {
            workers,
            max_batch: 1024,
            executor,
        }
    }

    pub fn max_batch(mut self, max_batch: usize) -> Self {
        self.max_batch = max_batch;
        self
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    pub async fn run(&self, strategy: Strategy, tasks: Vec<Task>) -> Result<ClusterReport> {
        let (coordinator_end, worker_ends) = memory::channel(self.workers);

        let mut handles = JoinSet::new();
        for end in worker_ends {
            let worker = Worker::new(end, self.executor.clone(), self.max_batch);
            let id = worker.id();
            handles.spawn(async move { (id, worker.run().await) });
        }
        info!(workers = self.workers, %strategy, "Cluster started");

        let coordinator = Coordinator::new(coordinator_end, self.executor.clone(), self.max_batch);
        let run = coordinator.run(strategy, tasks);
        tokio::pin!(run);

        let mut workers = BTreeMap::new();
        let summary = loop {
            tokio::select! {
                result = &mut run => break result?,
                Some(joined) = handles.join_next() => {
                    let (id, stats) = settle(joined)?;
                    workers.insert(id, stats);
                }
            }
        };

        while let Some(joined) = handles.join_next().await {
            let (id, stats) = settle(joined)?;
            workers.insert(id, stats);
        }

        Ok(ClusterReport { summary, workers })
    }
}

fn settle(
    joined: std::result::Result<(WorkerId, Result<WorkerStats>), tokio::task::JoinError>,
) -> Result<(WorkerId, WorkerStats)> {
    match joined {
        Ok((id, Ok(stats))) => Ok((id, stats)),
        Ok((worker, Err(e))) => {
            error!(%worker, error = %e, "Worker failed, aborting run");
            Err(Error::Worker {
                worker,
                source: Box::new(e),
            })
        }
        Err(e) => Err(Error::WorkerCrashed(e.to_string())),
    }
}
