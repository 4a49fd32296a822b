use serde::Serialize;
use std::time::{Duration, Instant};
use tracing::{info, warn};

use crate::cluster::Cluster;
use crate::error::Result;
use crate::runtime::task::Task;
use crate::scheduler::Strategy;

#[derive(Debug, Clone, Serialize)]
pub struct StrategyTiming {
    pub strategy: Strategy,
    pub executed: u64,
    pub best_ms: f64,
    pub mean_ms: f64,
}

/// Times every strategy on the same workload.
pub struct BenchmarkRunner {
    cluster: Cluster,
    repeats: usize,
}

impl BenchmarkRunner {
    pub fn new(cluster: Cluster, repeats: usize) -> Self {
        Self {
            cluster,
            repeats: repeats.max(1),
        }
    }

    async fn run_once(&self, strategy: Strategy, tasks: &[Task]) -> Result<(Duration, u64)> {
        let start = Instant::now();
        let report = self.cluster.run(strategy, tasks.to_vec()).await?;
        Ok((start.elapsed(), report.summary.executed()))
    }

    pub async fn compare(&self, tasks: &[Task]) -> Result<Vec<StrategyTiming>> {
        info!(
            workers = self.cluster.workers(),
            roots = tasks.len(),
            repeats = self.repeats,
            "Starting benchmark"
        );

        let mut timings = Vec::with_capacity(Strategy::ALL.len());
        for strategy in Strategy::ALL {
            let mut samples = Vec::with_capacity(self.repeats);
            let mut executed = 0;
            for _ in 0..self.repeats {
                let (elapsed, count) = self.run_once(strategy, tasks).await?;
                samples.push(elapsed);
                executed = count;
            }

            let best = samples.iter().min().copied().unwrap_or_default();
            let total: Duration = samples.iter().sum();
            let timing = StrategyTiming {
                strategy,
                executed,
                best_ms: best.as_secs_f64() * 1000.0,
                mean_ms: total.as_secs_f64() * 1000.0 / samples.len() as f64,
            };
            info!(
                %strategy,
                executed,
                best_ms = timing.best_ms,
                mean_ms = timing.mean_ms,
                "Strategy timed"
            );
            timings.push(timing);
        }

        if let Some(first) = timings.first() {
            if timings.iter().any(|t| t.executed != first.executed) {
                warn!("Strategies executed different numbers of tasks");
            }
        }

        Ok(timings)
    }
}
