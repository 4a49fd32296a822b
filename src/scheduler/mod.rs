//! The coordinator and its dispatch strategies.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

mod blocking;
mod coordinator;
mod overlapped;
mod round_robin;
mod sequential;

pub use coordinator::Coordinator;

/// How the coordinator hands out work.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "kebab-case")]
pub enum Strategy {
    /// Dispatch to idle workers and block for one reply at a time.
    #[default]
    Blocking,
    /// Like `Blocking`, but the coordinator runs queued tasks itself while
    /// no reply has arrived.
    Overlapped,
    /// Fixed rounds: one task for the coordinator, one per worker by position.
    RoundRobin,
    /// Everything on the coordinator. Used automatically when there are
    /// no workers.
    Sequential,
}

impl Strategy {
    pub const ALL: [Strategy; 4] = [
        Strategy::Blocking,
        Strategy::Overlapped,
        Strategy::RoundRobin,
        Strategy::Sequential,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Strategy::Blocking => "blocking",
            Strategy::Overlapped => "overlapped",
            Strategy::RoundRobin => "round-robin",
            Strategy::Sequential => "sequential",
        }
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Counters for one finished run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    pub run_id: Uuid,
    /// The strategy that actually ran; may differ from the requested one.
    pub strategy: Strategy,
    pub workers: usize,
    pub roots: u64,
    /// Tasks sent to workers. Each one was replied to before the run ended.
    pub dispatched: u64,
    pub executed_locally: u64,
    pub replies: u64,
    /// Children produced by workers and by the coordinator.
    pub children: u64,
    pub terminations: u64,
    pub elapsed_ms: u64,
}

impl RunSummary {
    fn new(strategy: Strategy, workers: usize) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            strategy,
            workers,
            roots: 0,
            dispatched: 0,
            executed_locally: 0,
            replies: 0,
            children: 0,
            terminations: 0,
            elapsed_ms: 0,
        }
    }

    /// Every task executed anywhere during the run.
    pub fn executed(&self) -> u64 {
        self.dispatched + self.executed_locally
    }
}
