//! The initial workload file: a record count, then one `<kind> <seed>` pair
//! per record, all whitespace-delimited.

use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{info, warn};

use crate::runtime::task::{Task, TaskKind};

#[derive(Debug, Error)]
pub enum WorkloadError {
    #[error("failed to read workload file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("workload has no record count")]
    MissingCount,

    #[error("invalid record count {0:?}")]
    InvalidCount(String),

    #[error("invalid {field} {token:?} in record {index}")]
    InvalidToken {
        field: &'static str,
        index: usize,
        token: String,
    },
}

/// Parses a workload into root tasks, in file order.
///
/// A file that declares more records than it holds yields the records it
/// does hold.
pub fn parse(text: &str) -> Result<Vec<Task>, WorkloadError> {
    let mut tokens = text.split_whitespace();

    let count_token = tokens.next().ok_or(WorkloadError::MissingCount)?;
    let count: usize = count_token
        .parse()
        .map_err(|_| WorkloadError::InvalidCount(count_token.to_string()))?;

    let mut tasks = Vec::with_capacity(count);
    for index in 0..count {
        let (Some(kind), Some(seed)) = (tokens.next(), tokens.next()) else {
            warn!(declared = count, found = index, "Workload shorter than declared");
            break;
        };
        let kind: i32 = kind.parse().map_err(|_| WorkloadError::InvalidToken {
            field: "type",
            index,
            token: kind.to_string(),
        })?;
        let seed: u32 = seed.parse().map_err(|_| WorkloadError::InvalidToken {
            field: "seed",
            index,
            token: seed.to_string(),
        })?;
        tasks.push(Task::root(TaskKind(kind), seed));
    }

    Ok(tasks)
}

pub fn load(path: &Path) -> Result<Vec<Task>, WorkloadError> {
    let text = fs::read_to_string(path).map_err(|source| WorkloadError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    parse(&text)
}

/// Like [`load`], but a missing or malformed file is an empty workload.
pub fn load_or_empty(path: &Path) -> Vec<Task> {
    match load(path) {
        Ok(tasks) => {
            info!(path = %path.display(), tasks = tasks.len(), "Workload loaded");
            tasks
        }
        Err(e) => {
            warn!(error = %e, "Starting with an empty workload");
            Vec::new()
        }
    }
}
