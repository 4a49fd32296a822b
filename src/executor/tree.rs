use anyhow::{Context as _, anyhow, ensure};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::iter;
use std::time::Duration;

use crate::executor::{Execution, Executor};
use crate::runtime::task::{Task, TaskKind};

/// How tasks of one kind behave under [`TreeExecutor`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct KindProfile {
    /// Children spawned by every task below `max_generation`.
    pub fanout: u32,
    /// Tasks at this generation spawn nothing.
    pub max_generation: u32,
    /// Hash rounds spent computing the output.
    pub rounds: u32,
    /// Simulated latency per task.
    pub delay_ms: u64,
}

impl Default for KindProfile {
    fn default() -> Self {
        Self {
            fanout: 0,
            max_generation: 0,
            rounds: 1,
            delay_ms: 0,
        }
    }
}

/// First id handed to a child. Roots keep their seed as id, so seeds must
/// stay below this whenever any kind spawns children.
pub const CHILD_ID_BASE: u32 = 1 << 31;

/// A synthetic workload: every task expands into a fixed-shape subtree.
///
/// Child ids and seeds are derived from the parent alone, so the set of
/// executed tasks does not depend on who executed what.
///
/// Root `r` owns the id block `CHILD_ID_BASE + r * stride ..`, where
/// `stride` is the largest tree of any kind minus its root. A task at heap
/// position `q` of its tree (root at 0, children of `q` at `q * fanout + 1 ..`)
/// gets the id `CHILD_ID_BASE + r * stride + q - 1`, so ids never repeat
/// within a run. Workers must share the same profiles.
#[derive(Debug, Clone, Default)]
pub struct TreeExecutor {
    profiles: HashMap<TaskKind, KindProfile>,
    fallback: KindProfile,
}

impl TreeExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_profile(mut self, kind: TaskKind, profile: KindProfile) -> Self {
        self.profiles.insert(kind, profile);
        self
    }

    /// Profile used for kinds without their own entry.
    pub fn with_fallback(mut self, profile: KindProfile) -> Self {
        self.fallback = profile;
        self
    }

    pub fn profile(&self, kind: TaskKind) -> KindProfile {
        self.profiles.get(&kind).copied().unwrap_or(self.fallback)
    }

    /// Number of tasks one root of `kind` expands into, itself included.
    pub fn tree_size(&self, kind: TaskKind) -> u64 {
        subtree_size(&self.profile(kind))
    }

    /// Ids reserved for the descendants of each root.
    fn stride(&self) -> u64 {
        self.profiles
            .values()
            .chain(iter::once(&self.fallback))
            .map(subtree_size)
            .max()
            .unwrap_or(1)
            - 1
    }
}

fn subtree_size(profile: &KindProfile) -> u64 {
    let mut level = 1u64;
    let mut total = 1u64;
    for _ in 0..profile.max_generation {
        level = level.saturating_mul(profile.fanout as u64);
        total = total.saturating_add(level);
    }
    total
}

// murmur3 finalizer
fn mix(mut h: u32) -> u32 {
    h ^= h >> 16;
    h = h.wrapping_mul(0x85eb_ca6b);
    h ^= h >> 13;
    h = h.wrapping_mul(0xc2b2_ae35);
    h ^= h >> 16;
    h
}

/// The root a task descends from and its heap position in that tree.
fn tree_position(task: &Task, stride: u64) -> anyhow::Result<(u64, u64)> {
    if task.generation == 0 {
        return Ok((u64::from(task.id), 0));
    }
    let offset = task
        .id
        .checked_sub(CHILD_ID_BASE)
        .ok_or_else(|| anyhow!("task {} is not a tree child", task.id))?;
    let offset = u64::from(offset);
    Ok((offset / stride, offset % stride + 1))
}

/// Id of the child at heap `position` (at least 1) under `root`.
fn child_id(root: u64, position: u64, stride: u64) -> anyhow::Result<u32> {
    root.checked_mul(stride)
        .and_then(|block| block.checked_add(position - 1))
        .and_then(|offset| offset.checked_add(u64::from(CHILD_ID_BASE)))
        .and_then(|id| u32::try_from(id).ok())
        .ok_or_else(|| anyhow!("task id space exhausted under root {root}"))
}

#[async_trait]
impl Executor for TreeExecutor {
    async fn execute(&self, task: &Task) -> anyhow::Result<Execution> {
        let profile = self.profile(task.kind);
        let stride = self.stride();
        if task.generation == 0 && stride > 0 {
            ensure!(
                task.id < CHILD_ID_BASE,
                "root id {} falls in the child id range",
                task.id
            );
        }

        let mut output = task.seed;
        for _ in 0..profile.rounds {
            output = mix(output ^ task.generation);
        }

        if profile.delay_ms > 0 {
            tokio::time::sleep(Duration::from_millis(profile.delay_ms)).await;
        }

        let mut children = Vec::new();
        if task.generation < profile.max_generation && profile.fanout > 0 {
            let (root, position) = tree_position(task, stride)?;
            children.reserve(profile.fanout as usize);
            for index in 0..profile.fanout {
                let seed = mix(output.wrapping_add(index));
                let id = position
                    .checked_mul(u64::from(profile.fanout))
                    .and_then(|first| first.checked_add(u64::from(index) + 1))
                    .ok_or_else(|| anyhow!("task id space exhausted under root {root}"))
                    .and_then(|position| child_id(root, position, stride))?;
                let mut child = Task::child(task, id, task.kind, seed);
                child
                    .dependencies
                    .push(task.id, 1u32.rotate_left(index))
                    .with_context(|| format!("dependency list of child {index}"))?;
                children.push(child);
            }
        }

        Ok(Execution { output, children })
    }
}
