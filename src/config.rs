use anyhow::{Context as AnyhowContext, Result, ensure};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use crate::executor::{KindProfile, TreeExecutor};
use crate::runtime::task::TaskKind;
use crate::scheduler::Strategy;

pub const DEFAULT_REDIS_URL: &str = "redis://127.0.0.1:6379/0";
pub const DEFAULT_REDIS_PREFIX: &str = "taskfarm";

/// Settings for a run. Every field has a default, so a config file only
/// lists what it changes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    pub strategy: Strategy,
    /// Worker processes besides the coordinator.
    pub workers: usize,
    /// Most children a single task may produce.
    pub max_batch: usize,
    pub input: Option<PathBuf>,
    pub transport: TransportConfig,
    /// Fallback for kinds missing from `kinds`.
    pub default_kind: KindProfile,
    pub kinds: BTreeMap<i32, KindProfile>,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            strategy: Strategy::default(),
            workers: 3,
            max_batch: 1024,
            input: None,
            transport: TransportConfig::default(),
            default_kind: KindProfile::default(),
            kinds: BTreeMap::new(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum TransportConfig {
    #[default]
    Memory,
    Redis {
        #[serde(default = "default_redis_url")]
        url: String,
        #[serde(default = "default_redis_prefix")]
        prefix: String,
    },
}

fn default_redis_url() -> String {
    DEFAULT_REDIS_URL.to_string()
}

fn default_redis_prefix() -> String {
    DEFAULT_REDIS_PREFIX.to_string()
}

impl RunConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let yaml = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        Self::from_yaml(&yaml)
            .with_context(|| format!("Failed to load config from {}", path.display()))
    }

    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: RunConfig =
            serde_yaml::from_str(yaml).context("Failed to deserialize YAML config")?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        ensure!(self.max_batch > 0, "max_batch must be at least 1");
        for (kind, profile) in &self.kinds {
            ensure!(
                profile.fanout as usize <= self.max_batch || profile.max_generation == 0,
                "kind {kind} fans out to {} children but max_batch is {}",
                profile.fanout,
                self.max_batch
            );
        }
        Ok(())
    }

    /// Redis url and key prefix, from the config or the defaults.
    pub fn redis(&self) -> (String, String) {
        match &self.transport {
            TransportConfig::Redis { url, prefix } => (url.clone(), prefix.clone()),
            TransportConfig::Memory => (default_redis_url(), default_redis_prefix()),
        }
    }

    pub fn executor(&self) -> TreeExecutor {
        self.kinds
            .iter()
            .fold(
                TreeExecutor::new().with_fallback(self.default_kind),
                |executor, (&kind, &profile)| executor.with_profile(TaskKind(kind), profile),
            )
    }
}
