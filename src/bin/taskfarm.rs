use anyhow::{Result, bail, ensure};
use clap::{Args, Parser, Subcommand};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use taskfarm::benchmark::BenchmarkRunner;
use taskfarm::cluster::Cluster;
use taskfarm::config::RunConfig;
use taskfarm::executor::Recording;
use taskfarm::runtime::registry::WorkerId;
use taskfarm::runtime::task::Task;
use taskfarm::runtime::worker::Worker;
use taskfarm::scheduler::{Coordinator, Strategy};
use taskfarm::transport::redis::{RedisCoordinator, RedisWorker};
use taskfarm::workload;
use tracing::{Level, info, warn};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Log at debug level
    #[arg(long, short, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args, Debug, Clone)]
struct Settings {
    /// YAML run configuration
    #[arg(long, short)]
    config: Option<PathBuf>,

    /// Workload file (overrides the config)
    #[arg(long, short)]
    input: Option<PathBuf>,

    /// Dispatch strategy (overrides the config)
    #[arg(long, value_enum)]
    strategy: Option<Strategy>,

    /// Number of workers besides the coordinator (overrides the config)
    #[arg(long, short)]
    workers: Option<usize>,

    /// Most children a single task may produce (overrides the config)
    #[arg(long)]
    max_batch: Option<usize>,
}

impl Settings {
    fn resolve(&self) -> Result<RunConfig> {
        let mut config = match &self.config {
            Some(path) => RunConfig::load(path)?,
            None => RunConfig::default(),
        };
        if let Some(input) = &self.input {
            config.input = Some(input.clone());
        }
        if let Some(strategy) = self.strategy {
            config.strategy = strategy;
        }
        if let Some(workers) = self.workers {
            config.workers = workers;
        }
        if let Some(max_batch) = self.max_batch {
            config.max_batch = max_batch;
        }
        config.validate()?;
        Ok(config)
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Run a workload with in-process workers
    Run {
        #[command(flatten)]
        settings: Settings,

        /// Fail unless every task ran exactly once
        #[arg(long)]
        audit: bool,

        /// Print the report as JSON on stdout
        #[arg(long)]
        json: bool,
    },

    /// Coordinate worker processes over Redis
    Coordinate {
        #[command(flatten)]
        settings: Settings,

        /// Redis connection URL (overrides the config)
        #[arg(long)]
        redis: Option<String>,

        /// Key prefix shared with the workers (overrides the config)
        #[arg(long)]
        prefix: Option<String>,

        /// Keep frames left in Redis by an earlier run
        #[arg(long)]
        keep_queues: bool,

        /// Print the summary as JSON on stdout
        #[arg(long)]
        json: bool,
    },

    /// Serve as one worker process over Redis
    Worker {
        /// Worker id, from 1 to the coordinator's worker count
        #[arg(long)]
        id: u32,

        /// YAML run configuration (for task kinds and batch capacity)
        #[arg(long, short)]
        config: Option<PathBuf>,

        /// Redis connection URL (overrides the config)
        #[arg(long)]
        redis: Option<String>,

        /// Key prefix shared with the coordinator (overrides the config)
        #[arg(long)]
        prefix: Option<String>,

        /// Most children a single task may produce (overrides the config)
        #[arg(long)]
        max_batch: Option<usize>,
    },

    /// Time every strategy on the same workload
    Bench {
        #[command(flatten)]
        settings: Settings,

        /// Runs per strategy
        #[arg(long, default_value_t = 3)]
        repeats: usize,

        /// Print the timings as JSON on stdout
        #[arg(long)]
        json: bool,
    },
}

fn load_workload(config: &RunConfig) -> Vec<Task> {
    match &config.input {
        Some(path) => workload::load_or_empty(path),
        None => {
            warn!("No workload given, starting with an empty queue");
            Vec::new()
        }
    }
}

fn redis_target(
    config: &RunConfig,
    url: Option<String>,
    prefix: Option<String>,
) -> (String, String) {
    let (default_url, default_prefix) = config.redis();
    (url.unwrap_or(default_url), prefix.unwrap_or(default_prefix))
}

fn emit<T: Serialize + std::fmt::Debug>(value: &T, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(value)?);
    } else {
        info!("{:#?}", value);
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    tracing_subscriber::fmt()
        .with_max_level(if cli.verbose { Level::DEBUG } else { Level::INFO })
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Run {
            settings,
            audit,
            json,
        } => {
            let config = settings.resolve()?;
            let tasks = load_workload(&config);

            let recorder = Arc::new(Recording::new(config.executor()));
            let cluster = Cluster::new(config.workers, recorder.clone()).max_batch(config.max_batch);
            let report = cluster.run(config.strategy, tasks).await?;

            if audit {
                let duplicates = recorder.duplicates();
                if !duplicates.is_empty() {
                    bail!(
                        "{} tasks executed more than once: {:?}",
                        duplicates.len(),
                        duplicates
                    );
                }
                ensure!(
                    recorder.total() as u64 == report.summary.executed(),
                    "executor saw {} tasks but the coordinator accounted for {}",
                    recorder.total(),
                    report.summary.executed()
                );
                info!(executed = recorder.total(), "Audit passed");
            }

            emit(&report, json)?;
        }

        Commands::Coordinate {
            settings,
            redis,
            prefix,
            keep_queues,
            json,
        } => {
            let config = settings.resolve()?;
            let (url, prefix) = redis_target(&config, redis, prefix);
            info!(redis = %url, %prefix, workers = config.workers, "Starting coordinator");

            let tasks = load_workload(&config);
            let mut transport = RedisCoordinator::connect(&url, &prefix, config.workers).await?;
            if !keep_queues {
                transport.clear().await?;
            }

            let coordinator =
                Coordinator::new(transport, Arc::new(config.executor()), config.max_batch);
            let summary = coordinator.run(config.strategy, tasks).await?;
            emit(&summary, json)?;
        }

        Commands::Worker {
            id,
            config,
            redis,
            prefix,
            max_batch,
        } => {
            ensure!(id >= 1, "worker ids start at 1");
            let config = match config {
                Some(path) => RunConfig::load(&path)?,
                None => RunConfig::default(),
            };
            let (url, prefix) = redis_target(&config, redis, prefix);
            let max_batch = max_batch.unwrap_or(config.max_batch);
            info!(worker = id, redis = %url, %prefix, "Starting worker");

            let transport = RedisWorker::connect(&url, &prefix, WorkerId(id)).await?;
            let worker = Worker::new(transport, Arc::new(config.executor()), max_batch);
            let stats = worker.run().await?;
            info!(
                worker = id,
                executed = stats.executed,
                children_sent = stats.children_sent,
                "Worker finished"
            );
        }

        Commands::Bench {
            settings,
            repeats,
            json,
        } => {
            let config = settings.resolve()?;
            let tasks = load_workload(&config);
            let cluster =
                Cluster::new(config.workers, Arc::new(config.executor())).max_batch(config.max_batch);
            let timings = BenchmarkRunner::new(cluster, repeats).compare(&tasks).await?;
            emit(&timings, json)?;
        }
    }

    Ok(())
}
