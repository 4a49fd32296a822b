use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use taskfarm::cluster::Cluster;
use taskfarm::executor::{Execution, Executor, KindProfile, Recording, TreeExecutor};
use taskfarm::runtime::registry::WorkerId;
use taskfarm::runtime::task::{Dispatch, Task, TaskId, TaskKind};
use taskfarm::scheduler::{Coordinator, Strategy};
use taskfarm::transport::memory::{self, MemoryWorker};
use taskfarm::transport::{Phase, WorkerTransport};
use taskfarm::wire::{self, ReplyLeg};
use taskfarm::{Error, ProtocolViolation};
use tokio::task::JoinHandle;

fn leaves() -> Arc<TreeExecutor> {
    Arc::new(TreeExecutor::new())
}

fn tree(fanout: u32, max_generation: u32) -> TreeExecutor {
    TreeExecutor::new().with_profile(
        TaskKind(0),
        KindProfile {
            fanout,
            max_generation,
            ..Default::default()
        },
    )
}

fn roots(seeds: impl IntoIterator<Item = u32>) -> Vec<Task> {
    seeds
        .into_iter()
        .map(|seed| Task::root(TaskKind(0), seed))
        .collect()
}

/// A hand-driven worker that replies zero children after `delay`. It keeps
/// reading until the coordinator drops its links and logs every frame,
/// `None` standing for a termination.
type FrameLog = JoinHandle<Vec<Option<TaskId>>>;

fn fake_worker(mut end: MemoryWorker, delay: Duration) -> FrameLog {
    tokio::spawn(async move {
        let mut log = Vec::new();
        while let Ok(frame) = end.recv().await {
            match wire::decode_dispatch(&frame).unwrap() {
                Dispatch::Run(task) => {
                    log.push(Some(task.id));
                    tokio::time::sleep(delay).await;
                    let reply = wire::encode_reply(&ReplyLeg::Count(0)).unwrap();
                    end.send(reply, Phase::SendCount).await.unwrap();
                }
                Dispatch::Terminate => log.push(None),
            }
        }
        log
    })
}

fn fake_workers(ends: Vec<MemoryWorker>) -> Vec<FrameLog> {
    ends.into_iter()
        .map(|end| fake_worker(end, Duration::ZERO))
        .collect()
}

/// Tasks each worker ran, checking it was terminated once and last.
async fn tasks_run(handle: FrameLog) -> Vec<TaskId> {
    let mut log = handle.await.unwrap();
    assert_eq!(log.pop(), Some(None), "termination must be the last frame");
    log.into_iter()
        .map(|entry| entry.expect("a second termination"))
        .collect()
}

async fn collect(handles: Vec<FrameLog>) -> Vec<Vec<TaskId>> {
    let mut all = Vec::new();
    for handle in handles {
        all.push(tasks_run(handle).await);
    }
    all
}

async fn preload(end: &mut MemoryWorker, leg: ReplyLeg) {
    let frame = wire::encode_reply(&leg).unwrap();
    end.send(frame, Phase::SendCount).await.unwrap();
}

#[tokio::test]
async fn test_blocking_spreads_roots_over_idle_workers() {
    let (coordinator, ends) = memory::channel(3);
    let workers = fake_workers(ends);

    let summary = Coordinator::new(coordinator, leaves(), 16)
        .run(Strategy::Blocking, roots([10, 11]))
        .await
        .unwrap();

    assert_eq!(summary.strategy, Strategy::Blocking);
    assert_eq!(summary.dispatched, 2);
    assert_eq!(summary.executed_locally, 0);
    assert_eq!(summary.replies, 2);
    assert_eq!(summary.terminations, 3);
    assert_eq!(summary.executed(), 2);

    // Idle workers are handed out lowest id first; the third only hears
    // the termination.
    assert_eq!(collect(workers).await, vec![vec![10], vec![11], vec![]]);
}

#[tokio::test]
async fn test_empty_workload_terminates_immediately() {
    for strategy in Strategy::ALL {
        let (coordinator, ends) = memory::channel(3);
        let workers = fake_workers(ends);

        let summary = Coordinator::new(coordinator, leaves(), 16)
            .run(strategy, Vec::new())
            .await
            .unwrap();

        assert_eq!(summary.executed(), 0, "{strategy}");
        assert_eq!(summary.terminations, 3, "{strategy}");
        assert!(collect(workers).await.iter().all(Vec::is_empty));
    }
}

#[tokio::test]
async fn test_no_workers_falls_back_to_sequential() {
    let (coordinator, _) = memory::channel(0);
    let executor = Arc::new(Recording::new(tree(2, 2)));

    let summary = Coordinator::new(coordinator, executor.clone(), 16)
        .run(Strategy::Overlapped, roots([1]))
        .await
        .unwrap();

    assert_eq!(summary.strategy, Strategy::Sequential);
    assert_eq!(summary.executed_locally, 7);
    assert_eq!(summary.dispatched, 0);
    assert_eq!(summary.terminations, 0);
    assert_eq!(executor.total(), 7);
}

#[tokio::test]
async fn test_round_robin_assigns_by_position() {
    let (coordinator, ends) = memory::channel(2);
    let workers = fake_workers(ends);

    let summary = Coordinator::new(coordinator, leaves(), 16)
        .run(Strategy::RoundRobin, roots([1, 2, 3, 4, 5]))
        .await
        .unwrap();

    // Round one: 1 here, 2 and 3 out. Round two: 4 here, 5 to worker 1.
    assert_eq!(summary.executed_locally, 2);
    assert_eq!(summary.dispatched, 3);
    assert_eq!(collect(workers).await, vec![vec![2, 5], vec![3]]);
}

#[tokio::test]
async fn test_overlapped_works_while_waiting() {
    let (coordinator, mut ends) = memory::channel(1);
    let worker = fake_worker(ends.remove(0), Duration::from_millis(50));

    let summary = Coordinator::new(coordinator, leaves(), 16)
        .run(Strategy::Overlapped, roots([1, 2, 3]))
        .await
        .unwrap();

    assert_eq!(summary.dispatched, 1);
    assert_eq!(summary.executed_locally, 2);
    assert_eq!(summary.replies, 1);
    assert_eq!(tasks_run(worker).await, vec![1]);
}

#[tokio::test]
async fn test_reply_count_over_capacity_aborts() {
    let (coordinator, mut ends) = memory::channel(1);
    preload(&mut ends[0], ReplyLeg::Count(5)).await;

    let result = Coordinator::new(coordinator, leaves(), 2)
        .run(Strategy::Blocking, roots([1]))
        .await;

    assert!(matches!(
        result,
        Err(Error::Protocol(ProtocolViolation::CountExceedsCapacity {
            worker: WorkerId(1),
            count: 5,
            capacity: 2
        }))
    ));
}

#[tokio::test]
async fn test_reply_from_idle_worker_aborts() {
    let (coordinator, mut ends) = memory::channel(2);
    preload(&mut ends[1], ReplyLeg::Count(0)).await;

    let result = Coordinator::new(coordinator, leaves(), 16)
        .run(Strategy::Blocking, roots([1]))
        .await;

    assert!(matches!(
        result,
        Err(Error::Protocol(ProtocolViolation::NotInFlight {
            worker: WorkerId(2)
        }))
    ));
}

#[tokio::test]
async fn test_short_batch_aborts() {
    let (coordinator, mut ends) = memory::channel(1);
    preload(&mut ends[0], ReplyLeg::Count(2)).await;
    preload(&mut ends[0], ReplyLeg::Batch(roots([9]))).await;

    let result = Coordinator::new(coordinator, leaves(), 16)
        .run(Strategy::Blocking, roots([1]))
        .await;

    assert!(matches!(
        result,
        Err(Error::Protocol(ProtocolViolation::BatchMismatch {
            worker: WorkerId(1),
            announced: 2,
            received: 1
        }))
    ));
}

#[tokio::test]
async fn test_batch_without_count_aborts() {
    let (coordinator, mut ends) = memory::channel(1);
    preload(&mut ends[0], ReplyLeg::Batch(roots([9]))).await;

    let result = Coordinator::new(coordinator, leaves(), 16)
        .run(Strategy::Blocking, roots([1]))
        .await;

    assert!(matches!(
        result,
        Err(Error::Protocol(ProtocolViolation::UnexpectedBatch {
            worker: WorkerId(1)
        }))
    ));
}

#[tokio::test]
async fn test_children_go_back_through_the_queue() {
    let (coordinator, mut ends) = memory::channel(1);
    let mut end = ends.remove(0);
    let root = Task::root(TaskKind(0), 1);
    let child = Task::child(&root, 100, TaskKind(0), 2);

    let expected = child.clone();
    let worker = tokio::spawn(async move {
        let mut seen = Vec::new();
        while let Ok(frame) = end.recv().await {
            let Dispatch::Run(task) = wire::decode_dispatch(&frame).unwrap() else {
                break;
            };
            let children = if task.generation == 0 {
                vec![expected.clone()]
            } else {
                Vec::new()
            };
            seen.push(task);
            preload(&mut end, ReplyLeg::Count(children.len() as u32)).await;
            if !children.is_empty() {
                preload(&mut end, ReplyLeg::Batch(children)).await;
            }
        }
        seen
    });

    let summary = Coordinator::new(coordinator, leaves(), 16)
        .run(Strategy::Blocking, vec![root.clone()])
        .await
        .unwrap();

    assert_eq!(summary.dispatched, 2);
    assert_eq!(summary.children, 1);
    assert_eq!(worker.await.unwrap(), vec![root, child]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_linear_chain_runs_every_generation_once() {
    for workers in 0..=3 {
        for strategy in Strategy::ALL {
            let executor = Arc::new(Recording::new(tree(1, 5)));
            let report = Cluster::new(workers, executor.clone())
                .run(strategy, roots([7]))
                .await
                .unwrap();

            assert_eq!(report.summary.executed(), 6, "{strategy} with {workers} workers");
            assert_eq!(executor.total(), 6);
            assert!(executor.duplicates().is_empty());
            let generations: Vec<u32> = {
                let mut g: Vec<_> = executor.snapshot().keys().map(|(_, g)| *g).collect();
                g.sort_unstable();
                g
            };
            assert_eq!(generations, vec![0, 1, 2, 3, 4, 5]);
        }
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_strategies_execute_the_same_tasks() {
    let mut snapshots: Vec<(Strategy, HashMap<(TaskId, u32), usize>)> = Vec::new();
    for strategy in Strategy::ALL {
        let executor = Arc::new(Recording::new(tree(3, 3)));
        let report = Cluster::new(3, executor.clone())
            .run(strategy, roots([1, 2, 3, 4]))
            .await
            .unwrap();

        assert_eq!(report.summary.executed(), 4 * 40);
        assert!(executor.duplicates().is_empty(), "{strategy}");
        let worker_total: u64 = report.workers.values().map(|s| s.executed).sum();
        assert_eq!(worker_total, report.summary.dispatched);
        snapshots.push((strategy, executor.snapshot()));
    }

    let (_, reference) = &snapshots[0];
    for (strategy, snapshot) in &snapshots[1..] {
        assert_eq!(snapshot, reference, "{strategy} diverged");
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_replies_out_of_dispatch_order() {
    let executor = TreeExecutor::new()
        .with_profile(
            TaskKind(0),
            KindProfile {
                delay_ms: 40,
                ..Default::default()
            },
        )
        .with_profile(
            TaskKind(1),
            KindProfile {
                fanout: 2,
                max_generation: 2,
                ..Default::default()
            },
        );
    let executor = Arc::new(Recording::new(executor));

    // The slow root goes to worker 1 first; worker 2 replies long before it.
    let tasks = vec![Task::root(TaskKind(0), 1), Task::root(TaskKind(1), 2)];
    for strategy in [Strategy::Blocking, Strategy::Overlapped] {
        executor.clear();
        let report = Cluster::new(2, executor.clone())
            .run(strategy, tasks.clone())
            .await
            .unwrap();

        assert_eq!(report.summary.executed(), 1 + 7, "{strategy}");
        assert_eq!(executor.count(1, 0), 1);
        assert!(executor.duplicates().is_empty());
    }
}

/// Logs the order tasks start in and delegates to a tree.
struct OrderLog {
    tree: TreeExecutor,
    order: Mutex<Vec<(TaskId, u32)>>,
}

#[async_trait]
impl Executor for OrderLog {
    async fn execute(&self, task: &Task) -> anyhow::Result<Execution> {
        self.order.lock().unwrap().push((task.id, task.generation));
        self.tree.execute(task).await
    }
}

#[tokio::test]
async fn test_single_executor_sees_fifo_order() {
    for (workers, strategy) in [(0, Strategy::Sequential), (1, Strategy::Blocking)] {
        let log = Arc::new(OrderLog {
            tree: tree(1, 1),
            order: Mutex::new(Vec::new()),
        });
        Cluster::new(workers, log.clone())
            .run(strategy, roots([1, 2]))
            .await
            .unwrap();

        let order = log.order.lock().unwrap().clone();
        let generations: Vec<u32> = order.iter().map(|(_, g)| *g).collect();
        assert_eq!(generations, vec![0, 0, 1, 1], "{strategy}");
        assert_eq!(order[0].0, 1);
        assert_eq!(order[1].0, 2);
    }
}

struct Failing;

#[async_trait]
impl Executor for Failing {
    async fn execute(&self, task: &Task) -> anyhow::Result<Execution> {
        Err(anyhow::anyhow!("kind {} is not supported", task.kind))
    }
}

#[tokio::test]
async fn test_cluster_aborts_when_a_worker_fails() {
    let result = Cluster::new(2, Arc::new(Failing))
        .run(Strategy::Blocking, roots([1]))
        .await;

    match result {
        Err(Error::Worker { worker, source }) => {
            assert_eq!(worker, WorkerId(1));
            assert!(matches!(*source, Error::Execute { task_id: 1, .. }));
        }
        other => panic!("expected a worker failure, got {other:?}"),
    }
}

#[tokio::test]
async fn test_local_execution_failure_aborts_the_run() {
    let (coordinator, _) = memory::channel(0);
    let result = Coordinator::new(coordinator, Arc::new(Failing), 16)
        .run(Strategy::Sequential, roots([3]))
        .await;

    assert!(matches!(
        result,
        Err(Error::Execute {
            task_id: 3,
            generation: 0,
            ..
        })
    ));
}
