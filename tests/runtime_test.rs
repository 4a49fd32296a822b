use std::collections::HashSet;
use taskfarm::ProtocolViolation;
use taskfarm::runtime::queue::WorkQueue;
use taskfarm::runtime::registry::{WorkerId, WorkerPool};
use taskfarm::runtime::task::{CapacityError, Dependencies, MAX_DEPENDENCIES, Task, TaskKind};

#[test]
fn test_queue_is_fifo() {
    let mut queue = WorkQueue::new();
    assert!(queue.is_empty());

    queue.push(Task::root(TaskKind(0), 1));
    queue.push(Task::root(TaskKind(0), 2));
    let parent = queue.pop().unwrap();
    assert_eq!(parent.id, 1);

    // Children land behind what was already waiting.
    queue.extend([
        Task::child(&parent, 10, TaskKind(0), 0),
        Task::child(&parent, 11, TaskKind(0), 0),
    ]);
    let order: Vec<_> = std::iter::from_fn(|| queue.pop()).map(|t| t.id).collect();
    assert_eq!(order, vec![2, 10, 11]);
    assert!(queue.is_empty());
}

#[test]
fn test_pool_hands_out_workers_in_idle_order() {
    let mut pool = WorkerPool::new(3);
    assert_eq!(pool.idle_count(), 3);

    assert_eq!(pool.acquire(), Some(WorkerId(1)));
    assert_eq!(pool.acquire(), Some(WorkerId(2)));
    assert_eq!(pool.acquire(), Some(WorkerId(3)));
    assert_eq!(pool.acquire(), None);
    assert_eq!(pool.in_flight(), 3);

    pool.release(WorkerId(2)).unwrap();
    pool.release(WorkerId(1)).unwrap();
    assert_eq!(pool.acquire(), Some(WorkerId(2)));
    assert_eq!(pool.acquire(), Some(WorkerId(1)));
}

#[test]
fn test_pool_rejects_double_release_and_strangers() {
    let mut pool = WorkerPool::new(2);
    let worker = pool.acquire().unwrap();
    pool.release(worker).unwrap();

    assert_eq!(
        pool.release(worker),
        Err(ProtocolViolation::NotInFlight { worker })
    );
    assert_eq!(
        pool.release(WorkerId(9)),
        Err(ProtocolViolation::UnknownWorker {
            worker: WorkerId(9)
        })
    );
    assert_eq!(
        pool.claim(WorkerId(0)),
        Err(ProtocolViolation::UnknownWorker {
            worker: WorkerId(0)
        })
    );
}

#[test]
fn test_pool_claim_takes_a_specific_worker() {
    let mut pool = WorkerPool::new(3);
    pool.claim(WorkerId(2)).unwrap();
    assert!(pool.is_busy(WorkerId(2)));
    assert_eq!(
        pool.claim(WorkerId(2)),
        Err(ProtocolViolation::NotIdle {
            worker: WorkerId(2)
        })
    );
    assert_eq!(pool.acquire(), Some(WorkerId(1)));
    assert_eq!(pool.acquire(), Some(WorkerId(3)));
}

#[test]
fn test_idle_and_busy_partition_the_pool() {
    let mut pool = WorkerPool::new(4);
    let all: HashSet<_> = pool.ids().collect();

    let mut busy = Vec::new();
    for step in 0..12 {
        if step % 3 == 2 {
            let worker = busy.remove(0);
            pool.release(worker).unwrap();
        } else if let Some(worker) = pool.acquire() {
            busy.push(worker);
        }

        let busy_set: HashSet<_> = all.iter().copied().filter(|w| pool.is_busy(*w)).collect();
        assert_eq!(busy_set, busy.iter().copied().collect());
        assert_eq!(pool.in_flight() + pool.idle_count(), all.len());
    }
}

#[test]
fn test_dependencies_are_bounded() {
    let mut dependencies = Dependencies::new();
    for i in 0..MAX_DEPENDENCIES as u32 {
        dependencies.push(i, 1 << i).unwrap();
    }
    assert_eq!(dependencies.push(99, 0), Err(CapacityError));
    assert_eq!(dependencies.len(), MAX_DEPENDENCIES);

    let pairs: Vec<_> = dependencies.iter().collect();
    assert_eq!(pairs, vec![(0, 1), (1, 2), (2, 4), (3, 8)]);
    assert!(Dependencies::from_slots([0; 4], [0; 4], 5).is_err());
}

#[test]
fn test_root_and_child_tasks() {
    let root = Task::root(TaskKind(2), 42);
    assert_eq!(root.id, 42);
    assert_eq!(root.generation, 0);
    assert!(root.dependencies.is_empty());

    let child = Task::child(&root, 7, TaskKind(3), 8);
    assert_eq!(child.generation, 1);
    assert_eq!(child.kind, TaskKind(3));
}
