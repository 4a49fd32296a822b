use std::collections::HashSet;
use std::sync::Arc;
use taskfarm::executor::{CHILD_ID_BASE, Executor, KindProfile, Recording, TreeExecutor};
use taskfarm::runtime::task::{Task, TaskKind};
use taskfarm::scheduler::{Coordinator, Strategy};
use taskfarm::transport::memory;

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

async fn child_ids(executor: &TreeExecutor, task: &Task) -> Vec<u32> {
    executor
        .execute(task)
        .await
        .unwrap()
        .children
        .iter()
        .map(|c| c.id)
        .collect()
}

#[tokio::test]
async fn test_ids_are_unique_across_many_roots() {
    let (coordinator, _) = memory::channel(0);
    let executor = Arc::new(Recording::new(tree(2, 6)));
    let roots: Vec<Task> = (0..4000).map(|seed| Task::root(TaskKind(0), seed)).collect();

    let summary = Coordinator::new(coordinator, executor.clone(), 16)
        .run(Strategy::Sequential, roots)
        .await
        .unwrap();

    assert_eq!(summary.executed(), 4000 * 127);
    assert_eq!(executor.total(), 4000 * 127);
    assert!(executor.duplicates().is_empty());

    let ids: HashSet<u32> = executor.snapshot().keys().map(|(id, _)| *id).collect();
    assert_eq!(ids.len(), 4000 * 127);
}

#[tokio::test]
async fn test_children_of_distinct_parents_never_share_ids() {
    let executor = tree(2, 3);
    let root_zero = Task::root(TaskKind(0), 0);
    let first_child = executor.execute(&root_zero).await.unwrap().children[0].clone();
    let other_root = Task::root(TaskKind(0), 0x10000);

    let mut seen = HashSet::new();
    for parent in [&root_zero, &first_child, &other_root] {
        for id in child_ids(&executor, parent).await {
            assert!(id >= CHILD_ID_BASE);
            assert!(seen.insert(id), "id {id} handed out twice");
        }
    }
    assert_eq!(seen.len(), 6);
}

#[tokio::test]
async fn test_ids_follow_heap_positions() {
    let executor = tree(2, 2);
    let stride = executor.tree_size(TaskKind(0)) as u32 - 1;
    let root = Task::root(TaskKind(0), 3);

    let children = executor.execute(&root).await.unwrap().children;
    let base = CHILD_ID_BASE + 3 * stride;
    assert_eq!(children.iter().map(|c| c.id).collect::<Vec<_>>(), vec![base, base + 1]);

    // The second child sits at position 2, so its children are 5 and 6.
    assert_eq!(child_ids(&executor, &children[1]).await, vec![base + 4, base + 5]);
    assert_eq!(child_ids(&executor, &children[1]).await, vec![base + 4, base + 5]);
}

#[tokio::test]
async fn test_exhausted_id_space_is_an_error() {
    let executor = tree(2, 6);

    let last_root = Task::root(TaskKind(0), CHILD_ID_BASE - 1);
    let error = executor.execute(&last_root).await.unwrap_err();
    assert!(error.to_string().contains("id space exhausted"), "{error}");

    let in_child_range = Task::root(TaskKind(0), CHILD_ID_BASE + 5);
    assert!(executor.execute(&in_child_range).await.is_err());
}

#[tokio::test]
async fn test_leaf_workloads_accept_any_seed() {
    let executor = TreeExecutor::new();
    let execution = executor.execute(&Task::root(TaskKind(9), u32::MAX)).await.unwrap();
    assert!(execution.children.is_empty());
}
