use std::collections::VecDeque;

use crate::runtime::task::Task;

/// Pending tasks in arrival order. Children go to the tail like any other task.
#[derive(Debug, Default)]
pub struct WorkQueue {
    tasks: VecDeque<Task>,
}

impl WorkQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, task: Task) {
        self.tasks.push_back(task);
    }

    pub fn pop(&mut self) -> Option<Task> {
        self.tasks.pop_front()
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }
}

impl Extend<Task> for WorkQueue {
    fn extend<I: IntoIterator<Item = Task>>(&mut self, iter: I) {
        self.tasks.extend(iter);
    }
}
