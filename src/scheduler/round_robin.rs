use tracing::debug;

use crate::error::Result;
use crate::runtime::registry::WorkerId;
use crate::scheduler::Coordinator;
use crate::transport::CoordinatorTransport;

impl<T: CoordinatorTransport> Coordinator<T> {
    /// Each round splits the head of the queue between the coordinator and
    /// workers `1..batch`, then waits for all of them in worker order.
    pub(super) async fn run_round_robin(&mut self) -> Result<()> {
        while !self.queue.is_empty() {
            let batch = self.queue.len().min(self.pool.size() + 1);
            let Some(own) = self.queue.pop() else {
                break;
            };

            let targets: Vec<WorkerId> = self.pool.ids().take(batch - 1).collect();
            let mut assigned = Vec::with_capacity(targets.len());
            for worker in targets {
                let Some(task) = self.queue.pop() else {
                    break;
                };
                self.pool.claim(worker)?;
                self.send_task(worker, task).await?;
                assigned.push(worker);
            }
            debug!(batch, "Round dispatched");

            self.execute_locally(own).await?;

            for worker in assigned {
                let count = self.mailbox.recv_count_from(worker).await?;
                self.complete(worker, count).await?;
            }
        }
        Ok(())
    }
}
