use crate::error::Result;
use crate::runtime::registry::WorkerId;
use crate::scheduler::Coordinator;
use crate::transport::CoordinatorTransport;

impl<T: CoordinatorTransport> Coordinator<T> {
    pub(super) async fn run_overlapped(&mut self) -> Result<()> {
        self.dispatch_ready().await?;
        while !self.is_done() {
            let (worker, count) = self.work_until_reply().await?;
            self.complete(worker, count).await?;
            self.dispatch_ready().await?;
        }
        Ok(())
    }

    /// One step: poll for a reply; if none, run one queued task here. With
    /// nothing queued, block for the reply instead of spinning.
    async fn work_until_reply(&mut self) -> Result<(WorkerId, u32)> {
        loop {
            if let Some(reply) = self.mailbox.try_recv_count().await? {
                return Ok(reply);
            }
            match self.queue.pop() {
                Some(task) => {
                    self.execute_locally(task).await?;
                    tokio::task::yield_now().await;
                }
                None => return self.mailbox.recv_count().await,
            }
        }
    }
}
