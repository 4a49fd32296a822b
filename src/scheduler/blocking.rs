use crate::error::Result;
use crate::scheduler::Coordinator;
use crate::transport::CoordinatorTransport;

impl<T: CoordinatorTransport> Coordinator<T> {
    pub(super) async fn run_blocking(&mut self) -> Result<()> {
        self.dispatch_ready().await?;
        while !self.is_done() {
            let (worker, count) = self.mailbox.recv_count().await?;
            self.complete(worker, count).await?;
            self.dispatch_ready().await?;
        }
        Ok(())
    }
}
