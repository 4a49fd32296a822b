use crate::error::Result;
use crate::scheduler::Coordinator;
use crate::transport::CoordinatorTransport;

impl<T: CoordinatorTransport> Coordinator<T> {
    pub(super) async fn run_sequential(&mut self) -> Result<()> {
        while let Some(task) = self.queue.pop() {
            self.execute_locally(task).await?;
        }
        Ok(())
    }
}
