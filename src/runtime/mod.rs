pub mod queue;
pub mod registry;
pub mod task;
pub mod worker;
