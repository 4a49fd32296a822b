pub mod benchmark;
pub mod cluster;
pub mod config;
pub mod error;
pub mod executor;
pub mod runtime;
pub mod scheduler;
pub mod transport;
pub mod wire;
pub mod workload;

pub use error::{Error, ProtocolViolation, Result};
