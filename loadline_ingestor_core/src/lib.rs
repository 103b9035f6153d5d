pub mod batch;
pub mod error;
pub mod ingress;
pub mod memory;
pub mod metrics;
pub mod pool;
pub mod telemetry;
pub mod worker;

#[cfg(test)]
pub mod test_utils;

pub use batch::{Batch, PayloadOutcome};
pub use error::{IngestorError, Result};
pub use ingress::{Ingress, IngressOptions, ServerStatus, WriteReport};
pub use memory::{FixedMemoryProbe, MemoryGate, MemoryProbe, SystemMemoryProbe};
pub use pool::{
    PayloadTicket, PoolStatus, WorkerPool, WorkerPoolClient, WorkerPoolOptions, run_worker_pool,
};
pub use telemetry::TelemetryLog;
pub use worker::WorkerId;
