use std::sync::Arc;

use snafu::Snafu;

use crate::worker::WorkerId;

/// Ingestor error types.
///
/// The message associated with an error is forwarded to the client,
/// for this reason it should contain information that is useful to the user.
#[derive(Debug, Clone, Snafu)]
#[snafu(visibility(pub))]
pub enum IngestorError {
    /// Invalid configuration.
    ///
    /// Returned at construction time, never while serving requests.
    #[snafu(display("invalid configuration: {message}"))]
    InvalidConfiguration { message: String },
    /// The memory gate rejected the payload.
    #[snafu(display("server is overloaded"))]
    Overloaded,
    /// A worker could not open its storage session.
    #[snafu(display("worker {worker} failed to initialize: {message}"))]
    WorkerInitialization { worker: WorkerId, message: String },
    /// A worker failed to write a batch.
    #[snafu(display("worker {worker} failed to write batch: {message}"))]
    WriteFailure { worker: WorkerId, message: String },
    /// Every worker is unusable, queued batches cannot be processed.
    #[snafu(display("no usable workers left, dropped {num_batches} queued batches"))]
    NoUsableWorkers { num_batches: usize },
    /// The worker pool is draining and does not accept new batches.
    #[snafu(display("worker pool is shutting down"))]
    ShuttingDown,
    /// The worker pool task is gone.
    #[snafu(display("worker pool is closed"))]
    PoolClosed,
    /// Telemetry log IO error.
    #[snafu(display("telemetry error: {message}"))]
    Telemetry {
        message: &'static str,
        #[snafu(source(from(std::io::Error, Arc::new)))]
        source: Arc<std::io::Error>,
    },
    /// Telemetry entry encoding error.
    #[snafu(display("telemetry encoding error"))]
    TelemetryEncode {
        #[snafu(source(from(serde_json::Error, Arc::new)))]
        source: Arc<serde_json::Error>,
    },
}

pub type Result<T, E = IngestorError> = std::result::Result<T, E>;
