//! Storage engine sessions for writing points into a time-series database.
//!
//! This crate provides the `SessionFactory` trait that writer workers use to open
//! a private `WriteSession` against the storage engine. Every session buffers
//! points internally and exposes an explicit `flush` that only returns once the
//! storage engine acknowledged the write.
//!
//! Two implementations are provided:
//!
//! - [`InfluxSessionFactory`] writes line protocol to the InfluxDB v2 write API.
//! - [`MemoryStorage`] keeps durable lines in memory, useful for development and tests.

pub mod error;
pub mod influx;
pub mod line_protocol;
pub mod memory;
pub mod point;

use std::time::Duration;

pub use error::{Result, StorageError};
pub use influx::{InfluxOptions, InfluxSessionFactory};
pub use memory::MemoryStorage;
pub use point::Point;

/// Buffering parameters of a storage session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionOptions {
    /// Number of buffered points after which the session flushes on its own.
    pub batch_size: usize,
    /// Interval at which the owner of the session should flush buffered points.
    pub flush_interval: Duration,
    /// Id of the worker owning the session, if any.
    pub worker: Option<usize>,
}

impl SessionOptions {
    pub fn new(batch_size: usize, flush_interval: Duration) -> Self {
        Self {
            batch_size,
            flush_interval,
            worker: None,
        }
    }

    pub fn with_worker(mut self, worker: usize) -> Self {
        self.worker = Some(worker);
        self
    }
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            batch_size: 5000,
            flush_interval: Duration::from_secs(10),
            worker: None,
        }
    }
}

/// Factory trait for opening storage sessions.
#[async_trait::async_trait]
pub trait SessionFactory: Send + Sync {
    /// Open a new session configured with the given buffering parameters.
    async fn open_session(&self, options: SessionOptions) -> Result<Box<dyn WriteSession>>;
}

/// A persistent, exclusively owned session with the storage engine.
#[async_trait::async_trait]
pub trait WriteSession: Send {
    /// Buffer the points, flushing automatically if the buffer is full.
    ///
    /// Either all points are accepted into the buffer or none are.
    async fn write_points(&mut self, points: &[Point]) -> Result<()>;

    /// Send all buffered points and wait for the storage engine to acknowledge them.
    ///
    /// Buffered points are discarded even if the write fails.
    async fn flush(&mut self) -> Result<()>;

    /// Flush any pending points and release the session.
    async fn close(&mut self) -> Result<()>;
}
