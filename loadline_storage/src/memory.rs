//! In-memory storage engine.
//!
//! Flushed points are kept as encoded lines so that tests and development runs
//! can inspect exactly what would have reached the database. It uses a Mutex
//! shared by all sessions opened from the same storage.
use std::sync::{
    Arc,
    atomic::{AtomicUsize, Ordering},
};

use tokio::sync::Mutex;

use crate::{
    Point, SessionFactory, SessionOptions, WriteSession,
    error::{Result, StorageError},
    line_protocol::encode_points,
};

/// An in-memory storage engine.
#[derive(Debug, Clone, Default)]
pub struct MemoryStorage {
    inner: Arc<MemoryStorageInner>,
}

#[derive(Debug, Default)]
struct MemoryStorageInner {
    lines: Mutex<Vec<String>>,
    sessions_opened: AtomicUsize,
    flushes: AtomicUsize,
    default_tags: Vec<(String, String)>,
}

/// A buffered session writing into a [`MemoryStorage`].
pub struct MemorySession {
    storage: MemoryStorage,
    batch_size: usize,
    buffer: String,
    buffered_points: usize,
    closed: bool,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a storage that adds the given tags to every point.
    pub fn with_default_tags(default_tags: Vec<(String, String)>) -> Self {
        Self {
            inner: Arc::new(MemoryStorageInner {
                default_tags,
                ..Default::default()
            }),
        }
    }

    /// All durably written lines, in flush order.
    pub async fn lines(&self) -> Vec<String> {
        self.inner.lines.lock().await.clone()
    }

    /// Number of durably written points.
    pub async fn num_points(&self) -> usize {
        self.inner.lines.lock().await.len()
    }

    /// Number of sessions opened so far.
    pub fn sessions_opened(&self) -> usize {
        self.inner.sessions_opened.load(Ordering::Relaxed)
    }

    /// Number of non-empty flushes so far.
    pub fn flushes(&self) -> usize {
        self.inner.flushes.load(Ordering::Relaxed)
    }
}

#[async_trait::async_trait]
impl SessionFactory for MemoryStorage {
    async fn open_session(&self, options: SessionOptions) -> Result<Box<dyn WriteSession>> {
        self.inner.sessions_opened.fetch_add(1, Ordering::Relaxed);

        Ok(Box::new(MemorySession {
            storage: self.clone(),
            batch_size: options.batch_size.max(1),
            buffer: String::new(),
            buffered_points: 0,
            closed: false,
        }))
    }
}

#[async_trait::async_trait]
impl WriteSession for MemorySession {
    async fn write_points(&mut self, points: &[Point]) -> Result<()> {
        if self.closed {
            return Err(StorageError::SessionClosed);
        }

        self.buffered_points +=
            encode_points(&mut self.buffer, points, &self.storage.inner.default_tags)?;

        if self.buffered_points >= self.batch_size {
            self.flush().await?;
        }

        Ok(())
    }

    async fn flush(&mut self) -> Result<()> {
        if self.buffered_points == 0 {
            return Ok(());
        }

        let body = std::mem::take(&mut self.buffer);
        self.buffered_points = 0;

        let mut lines = self.storage.inner.lines.lock().await;
        lines.extend(body.lines().map(str::to_string));
        self.storage.inner.flushes.fetch_add(1, Ordering::Relaxed);

        Ok(())
    }

    async fn close(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }

        let result = self.flush().await;
        self.closed = true;
        result
    }
}
