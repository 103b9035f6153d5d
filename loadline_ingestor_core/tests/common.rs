#![allow(dead_code)]

use std::{
    sync::{
        Arc, Mutex,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};

use chrono::DateTime;
use loadline_ingestor_core::{WorkerPool, WorkerPoolClient, WorkerPoolOptions};
use loadline_storage::{
    MemoryStorage, Point, SessionFactory, SessionOptions, StorageError, WriteSession,
};
use tokio::{sync::Semaphore, task::JoinHandle};
use tokio_util::sync::CancellationToken;

/// A storage engine with injectable failures.
///
/// Faults are selected by the tag id of the first point of a batch.
#[derive(Clone, Default)]
pub struct TestStorage {
    pub storage: MemoryStorage,
    init_failures: Arc<AtomicUsize>,
    fail_tag: Option<String>,
    panic_tag: Option<String>,
    gate: Option<Arc<Semaphore>>,
    in_flight: Arc<AtomicUsize>,
    max_in_flight: Arc<AtomicUsize>,
    session_writes: Arc<Mutex<Vec<usize>>>,
    write_log: Arc<Mutex<Vec<LoggedWrite>>>,
}

/// A successful write, in the order writes completed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoggedWrite {
    pub worker: Option<usize>,
    /// Tag id of the first point of the batch.
    pub first_tag_id: String,
}

struct TestSession {
    index: usize,
    worker: Option<usize>,
    inner: Box<dyn WriteSession>,
    storage: TestStorage,
}

struct InFlightGuard(Arc<AtomicUsize>);

impl TestStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail the next `count` sessions opened.
    pub fn with_init_failures(self, count: usize) -> Self {
        self.init_failures.store(count, Ordering::SeqCst);
        self
    }

    /// Fail batches starting with the given tag id.
    pub fn with_failing_batch(mut self, tag_id: &str) -> Self {
        self.fail_tag = Some(tag_id.to_string());
        self
    }

    /// Panic while writing batches starting with the given tag id.
    pub fn with_panicking_batch(mut self, tag_id: &str) -> Self {
        self.panic_tag = Some(tag_id.to_string());
        self
    }

    /// Every write waits for a permit of the semaphore.
    pub fn with_gate(mut self, gate: Arc<Semaphore>) -> Self {
        self.gate = Some(gate);
        self
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    /// Number of successful writes per opened session.
    pub fn session_writes(&self) -> Vec<usize> {
        self.session_writes.lock().expect("lock").clone()
    }

    pub fn write_log(&self) -> Vec<LoggedWrite> {
        self.write_log.lock().expect("lock").clone()
    }

    fn matches(tag: &Option<String>, points: &[Point]) -> bool {
        match (tag, points.first()) {
            (Some(tag), Some(point)) => &point.tag_id == tag,
            _ => false,
        }
    }
}

#[async_trait::async_trait]
impl SessionFactory for TestStorage {
    async fn open_session(
        &self,
        options: SessionOptions,
    ) -> loadline_storage::Result<Box<dyn WriteSession>> {
        let should_fail = self
            .init_failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();

        if should_fail {
            return Err(StorageError::Response {
                status: 401,
                message: "injected initialization failure".to_string(),
            });
        }

        let inner = self.storage.open_session(options).await?;
        let index = {
            let mut writes = self.session_writes.lock().expect("lock");
            writes.push(0);
            writes.len() - 1
        };

        Ok(Box::new(TestSession {
            index,
            worker: options.worker,
            inner,
            storage: self.clone(),
        }))
    }
}

#[async_trait::async_trait]
impl WriteSession for TestSession {
    async fn write_points(&mut self, points: &[Point]) -> loadline_storage::Result<()> {
        let current = self.storage.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.storage
            .max_in_flight
            .fetch_max(current, Ordering::SeqCst);
        let _guard = InFlightGuard(self.storage.in_flight.clone());

        if let Some(gate) = &self.storage.gate {
            gate.acquire().await.expect("gate open").forget();
        }

        if TestStorage::matches(&self.storage.panic_tag, points) {
            panic!("injected panic");
        }

        if TestStorage::matches(&self.storage.fail_tag, points) {
            return Err(StorageError::Response {
                status: 500,
                message: "injected write failure".to_string(),
            });
        }

        self.inner.write_points(points).await?;
        self.storage.session_writes.lock().expect("lock")[self.index] += 1;
        self.storage
            .write_log
            .lock()
            .expect("lock")
            .push(LoggedWrite {
                worker: self.worker,
                first_tag_id: points
                    .first()
                    .map(|point| point.tag_id.clone())
                    .unwrap_or_default(),
            });

        Ok(())
    }

    async fn flush(&mut self) -> loadline_storage::Result<()> {
        self.inner.flush().await
    }

    async fn close(&mut self) -> loadline_storage::Result<()> {
        self.inner.close().await
    }
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

pub fn create_worker_pool(
    storage: TestStorage,
    concurrency_limit: usize,
    batch_size: usize,
) -> (JoinHandle<()>, WorkerPoolClient, CancellationToken) {
    let options = WorkerPoolOptions::new(concurrency_limit, batch_size, Duration::from_secs(10))
        .with_shutdown_poll_interval(Duration::from_millis(10));
    let pool = WorkerPool::new(options, Arc::new(storage)).expect("worker pool");

    let client = pool.client();
    let ct = CancellationToken::new();
    let task = tokio::spawn({
        let ct = ct.clone();
        async move {
            loadline_ingestor_core::run_worker_pool(pool, ct)
                .await
                .expect("worker pool run");
        }
    });

    (task, client, ct)
}

/// Generate `num_points` points, one second apart.
/// Point `i` has tag id `p{i:04}`.
pub fn generate_points(num_points: usize) -> Vec<Point> {
    let start = DateTime::from_timestamp_millis(1633046400000).expect("valid timestamp");
    (0..num_points)
        .map(|i| {
            Point::new(
                "temperature",
                format!("p{i:04}"),
                i as f64,
                start + chrono::Duration::seconds(i as i64),
            )
        })
        .collect()
}

/// Wait until `num_workers` workers opened their session and are idle.
pub async fn wait_for_idle_workers(client: &WorkerPoolClient, num_workers: usize) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while client.status().await.expect("pool status").idle_workers < num_workers {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("workers not ready in time");
}

/// Poll `condition` until it holds, panicking after a few seconds.
pub async fn wait_until(mut condition: impl FnMut() -> bool) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("condition not met in time");
}
