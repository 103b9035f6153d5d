//! The worker pool coordinator.
//!
//! The coordinator is a single background task that owns the batch queue, the
//! workers and all counters. Clients talk to it through a [`WorkerPoolClient`],
//! outcomes from the workers come back on a dedicated channel. Both are handled
//! in the same loop so scheduling decisions never race.
//!
//! Batches are handed to the first idle worker, never more than
//! `concurrency_limit` at a time. A batch that fails is dropped and accounted
//! for in its payload outcome.
use std::{
    collections::{HashMap, VecDeque},
    sync::Arc,
    time::Duration,
};

use futures::future::join_all;
use loadline_storage::{SessionFactory, SessionOptions};
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::{
    batch::{Batch, PayloadOutcome},
    error::{
        IngestorError, InvalidConfigurationSnafu, PoolClosedSnafu, Result, ShuttingDownSnafu,
    },
    worker::{OutcomeKind, WorkerCommand, WorkerHandle, WorkerId, WorkerOutcome, spawn_worker},
};

/// Worker pool configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkerPoolOptions {
    /// Number of workers, and maximum number of batches written at the same time.
    pub concurrency_limit: usize,
    /// Number of points per batch.
    pub batch_size: usize,
    /// Interval at which idle sessions flush their buffers.
    pub flush_interval: Duration,
    /// How often a draining pool checks whether all workers are idle.
    pub shutdown_poll_interval: Duration,
}

pub struct WorkerPool {
    options: WorkerPoolOptions,
    factory: Arc<dyn SessionFactory>,
    tx: mpsc::UnboundedSender<PoolRequest>,
    rx: mpsc::UnboundedReceiver<PoolRequest>,
}

#[derive(Clone)]
pub struct WorkerPoolClient {
    tx: mpsc::UnboundedSender<PoolRequest>,
}

/// Resolves once every batch of an enqueue call has been attempted.
#[derive(Debug)]
pub struct PayloadTicket {
    rx: oneshot::Receiver<Result<PayloadOutcome>>,
}

/// A snapshot of the pool state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PoolStatus {
    pub concurrency_limit: usize,
    /// Workers currently writing a batch.
    pub active_workers: usize,
    pub idle_workers: usize,
    /// Workers still opening their session.
    pub starting_workers: usize,
    /// Workers that failed to initialize or exited.
    pub unusable_workers: usize,
    pub queued_batches: usize,
    /// Enqueue calls with at least one batch not attempted yet.
    pub pending_payloads: usize,
    pub draining: bool,
}

enum PoolRequest {
    Enqueue {
        batches: Vec<Batch>,
        reply: oneshot::Sender<Result<PayloadOutcome>>,
    },
    Status {
        reply: oneshot::Sender<PoolStatus>,
    },
    Shutdown {
        reply: oneshot::Sender<()>,
    },
}

type PayloadId = u64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WorkerState {
    Starting,
    Idle,
    Busy,
    Unusable,
}

struct WorkerSlot {
    handle: WorkerHandle,
    state: WorkerState,
    in_flight: Option<InFlight>,
}

#[derive(Debug, Clone, Copy)]
struct InFlight {
    payload: PayloadId,
    sequence: usize,
    rows: usize,
}

struct QueuedBatch {
    payload: PayloadId,
    batch: Batch,
}

struct PendingPayload {
    remaining: usize,
    outcome: PayloadOutcome,
    reply: oneshot::Sender<Result<PayloadOutcome>>,
}

enum BatchResult {
    Written(usize),
    Failed(usize),
}

struct Coordinator {
    options: WorkerPoolOptions,
    workers: Vec<WorkerSlot>,
    queue: VecDeque<QueuedBatch>,
    active_workers: usize,
    payloads: HashMap<PayloadId, PendingPayload>,
    next_payload_id: PayloadId,
    draining: bool,
    _outcomes: mpsc::UnboundedSender<WorkerOutcome>,
}

pub async fn run_worker_pool(pool: WorkerPool, ct: CancellationToken) -> Result<()> {
    pool.run(ct).await
}

impl WorkerPoolOptions {
    pub fn new(concurrency_limit: usize, batch_size: usize, flush_interval: Duration) -> Self {
        Self {
            concurrency_limit,
            batch_size,
            flush_interval,
            shutdown_poll_interval: Duration::from_millis(100),
        }
    }

    /// Change how often a draining pool checks for idle workers.
    pub fn with_shutdown_poll_interval(mut self, interval: Duration) -> Self {
        self.shutdown_poll_interval = interval;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.concurrency_limit == 0 {
            return InvalidConfigurationSnafu {
                message: "concurrency limit must be a positive number",
            }
            .fail();
        }

        if self.batch_size == 0 {
            return InvalidConfigurationSnafu {
                message: "batch size must be a positive number",
            }
            .fail();
        }

        if self.flush_interval.is_zero() {
            return InvalidConfigurationSnafu {
                message: "flush interval must be positive",
            }
            .fail();
        }

        if self.shutdown_poll_interval.is_zero() {
            return InvalidConfigurationSnafu {
                message: "shutdown poll interval must be positive",
            }
            .fail();
        }

        Ok(())
    }

    pub fn session_options(&self) -> SessionOptions {
        SessionOptions::new(self.batch_size, self.flush_interval)
    }
}

impl Default for WorkerPoolOptions {
    fn default() -> Self {
        Self::new(1, 100, Duration::from_secs(10))
    }
}

impl WorkerPool {
    pub fn new(options: WorkerPoolOptions, factory: Arc<dyn SessionFactory>) -> Result<Self> {
        options.validate()?;

        let (tx, rx) = mpsc::unbounded_channel();

        Ok(Self {
            options,
            factory,
            tx,
            rx,
        })
    }

    pub fn options(&self) -> &WorkerPoolOptions {
        &self.options
    }

    pub fn client(&self) -> WorkerPoolClient {
        WorkerPoolClient {
            tx: self.tx.clone(),
        }
    }

    async fn run(self, ct: CancellationToken) -> Result<()> {
        let WorkerPool {
            options,
            factory,
            tx,
            mut rx,
        } = self;

        // The request channel closes once every client is gone.
        drop(tx);

        let (outcome_tx, mut outcome_rx) = mpsc::unbounded_channel();
        let mut coordinator = Coordinator::start(options, factory, outcome_tx);
        let mut shutdown_waiters = Vec::new();
        let mut requests_open = true;
        let mut poll = tokio::time::interval(options.shutdown_poll_interval);

        info!(
            concurrency_limit = options.concurrency_limit,
            batch_size = options.batch_size,
            flush_interval_ms = options.flush_interval.as_millis() as u64,
            "Worker pool started"
        );

        loop {
            tokio::select! {
                _ = ct.cancelled(), if !coordinator.draining => {
                    coordinator.start_draining("cancelled");
                }
                request = rx.recv(), if requests_open => {
                    match request {
                        None => {
                            requests_open = false;
                            coordinator.start_draining("all clients dropped");
                        }
                        Some(PoolRequest::Enqueue { batches, reply }) => {
                            coordinator.enqueue(batches, reply);
                        }
                        Some(PoolRequest::Status { reply }) => {
                            let _ = reply.send(coordinator.status());
                        }
                        Some(PoolRequest::Shutdown { reply }) => {
                            shutdown_waiters.push(reply);
                            coordinator.start_draining("shutdown requested");
                        }
                    }
                }
                outcome = outcome_rx.recv() => {
                    // The coordinator keeps a sender alive, the channel never closes here.
                    if let Some(outcome) = outcome {
                        coordinator.handle_outcome(outcome);
                    }
                }
                _ = poll.tick(), if coordinator.draining => {
                    if coordinator.is_drained() {
                        break;
                    }
                }
            }
        }

        coordinator.terminate().await;

        for waiter in shutdown_waiters {
            let _ = waiter.send(());
        }

        Ok(())
    }
}

impl WorkerPoolClient {
    /// Queue the batches of one payload.
    ///
    /// Never waits for the pool. The returned ticket resolves once all
    /// batches have been attempted.
    pub fn enqueue(&self, batches: Vec<Batch>) -> Result<PayloadTicket> {
        let (tx, rx) = oneshot::channel();

        self.tx
            .send(PoolRequest::Enqueue { batches, reply: tx })
            .or_else(|_| PoolClosedSnafu {}.fail())?;

        Ok(PayloadTicket { rx })
    }

    /// Queue the batches and wait for their outcome.
    pub async fn write(&self, batches: Vec<Batch>) -> Result<PayloadOutcome> {
        self.enqueue(batches)?.wait().await
    }

    pub async fn status(&self) -> Result<PoolStatus> {
        let (tx, rx) = oneshot::channel();

        self.tx
            .send(PoolRequest::Status { reply: tx })
            .or_else(|_| PoolClosedSnafu {}.fail())?;

        rx.await.or_else(|_| PoolClosedSnafu {}.fail())
    }

    /// Stop accepting batches and wait until the pool terminated.
    ///
    /// Returns immediately if the pool is already gone.
    pub async fn shutdown(&self) {
        let (tx, rx) = oneshot::channel();

        if self.tx.send(PoolRequest::Shutdown { reply: tx }).is_err() {
            return;
        }

        let _ = rx.await;
    }
}

impl PayloadTicket {
    pub async fn wait(self) -> Result<PayloadOutcome> {
        self.rx.await.or_else(|_| PoolClosedSnafu {}.fail())?
    }
}

impl Coordinator {
    fn start(
        options: WorkerPoolOptions,
        factory: Arc<dyn SessionFactory>,
        outcomes: mpsc::UnboundedSender<WorkerOutcome>,
    ) -> Self {
        let session_options = options.session_options();

        let workers = (1..=options.concurrency_limit)
            .map(|id| {
                let handle = spawn_worker(WorkerId(id), factory.clone(), outcomes.clone());
                let state = if handle.send(WorkerCommand::Init(session_options)) {
                    WorkerState::Starting
                } else {
                    WorkerState::Unusable
                };

                WorkerSlot {
                    handle,
                    state,
                    in_flight: None,
                }
            })
            .collect();

        Self {
            options,
            workers,
            queue: VecDeque::new(),
            active_workers: 0,
            payloads: HashMap::new(),
            next_payload_id: 0,
            draining: false,
            _outcomes: outcomes,
        }
    }

    fn enqueue(&mut self, batches: Vec<Batch>, reply: oneshot::Sender<Result<PayloadOutcome>>) {
        if self.draining {
            let _ = reply.send(ShuttingDownSnafu {}.fail());
            return;
        }

        if batches.is_empty() {
            let _ = reply.send(Ok(PayloadOutcome::default()));
            return;
        }

        if self.has_no_usable_worker() {
            let _ = reply.send(Err(IngestorError::NoUsableWorkers {
                num_batches: batches.len(),
            }));
            return;
        }

        let payload = self.next_payload_id;
        self.next_payload_id += 1;

        debug!(payload, num_batches = batches.len(), "Payload queued");

        self.payloads.insert(
            payload,
            PendingPayload {
                remaining: batches.len(),
                outcome: PayloadOutcome {
                    batches: batches.len(),
                    ..Default::default()
                },
                reply,
            },
        );

        self.queue.extend(
            batches
                .into_iter()
                .map(|batch| QueuedBatch { payload, batch }),
        );

        self.drain_and_schedule();
    }

    fn handle_outcome(&mut self, outcome: WorkerOutcome) {
        let WorkerOutcome { worker, kind } = outcome;
        let Some(index) = worker.0.checked_sub(1).filter(|i| *i < self.workers.len()) else {
            warn!(%worker, "Outcome from unknown worker");
            return;
        };

        match kind {
            OutcomeKind::Ready => {
                let slot = &mut self.workers[index];
                if slot.state == WorkerState::Starting {
                    debug!(%worker, "Worker ready");
                    slot.state = WorkerState::Idle;
                }
            }
            OutcomeKind::InitializationFailed { error } => {
                let error = IngestorError::WorkerInitialization {
                    worker,
                    message: error,
                };
                error!(%error, "Worker is unusable");
                self.workers[index].state = WorkerState::Unusable;
            }
            OutcomeKind::Done { rows } => {
                self.finish_in_flight(index, BatchResult::Written(rows));
                self.workers[index].state = WorkerState::Idle;
            }
            OutcomeKind::WriteFailed { rows, error } => {
                let error = IngestorError::WriteFailure {
                    worker,
                    message: error,
                };
                warn!(%error, rows, "Batch dropped");
                self.finish_in_flight(index, BatchResult::Failed(rows));
                self.workers[index].state = WorkerState::Idle;
            }
            OutcomeKind::Exited => {
                let state = self.workers[index].state;
                if let Some(in_flight) = self.workers[index].in_flight {
                    warn!(
                        %worker,
                        sequence = in_flight.sequence,
                        rows = in_flight.rows,
                        "Worker exited while writing, batch dropped"
                    );
                    self.finish_in_flight(index, BatchResult::Failed(in_flight.rows));
                } else if state != WorkerState::Unusable {
                    warn!(%worker, "Worker exited");
                }
                self.workers[index].state = WorkerState::Unusable;
            }
        }

        self.drain_and_schedule();
    }

    fn finish_in_flight(&mut self, index: usize, result: BatchResult) {
        let Some(in_flight) = self.workers[index].in_flight.take() else {
            return;
        };

        self.active_workers = self.active_workers.saturating_sub(1);
        self.complete_batch(in_flight.payload, result);
    }

    fn complete_batch(&mut self, payload: PayloadId, result: BatchResult) {
        let Some(pending) = self.payloads.get_mut(&payload) else {
            return;
        };

        match result {
            BatchResult::Written(rows) => pending.outcome.rows_written += rows,
            BatchResult::Failed(rows) => {
                pending.outcome.rows_failed += rows;
                pending.outcome.failed_batches += 1;
            }
        }

        pending.remaining -= 1;
        if pending.remaining > 0 {
            return;
        }

        if let Some(pending) = self.payloads.remove(&payload) {
            debug!(payload, outcome = ?pending.outcome, "Payload completed");
            let _ = pending.reply.send(Ok(pending.outcome));
        }
    }

    /// Hand queued batches to idle workers, up to the concurrency limit.
    fn drain_and_schedule(&mut self) {
        while self.active_workers < self.options.concurrency_limit {
            let Some(queued) = self.queue.pop_front() else {
                break;
            };

            let Some(index) = self
                .workers
                .iter()
                .position(|slot| slot.state == WorkerState::Idle)
            else {
                self.queue.push_front(queued);
                break;
            };

            let QueuedBatch { payload, batch } = queued;
            let in_flight = InFlight {
                payload,
                sequence: batch.sequence,
                rows: batch.len(),
            };

            let slot = &mut self.workers[index];
            if !slot.handle.send(WorkerCommand::Write(batch)) {
                warn!(worker = %slot.handle.id(), "Worker is gone, batch dropped");
                slot.state = WorkerState::Unusable;
                self.complete_batch(payload, BatchResult::Failed(in_flight.rows));
                continue;
            }

            slot.state = WorkerState::Busy;
            slot.in_flight = Some(in_flight);
            self.active_workers += 1;

            debug_assert!(self.active_workers <= self.options.concurrency_limit);
        }

        self.abandon_if_unservable();
    }

    /// Drop queued batches if no worker will ever pick them up.
    fn abandon_if_unservable(&mut self) {
        if self.queue.is_empty() || !self.has_no_usable_worker() {
            return;
        }

        let mut dropped: HashMap<PayloadId, usize> = HashMap::new();
        for queued in self.queue.drain(..) {
            *dropped.entry(queued.payload).or_default() += 1;
        }

        error!(
            num_batches = dropped.values().sum::<usize>(),
            "No usable workers left, dropping queued batches"
        );

        for (payload, num_batches) in dropped {
            if let Some(pending) = self.payloads.remove(&payload) {
                let _ = pending
                    .reply
                    .send(Err(IngestorError::NoUsableWorkers { num_batches }));
            }
        }
    }

    fn has_no_usable_worker(&self) -> bool {
        self.workers
            .iter()
            .all(|slot| slot.state == WorkerState::Unusable)
    }

    fn start_draining(&mut self, reason: &'static str) {
        if self.draining {
            return;
        }

        info!(
            reason,
            queued_batches = self.queue.len(),
            active_workers = self.active_workers,
            "Worker pool draining"
        );
        self.draining = true;
    }

    fn is_drained(&self) -> bool {
        self.active_workers == 0 && (self.queue.is_empty() || self.has_no_usable_worker())
    }

    async fn terminate(&mut self) {
        self.queue.clear();
        for (_, pending) in self.payloads.drain() {
            let _ = pending.reply.send(ShuttingDownSnafu {}.fail());
        }

        for slot in &self.workers {
            slot.handle.send(WorkerCommand::Destroy);
        }

        join_all(self.workers.drain(..).map(|slot| slot.handle.join())).await;

        info!("Worker pool terminated");
    }

    fn status(&self) -> PoolStatus {
        let count = |state| {
            self.workers
                .iter()
                .filter(|slot| slot.state == state)
                .count()
        };

        PoolStatus {
            concurrency_limit: self.options.concurrency_limit,
            active_workers: self.active_workers,
            idle_workers: count(WorkerState::Idle),
            starting_workers: count(WorkerState::Starting),
            unusable_workers: count(WorkerState::Unusable),
            queued_batches: self.queue.len(),
            pending_payloads: self.payloads.len(),
            draining: self.draining,
        }
    }
}
