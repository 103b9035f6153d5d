//! Writer workers.
//!
//! A worker is a background task that owns one storage session. It receives
//! commands from the pool and reports the outcome of every command on a shared
//! outcome channel. Between commands, the worker flushes its session
//! periodically so that buffered points are not kept around indefinitely.
use std::{fmt, sync::Arc};

use loadline_storage::{SessionFactory, SessionOptions, StorageError, WriteSession};
use tokio::{
    sync::mpsc,
    task::JoinHandle,
    time::{Instant, Interval, MissedTickBehavior},
};
use tracing::{debug, warn};

use crate::batch::Batch;

/// Identifier of a worker inside its pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct WorkerId(pub usize);

/// Commands sent from the pool to a worker.
#[derive(Debug)]
pub enum WorkerCommand {
    /// Open the storage session.
    Init(SessionOptions),
    /// Write the batch and flush it.
    Write(Batch),
    /// Close the session and exit.
    Destroy,
}

/// A message sent from a worker to the pool.
#[derive(Debug, Clone, PartialEq)]
pub struct WorkerOutcome {
    pub worker: WorkerId,
    pub kind: OutcomeKind,
}

#[derive(Debug, Clone, PartialEq)]
pub enum OutcomeKind {
    /// The session is open, the worker accepts batches.
    Ready,
    /// The session could not be opened.
    InitializationFailed { error: String },
    /// The batch was written and flushed.
    Done { rows: usize },
    /// The batch was dropped.
    WriteFailed { rows: usize, error: String },
    /// The worker task terminated, either after `Destroy` or abnormally.
    Exited,
}

/// Pool side of a worker.
#[derive(Debug)]
pub struct WorkerHandle {
    id: WorkerId,
    commands: mpsc::UnboundedSender<WorkerCommand>,
    task: JoinHandle<()>,
}

struct Worker {
    id: WorkerId,
    factory: Arc<dyn SessionFactory>,
    commands: mpsc::UnboundedReceiver<WorkerCommand>,
    outcomes: mpsc::UnboundedSender<WorkerOutcome>,
    session: Option<Box<dyn WriteSession>>,
    flush_timer: Option<Interval>,
}

/// Reports `Exited` when the worker task ends, including on panic.
struct ExitGuard {
    id: WorkerId,
    outcomes: mpsc::UnboundedSender<WorkerOutcome>,
}

/// Spawn a new worker in the background.
///
/// The worker does nothing until it receives [`WorkerCommand::Init`].
pub fn spawn_worker(
    id: WorkerId,
    factory: Arc<dyn SessionFactory>,
    outcomes: mpsc::UnboundedSender<WorkerOutcome>,
) -> WorkerHandle {
    let (tx, rx) = mpsc::unbounded_channel();

    let worker = Worker {
        id,
        factory,
        commands: rx,
        outcomes,
        session: None,
        flush_timer: None,
    };

    let task = tokio::spawn(worker.run());

    WorkerHandle {
        id,
        commands: tx,
        task,
    }
}

impl WorkerHandle {
    pub fn id(&self) -> WorkerId {
        self.id
    }

    /// Send a command to the worker.
    ///
    /// Returns false if the worker has exited.
    pub fn send(&self, command: WorkerCommand) -> bool {
        self.commands.send(command).is_ok()
    }

    /// Wait for the worker task to terminate.
    pub async fn join(self) {
        if let Err(err) = self.task.await {
            warn!(worker = %self.id, error = %err, "Writer worker terminated abnormally");
        }
    }
}

impl Worker {
    async fn run(mut self) {
        let _exit_guard = ExitGuard {
            id: self.id,
            outcomes: self.outcomes.clone(),
        };

        loop {
            tokio::select! {
                command = self.commands.recv() => {
                    match command {
                        Some(WorkerCommand::Init(options)) => self.init(options).await,
                        Some(WorkerCommand::Write(batch)) => self.write(batch).await,
                        Some(WorkerCommand::Destroy) | None => break,
                    }
                }
                _ = next_tick(&mut self.flush_timer) => {
                    self.periodic_flush().await;
                }
            }
        }

        self.close().await;
    }

    async fn init(&mut self, options: SessionOptions) {
        if self.session.is_some() {
            self.report(OutcomeKind::Ready);
            return;
        }

        let options = options.with_worker(self.id.0);

        match self.factory.open_session(options).await {
            Ok(session) => {
                debug!(worker = %self.id, "Storage session opened");
                self.session = Some(session);
                self.flush_timer = Some(flush_timer(options));
                self.report(OutcomeKind::Ready);
            }
            Err(err) => {
                warn!(worker = %self.id, error = %err, "Failed to open storage session");
                self.report(OutcomeKind::InitializationFailed {
                    error: err.to_string(),
                });
            }
        }
    }

    async fn write(&mut self, batch: Batch) {
        let rows = batch.len();

        let Some(session) = self.session.as_mut() else {
            self.report(OutcomeKind::WriteFailed {
                rows,
                error: StorageError::SessionClosed.to_string(),
            });
            return;
        };

        let result = match session.write_points(&batch.points).await {
            Ok(()) => session.flush().await,
            Err(err) => Err(err),
        };

        match result {
            Ok(()) => self.report(OutcomeKind::Done { rows }),
            Err(err) => {
                warn!(
                    worker = %self.id,
                    sequence = batch.sequence,
                    rows,
                    error = %err,
                    "Failed to write batch"
                );
                self.report(OutcomeKind::WriteFailed {
                    rows,
                    error: err.to_string(),
                });
            }
        }
    }

    async fn periodic_flush(&mut self) {
        let Some(session) = self.session.as_mut() else {
            return;
        };

        if let Err(err) = session.flush().await {
            warn!(worker = %self.id, error = %err, "Periodic flush failed");
        }
    }

    async fn close(&mut self) {
        self.flush_timer = None;

        let Some(mut session) = self.session.take() else {
            return;
        };

        match session.close().await {
            Ok(()) => debug!(worker = %self.id, "Storage session closed"),
            Err(err) => warn!(worker = %self.id, error = %err, "Failed to close storage session"),
        }
    }

    fn report(&self, kind: OutcomeKind) {
        // The pool is gone if this fails, nobody is waiting for the outcome.
        let _ = self.outcomes.send(WorkerOutcome {
            worker: self.id,
            kind,
        });
    }
}

impl Drop for ExitGuard {
    fn drop(&mut self) {
        let _ = self.outcomes.send(WorkerOutcome {
            worker: self.id,
            kind: OutcomeKind::Exited,
        });
    }
}

fn flush_timer(options: SessionOptions) -> Interval {
    let period = options.flush_interval;
    let mut timer = tokio::time::interval_at(Instant::now() + period, period);
    timer.set_missed_tick_behavior(MissedTickBehavior::Delay);
    timer
}

async fn next_tick(timer: &mut Option<Interval>) {
    match timer {
        Some(timer) => {
            timer.tick().await;
        }
        None => std::future::pending().await,
    }
}

impl fmt::Display for WorkerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use loadline_storage::MemoryStorage;

    use super::*;
    use crate::test_utils::generate_points;

    async fn next_outcome(rx: &mut mpsc::UnboundedReceiver<WorkerOutcome>) -> OutcomeKind {
        rx.recv().await.expect("outcome channel open").kind
    }

    #[tokio::test]
    async fn test_write_before_init_fails() {
        let storage = MemoryStorage::new();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let worker = spawn_worker(WorkerId(0), Arc::new(storage.clone()), tx);

        assert!(worker.send(WorkerCommand::Write(Batch::new(0, generate_points(5)))));
        assert!(matches!(
            next_outcome(&mut rx).await,
            OutcomeKind::WriteFailed { rows: 5, .. }
        ));
        assert_eq!(storage.num_points().await, 0);

        assert!(worker.send(WorkerCommand::Destroy));
        assert_eq!(next_outcome(&mut rx).await, OutcomeKind::Exited);
        worker.join().await;
    }

    #[tokio::test]
    async fn test_write_is_flushed_before_done() {
        let storage = MemoryStorage::new();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let worker = spawn_worker(WorkerId(3), Arc::new(storage.clone()), tx);

        worker.send(WorkerCommand::Init(SessionOptions::new(
            1000,
            Duration::from_secs(10),
        )));
        assert_eq!(next_outcome(&mut rx).await, OutcomeKind::Ready);

        worker.send(WorkerCommand::Write(Batch::new(0, generate_points(10))));
        assert_eq!(next_outcome(&mut rx).await, OutcomeKind::Done { rows: 10 });
        assert_eq!(storage.num_points().await, 10);
        assert_eq!(storage.sessions_opened(), 1);

        worker.send(WorkerCommand::Destroy);
        assert_eq!(next_outcome(&mut rx).await, OutcomeKind::Exited);
        worker.join().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_destroy_after_init_exits() {
        let storage = MemoryStorage::new();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let worker = spawn_worker(WorkerId(1), Arc::new(storage.clone()), tx);

        worker.send(WorkerCommand::Init(SessionOptions::new(
            10,
            Duration::from_millis(50),
        )));
        assert_eq!(next_outcome(&mut rx).await, OutcomeKind::Ready);

        // Let a few flush ticks go by with nothing buffered.
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(storage.flushes(), 0);

        worker.send(WorkerCommand::Destroy);
        assert_eq!(next_outcome(&mut rx).await, OutcomeKind::Exited);
        worker.join().await;
        assert!(!worker_is_alive(&mut rx));
    }

    #[tokio::test]
    async fn test_dropping_handle_exits_worker() {
        let storage = MemoryStorage::new();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let worker = spawn_worker(WorkerId(2), Arc::new(storage), tx);
        let WorkerHandle { commands, task, .. } = worker;

        drop(commands);
        task.await.unwrap();
        assert_eq!(next_outcome(&mut rx).await, OutcomeKind::Exited);
    }

    fn worker_is_alive(rx: &mut mpsc::UnboundedReceiver<WorkerOutcome>) -> bool {
        // All senders are dropped once the worker task is gone.
        !matches!(
            rx.try_recv(),
            Err(mpsc::error::TryRecvError::Disconnected)
        )
    }
}
