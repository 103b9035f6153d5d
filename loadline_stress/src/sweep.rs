//! Benchmark sweeps.
//!
//! A sweep starts a fresh `loadline serve` process for every configuration,
//! runs batch mode against it and stops it again. Reports of all
//! configurations end up in the same log.
use std::{path::Path, process::Stdio, time::Duration};

use chrono::{DateTime, Utc};
use loadline_push_client::{HttpWriteClient, RetryPolicy, ServerStatus};
use serde::{Deserialize, Serialize};
use snafu::ResultExt;
use tokio::process::{Child, Command};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::{
    error::{Result, SpawnServerSnafu, SweepConfigDecodeSnafu, SweepConfigReadSnafu},
    generators::{BatchCursor, SampleGenerator},
    log::ReportLog,
    memory::MemorySampler,
    run::{BatchRun, run_batch},
};

/// Requests sent to each configuration of the default matrix.
pub const DEFAULT_REQUESTS: u64 = 20;

/// Rows per request, with the batch sizes and concurrency limits tried for it.
const MATRIX: [(usize, [usize; 4], [usize; 4]); 5] = [
    (10_000, [100, 500, 1_000, 5_000], [1, 2, 5, 10]),
    (50_000, [500, 1_000, 5_000, 10_000], [2, 5, 10, 20]),
    (250_000, [1_000, 5_000, 10_000, 25_000], [5, 10, 20, 50]),
    (500_000, [5_000, 10_000, 25_000, 50_000], [10, 20, 50, 100]),
    (1_000_000, [10_000, 25_000, 50_000, 100_000], [20, 50, 100, 200]),
];

const STATUS_POLL_INTERVAL: Duration = Duration::from_millis(250);

/// One server configuration and the load sent to it.
///
/// Uses the key names of the environment variables the server reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub struct SweepConfig {
    pub concurrency_limit: usize,
    pub batch_size: usize,
    pub rows_received: usize,
    pub requests: u64,
}

/// How to start and stop the server under test.
#[derive(Debug, Clone)]
pub struct ServerCommand {
    pub program: String,
    /// Arguments passed after `serve`.
    pub args: Vec<String>,
    pub startup_timeout: Duration,
    pub stop_timeout: Duration,
}

pub struct SweepRun {
    pub configs: Vec<SweepConfig>,
    pub server: ServerCommand,
    pub start: DateTime<Utc>,
    pub step: chrono::Duration,
    pub request_interval: Duration,
    pub retry: RetryPolicy,
    pub influx_pid: Option<u32>,
}

/// Every combination of rows per request, batch size and concurrency limit.
pub fn default_matrix(requests: u64) -> Vec<SweepConfig> {
    MATRIX
        .iter()
        .flat_map(|(rows_received, batch_sizes, concurrency_limits)| {
            batch_sizes.iter().flat_map(move |batch_size| {
                concurrency_limits
                    .iter()
                    .map(move |concurrency_limit| SweepConfig {
                        concurrency_limit: *concurrency_limit,
                        batch_size: *batch_size,
                        rows_received: *rows_received,
                        requests,
                    })
            })
        })
        .collect()
}

/// Read configurations from a JSON array.
pub async fn load_configs(path: &Path) -> Result<Vec<SweepConfig>> {
    let path_str = path.display().to_string();

    let content = tokio::fs::read(path).await.context(SweepConfigReadSnafu {
        path: path_str.clone(),
    })?;

    serde_json::from_slice(&content).context(SweepConfigDecodeSnafu { path: path_str })
}

pub async fn run_sweep(
    client: &HttpWriteClient,
    generator: &mut SampleGenerator,
    sweep: SweepRun,
    log: &ReportLog,
    ct: &CancellationToken,
) -> Result<()> {
    let total = sweep.configs.len();

    for (index, config) in sweep.configs.iter().enumerate() {
        if ct.is_cancelled() {
            break;
        }

        info!(
            config = index + 1,
            total,
            concurrency_limit = config.concurrency_limit,
            batch_size = config.batch_size,
            rows_received = config.rows_received,
            requests = config.requests,
            "Running configuration"
        );

        let mut server = sweep.server.spawn(config)?;

        let ready = tokio::select! {
            _ = ct.cancelled() => false,
            ready = wait_for_server(client, sweep.server.startup_timeout) => ready,
        };

        if !ready {
            if !ct.is_cancelled() {
                error!(config = index + 1, "Server is not ready, skipping configuration");
            }
            stop_server(&mut server, sweep.server.stop_timeout).await;
            continue;
        }

        let mut memory = MemorySampler::new(server.id(), sweep.influx_pid);
        let run = BatchRun {
            rows_per_request: config.rows_received..=config.rows_received,
            requests: config.requests,
            request_interval: sweep.request_interval,
            retry: sweep.retry,
        };
        let cursor = BatchCursor::new(sweep.start, sweep.step);

        let result = run_batch(client, generator, cursor, run, log, &mut memory, ct).await;

        stop_server(&mut server, sweep.server.stop_timeout).await;
        result?;
    }

    info!(total, "Sweep completed");

    Ok(())
}

impl ServerCommand {
    fn spawn(&self, config: &SweepConfig) -> Result<Child> {
        Command::new(&self.program)
            .arg("serve")
            .args(&self.args)
            .env("CONCURRENCY_LIMIT", config.concurrency_limit.to_string())
            .env("BATCH_SIZE", config.batch_size.to_string())
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .context(SpawnServerSnafu {
                program: self.program.clone(),
            })
    }
}

/// Whether the server reported ready before `timeout`.
async fn wait_for_server(client: &HttpWriteClient, timeout: Duration) -> bool {
    tokio::time::timeout(timeout, async {
        loop {
            if let Ok(ServerStatus::Ready) = client.status().await {
                return;
            }
            tokio::time::sleep(STATUS_POLL_INTERVAL).await;
        }
    })
    .await
    .is_ok()
}

/// Interrupt the server so it drains its workers, kill it if it does not exit in time.
async fn stop_server(server: &mut Child, timeout: Duration) {
    #[cfg(unix)]
    {
        if let Some(pid) = server.id() {
            let interrupted = Command::new("kill")
                .args(["-INT", &pid.to_string()])
                .status()
                .await
                .is_ok_and(|status| status.success());

            if interrupted {
                match tokio::time::timeout(timeout, server.wait()).await {
                    Ok(Ok(status)) => {
                        info!(%status, "Server stopped");
                        return;
                    }
                    Ok(Err(err)) => warn!(error = %err, "Failed to wait for server"),
                    Err(_) => warn!("Server did not stop in time, killing it"),
                }
            }
        }
    }

    if let Err(err) = server.kill().await {
        warn!(error = %err, "Failed to kill server");
    }
}
