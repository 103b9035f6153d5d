use std::{path::PathBuf, time::Duration};

use clap::{Parser, ValueEnum};
use loadline_push_client::{HttpWriteClient, RetryPolicy};
use snafu::ResultExt;
use tokio_util::sync::CancellationToken;

use crate::{
    error::{
        InvalidRangeSnafu, InvalidStartTimeSnafu, ObservabilitySnafu, Result, WriteClientSnafu,
    },
    generators::{BatchCursor, SampleGenerator},
    helpers::{parse_range, parse_start_time},
    log::ReportLog,
    memory::MemorySampler,
    run::{BatchRun, check_server, run_batch, run_realtime},
    sweep::{DEFAULT_REQUESTS, ServerCommand, SweepRun, default_matrix, load_configs, run_sweep},
};

mod error;
mod generators;
mod helpers;
mod log;
mod memory;
mod run;
mod sweep;

#[derive(Copy, Clone, PartialEq, Eq, ValueEnum, Debug)]
enum Mode {
    /// Send historical data, payload after payload.
    Batch,
    /// Send one reading per measurement at a fixed interval.
    Realtime,
    /// Start a server for each configuration of a matrix and run batch mode against it.
    Sweep,
}

#[derive(Parser)]
#[command(name = "loadline-stress")]
#[command(about = "Loadline load generator")]
#[command(version)]
struct Cli {
    /// Address of the loadline server.
    #[arg(long, default_value = "http://127.0.0.1:3000")]
    http_address: String,
    #[arg(long, value_enum, default_value_t = Mode::Batch)]
    mode: Mode,
    /// Number of points per request.
    ///
    /// Either provide a number (e.g. 1000) or a range (e.g. 1000-2000).
    #[arg(long, default_value = "1000")]
    rows_per_request: String,
    /// Number of requests to send. Realtime mode runs until interrupted if omitted.
    ///
    /// In sweep mode, the number of requests per configuration of the default matrix.
    #[arg(long)]
    requests: Option<u64>,
    /// Pause between requests, in milliseconds.
    #[arg(long, default_value_t = 1000)]
    request_interval_ms: u64,
    /// Timestamp of the first generated sample, in batch mode.
    #[arg(long, default_value = "2021-10-01")]
    start: String,
    /// Time between generated samples, in batch mode, in milliseconds.
    #[arg(long, default_value_t = 1000)]
    step_ms: i64,
    /// Interval between status checks while the server is overloaded, in milliseconds.
    #[arg(long, default_value_t = 15_000)]
    status_poll_interval_ms: u64,
    /// Pause after a failed request, in milliseconds.
    #[arg(long, default_value_t = 15_000)]
    failure_pause_ms: u64,
    /// File receiving one JSON line per successful request.
    #[arg(long, default_value = "clientLogs.txt")]
    log_file: String,
    /// Seed of the random generator.
    #[arg(long)]
    seed: Option<u64>,
    /// PID of the server, its memory is logged with every report.
    #[arg(long)]
    server_pid: Option<u32>,
    /// PID of InfluxDB, its memory is logged with every report.
    #[arg(long)]
    influx_pid: Option<u32>,
    /// JSON array of sweep configurations. Defaults to the built-in matrix.
    #[arg(long)]
    sweep_configs: Option<PathBuf>,
    /// Server binary started by sweep mode.
    #[arg(long, default_value = "loadline")]
    server_bin: String,
    /// Extra argument passed to `serve` in sweep mode. Can be repeated.
    #[arg(long = "server-arg", allow_hyphen_values = true)]
    server_args: Vec<String>,
    /// Time a sweep server has to report ready, in milliseconds.
    #[arg(long, default_value_t = 5_000)]
    server_startup_timeout_ms: u64,
}

#[tokio::main]
#[snafu::report]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    loadline_observability::init_observability(env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION"))
        .context(ObservabilitySnafu {})?;

    let ct = CancellationToken::new();

    tokio::spawn({
        let ct = ct.clone();
        async move {
            let _ = tokio::signal::ctrl_c().await;
            ct.cancel();
        }
    });

    let rows_per_request = parse_range(&cli.rows_per_request).context(InvalidRangeSnafu {})?;
    let start = parse_start_time(&cli.start).context(InvalidStartTimeSnafu {})?;
    let client = HttpWriteClient::new(&cli.http_address).context(WriteClientSnafu {})?;
    let mut generator = SampleGenerator::new(cli.seed);
    let request_interval = Duration::from_millis(cli.request_interval_ms);

    println!("Running load generator");
    println!("  Server: {}", client.base_url());
    println!("  Mode: {:?}", cli.mode);

    let retry = RetryPolicy::new(
        Duration::from_millis(cli.status_poll_interval_ms),
        Duration::from_millis(cli.failure_pause_ms),
    );
    let step = chrono::Duration::milliseconds(cli.step_ms.max(1));
    let log = ReportLog::new(&cli.log_file);

    match cli.mode {
        Mode::Batch => {
            check_server(&client).await?;

            println!("  Rows per request: {:?}", rows_per_request);
            println!("  Start: {}", start);
            println!("  Log file: {}", cli.log_file);

            let run = BatchRun {
                rows_per_request,
                requests: cli.requests.unwrap_or(10),
                request_interval,
                retry,
            };
            let mut memory = MemorySampler::new(cli.server_pid, cli.influx_pid);

            run_batch(
                &client,
                &mut generator,
                BatchCursor::new(start, step),
                run,
                &log,
                &mut memory,
                &ct,
            )
            .await
        }
        Mode::Realtime => {
            check_server(&client).await?;

            run_realtime(client, generator, request_interval, cli.requests, ct).await
        }
        Mode::Sweep => {
            let configs = match &cli.sweep_configs {
                Some(path) => load_configs(path).await?,
                None => default_matrix(cli.requests.unwrap_or(DEFAULT_REQUESTS)),
            };

            println!("  Configurations: {}", configs.len());
            println!("  Server command: {} serve {}", cli.server_bin, cli.server_args.join(" "));
            println!("  Log file: {}", cli.log_file);

            let sweep = SweepRun {
                configs,
                server: ServerCommand {
                    program: cli.server_bin.clone(),
                    args: cli.server_args.clone(),
                    startup_timeout: Duration::from_millis(cli.server_startup_timeout_ms),
                    stop_timeout: Duration::from_secs(30),
                },
                start,
                step,
                request_interval,
                retry,
                influx_pid: cli.influx_pid,
            };

            run_sweep(&client, &mut generator, sweep, &log, &ct).await
        }
    }
}
