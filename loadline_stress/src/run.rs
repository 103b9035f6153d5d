use std::{ops::RangeInclusive, time::Duration};

use chrono::Utc;
use loadline_push_client::{HttpWriteClient, RetryPolicy};
use snafu::ResultExt;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::{
    error::{Result, WriteClientSnafu},
    generators::{BatchCursor, SampleGenerator},
    log::{ReportEntry, ReportLog},
    memory::MemorySampler,
};

pub struct BatchRun {
    pub rows_per_request: RangeInclusive<usize>,
    pub requests: u64,
    pub request_interval: Duration,
    pub retry: RetryPolicy,
}

/// Send historical data, walking forward in time one payload at a time.
///
/// Overloaded requests are retried following the overload retry protocol,
/// other failures are logged and the run continues with the next payload.
/// Memory is sampled after every successful request.
pub async fn run_batch(
    client: &HttpWriteClient,
    generator: &mut SampleGenerator,
    mut cursor: BatchCursor,
    run: BatchRun,
    log: &ReportLog,
    memory: &mut MemorySampler,
    ct: &CancellationToken,
) -> Result<()> {
    for request in 1..=run.requests {
        if ct.is_cancelled() {
            break;
        }

        let rows = generator.rows(&run.rows_per_request);
        let points = cursor.next_payload(generator, rows);
        let data_range = match (points.first(), points.last()) {
            (Some(first), Some(last)) => (first.timestamp, last.timestamp),
            _ => continue,
        };

        info!(request, rows, data_start = %data_range.0, "Sending payload");

        let result = tokio::select! {
            _ = ct.cancelled() => break,
            result = client.write_with_retry(&points, &run.retry) => result,
        };

        match result {
            Ok(report) => {
                let entry = ReportEntry::new(request, rows, data_range, report, memory.sample());
                println!("{entry}");
                log.append(&entry).await?;
            }
            Err(err) => {
                warn!(request, error = %err, "Payload not written");
            }
        }

        tokio::select! {
            _ = ct.cancelled() => break,
            _ = tokio::time::sleep(run.request_interval) => {}
        }
    }

    Ok(())
}

/// Send one reading per measurement every `interval`, timestamped now.
///
/// Runs until cancelled, or for `requests` requests if set.
pub async fn run_realtime(
    client: HttpWriteClient,
    mut generator: SampleGenerator,
    interval: Duration,
    requests: Option<u64>,
    ct: CancellationToken,
) -> Result<()> {
    let mut ticker = tokio::time::interval(interval.max(Duration::from_millis(1)));
    let mut sent = 0;

    loop {
        if requests.is_some_and(|requests| sent >= requests) {
            break;
        }

        tokio::select! {
            _ = ct.cancelled() => break,
            _ = ticker.tick() => {}
        }

        let points = generator.sample(Utc::now());
        sent += 1;

        match client.write_data(&points).await {
            Ok(report) => {
                info!(
                    request = sent,
                    rows = report.rows_received,
                    process_time = report.process_time,
                    "Sample written"
                );
            }
            Err(err) => {
                warn!(request = sent, error = %err, "Sample not written");
            }
        }
    }

    Ok(())
}

/// Check the server is reachable before starting a run.
pub async fn check_server(client: &HttpWriteClient) -> Result<()> {
    let status = client.status().await.context(WriteClientSnafu {})?;
    info!(url = client.base_url(), ?status, "Server reachable");
    Ok(())
}
