//! Write admission.
//!
//! The ingress checks the memory gate, splits the payload into batches, hands
//! them to the worker pool and builds the write report once every batch has
//! been attempted.
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use loadline_observability::KeyValue;
use loadline_storage::Point;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::{
    batch::{Batch, PayloadOutcome},
    error::{OverloadedSnafu, Result},
    memory::MemoryGate,
    metrics::IngestionMetrics,
    pool::{WorkerPoolClient, WorkerPoolOptions},
    telemetry::TelemetryLog,
};

const REPORT_TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Parameters echoed in every write report.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IngressOptions {
    pub concurrency_limit: usize,
    pub batch_size: usize,
    pub flush_interval: Duration,
}

#[derive(Clone)]
pub struct Ingress {
    options: IngressOptions,
    memory_gate: MemoryGate,
    pool: WorkerPoolClient,
    telemetry: TelemetryLog,
    metrics: IngestionMetrics,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServerStatus {
    Ready,
    Overloaded,
}

/// Summary of one accepted payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WriteReport {
    pub workers_num: usize,
    pub batch_size: usize,
    /// Flush interval, in milliseconds.
    pub flush_interval: u64,
    /// Wall time between admission and the last batch outcome, in seconds.
    pub process_time: f64,
    pub rows_received: usize,
    /// Seconds per received row, 0 for an empty payload.
    pub time_per_row: f64,
    pub start_time: String,
    pub end_time: String,
    pub rows_written: usize,
    pub rows_failed: usize,
    pub failed_batches: usize,
}

impl From<&WorkerPoolOptions> for IngressOptions {
    fn from(options: &WorkerPoolOptions) -> Self {
        Self {
            concurrency_limit: options.concurrency_limit,
            batch_size: options.batch_size,
            flush_interval: options.flush_interval,
        }
    }
}

impl Ingress {
    pub fn new(
        options: IngressOptions,
        memory_gate: MemoryGate,
        pool: WorkerPoolClient,
        telemetry: TelemetryLog,
    ) -> Self {
        Self {
            options,
            memory_gate,
            pool,
            telemetry,
            metrics: IngestionMetrics::default(),
        }
    }

    pub fn options(&self) -> &IngressOptions {
        &self.options
    }

    /// Write a payload through the worker pool.
    ///
    /// Returns [`IngestorError::Overloaded`](crate::IngestorError::Overloaded)
    /// without queuing anything if free memory is below the threshold.
    pub async fn write_payload(&self, points: Vec<Point>) -> Result<WriteReport> {
        if !self.memory_gate.is_capacity_sufficient() {
            warn!(
                free_memory_mb = self.memory_gate.free_memory_mb(),
                threshold_mb = self.memory_gate.threshold_mb(),
                rows = points.len(),
                "Rejecting payload, not enough free memory"
            );
            self.metrics.rejected_payloads.add(1, &[]);
            return OverloadedSnafu {}.fail();
        }

        let rows_received = points.len();
        let start_time = Utc::now();
        let started = Instant::now();

        self.metrics.received_rows.add(rows_received as u64, &[]);

        let batches = Batch::split(points, self.options.batch_size);
        let outcome = self.pool.enqueue(batches)?.wait().await?;

        let process_time = started.elapsed();
        let end_time = Utc::now();

        self.record_outcome(&outcome, process_time);

        let report = WriteReport::new(
            &self.options,
            rows_received,
            &outcome,
            process_time,
            start_time,
            end_time,
        );

        if let Err(err) = self.telemetry.append(&report).await {
            warn!(error = %err, "Failed to append write report to telemetry log");
        }

        info!(
            rows_received,
            rows_written = report.rows_written,
            rows_failed = report.rows_failed,
            failed_batches = report.failed_batches,
            process_time = report.process_time,
            "Payload written"
        );

        Ok(report)
    }

    /// Whether the server would currently accept a payload.
    pub fn status(&self) -> ServerStatus {
        if self.memory_gate.is_capacity_sufficient() {
            ServerStatus::Ready
        } else {
            ServerStatus::Overloaded
        }
    }

    fn record_outcome(&self, outcome: &PayloadOutcome, process_time: Duration) {
        let status = if outcome.failed_batches == 0 {
            "ok"
        } else {
            "partial"
        };

        self.metrics
            .written_rows
            .add(outcome.rows_written as u64, &[]);
        self.metrics.failed_rows.add(outcome.rows_failed as u64, &[]);
        self.metrics
            .failed_batches
            .add(outcome.failed_batches as u64, &[]);
        self.metrics.payload_duration.record(
            process_time.as_secs_f64(),
            &[KeyValue::new("status", status)],
        );
    }
}

impl WriteReport {
    pub fn new(
        options: &IngressOptions,
        rows_received: usize,
        outcome: &PayloadOutcome,
        process_time: Duration,
        start_time: DateTime<Utc>,
        end_time: DateTime<Utc>,
    ) -> Self {
        let process_time = process_time.as_secs_f64();
        let time_per_row = if rows_received == 0 {
            0.0
        } else {
            process_time / rows_received as f64
        };

        Self {
            workers_num: options.concurrency_limit,
            batch_size: options.batch_size,
            flush_interval: options.flush_interval.as_millis() as u64,
            process_time,
            rows_received,
            time_per_row,
            start_time: start_time.format(REPORT_TIME_FORMAT).to_string(),
            end_time: end_time.format(REPORT_TIME_FORMAT).to_string(),
            rows_written: outcome.rows_written,
            rows_failed: outcome.rows_failed,
            failed_batches: outcome.failed_batches,
        }
    }
}
