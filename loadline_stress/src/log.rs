use std::path::PathBuf;

use chrono::{DateTime, SecondsFormat, Utc};
use loadline_push_client::WriteReport;
use serde::Serialize;
use snafu::ResultExt;
use tokio::{fs::OpenOptions, io::AsyncWriteExt};

use crate::{
    error::{ReportEncodeSnafu, ReportLogSnafu, Result},
    memory::MemoryUsage,
};

/// One successful request, as seen by the load generator.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportEntry {
    pub request: u64,
    pub rows_sent: usize,
    /// Timestamp of the first point of the payload.
    pub data_start: String,
    /// Timestamp of the last point of the payload.
    pub data_end: String,
    #[serde(flatten)]
    pub report: WriteReport,
    /// Memory of the processes once the request completed.
    #[serde(rename = "memUsageMB")]
    pub mem_usage_mb: MemoryUsage,
}

/// Appends report entries as JSON lines.
#[derive(Debug, Clone)]
pub struct ReportLog {
    path: PathBuf,
}

impl ReportEntry {
    pub fn new(
        request: u64,
        rows_sent: usize,
        data_range: (DateTime<Utc>, DateTime<Utc>),
        report: WriteReport,
        mem_usage_mb: MemoryUsage,
    ) -> Self {
        Self {
            request,
            rows_sent,
            data_start: data_range.0.to_rfc3339_opts(SecondsFormat::Secs, true),
            data_end: data_range.1.to_rfc3339_opts(SecondsFormat::Secs, true),
            report,
            mem_usage_mb,
        }
    }
}

impl ReportLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub async fn append(&self, entry: &ReportEntry) -> Result<()> {
        let mut line = serde_json::to_vec(entry).context(ReportEncodeSnafu {})?;
        line.push(b'\n');

        let path = self.path.display().to_string();

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await
            .context(ReportLogSnafu { path: path.clone() })?;

        file.write_all(&line)
            .await
            .context(ReportLogSnafu { path })
    }
}

impl std::fmt::Display for ReportEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{:<6}|{:<8}|{} / {}|{:>10.3}s|{:>12.6}s/row|{}|failed {}",
            self.request,
            self.rows_sent,
            self.data_start,
            self.data_end,
            self.report.process_time,
            self.report.time_per_row,
            self.mem_usage_mb,
            self.report.rows_failed,
        )
    }
}
