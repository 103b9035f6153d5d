//! Append-only JSON lines log of write reports.
use std::{
    path::{Path, PathBuf},
    sync::Arc,
};

use serde::{Serialize, de::DeserializeOwned};
use snafu::ResultExt;
use tokio::{
    fs::OpenOptions,
    io::AsyncWriteExt,
    sync::Mutex,
};

use crate::error::{Result, TelemetryEncodeSnafu, TelemetrySnafu};

/// A telemetry log file.
///
/// Every entry is serialized as one JSON object per line. Concurrent appends
/// are serialized so that lines never interleave.
#[derive(Debug, Clone)]
pub struct TelemetryLog {
    path: Option<Arc<PathBuf>>,
    lock: Arc<Mutex<()>>,
}

impl TelemetryLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: Some(Arc::new(path.into())),
            lock: Default::default(),
        }
    }

    /// A log that discards all entries.
    pub fn disabled() -> Self {
        Self {
            path: None,
            lock: Default::default(),
        }
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref().map(PathBuf::as_path)
    }

    /// Append one entry to the log, creating the file if needed.
    pub async fn append<T: Serialize>(&self, entry: &T) -> Result<()> {
        let Some(path) = self.path.as_deref() else {
            return Ok(());
        };

        let mut line = serde_json::to_vec(entry).context(TelemetryEncodeSnafu {})?;
        line.push(b'\n');

        let _guard = self.lock.lock().await;

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .await
            .context(TelemetrySnafu {
                message: "failed to open telemetry log",
            })?;

        file.write_all(&line).await.context(TelemetrySnafu {
            message: "failed to append to telemetry log",
        })?;

        file.flush().await.context(TelemetrySnafu {
            message: "failed to flush telemetry log",
        })
    }

    /// Read back all entries of the log.
    pub async fn read_entries<T: DeserializeOwned>(&self) -> Result<Vec<T>> {
        let Some(path) = self.path.as_deref() else {
            return Ok(Vec::new());
        };

        let content = match tokio::fs::read_to_string(path).await {
            Ok(content) => content,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => {
                return Err(err).context(TelemetrySnafu {
                    message: "failed to read telemetry log",
                });
            }
        };

        content
            .lines()
            .filter(|line| !line.trim().is_empty())
            .map(|line| serde_json::from_str(line).context(TelemetryEncodeSnafu {}))
            .collect()
    }
}
