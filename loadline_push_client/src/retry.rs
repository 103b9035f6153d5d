use std::time::Duration;

use loadline_storage::Point;
use tracing::{debug, info, warn};

use crate::{HttpWriteClient, Result, ServerStatus, WriteClientError, WriteReport};

/// Timing of the overload retry protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Interval between status checks while the server is overloaded.
    pub status_poll_interval: Duration,
    /// Pause after a failure other than overload.
    pub failure_pause: Duration,
}

impl RetryPolicy {
    pub fn new(status_poll_interval: Duration, failure_pause: Duration) -> Self {
        Self {
            status_poll_interval,
            failure_pause,
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(Duration::from_secs(15), Duration::from_secs(15))
    }
}

impl HttpWriteClient {
    /// Write the payload, waiting out an overloaded server.
    ///
    /// If the server is overloaded, poll its status until it is ready and send
    /// the whole payload again, once. The server does not deduplicate, points
    /// are written again even if they were written before.
    ///
    /// Any other error is returned after pausing for `failure_pause`.
    pub async fn write_with_retry(
        &self,
        points: &[Point],
        policy: &RetryPolicy,
    ) -> Result<WriteReport> {
        match self.write_data(points).await {
            Ok(report) => Ok(report),
            Err(WriteClientError::Overloaded) => {
                info!(rows = points.len(), "Server overloaded, waiting until ready");
                self.wait_until_ready(policy).await;
                self.write_data(points).await
            }
            Err(err) => {
                warn!(error = %err, "Write failed, pausing");
                tokio::time::sleep(policy.failure_pause).await;
                Err(err)
            }
        }
    }

    async fn wait_until_ready(&self, policy: &RetryPolicy) {
        loop {
            tokio::time::sleep(policy.status_poll_interval).await;

            match self.status().await {
                Ok(ServerStatus::Ready) => {
                    info!("Server ready, resubmitting payload");
                    return;
                }
                Ok(ServerStatus::Overloaded) => {
                    debug!("Server still overloaded");
                }
                Err(err) => {
                    warn!(error = %err, "Failed to query server status");
                }
            }
        }
    }
}
