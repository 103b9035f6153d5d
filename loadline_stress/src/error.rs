use loadline_push_client::WriteClientError;
use snafu::Snafu;

use crate::helpers::{RangeParserError, TimeParserError};

/// CLI error types.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum CliError {
    #[snafu(display("Invalid range format"))]
    InvalidRange { source: RangeParserError },
    #[snafu(display("Invalid start time"))]
    InvalidStartTime { source: TimeParserError },
    #[snafu(display("Failed to initialize observability"))]
    Observability {
        source: loadline_observability::ObservabilityError,
    },
    #[snafu(display("Failed HTTP write operation"))]
    WriteClient { source: WriteClientError },
    #[snafu(display("Failed to write report log {path}"))]
    ReportLog {
        path: String,
        source: std::io::Error,
    },
    #[snafu(display("Failed to encode report log entry"))]
    ReportEncode { source: serde_json::Error },
    #[snafu(display("Failed to read sweep configurations {path}"))]
    SweepConfigRead {
        path: String,
        source: std::io::Error,
    },
    #[snafu(display("Invalid sweep configurations in {path}"))]
    SweepConfigDecode {
        path: String,
        source: serde_json::Error,
    },
    #[snafu(display("Failed to start server {program}"))]
    SpawnServer {
        program: String,
        source: std::io::Error,
    },
}

pub type Result<T, E = CliError> = std::result::Result<T, E>;
