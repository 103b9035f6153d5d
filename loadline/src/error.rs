use std::net::AddrParseError;

use loadline_ingestor_core::IngestorError;
use loadline_observability::ObservabilityError;
use loadline_push_client::WriteClientError;
use loadline_storage::StorageError;
use snafu::Snafu;

/// CLI error types.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum CliError {
    #[snafu(display("Invalid {name} argument: {message}"))]
    InvalidArgument { name: &'static str, message: String },
    #[snafu(display("Invalid server address"))]
    InvalidServerAddress { source: AddrParseError },
    #[snafu(display("Failed to initialize observability"))]
    Observability { source: ObservabilityError },
    #[snafu(display("Failed to configure storage"))]
    Storage { source: StorageError },
    #[snafu(display("Failed to configure ingestor"))]
    Ingestor { source: IngestorError },
    #[snafu(display("IO error"))]
    Io { source: std::io::Error },
    #[snafu(display("Failed HTTP client operation"))]
    WriteClient { source: WriteClientError },
}

pub type Result<T, E = CliError> = std::result::Result<T, E>;
