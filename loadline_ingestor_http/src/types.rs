//! Request and response types of the HTTP ingestor.

use serde::{Deserialize, Serialize};

pub use loadline_ingestor_core::{ServerStatus, WriteReport};

/// Body of the `503` response of `/write-data`.
pub const OVERLOADED_MESSAGE: &str = "Server is overloaded. Please try again later.";

/// Response payload for errors.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ErrorResponse {
    pub message: String,
}

/// Response payload for the /status endpoint.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct StatusResponse {
    pub status: ServerStatus,
}
