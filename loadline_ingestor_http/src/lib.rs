//! HTTP ingestor server.
//!
//! The server is built using axum and provides two endpoints:
//!
//! - `POST /write-data` accepts a JSON array of points and replies with a write report.
//! - `GET /status` reports whether the server would accept a payload.

pub mod error;
pub mod status;
pub mod types;
pub mod write;

pub use error::{HttpIngestorError, Result};
pub use types::{ErrorResponse, OVERLOADED_MESSAGE, ServerStatus, StatusResponse, WriteReport};

use axum::{
    Router,
    extract::DefaultBodyLimit,
    routing::{get, post},
};
use loadline_ingestor_core::Ingress;

use crate::{status::status_handler, write::write_data_handler};

/// Default limit on the size of a request body, 1 GiB.
pub const DEFAULT_MAX_BODY_SIZE: usize = 1024 * 1024 * 1024;

/// HTTP ingestor server that receives points via HTTP POST requests.
pub struct HttpIngestor {
    state: HttpIngestorState,
    max_body_size: usize,
}

#[derive(Clone)]
pub struct HttpIngestorState {
    ingress: Ingress,
}

impl HttpIngestor {
    pub fn new(ingress: Ingress) -> Self {
        Self {
            state: HttpIngestorState { ingress },
            max_body_size: DEFAULT_MAX_BODY_SIZE,
        }
    }

    /// Change the maximum accepted request body size, in bytes.
    pub fn with_max_body_size(mut self, max_body_size: usize) -> Self {
        self.max_body_size = max_body_size;
        self
    }

    pub fn into_router(self) -> Router {
        Router::new()
            .route("/write-data", post(write_data_handler))
            .route("/status", get(status_handler))
            .layer(DefaultBodyLimit::max(self.max_body_size))
            .with_state(self.state)
    }
}
