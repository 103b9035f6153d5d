use axum::{
    Json,
    http::{StatusCode, header},
    response::{IntoResponse, Response},
};
use loadline_ingestor_core::IngestorError;
use thiserror::Error;

use crate::types::{ErrorResponse, OVERLOADED_MESSAGE};

/// Errors that can occur in the HTTP ingestor.
#[derive(Error, Debug)]
pub enum HttpIngestorError {
    #[error("server is overloaded")]
    Overloaded,
    #[error("internal error: {message}")]
    Internal { message: String },
}

pub type Result<T, E = HttpIngestorError> = std::result::Result<T, E>;

impl From<IngestorError> for HttpIngestorError {
    fn from(error: IngestorError) -> Self {
        match error {
            IngestorError::Overloaded => HttpIngestorError::Overloaded,
            error => HttpIngestorError::Internal {
                message: error.to_string(),
            },
        }
    }
}

impl IntoResponse for HttpIngestorError {
    fn into_response(self) -> Response {
        map_error_to_response(self)
    }
}

fn map_error_to_response(error: HttpIngestorError) -> Response {
    match error {
        HttpIngestorError::Overloaded => (
            StatusCode::SERVICE_UNAVAILABLE,
            [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
            OVERLOADED_MESSAGE,
        )
            .into_response(),
        HttpIngestorError::Internal { .. } => {
            let response = Json(ErrorResponse {
                message: error.to_string(),
            });

            (StatusCode::INTERNAL_SERVER_ERROR, response).into_response()
        }
    }
}
