use axum::{Json, extract::State};

use crate::{HttpIngestorState, types::StatusResponse};

/// Handler for the /status endpoint.
pub async fn status_handler(State(state): State<HttpIngestorState>) -> Json<StatusResponse> {
    Json(StatusResponse {
        status: state.ingress.status(),
    })
}
