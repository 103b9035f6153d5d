use axum::{
    Json,
    extract::State,
    response::{IntoResponse, Response},
};
use loadline_storage::Point;
use tracing::debug;

use crate::{HttpIngestorState, error::Result, types::WriteReport};

/// Handler for the /write-data endpoint.
pub async fn write_data_handler(
    State(state): State<HttpIngestorState>,
    Json(points): Json<Vec<Point>>,
) -> Response {
    match process_write_request(&state, points).await {
        Ok(report) => Json(report).into_response(),
        Err(err) => err.into_response(),
    }
}

async fn process_write_request(
    state: &HttpIngestorState,
    points: Vec<Point>,
) -> Result<WriteReport> {
    debug!(rows = points.len(), "Received write request");
    let report = state.ingress.write_payload(points).await?;
    Ok(report)
}
