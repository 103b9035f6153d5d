use std::time::Duration;

use loadline_ingestor_http::{ErrorResponse, StatusResponse};
use loadline_storage::Point;
use reqwest::StatusCode;
use snafu::{ResultExt, Snafu};

use crate::{ServerStatus, WriteReport};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(300);

/// A client for writing points to a loadline server over HTTP.
#[derive(Debug, Clone)]
pub struct HttpWriteClient {
    client: reqwest::Client,
    base_url: String,
}

#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum WriteClientError {
    #[snafu(display("Request error"))]
    Request { source: reqwest::Error },
    #[snafu(display("Server is overloaded"))]
    Overloaded,
    #[snafu(display("Response error: status={status}, message={message}"))]
    Response { status: StatusCode, message: String },
}

pub type Result<T, E = WriteClientError> = std::result::Result<T, E>;

impl HttpWriteClient {
    /// Create a new client for the server at `base_url`, e.g. `http://localhost:3000`.
    pub fn new(base_url: impl Into<String>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .context(RequestSnafu {})?;

        let base_url = base_url.into().trim_end_matches('/').to_string();

        Ok(Self { client, base_url })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Send one payload to `/write-data`.
    ///
    /// Returns [`WriteClientError::Overloaded`] if the server rejected the
    /// payload because it is low on memory.
    pub async fn write_data(&self, points: &[Point]) -> Result<WriteReport> {
        let url = format!("{}/write-data", self.base_url);

        let response = self
            .client
            .post(&url)
            .json(points)
            .send()
            .await
            .context(RequestSnafu {})?;

        let status = response.status();

        if status.is_success() {
            return response
                .json::<WriteReport>()
                .await
                .context(RequestSnafu {});
        }

        if status == StatusCode::SERVICE_UNAVAILABLE {
            return OverloadedSnafu {}.fail();
        }

        let body = response.text().await.context(RequestSnafu {})?;
        let message = error_message(&body).unwrap_or(body);

        ResponseSnafu { status, message }.fail()
    }

    /// Query `/status`.
    pub async fn status(&self) -> Result<ServerStatus> {
        let url = format!("{}/status", self.base_url);

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .context(RequestSnafu {})?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.context(RequestSnafu {})?;
            return ResponseSnafu { status, message }.fail();
        }

        let body = response
            .json::<StatusResponse>()
            .await
            .context(RequestSnafu {})?;

        Ok(body.status)
    }
}

fn error_message(body: &str) -> Option<String> {
    serde_json::from_str::<ErrorResponse>(body)
        .ok()
        .map(|error| error.message)
}
