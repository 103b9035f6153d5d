//! InfluxDB v2 write sessions.
//!
//! Points are encoded as line protocol and sent to `POST /api/v2/write` with
//! nanosecond precision.
use std::time::Duration;

use reqwest::{
    Url,
    header::{AUTHORIZATION, CONTENT_TYPE},
};
use snafu::ResultExt;
use tracing::debug;

use crate::{
    Point, SessionFactory, SessionOptions, WriteSession,
    error::{InvalidUrlSnafu, RequestSnafu, Result, StorageError},
    line_protocol::encode_points,
};

/// Connection settings for an InfluxDB v2 server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InfluxOptions {
    /// Base URL of the server, e.g. `http://localhost:8086`.
    pub url: String,
    /// API token, sent as `Authorization: Token <token>`.
    pub token: Option<String>,
    pub org: String,
    pub bucket: String,
    /// Tags added to every point.
    pub default_tags: Vec<(String, String)>,
    /// Timeout of a single write request. Writes are never aborted when unset.
    pub request_timeout: Option<Duration>,
}

impl InfluxOptions {
    pub fn new(url: impl Into<String>, org: impl Into<String>, bucket: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            token: None,
            org: org.into(),
            bucket: bucket.into(),
            default_tags: vec![("dataSource".to_string(), "testGenerator".to_string())],
            request_timeout: None,
        }
    }

    /// Change the API token.
    pub fn with_token(mut self, token: Option<String>) -> Self {
        self.token = token;
        self
    }

    /// Replace the tags added to every point.
    pub fn with_default_tags(mut self, default_tags: Vec<(String, String)>) -> Self {
        self.default_tags = default_tags;
        self
    }

    /// Abort write requests running longer than `request_timeout`.
    ///
    /// A timed out request fails the batch like any other transport error.
    pub fn with_request_timeout(mut self, request_timeout: Duration) -> Self {
        self.request_timeout = Some(request_timeout);
        self
    }

    /// The full write URL, including organization, bucket and precision.
    pub fn write_url(&self) -> Result<Url> {
        let base = self.url.trim_end_matches('/');
        let mut url = Url::parse(&format!("{base}/api/v2/write")).map_err(|err| {
            StorageError::InvalidUrl {
                url: self.url.clone(),
                message: err.to_string(),
            }
        })?;

        if url.cannot_be_a_base() || !matches!(url.scheme(), "http" | "https") {
            return InvalidUrlSnafu {
                url: self.url.clone(),
                message: "expected an http or https URL",
            }
            .fail();
        }

        url.query_pairs_mut()
            .append_pair("org", &self.org)
            .append_pair("bucket", &self.bucket)
            .append_pair("precision", "ns");

        Ok(url)
    }
}

/// Opens write sessions against an InfluxDB v2 server.
#[derive(Debug, Clone)]
pub struct InfluxSessionFactory {
    client: reqwest::Client,
    options: InfluxOptions,
}

/// A buffered write session.
pub struct InfluxSession {
    client: reqwest::Client,
    write_url: Url,
    token: Option<String>,
    default_tags: Vec<(String, String)>,
    worker: Option<usize>,
    batch_size: usize,
    buffer: String,
    buffered_points: usize,
    closed: bool,
}

impl InfluxSessionFactory {
    pub fn new(options: InfluxOptions) -> Result<Self> {
        let mut builder = reqwest::Client::builder();
        if let Some(timeout) = options.request_timeout {
            builder = builder.timeout(timeout);
        }
        let client = builder.build().context(RequestSnafu {})?;

        Ok(Self { client, options })
    }

    pub fn options(&self) -> &InfluxOptions {
        &self.options
    }
}

#[async_trait::async_trait]
impl SessionFactory for InfluxSessionFactory {
    async fn open_session(&self, options: SessionOptions) -> Result<Box<dyn WriteSession>> {
        let write_url = self.options.write_url()?;

        Ok(Box::new(InfluxSession {
            client: self.client.clone(),
            write_url,
            token: self.options.token.clone(),
            default_tags: self.options.default_tags.clone(),
            worker: options.worker,
            batch_size: options.batch_size.max(1),
            buffer: String::new(),
            buffered_points: 0,
            closed: false,
        }))
    }
}

#[async_trait::async_trait]
impl WriteSession for InfluxSession {
    async fn write_points(&mut self, points: &[Point]) -> Result<()> {
        if self.closed {
            return Err(StorageError::SessionClosed);
        }

        self.buffered_points += encode_points(&mut self.buffer, points, &self.default_tags)?;

        if self.buffered_points >= self.batch_size {
            self.flush().await?;
        }

        Ok(())
    }

    async fn flush(&mut self) -> Result<()> {
        if self.buffered_points == 0 {
            return Ok(());
        }

        let body = std::mem::take(&mut self.buffer);
        let num_points = std::mem::take(&mut self.buffered_points);

        debug!(num_points, worker = ?self.worker, url = %self.write_url, "flushing points");

        let mut request = self
            .client
            .post(self.write_url.clone())
            .header(CONTENT_TYPE, "text/plain; charset=utf-8")
            .body(body);

        if let Some(token) = &self.token {
            request = request.header(AUTHORIZATION, format!("Token {token}"));
        }

        let response = request.send().await.context(RequestSnafu {})?;
        let status = response.status();
        if status.is_success() {
            return Ok(());
        }

        let message = response.text().await.unwrap_or_default();
        Err(StorageError::Response {
            status: status.as_u16(),
            message,
        })
    }

    async fn close(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }

        let result = self.flush().await;
        self.closed = true;
        result
    }
}
