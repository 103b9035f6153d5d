//! HTTP client for writing points to a loadline server.
//!
//! Besides the plain endpoints, the client implements the overload retry
//! protocol: a payload rejected because the server is low on memory is sent
//! again, exactly once, after the server reports it is ready.

pub mod http;
pub mod retry;

pub use http::{HttpWriteClient, Result, WriteClientError};
pub use loadline_ingestor_http::{ServerStatus, WriteReport};
pub use retry::RetryPolicy;
