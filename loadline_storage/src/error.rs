use snafu::Snafu;

/// Errors returned by storage sessions.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum StorageError {
    #[snafu(display("Invalid storage URL {url}: {message}"))]
    InvalidUrl { url: String, message: String },
    #[snafu(display("Storage request failed"))]
    Request { source: reqwest::Error },
    #[snafu(display("Storage engine responded with status {status}: {message}"))]
    Response { status: u16, message: String },
    #[snafu(display("Invalid point: {message}"))]
    InvalidPoint { message: String },
    #[snafu(display("Session is closed"))]
    SessionClosed,
}

pub type Result<T, E = StorageError> = std::result::Result<T, E>;
