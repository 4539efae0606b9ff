use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    /// Gateway handshake failed, timed out, or the credential was rejected.
    #[error("connection failed: {reason}")]
    Connection { reason: String },

    /// A REST command was rejected or never reached the server.
    #[error("command failed: {0}")]
    Command(#[from] ApiError),

    /// Input rejected before any network call was made.
    #[error("{0}")]
    InvalidInput(String),
}

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("server returned {status}: {message}")]
    Rejected { status: u16, message: String },
}
