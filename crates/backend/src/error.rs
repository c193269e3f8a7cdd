/// Crate-wide result type for backend calls.
pub type Result<T> = std::result::Result<T, Error>;

/// Classified failures from the remote consultation backend.
///
/// The router maps each variant to a fixed user-visible reply, so the
/// classification here is the single place connection-level errors are
/// interpreted.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A connection could not be established (backend down or refusing).
    #[error("backend unreachable: {0}")]
    Unreachable(#[source] reqwest::Error),

    /// The request exceeded its time budget.
    #[error("backend request timed out: {0}")]
    Timeout(#[source] reqwest::Error),

    /// Backend answered with a non-success status.
    #[error("backend returned {status}: {body}")]
    Upstream {
        status: reqwest::StatusCode,
        body: String,
    },

    /// Backend answered 200 but the body did not have the expected shape.
    #[error("malformed backend response: {0}")]
    InvalidResponse(String),

    /// Any other transport-level failure.
    #[error("backend request failed: {0}")]
    Network(#[source] reqwest::Error),
}

impl From<reqwest::Error> for Error {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            Self::Timeout(e)
        } else if e.is_connect() {
            Self::Unreachable(e)
        } else {
            Self::Network(e)
        }
    }
}
