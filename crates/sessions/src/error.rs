/// Crate-wide result type for session persistence.
pub type Result<T> = std::result::Result<T, Error>;

/// Snapshot read/write failures. These are logged by the store and never
/// surfaced to senders or allowed to crash the process.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    SerdeJson(#[from] serde_json::Error),
}
