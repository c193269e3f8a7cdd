use consult_backend::Error as BackendError;

/// Failures while servicing one inbound event.
#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    #[error(transparent)]
    Backend(#[from] BackendError),

    /// Media could not be fetched or decoded from the transport.
    #[error("media download failed: {0}")]
    MediaDownload(#[source] anyhow::Error),
}

impl RelayError {
    /// Fixed user-visible reply for this failure class.
    #[must_use]
    pub fn user_reply(&self) -> &'static str {
        match self {
            Self::Backend(BackendError::Unreachable(_)) => reply::SERVICE_UNAVAILABLE,
            Self::Backend(BackendError::Timeout(_)) => reply::REQUEST_TIMED_OUT,
            Self::MediaDownload(_) => reply::MEDIA_DOWNLOAD_FAILED,
            Self::Backend(_) => reply::GENERIC_FAILURE,
        }
    }
}

/// Canned user-visible reply texts.
pub mod reply {
    /// Backend connection refused.
    pub const SERVICE_UNAVAILABLE: &str =
        "The service is temporarily unavailable. Please try again in a few minutes.";
    /// Backend call exceeded the request budget.
    pub const REQUEST_TIMED_OUT: &str = "The request timed out. Please try a simpler question.";
    /// Media could not be fetched from the transport.
    pub const MEDIA_DOWNLOAD_FAILED: &str = "Failed to download the image. Please resend it.";
    /// Any other failure.
    pub const GENERIC_FAILURE: &str =
        "An error occurred while processing your message. Please try again.";
    /// Non-image attachment received.
    pub const IMAGES_ONLY: &str =
        "Please send a photo for diagnosis. Text messages are answered as consultation questions.";
}
