/// Errors raised by streaming calls and sockets.
///
/// `Cancelled` is reserved for streams stopped by their own session's
/// cancellation token and is never reported as a failure.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    #[error("connection failed: {0}")]
    Connect(String),

    #[error("socket error: {0}")]
    Socket(String),

    #[error("stream error: {0}")]
    Stream(String),

    /// The backend answered but reported a logical failure
    #[error("{0}")]
    Application(String),

    #[error("cancelled")]
    Cancelled,
}

impl TransportError {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, TransportError::Cancelled)
    }
}

impl From<reqwest::Error> for TransportError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_connect() {
            TransportError::Connect(err.to_string())
        } else {
            TransportError::Stream(err.to_string())
        }
    }
}
