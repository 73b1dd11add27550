//! Transport contracts consumed by the session adapters.
//!
//! A one-way call is a [`StreamCall`]: handed the session's cancellation
//! token, it returns a stream of [`StreamMessage`] records. A duplex
//! connection is opened through a [`DuplexConnector`] and exchanges
//! [`Frame`]s.

pub mod error;
pub mod http;
pub mod mock;
pub mod ws;

use std::pin::Pin;
use std::sync::Arc;

use async_trait::async_trait;
use futures::stream::{self, BoxStream};
use futures::{Sink, StreamExt};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::session::DeployAction;

pub use error::TransportError;
pub use http::HttpStreamClient;
pub use ws::WsConnector;

/// One record of a one-way stream
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamMessage {
    #[serde(default)]
    pub message: String,
    /// Set when the backend reports a logical failure
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl StreamMessage {
    pub fn text(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            error: None,
        }
    }

    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            message: String::new(),
            error: Some(error.into()),
        }
    }

    /// Extract the message text, turning an explicit error field into
    /// [`TransportError::Application`]
    pub fn into_text(self) -> Result<String, TransportError> {
        match self.error {
            Some(error) => Err(TransportError::Application(error)),
            None => Ok(self.message),
        }
    }
}

pub type MessageStream = BoxStream<'static, Result<StreamMessage, TransportError>>;

/// A one-way streaming call that has not been started yet
pub type StreamCall = Box<dyn FnOnce(CancellationToken) -> MessageStream + Send>;

/// Starts a deployment action for `(file, selected services)`
pub type ActionStreamFn = Arc<dyn Fn(&str, &[String]) -> StreamCall + Send + Sync>;

/// A socket frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    Text(String),
    Binary(Vec<u8>),
    Close,
}

pub type FrameSink = Pin<Box<dyn Sink<Frame, Error = TransportError> + Send>>;
pub type FrameStream = BoxStream<'static, Result<Frame, TransportError>>;

/// Opens bidirectional sockets
#[async_trait]
pub trait DuplexConnector: Send + Sync {
    async fn connect(&self, url: &str) -> Result<(FrameSink, FrameStream), TransportError>;
}

/// Builds the one-way calls the console issues
pub trait StreamClient: Send + Sync {
    /// Tail of a log endpoint
    fn log_stream(&self, url: &str) -> StreamCall;

    /// Trigger for one deployment action
    fn action_stream(&self, action: DeployAction) -> ActionStreamFn;
}

/// Guard a message stream with a cancellation token.
///
/// Once the token trips no further items are yielded and the stream ends
/// with [`TransportError::Cancelled`], even if the producer ignores the
/// token. Source errors raised after the trip are reported as cancellation
/// too.
pub fn cancellable<T: Send + 'static>(
    source: BoxStream<'static, Result<T, TransportError>>,
    token: CancellationToken,
) -> BoxStream<'static, Result<T, TransportError>> {
    stream::unfold(Some((source, token)), |state| async move {
        let Some((mut source, token)) = state else {
            return None;
        };
        tokio::select! {
            biased;
            item = source.next() => match item {
                Some(Ok(_)) | Some(Err(_)) if token.is_cancelled() => {
                    Some((Err(TransportError::Cancelled), None))
                }
                Some(Ok(value)) => Some((Ok(value), Some((source, token)))),
                Some(Err(error)) => Some((Err(error), None)),
                None => None,
            },
            _ = token.cancelled() => Some((Err(TransportError::Cancelled), None)),
        }
    })
    .boxed()
}

/// Resolve `path` against `base` unless it is already an absolute URL
pub fn join_url(base: &str, path: &str) -> String {
    if path.contains("://") {
        return path.to_string();
    }
    let base = base.trim_end_matches('/');
    if path.starts_with('/') {
        format!("{base}{path}")
    } else {
        format!("{base}/{path}")
    }
}
