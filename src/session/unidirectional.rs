use futures::StreamExt;
use tokio_util::sync::CancellationToken;

use crate::session::{
    Chunk, LiveHandle, Session, SessionId, SessionKind, SessionOutcome, SessionRegistry,
};
use crate::stream::{StreamTransformer, TransformConfig};
use crate::transport::{cancellable, StreamCall, StreamMessage, TransportError};

/// Marker text for a one-way stream stopped by its own session
const CANCELLED_MARKER: &str = "stream cancelled";

/// A freshly opened read-only session
#[derive(Debug, Clone)]
pub struct OpenedStream {
    pub id: SessionId,
    /// Trips the session's transport
    pub cancel: CancellationToken,
}

/// Binds one-way streaming calls (log tails, deployment actions) to
/// read-only sessions
#[derive(Clone)]
pub struct UnidirectionalAdapter {
    registry: SessionRegistry,
}

impl UnidirectionalAdapter {
    pub fn new(registry: SessionRegistry) -> Self {
        Self { registry }
    }

    /// Open a read-only session and start pumping `call` into it.
    ///
    /// `on_done` runs exactly once when the stream ends, whatever the
    /// outcome.
    pub fn open(
        &self,
        title: impl Into<String>,
        call: StreamCall,
        on_done: impl FnOnce() + Send + 'static,
    ) -> OpenedStream {
        self.open_with_token(title, call, CancellationToken::new(), on_done)
    }

    /// Like [`open`](Self::open) with a caller-owned cancellation token
    pub fn open_with_token(
        &self,
        title: impl Into<String>,
        call: StreamCall,
        token: CancellationToken,
        on_done: impl FnOnce() + Send + 'static,
    ) -> OpenedStream {
        let title = title.into();
        let session = Session::new(
            title.clone(),
            SessionKind::ReadOnly,
            LiveHandle::from_token(token.clone()),
        );
        let id = self.registry.add(session);
        tracing::info!(session_id = %id, %title, "Opened stream session");

        let source = cancellable(call(token.clone()), token.clone())
            .map(|item| item.and_then(StreamMessage::into_text));

        let transform_registry = self.registry.clone();
        let transform_id = id.clone();
        let complete_registry = self.registry.clone();
        let complete_id = id.clone();
        let error_registry = self.registry.clone();
        let error_id = id.clone();
        let finally_id = id.clone();

        let config = TransformConfig::new(move |text: String| {
            transform_registry.append_chunk(&transform_id, Chunk::Text(text.clone()));
            text
        })
        .on_complete(move || {
            tracing::debug!(session_id = %complete_id, "Stream completed");
            complete_registry.finish(&complete_id, SessionOutcome::Completed);
        })
        .on_error(move |error: TransportError| {
            let outcome = if error.is_cancelled() {
                tracing::debug!(session_id = %error_id, "Stream cancelled");
                SessionOutcome::Closed(CANCELLED_MARKER.to_string())
            } else {
                tracing::warn!(session_id = %error_id, error = %error, "Stream failed");
                SessionOutcome::Failed(error.to_string())
            };
            error_registry.finish(&error_id, outcome);
        })
        .on_finally(move || {
            tracing::trace!(session_id = %finally_id, "Stream finalized");
            on_done();
        });

        let mut stream = StreamTransformer::new(source, config);
        tokio::spawn(async move {
            while let Some(text) = stream.next().await {
                tracing::trace!(len = text.len(), "Stream chunk");
            }
        });

        OpenedStream { id, cancel: token }
    }
}
