use std::sync::Arc;

use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::session::{
    Chunk, InputSink, LiveHandle, Session, SessionId, SessionKind, SessionOutcome,
    SessionRegistry,
};
use crate::transport::{DuplexConnector, Frame, FrameSink, FrameStream};

const DEFAULT_CLOSED_MARKER: &str = "connection closed";

/// Binds bidirectional sockets (exec shells, attach) to sessions
#[derive(Clone)]
pub struct DuplexAdapter {
    registry: SessionRegistry,
    connector: Arc<dyn DuplexConnector>,
    closed_marker: String,
}

impl DuplexAdapter {
    pub fn new(registry: SessionRegistry, connector: Arc<dyn DuplexConnector>) -> Self {
        Self {
            registry,
            connector,
            closed_marker: DEFAULT_CLOSED_MARKER.to_string(),
        }
    }

    pub fn with_closed_marker(mut self, marker: impl Into<String>) -> Self {
        self.closed_marker = marker.into();
        self
    }

    /// Open a socket session.
    ///
    /// Interactive sessions get an input sink that forwards keystrokes
    /// while the socket is open; non-interactive ones only display output.
    pub fn open(
        &self,
        url: impl Into<String>,
        title: impl Into<String>,
        interactive: bool,
    ) -> SessionId {
        let url = url.into();
        let title = title.into();
        let live = LiveHandle::new();
        let token = live.token();

        let (kind, input) = if interactive {
            let (sink, rx) = InputSink::channel();
            (SessionKind::Interactive(sink.clone()), Some((sink, rx)))
        } else {
            (SessionKind::ReadOnly, None)
        };

        let id = self.registry.add(Session::new(title.clone(), kind, live));
        tracing::info!(session_id = %id, %title, %url, interactive, "Opened socket session");

        let pump = SocketPump {
            registry: self.registry.clone(),
            connector: self.connector.clone(),
            closed_marker: self.closed_marker.clone(),
            id: id.clone(),
            token,
            input,
        };
        tokio::spawn(pump.run(url));

        id
    }
}

/// Drives one socket for one session
struct SocketPump {
    registry: SessionRegistry,
    connector: Arc<dyn DuplexConnector>,
    closed_marker: String,
    id: SessionId,
    token: CancellationToken,
    input: PendingInput,
}

impl SocketPump {
    async fn run(mut self, url: String) {
        let connected = tokio::select! {
            biased;
            _ = self.token.cancelled() => {
                self.registry.finish(&self.id, SessionOutcome::Closed(self.closed_marker.clone()));
                return;
            }
            connected = self.connector.connect(&url) => connected,
        };

        let (sink, frames) = match connected {
            Ok(connection) => connection,
            Err(e) => {
                tracing::warn!(session_id = %self.id, %url, error = %e, "Socket connect failed");
                self.registry.finish(&self.id, SessionOutcome::Failed(e.to_string()));
                return;
            }
        };

        if let Some((sink, _)) = &self.input {
            sink.set_open(true);
        }
        self.registry.focus_terminal(&self.id);

        let outcome = self.pump(sink, frames).await;

        // Input after close is dropped by the sink itself
        if let Some((sink, _)) = self.input.take() {
            sink.set_open(false);
        }
        tracing::debug!(session_id = %self.id, ?outcome, "Socket session ended");
        self.registry.finish(&self.id, outcome);
    }

    async fn pump(&mut self, mut sink: FrameSink, mut frames: FrameStream) -> SessionOutcome {
        let outcome = loop {
            tokio::select! {
                _ = self.token.cancelled() => {
                    break SessionOutcome::Closed(self.closed_marker.clone());
                }
                frame = frames.next() => match frame {
                    Some(Ok(Frame::Text(text))) => {
                        self.registry.append_chunk(&self.id, Chunk::Text(text));
                    }
                    Some(Ok(Frame::Binary(bytes))) => {
                        self.registry.append_chunk(&self.id, Chunk::Binary(bytes));
                    }
                    Some(Ok(Frame::Close)) | None => {
                        break SessionOutcome::Closed(self.closed_marker.clone());
                    }
                    Some(Err(e)) => {
                        tracing::warn!(session_id = %self.id, error = %e, "Socket error");
                        break SessionOutcome::Failed(e.to_string());
                    }
                },
                Some(data) = next_input(&mut self.input) => {
                    if let Err(e) = sink.send(Frame::Text(data)).await {
                        tracing::warn!(session_id = %self.id, error = %e, "Failed to send input");
                        break SessionOutcome::Failed(e.to_string());
                    }
                }
            }
        };

        // Closing an already-closed socket is not an error worth reporting
        if let Err(e) = sink.send(Frame::Close).await {
            tracing::debug!(session_id = %self.id, error = %e, "Close frame not sent");
        }
        if let Err(e) = sink.close().await {
            tracing::debug!(session_id = %self.id, error = %e, "Socket close failed");
        }
        outcome
    }
}

type PendingInput = Option<(InputSink, mpsc::UnboundedReceiver<String>)>;

/// Next line of input; never resolves for sessions without input
async fn next_input(input: &mut PendingInput) -> Option<String> {
    match input {
        Some((_, rx)) => rx.recv().await,
        None => std::future::pending().await,
    }
}
