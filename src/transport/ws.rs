//! Duplex exec sockets over WebSocket.

use async_trait::async_trait;
use futures::{future, SinkExt, StreamExt};
use tokio_tungstenite::tungstenite::Message;

use super::{join_url, DuplexConnector, Frame, FrameSink, FrameStream, TransportError};

/// tokio-tungstenite backed [`DuplexConnector`]
#[derive(Debug, Clone)]
pub struct WsConnector {
    base_url: String,
}

impl WsConnector {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
        }
    }
}

#[async_trait]
impl DuplexConnector for WsConnector {
    async fn connect(&self, url: &str) -> Result<(FrameSink, FrameStream), TransportError> {
        let url = join_url(&self.base_url, url);
        let (socket, _response) = tokio_tungstenite::connect_async(url.as_str())
            .await
            .map_err(|e| TransportError::Connect(e.to_string()))?;
        tracing::debug!(%url, "Socket connected");

        let (sink, stream) = socket.split();

        let sink = sink
            .sink_map_err(|e| TransportError::Socket(e.to_string()))
            .with(|frame: Frame| future::ready(Ok::<_, TransportError>(frame_to_message(frame))));

        let stream = stream.filter_map(|message| {
            future::ready(match message {
                Ok(message) => message_to_frame(message).map(Ok),
                Err(e) => Some(Err(TransportError::Socket(e.to_string()))),
            })
        });

        let sink: FrameSink = Box::pin(sink);
        Ok((sink, stream.boxed()))
    }
}

fn frame_to_message(frame: Frame) -> Message {
    match frame {
        Frame::Text(text) => Message::Text(text),
        Frame::Binary(bytes) => Message::Binary(bytes),
        Frame::Close => Message::Close(None),
    }
}

/// Control frames (ping/pong) carry no terminal output
fn message_to_frame(message: Message) -> Option<Frame> {
    match message {
        Message::Text(text) => Some(Frame::Text(text)),
        Message::Binary(bytes) => Some(Frame::Binary(bytes)),
        Message::Close(_) => Some(Frame::Close),
        Message::Ping(_) | Message::Pong(_) | Message::Frame(_) => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_control_frames_are_dropped() {
        assert_eq!(message_to_frame(Message::Ping(vec![1])), None);
        assert_eq!(message_to_frame(Message::Pong(vec![1])), None);
        assert_eq!(
            message_to_frame(Message::Text("ls\r\n".into())),
            Some(Frame::Text("ls\r\n".into()))
        );
        assert_eq!(
            message_to_frame(Message::Binary(vec![0x1b, 0x5b])),
            Some(Frame::Binary(vec![0x1b, 0x5b]))
        );
        assert_eq!(message_to_frame(Message::Close(None)), Some(Frame::Close));
    }

    #[test]
    fn test_input_frames_map_to_messages() {
        assert_eq!(
            frame_to_message(Frame::Text("ls\n".into())),
            Message::Text("ls\n".into())
        );
        assert_eq!(frame_to_message(Frame::Close), Message::Close(None));
    }

    #[tokio::test]
    async fn test_unreachable_host_is_connect_error() {
        let connector = WsConnector::new("ws://127.0.0.1:1");
        let result = connector.connect("/exec/abc").await;
        assert!(matches!(result, Err(TransportError::Connect(_))));
    }
}
