//! Mock transports for deterministic testing
//!
//! Stand-ins for the HTTP and socket transports that emit scripted
//! records and capture everything the adapters send, so session flows can
//! be tested without a live orchestration host.
//!
//! # Example
//! ```no_run
//! use stackdeck::transport::mock::MockStream;
//!
//! let call = MockStream::new()
//!     .with_messages(["Pulling image", "Starting container"])
//!     .into_call();
//! ```

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::{sink, stream, StreamExt};
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use super::{
    ActionStreamFn, DuplexConnector, Frame, FrameSink, FrameStream, StreamCall, StreamClient,
    StreamMessage, TransportError,
};
use crate::session::{Chunk, DeployAction};
use crate::terminal::Terminal;

type Item = Result<StreamMessage, TransportError>;

/// Scripted one-way stream
#[derive(Clone, Default)]
pub struct MockStream {
    items: Vec<Item>,
    /// Delay before each item (simulates streaming)
    delay: Duration,
}

impl MockStream {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append plain message records
    pub fn with_messages<I, S>(mut self, messages: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.items
            .extend(messages.into_iter().map(|m| Ok(StreamMessage::text(m))));
        self
    }

    /// Append a raw record (e.g. one carrying an `error` field)
    pub fn with_record(mut self, record: StreamMessage) -> Self {
        self.items.push(Ok(record));
        self
    }

    /// End the stream with a transport error
    pub fn failing_with(mut self, error: TransportError) -> Self {
        self.items.push(Err(error));
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn into_call(self) -> StreamCall {
        Box::new(move |_token: CancellationToken| {
            let delay = self.delay;
            stream::iter(self.items)
                .then(move |item| async move {
                    if !delay.is_zero() {
                        tokio::time::sleep(delay).await;
                    }
                    item
                })
                .boxed()
        })
    }
}

/// Drives a stream created by [`channel_stream`]
#[derive(Clone)]
pub struct MockStreamController {
    tx: Arc<Mutex<Option<mpsc::UnboundedSender<Item>>>>,
    started: Arc<AtomicBool>,
    cancellations: Arc<AtomicUsize>,
}

impl MockStreamController {
    /// Emit one message; false once the stream is finished or dropped
    pub fn send(&self, message: impl Into<String>) -> bool {
        self.push(Ok(StreamMessage::text(message)))
    }

    /// Fail the stream with `error`
    pub fn fail(&self, error: TransportError) -> bool {
        let sent = self.push(Err(error));
        self.finish();
        sent
    }

    /// Complete the stream normally
    pub fn finish(&self) {
        self.tx.lock().take();
    }

    /// Whether the call has been started by an adapter
    pub fn started(&self) -> bool {
        self.started.load(Ordering::Acquire)
    }

    /// How many times the producer observed its cancellation token
    pub fn cancellations(&self) -> usize {
        self.cancellations.load(Ordering::Acquire)
    }

    fn push(&self, item: Item) -> bool {
        match self.tx.lock().as_ref() {
            Some(tx) => tx.send(item).is_ok(),
            None => false,
        }
    }
}

/// A one-way call fed by hand through the returned controller.
///
/// The producer honours its cancellation token and counts every time it
/// observes it, so tests can assert the transport was released exactly
/// once.
pub fn channel_stream() -> (StreamCall, MockStreamController) {
    let (tx, rx) = mpsc::unbounded_channel::<Item>();
    let controller = MockStreamController {
        tx: Arc::new(Mutex::new(Some(tx))),
        started: Arc::new(AtomicBool::new(false)),
        cancellations: Arc::new(AtomicUsize::new(0)),
    };

    let started = controller.started.clone();
    let cancellations = controller.cancellations.clone();
    let call: StreamCall = Box::new(move |token: CancellationToken| {
        started.store(true, Ordering::Release);
        stream::unfold(Some(rx), move |state| {
            let token = token.clone();
            let cancellations = cancellations.clone();
            async move {
                let Some(mut rx) = state else {
                    return None;
                };
                tokio::select! {
                    biased;
                    _ = token.cancelled() => {
                        cancellations.fetch_add(1, Ordering::AcqRel);
                        Some((Err(TransportError::Cancelled), None))
                    }
                    item = rx.recv() => item.map(|item| (item, Some(rx))),
                }
            }
        })
        .boxed()
    });

    (call, controller)
}

/// One captured action trigger
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionCall {
    pub file: String,
    pub services: Vec<String>,
}

#[derive(Clone)]
enum ActionSource {
    Scripted(MockStream),
    Channel(Arc<Mutex<Vec<MockStreamController>>>),
}

/// Mock action trigger that captures every invocation
#[derive(Clone)]
pub struct MockActions {
    source: ActionSource,
    calls: Arc<Mutex<Vec<ActionCall>>>,
}

impl MockActions {
    /// Every run replays the same scripted stream
    pub fn scripted(stream: MockStream) -> Self {
        Self {
            source: ActionSource::Scripted(stream),
            calls: Arc::default(),
        }
    }

    /// Every run gets a fresh hand-driven stream, see [`MockActions::controller`]
    pub fn channel() -> Self {
        Self {
            source: ActionSource::Channel(Arc::default()),
            calls: Arc::default(),
        }
    }

    pub fn stream_fn(&self) -> ActionStreamFn {
        let source = self.source.clone();
        let calls = self.calls.clone();
        Arc::new(move |file: &str, services: &[String]| {
            calls.lock().push(ActionCall {
                file: file.to_string(),
                services: services.to_vec(),
            });
            match &source {
                ActionSource::Scripted(stream) => stream.clone().into_call(),
                ActionSource::Channel(controllers) => {
                    let (call, controller) = channel_stream();
                    controllers.lock().push(controller);
                    call
                }
            }
        })
    }

    pub fn calls(&self) -> Vec<ActionCall> {
        self.calls.lock().clone()
    }

    /// Controller for the `index`-th run (channel mode only)
    pub fn controller(&self, index: usize) -> Option<MockStreamController> {
        match &self.source {
            ActionSource::Channel(controllers) => controllers.lock().get(index).cloned(),
            ActionSource::Scripted(_) => None,
        }
    }
}

/// Mock [`StreamClient`]: log calls are handed out in the order queued
pub struct MockStreamClient {
    logs: Mutex<VecDeque<StreamCall>>,
    log_urls: Mutex<Vec<String>>,
    actions: MockActions,
    triggered: Mutex<Vec<DeployAction>>,
}

impl MockStreamClient {
    pub fn new(actions: MockActions) -> Self {
        Self {
            logs: Mutex::new(VecDeque::new()),
            log_urls: Mutex::new(Vec::new()),
            actions,
            triggered: Mutex::new(Vec::new()),
        }
    }

    pub fn queue_log(&self, call: StreamCall) {
        self.logs.lock().push_back(call);
    }

    pub fn log_urls(&self) -> Vec<String> {
        self.log_urls.lock().clone()
    }

    pub fn triggered(&self) -> Vec<DeployAction> {
        self.triggered.lock().clone()
    }

    pub fn actions(&self) -> &MockActions {
        &self.actions
    }
}

impl StreamClient for MockStreamClient {
    fn log_stream(&self, url: &str) -> StreamCall {
        self.log_urls.lock().push(url.to_string());
        self.logs
            .lock()
            .pop_front()
            .unwrap_or_else(|| MockStream::new().into_call())
    }

    fn action_stream(&self, action: DeployAction) -> ActionStreamFn {
        self.triggered.lock().push(action);
        self.actions.stream_fn()
    }
}

type Incoming = mpsc::UnboundedSender<Result<Frame, TransportError>>;

struct MockConnection {
    incoming: mpsc::UnboundedReceiver<Result<Frame, TransportError>>,
    sent: Arc<Mutex<Vec<Frame>>>,
}

/// Server side of a mock socket
#[derive(Clone)]
pub struct MockSocket {
    incoming: Arc<Mutex<Option<Incoming>>>,
    sent: Arc<Mutex<Vec<Frame>>>,
}

impl MockSocket {
    pub fn push_text(&self, text: impl Into<String>) -> bool {
        self.push(Ok(Frame::Text(text.into())))
    }

    pub fn push_binary(&self, bytes: impl Into<Vec<u8>>) -> bool {
        self.push(Ok(Frame::Binary(bytes.into())))
    }

    /// Send a close frame
    pub fn close(&self) -> bool {
        self.push(Ok(Frame::Close))
    }

    /// Drop the connection without a close frame
    pub fn hang_up(&self) {
        self.incoming.lock().take();
    }

    pub fn fail(&self, message: impl Into<String>) -> bool {
        self.push(Err(TransportError::Socket(message.into())))
    }

    /// Every frame the client sent, in order
    pub fn sent(&self) -> Vec<Frame> {
        self.sent.lock().clone()
    }

    /// Text frames the client sent, in order
    pub fn sent_text(&self) -> Vec<String> {
        self.sent
            .lock()
            .iter()
            .filter_map(|frame| match frame {
                Frame::Text(text) => Some(text.clone()),
                _ => None,
            })
            .collect()
    }

    fn push(&self, item: Result<Frame, TransportError>) -> bool {
        match self.incoming.lock().as_ref() {
            Some(tx) => tx.send(item).is_ok(),
            None => false,
        }
    }
}

/// Mock [`DuplexConnector`]: each connect takes the next queued socket
#[derive(Default)]
pub struct MockConnector {
    queue: Mutex<VecDeque<Result<MockConnection, TransportError>>>,
    urls: Mutex<Vec<String>>,
}

impl MockConnector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a socket that accepts the next connection
    pub fn socket(&self) -> MockSocket {
        let (tx, rx) = mpsc::unbounded_channel();
        let sent = Arc::new(Mutex::new(Vec::new()));
        self.queue.lock().push_back(Ok(MockConnection {
            incoming: rx,
            sent: sent.clone(),
        }));
        MockSocket {
            incoming: Arc::new(Mutex::new(Some(tx))),
            sent,
        }
    }

    /// Queue a refused connection
    pub fn refuse(&self, message: impl Into<String>) {
        self.queue
            .lock()
            .push_back(Err(TransportError::Connect(message.into())));
    }

    pub fn urls(&self) -> Vec<String> {
        self.urls.lock().clone()
    }
}

#[async_trait]
impl DuplexConnector for MockConnector {
    async fn connect(&self, url: &str) -> Result<(FrameSink, FrameStream), TransportError> {
        self.urls.lock().push(url.to_string());
        let connection = self
            .queue
            .lock()
            .pop_front()
            .unwrap_or_else(|| Err(TransportError::Connect("no mock socket queued".into())))?;

        let sent = connection.sent;
        let sink: FrameSink = Box::pin(sink::unfold(sent, |sent, frame: Frame| async move {
            sent.lock().push(frame);
            Ok::<_, TransportError>(sent)
        }));
        let frames: FrameStream = stream::unfold(connection.incoming, |mut rx| async move {
            rx.recv().await.map(|item| (item, rx))
        })
        .boxed();

        Ok((sink, frames))
    }
}

/// Terminal that records everything written to it
#[derive(Default)]
pub struct RecordingTerminal {
    writes: Mutex<Vec<Chunk>>,
    focused: AtomicUsize,
    fitted: AtomicUsize,
}

impl RecordingTerminal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn writes(&self) -> Vec<Chunk> {
        self.writes.lock().clone()
    }

    /// All writes concatenated, binary decoded lossily
    pub fn contents(&self) -> String {
        self.writes
            .lock()
            .iter()
            .map(|chunk| chunk.to_text_lossy())
            .collect()
    }

    pub fn focus_count(&self) -> usize {
        self.focused.load(Ordering::Acquire)
    }

    pub fn fit_count(&self) -> usize {
        self.fitted.load(Ordering::Acquire)
    }
}

impl Terminal for RecordingTerminal {
    fn write_text(&self, text: &str) {
        self.writes.lock().push(Chunk::Text(text.to_string()));
    }

    fn write_bytes(&self, bytes: &[u8]) {
        self.writes.lock().push(Chunk::Binary(bytes.to_vec()));
    }

    fn focus(&self) {
        self.focused.fetch_add(1, Ordering::AcqRel);
    }

    fn fit(&self) {
        self.fitted.fetch_add(1, Ordering::AcqRel);
    }
}

/// Poll `condition` until it holds or `timeout` elapses
pub async fn wait_for(mut condition: impl FnMut() -> bool, timeout: Duration) -> bool {
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        if condition() {
            return true;
        }
        if tokio::time::Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}
