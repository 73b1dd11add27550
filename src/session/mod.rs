//! Session multiplexer.
//!
//! A [`Session`] is one addressable tab of streamed output: a log tail, an
//! exec shell or a deployment action. Sessions live in a shared
//! [`SessionRegistry`] and are only mutated through it; adapters bind them
//! to their transports and the [`ActionCoordinator`] keeps deployment
//! actions single-flight.

pub mod coordinator;
pub mod duplex;
pub mod error;
pub mod manager;
pub mod registry;
pub mod unidirectional;

use std::borrow::Cow;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::terminal::{closed_marker, error_marker, Terminal};

pub use coordinator::{ActionCoordinator, DeployAction};
pub use duplex::DuplexAdapter;
pub use error::{ActionError, SessionError};
pub use manager::SessionManager;
pub use registry::SessionRegistry;
pub use unidirectional::{OpenedStream, UnidirectionalAdapter};

/// Stable session identifier, also used as the tab key
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(String);

impl SessionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn from_string(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One unit of session output
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum Chunk {
    Text(String),
    Binary(Vec<u8>),
}

impl Chunk {
    pub fn len(&self) -> usize {
        match self {
            Chunk::Text(text) => text.len(),
            Chunk::Binary(bytes) => bytes.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn to_text_lossy(&self) -> Cow<'_, str> {
        match self {
            Chunk::Text(text) => Cow::Borrowed(text),
            Chunk::Binary(bytes) => String::from_utf8_lossy(bytes),
        }
    }

    /// Binary chunks go out as raw bytes, text as text
    pub fn write_to(&self, terminal: &dyn Terminal) {
        match self {
            Chunk::Text(text) => terminal.write_text(text),
            Chunk::Binary(bytes) => terminal.write_bytes(bytes),
        }
    }
}

impl From<&str> for Chunk {
    fn from(text: &str) -> Self {
        Chunk::Text(text.to_string())
    }
}

impl From<String> for Chunk {
    fn from(text: String) -> Self {
        Chunk::Text(text)
    }
}

/// Presence of an open transport; tripping its token releases it
#[derive(Debug, Clone, Default)]
pub struct LiveHandle {
    token: CancellationToken,
}

impl LiveHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_token(token: CancellationToken) -> Self {
        Self { token }
    }

    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }
}

/// Keystroke channel of an interactive session.
///
/// Input is forwarded only while the socket is open; anything sent before
/// it opens or after it closes is dropped.
#[derive(Debug, Clone)]
pub struct InputSink {
    tx: mpsc::UnboundedSender<String>,
    open: Arc<AtomicBool>,
}

impl InputSink {
    pub(crate) fn channel() -> (Self, mpsc::UnboundedReceiver<String>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let sink = Self {
            tx,
            open: Arc::new(AtomicBool::new(false)),
        };
        (sink, rx)
    }

    /// Returns whether the input was accepted for the socket
    pub fn send(&self, data: impl Into<String>) -> bool {
        if !self.is_open() {
            tracing::trace!("Dropping input, socket not open");
            return false;
        }
        self.tx.send(data.into()).is_ok()
    }

    pub fn is_open(&self) -> bool {
        self.open.load(Ordering::Acquire)
    }

    pub(crate) fn set_open(&self, open: bool) {
        self.open.store(open, Ordering::Release);
    }
}

/// Interactive sessions carry their input sink; read-only ones have none
#[derive(Debug, Clone)]
pub enum SessionKind {
    Interactive(InputSink),
    ReadOnly,
}

impl SessionKind {
    pub fn is_interactive(&self) -> bool {
        matches!(self, SessionKind::Interactive(_))
    }

    pub fn input(&self) -> Option<&InputSink> {
        match self {
            SessionKind::Interactive(sink) => Some(sink),
            SessionKind::ReadOnly => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SessionKind::Interactive(_) => "interactive",
            SessionKind::ReadOnly => "read-only",
        }
    }
}

/// How a session's transport ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionOutcome {
    /// Source exhausted normally
    Completed,
    /// Closed or cancelled; the text is shown as a neutral marker
    Closed(String),
    /// Failed; the message becomes the session error
    Failed(String),
}

/// Represents a single output session (one tab)
pub struct Session {
    id: SessionId,
    title: String,
    kind: SessionKind,
    /// Replay cache, append-only while live
    cache: Vec<Chunk>,
    live: Option<LiveHandle>,
    error: Option<String>,
    /// Marker written when the transport ended, replayed after the cache
    end_marker: Option<String>,
    created_at: DateTime<Utc>,
    /// New output arrived while the tab was not active
    needs_attention: bool,
    /// Terminal widget currently mounted for this session
    terminal: Option<Arc<dyn Terminal>>,
}

impl Session {
    pub(crate) fn new(title: impl Into<String>, kind: SessionKind, live: LiveHandle) -> Self {
        Self {
            id: SessionId::new(),
            title: title.into(),
            kind,
            cache: Vec::new(),
            live: Some(live),
            error: None,
            end_marker: None,
            created_at: Utc::now(),
            needs_attention: false,
            terminal: None,
        }
    }

    pub fn id(&self) -> &SessionId {
        &self.id
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn kind(&self) -> &SessionKind {
        &self.kind
    }

    pub fn input(&self) -> Option<&InputSink> {
        self.kind.input()
    }

    pub fn cache(&self) -> &[Chunk] {
        &self.cache
    }

    /// Whether the transport is still streaming
    pub fn is_live(&self) -> bool {
        self.live.is_some()
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn needs_attention(&self) -> bool {
        self.needs_attention
    }

    /// Release the underlying transport. Idempotent; a no-op once the
    /// session has ended.
    pub fn cancel(&self) {
        if let Some(live) = &self.live {
            live.cancel();
        }
    }

    /// Append output, echoing it to the mounted terminal.
    ///
    /// Refused once the session has ended.
    pub(crate) fn push_chunk(&mut self, chunk: Chunk) -> bool {
        if self.live.is_none() {
            return false;
        }
        if let Some(terminal) = &self.terminal {
            chunk.write_to(terminal.as_ref());
        }
        self.cache.push(chunk);
        true
    }

    /// Clear the live handle. Returns false if it was already clear.
    pub(crate) fn finish(&mut self, outcome: SessionOutcome) -> bool {
        if self.live.take().is_none() {
            return false;
        }

        let marker = match outcome {
            SessionOutcome::Completed => None,
            SessionOutcome::Closed(text) => Some(closed_marker(&text)),
            SessionOutcome::Failed(message) => {
                let marker = error_marker(&message);
                self.error = Some(message);
                Some(marker)
            }
        };

        if let (Some(marker), Some(terminal)) = (&marker, &self.terminal) {
            terminal.write_text(marker);
        }
        self.end_marker = marker;
        true
    }

    pub(crate) fn set_needs_attention(&mut self, needs_attention: bool) {
        self.needs_attention = needs_attention;
    }

    /// Mount a terminal, replaying everything it missed
    pub(crate) fn mount(&mut self, terminal: Arc<dyn Terminal>) {
        terminal.fit();
        for chunk in &self.cache {
            chunk.write_to(terminal.as_ref());
        }
        if let Some(marker) = &self.end_marker {
            terminal.write_text(marker);
        }
        terminal.focus();
        self.terminal = Some(terminal);
    }

    pub(crate) fn unmount(&mut self) -> Option<Arc<dyn Terminal>> {
        self.terminal.take()
    }

    pub(crate) fn focus_terminal(&self) {
        if let Some(terminal) = &self.terminal {
            terminal.focus();
        }
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            id: self.id.clone(),
            title: self.title.clone(),
            interactive: self.kind.is_interactive(),
            cache: self.cache.clone(),
            live: self.is_live(),
            error: self.error.clone(),
            needs_attention: self.needs_attention,
            created_at: self.created_at,
        }
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("title", &self.title)
            .field("kind", &self.kind.as_str())
            .field("chunks", &self.cache.len())
            .field("live", &self.is_live())
            .field("error", &self.error)
            .finish_non_exhaustive()
    }
}

/// Read-only view of a session for rendering tabs and panes
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionSnapshot {
    pub id: SessionId,
    pub title: String,
    pub interactive: bool,
    pub cache: Vec<Chunk>,
    pub live: bool,
    pub error: Option<String>,
    pub needs_attention: bool,
    pub created_at: DateTime<Utc>,
}

impl SessionSnapshot {
    /// Text of every cached chunk, in order
    pub fn cached_text(&self) -> Vec<String> {
        self.cache
            .iter()
            .map(|chunk| chunk.to_text_lossy().into_owned())
            .collect()
    }
}
