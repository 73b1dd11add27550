use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use stackdeck::transport::mock::{MockActions, MockConnector, MockStreamClient, RecordingTerminal};
use stackdeck::{Config, SessionId, SessionManager};

/// Upper bound for any single wait in the integration tests
pub const WAIT: Duration = Duration::from_secs(2);

/// A session manager backed by mock transports
pub struct Harness {
    pub manager: Arc<SessionManager>,
    pub streams: Arc<MockStreamClient>,
    pub connector: Arc<MockConnector>,
}

impl Harness {
    pub fn new(actions: MockActions) -> Self {
        Self::with_config(Config::default(), actions)
    }

    pub fn with_config(config: Config, actions: MockActions) -> Self {
        let streams = Arc::new(MockStreamClient::new(actions));
        let connector = Arc::new(MockConnector::new());
        let manager = Arc::new(SessionManager::new(
            config,
            streams.clone(),
            connector.clone(),
        ));
        Self {
            manager,
            streams,
            connector,
        }
    }

    /// Mount a recording terminal on a session
    pub fn attach(&self, id: &SessionId) -> Arc<RecordingTerminal> {
        let terminal = Arc::new(RecordingTerminal::new());
        self.manager
            .attach_terminal(id, terminal.clone())
            .expect("session should exist");
        terminal
    }

    pub fn actions(&self) -> &MockActions {
        self.streams.actions()
    }
}

/// Counts how many times a completion callback ran
#[derive(Clone, Default)]
pub struct DoneCounter(Arc<AtomicUsize>);

impl DoneCounter {
    pub fn callback(&self) -> impl FnOnce() + Send + 'static {
        let count = self.0.clone();
        move || {
            count.fetch_add(1, Ordering::AcqRel);
        }
    }

    pub fn count(&self) -> usize {
        self.0.load(Ordering::Acquire)
    }
}

/// Remove SGR escape sequences (`ESC [ ... m`) from terminal output
pub fn strip_ansi(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut chars = text.chars().peekable();
    while let Some(c) = chars.next() {
        if c == '\x1b' && chars.peek() == Some(&'[') {
            for next in chars.by_ref() {
                if next == 'm' {
                    break;
                }
            }
            continue;
        }
        out.push(c);
    }
    out
}

#[test]
fn test_strip_ansi() {
    assert_eq!(strip_ansi("\x1b[31m[error] boom\x1b[0m"), "[error] boom");
    assert_eq!(strip_ansi("plain"), "plain");
}
