use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::watch;

use crate::session::{
    Chunk, InputSink, Session, SessionError, SessionId, SessionOutcome, SessionSnapshot,
};
use crate::terminal::Terminal;

#[derive(Default)]
struct RegistryState {
    /// Sessions in tab order
    sessions: Vec<Session>,
    /// Currently active tab
    active: Option<SessionId>,
}

impl RegistryState {
    fn position(&self, id: &SessionId) -> Option<usize> {
        self.sessions.iter().position(|s| s.id() == id)
    }

    fn get(&self, id: &SessionId) -> Option<&Session> {
        self.sessions.iter().find(|s| s.id() == id)
    }

    fn get_mut(&mut self, id: &SessionId) -> Option<&mut Session> {
        self.sessions.iter_mut().find(|s| s.id() == id)
    }

    fn activate(&mut self, index: usize) {
        if let Some(session) = self.sessions.get_mut(index) {
            session.set_needs_attention(false);
            self.active = Some(session.id().clone());
        }
    }

    fn active_index(&self) -> Option<usize> {
        self.active.as_ref().and_then(|id| self.position(id))
    }
}

/// Ordered, shared collection of sessions plus the active tab.
///
/// Cloning yields another handle to the same registry. Every operation
/// takes the lock for its whole read-modify-write, so callers always act
/// on the current stored session, never on a stale copy.
#[derive(Clone)]
pub struct SessionRegistry {
    state: Arc<Mutex<RegistryState>>,
    /// Bumped after every mutation so views know to re-render
    revision: Arc<watch::Sender<u64>>,
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionRegistry {
    pub fn new() -> Self {
        let (revision, _) = watch::channel(0);
        Self {
            state: Arc::new(Mutex::new(RegistryState::default())),
            revision: Arc::new(revision),
        }
    }

    /// Receiver that changes whenever the registry is mutated
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.revision.subscribe()
    }

    fn bump(&self) {
        self.revision.send_modify(|rev| *rev = rev.wrapping_add(1));
    }

    /// Insert a session, or replace the one with the same id in place, and
    /// make it active
    pub fn add(&self, session: Session) -> SessionId {
        let id = session.id().clone();
        {
            let mut state = self.state.lock();
            let index = match state.position(&id) {
                Some(index) => {
                    tracing::debug!(session_id = %id, "Replacing existing session");
                    state.sessions[index] = session;
                    index
                }
                None => {
                    state.sessions.push(session);
                    state.sessions.len() - 1
                }
            };
            state.activate(index);
        }
        self.bump();
        id
    }

    /// Read-modify-write a session. Absent ids are ignored (the session may
    /// have been closed while its transport was still reporting).
    pub fn update(&self, id: &SessionId, f: impl FnOnce(&mut Session)) -> bool {
        {
            let mut state = self.state.lock();
            let Some(session) = state.get_mut(id) else {
                tracing::debug!(session_id = %id, "Ignoring update for missing session");
                return false;
            };
            f(session);
        }
        self.bump();
        true
    }

    /// Remove a session. Pure data removal: callers cancel first.
    pub fn remove(&self, id: &SessionId) -> Option<Session> {
        let removed = {
            let mut state = self.state.lock();
            let index = state.position(id)?;
            let removed = state.sessions.remove(index);

            if state.active.as_ref() == Some(id) {
                state.active = None;
                let next = index.min(state.sessions.len().saturating_sub(1));
                if !state.sessions.is_empty() {
                    state.activate(next);
                }
            }
            removed
        };
        self.bump();
        Some(removed)
    }

    /// Switch to a session by id; false if unknown or already active
    pub fn set_active(&self, id: &SessionId) -> bool {
        let changed = {
            let mut state = self.state.lock();
            match state.position(id) {
                Some(_) if state.active.as_ref() == Some(id) => false,
                Some(index) => {
                    state.activate(index);
                    true
                }
                None => false,
            }
        };
        if changed {
            self.bump();
        }
        changed
    }

    /// Switch to the next tab, wrapping around
    pub fn next_tab(&self) -> Option<SessionId> {
        let next = {
            let mut state = self.state.lock();
            if state.sessions.is_empty() {
                return None;
            }
            let next = state
                .active_index()
                .map(|i| (i + 1) % state.sessions.len())
                .unwrap_or(0);
            state.activate(next);
            state.active.clone()
        };
        self.bump();
        next
    }

    /// Switch to the previous tab, wrapping around
    pub fn prev_tab(&self) -> Option<SessionId> {
        let prev = {
            let mut state = self.state.lock();
            let len = state.sessions.len();
            if len == 0 {
                return None;
            }
            let prev = match state.active_index() {
                Some(0) | None => len - 1,
                Some(i) => i - 1,
            };
            state.activate(prev);
            state.active.clone()
        };
        self.bump();
        prev
    }

    pub fn active_id(&self) -> Option<SessionId> {
        self.state.lock().active.clone()
    }

    pub fn len(&self) -> usize {
        self.state.lock().sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.lock().sessions.is_empty()
    }

    pub fn contains(&self, id: &SessionId) -> bool {
        self.state.lock().position(id).is_some()
    }

    /// Ids in tab order
    pub fn ids(&self) -> Vec<SessionId> {
        self.state
            .lock()
            .sessions
            .iter()
            .map(|s| s.id().clone())
            .collect()
    }

    /// Ids of every session with this title, in tab order
    pub fn find_by_title(&self, title: &str) -> Vec<SessionId> {
        self.state
            .lock()
            .sessions
            .iter()
            .filter(|s| s.title() == title)
            .map(|s| s.id().clone())
            .collect()
    }

    /// Get tab names for display
    pub fn tab_names(&self) -> Vec<String> {
        self.state
            .lock()
            .sessions
            .iter()
            .map(|s| s.title().to_string())
            .collect()
    }

    pub fn snapshot(&self, id: &SessionId) -> Option<SessionSnapshot> {
        self.state.lock().get(id).map(Session::snapshot)
    }

    /// Snapshots of all sessions in tab order
    pub fn snapshots(&self) -> Vec<SessionSnapshot> {
        self.state
            .lock()
            .sessions
            .iter()
            .map(Session::snapshot)
            .collect()
    }

    /// Append output to a live session and echo it to its terminal.
    ///
    /// Output for a background tab flags it as needing attention.
    pub fn append_chunk(&self, id: &SessionId, chunk: Chunk) -> bool {
        let appended = {
            let mut state = self.state.lock();
            let is_active = state.active.as_ref() == Some(id);
            let Some(session) = state.get_mut(id) else {
                tracing::debug!(session_id = %id, "Dropping output for missing session");
                return false;
            };
            let appended = session.push_chunk(chunk);
            if appended && !is_active {
                session.set_needs_attention(true);
            }
            appended
        };
        if appended {
            self.bump();
        } else {
            tracing::debug!(session_id = %id, "Dropping output for ended session");
        }
        appended
    }

    /// Mark a session's transport as ended
    pub fn finish(&self, id: &SessionId, outcome: SessionOutcome) -> bool {
        let mut finished = false;
        self.update(id, |session| finished = session.finish(outcome));
        finished
    }

    /// Trip a session's cancellation token without removing it
    pub fn cancel(&self, id: &SessionId) -> bool {
        match self.state.lock().get(id) {
            Some(session) => {
                session.cancel();
                true
            }
            None => false,
        }
    }

    pub fn cancel_all(&self) {
        for session in &self.state.lock().sessions {
            session.cancel();
        }
    }

    pub fn input_sink(&self, id: &SessionId) -> Result<InputSink, SessionError> {
        let state = self.state.lock();
        let session = state
            .get(id)
            .ok_or_else(|| SessionError::NotFound(id.clone()))?;
        session
            .input()
            .cloned()
            .ok_or_else(|| SessionError::NotInteractive(id.clone()))
    }

    /// Mount a terminal for a session, replaying its cache into it
    pub fn attach_terminal(&self, id: &SessionId, terminal: Arc<dyn Terminal>) -> bool {
        self.update(id, |session| session.mount(terminal))
    }

    pub fn detach_terminal(&self, id: &SessionId) -> Option<Arc<dyn Terminal>> {
        let mut detached = None;
        self.update(id, |session| detached = session.unmount());
        detached
    }

    pub(crate) fn focus_terminal(&self, id: &SessionId) {
        if let Some(session) = self.state.lock().get(id) {
            session.focus_terminal();
        }
    }
}
