//! Session manager
//!
//! Entry point for UI code: owns the registry, the adapters and the action
//! coordinator, and turns user intents (open a log tail, open a shell, run
//! `up` on a stack) into sessions.

use std::sync::Arc;

use crate::config::Config;
use crate::session::{
    ActionCoordinator, ActionError, DeployAction, DuplexAdapter, SessionError, SessionId,
    SessionRegistry, SessionSnapshot, UnidirectionalAdapter,
};
use crate::terminal::Terminal;
use crate::transport::{DuplexConnector, StreamClient};

pub struct SessionManager {
    config: Config,
    registry: SessionRegistry,
    streams: Arc<dyn StreamClient>,
    logs: UnidirectionalAdapter,
    sockets: DuplexAdapter,
    actions: ActionCoordinator,
}

impl SessionManager {
    pub fn new(
        config: Config,
        streams: Arc<dyn StreamClient>,
        connector: Arc<dyn DuplexConnector>,
    ) -> Self {
        let registry = SessionRegistry::new();
        let sockets = DuplexAdapter::new(registry.clone(), connector)
            .with_closed_marker(config.closed_marker.clone());
        Self {
            logs: UnidirectionalAdapter::new(registry.clone()),
            actions: ActionCoordinator::new(registry.clone()),
            sockets,
            registry,
            streams,
            config,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn registry(&self) -> &SessionRegistry {
        &self.registry
    }

    fn ensure_capacity(&self, replacing: Option<&str>) -> Result<(), SessionError> {
        let evicted = replacing.map_or(0, |title| self.registry.find_by_title(title).len());
        let open = self.registry.len().saturating_sub(evicted);
        if open >= self.config.max_sessions {
            tracing::warn!(open, max = self.config.max_sessions, "Session limit reached");
            return Err(SessionError::TooManySessions(open));
        }
        Ok(())
    }

    /// Tail a log stream in a new read-only session
    pub fn open_log_session(
        &self,
        title: impl Into<String>,
        url: &str,
    ) -> Result<SessionId, SessionError> {
        self.ensure_capacity(None)?;
        let call = self.streams.log_stream(url);
        let opened = self.logs.open(title, call, || {});
        Ok(opened.id)
    }

    /// Open a socket session; `interactive` sessions accept input
    pub fn open_exec_session(
        &self,
        title: impl Into<String>,
        url: &str,
        interactive: bool,
    ) -> Result<SessionId, SessionError> {
        self.ensure_capacity(None)?;
        Ok(self.sockets.open(url, title, interactive))
    }

    pub fn run_action(
        &self,
        file: &str,
        action: DeployAction,
        services: &[String],
        on_done: impl FnOnce() + Send + 'static,
    ) -> Result<SessionId, SessionError> {
        // A running action outranks the session limit
        if let Some(active) = self.actions.active_action() {
            tracing::info!(requested = %action, %active, "Action rejected, another is running");
            return Err(ActionError::Busy {
                requested: action,
                active,
            }
            .into());
        }
        self.ensure_capacity(Some(&format!("{file}-{action}")))?;
        let stream_fn = self.streams.action_stream(action);
        let id = self
            .actions
            .run_action(file, &stream_fn, action, services, on_done)?;
        Ok(id)
    }

    pub fn cancel_action(&self, reason: &str) -> bool {
        self.actions.cancel(reason)
    }

    pub fn active_action(&self) -> Option<DeployAction> {
        self.actions.active_action()
    }

    /// Cancel a session's transport, then drop it from the registry
    pub fn close_session(&self, id: &SessionId) -> Result<(), SessionError> {
        if !self.registry.cancel(id) {
            return Err(SessionError::NotFound(id.clone()));
        }
        self.registry.remove(id);
        tracing::info!(session_id = %id, "Closed session");
        Ok(())
    }

    pub fn set_active(&self, id: &SessionId) -> Result<bool, SessionError> {
        if !self.registry.contains(id) {
            return Err(SessionError::NotFound(id.clone()));
        }
        Ok(self.registry.set_active(id))
    }

    /// Forward input to an interactive session.
    ///
    /// Returns `Ok(false)` when the socket is not open; the input is dropped.
    pub fn send_input(
        &self,
        id: &SessionId,
        data: impl Into<String>,
    ) -> Result<bool, SessionError> {
        let sink = self.registry.input_sink(id)?;
        Ok(sink.send(data))
    }

    pub fn sessions(&self) -> Vec<SessionSnapshot> {
        self.registry.snapshots()
    }

    pub fn session(&self, id: &SessionId) -> Option<SessionSnapshot> {
        self.registry.snapshot(id)
    }

    pub fn active_id(&self) -> Option<SessionId> {
        self.registry.active_id()
    }

    pub fn attach_terminal(
        &self,
        id: &SessionId,
        terminal: Arc<dyn Terminal>,
    ) -> Result<(), SessionError> {
        if self.registry.attach_terminal(id, terminal) {
            Ok(())
        } else {
            Err(SessionError::NotFound(id.clone()))
        }
    }

    pub fn detach_terminal(&self, id: &SessionId) -> Option<Arc<dyn Terminal>> {
        self.registry.detach_terminal(id)
    }

    pub fn next_tab(&self) -> Option<SessionId> {
        self.registry.next_tab()
    }

    pub fn prev_tab(&self) -> Option<SessionId> {
        self.registry.prev_tab()
    }

    /// Wait until a session's transport has ended.
    ///
    /// Returns the final snapshot, or `None` if the session was removed.
    pub async fn wait_for_end(&self, id: &SessionId) -> Option<SessionSnapshot> {
        let mut revisions = self.registry.subscribe();
        loop {
            let snapshot = self.registry.snapshot(id)?;
            if !snapshot.live {
                return Some(snapshot);
            }
            if revisions.changed().await.is_err() {
                return self.registry.snapshot(id);
            }
        }
    }

    /// Cancel every live transport. Sessions stay in the registry.
    pub fn shutdown(&self) {
        tracing::info!(sessions = self.registry.len(), "Shutting down sessions");
        self.actions.cancel("shutdown");
        self.registry.cancel_all();
    }
}
