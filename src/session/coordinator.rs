use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::session::{ActionError, SessionId, SessionRegistry, UnidirectionalAdapter};
use crate::transport::ActionStreamFn;

/// Deployment actions the orchestration host can run on a stack
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum DeployAction {
    Up,
    Down,
    Start,
    Stop,
    Restart,
    Update,
}

impl DeployAction {
    pub const ALL: [DeployAction; 6] = [
        DeployAction::Up,
        DeployAction::Down,
        DeployAction::Start,
        DeployAction::Stop,
        DeployAction::Restart,
        DeployAction::Update,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            DeployAction::Up => "up",
            DeployAction::Down => "down",
            DeployAction::Start => "start",
            DeployAction::Stop => "stop",
            DeployAction::Restart => "restart",
            DeployAction::Update => "update",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|action| action.as_str().eq_ignore_ascii_case(s.trim()))
    }
}

impl fmt::Display for DeployAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The action currently holding the single-flight lock
struct ActionLock {
    action: DeployAction,
    run: u64,
    cancel: CancellationToken,
    session_id: Option<SessionId>,
}

/// Allows at most one deployment action in flight.
///
/// Each run opens a read-only session titled `"{file}-{action}"`; a
/// previous session with the same title is cancelled and replaced.
#[derive(Clone)]
pub struct ActionCoordinator {
    registry: SessionRegistry,
    adapter: UnidirectionalAdapter,
    lock: Arc<Mutex<Option<ActionLock>>>,
    runs: Arc<AtomicU64>,
}

impl ActionCoordinator {
    pub fn new(registry: SessionRegistry) -> Self {
        Self {
            adapter: UnidirectionalAdapter::new(registry.clone()),
            registry,
            lock: Arc::new(Mutex::new(None)),
            runs: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn run_action(
        &self,
        file: &str,
        stream_fn: &ActionStreamFn,
        action: DeployAction,
        services: &[String],
        on_done: impl FnOnce() + Send + 'static,
    ) -> Result<SessionId, ActionError> {
        let run = self.runs.fetch_add(1, Ordering::AcqRel) + 1;
        let token = CancellationToken::new();
        {
            let mut lock = self.lock.lock();
            if let Some(active) = lock.as_ref() {
                tracing::info!(
                    requested = %action,
                    active = %active.action,
                    "Action rejected, another is running"
                );
                return Err(ActionError::Busy {
                    requested: action,
                    active: active.action,
                });
            }
            *lock = Some(ActionLock {
                action,
                run,
                cancel: token.clone(),
                session_id: None,
            });
        }

        let title = format!("{file}-{action}");
        for previous in self.registry.find_by_title(&title) {
            tracing::debug!(session_id = %previous, %title, "Replacing session with same title");
            self.registry.cancel(&previous);
            self.registry.remove(&previous);
        }

        tracing::info!(%file, %action, ?services, run, "Running action");
        let call = stream_fn(file, services);
        let release = self.lock.clone();
        let opened = self.adapter.open_with_token(title, call, token, move || {
            {
                let mut lock = release.lock();
                if lock.as_ref().is_some_and(|held| held.run == run) {
                    *lock = None;
                }
            }
            on_done();
        });

        if let Some(held) = self.lock.lock().as_mut().filter(|held| held.run == run) {
            held.session_id = Some(opened.id.clone());
        }
        Ok(opened.id)
    }

    /// Trip the running action, if any, and release the lock
    pub fn cancel(&self, reason: &str) -> bool {
        match self.lock.lock().take() {
            Some(held) => {
                tracing::info!(
                    action = %held.action,
                    session_id = ?held.session_id,
                    %reason,
                    "Cancelling action"
                );
                held.cancel.cancel();
                true
            }
            None => {
                tracing::debug!(%reason, "No action to cancel");
                false
            }
        }
    }

    pub fn active_action(&self) -> Option<DeployAction> {
        self.lock.lock().as_ref().map(|held| held.action)
    }

    pub fn active_session(&self) -> Option<SessionId> {
        self.lock.lock().as_ref().and_then(|held| held.session_id.clone())
    }

    pub fn is_running(&self) -> bool {
        self.lock.lock().is_some()
    }

    /// Release the lock without touching the running stream
    pub fn reset(&self) {
        self.lock.lock().take();
    }
}
