use crate::session::{DeployAction, SessionId};

/// Errors surfaced synchronously to the UI by session operations
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("session not found: {0}")]
    NotFound(SessionId),

    #[error("session {0} does not accept input")]
    NotInteractive(SessionId),

    #[error("session limit reached ({0} open)")]
    TooManySessions(usize),

    #[error(transparent)]
    Action(#[from] ActionError),
}

/// Rejection of a deployment action
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ActionError {
    /// Only one deployment action may be in flight at a time
    #[error("cannot start {requested}: {active} is already running")]
    Busy {
        requested: DeployAction,
        active: DeployAction,
    },
}
