use serde_json::Value;
use thiserror::Error;

/// Failure of an outbound call to the remote peer.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum RemoteError {
    #[error("no remote peer is connected")]
    NotConnected,

    #[error("remote transport failed: {0}")]
    Transport(String),

    #[error("remote peer rejected {method}: {message}")]
    Rejected { method: String, message: String },

    #[error("remote peer sent an unusable reply to {method}: {reply}")]
    InvalidReply { method: String, reply: Value },
}

impl RemoteError {
    #[must_use]
    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport(message.into())
    }

    #[must_use]
    pub fn rejected(method: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Rejected {
            method: method.into(),
            message: message.into(),
        }
    }
}

/// Failure observed through a [`crate::runtime::ScheduledTask`].
#[derive(Debug, Clone, PartialEq, Error)]
pub enum TaskError {
    #[error(transparent)]
    Remote(#[from] RemoteError),

    #[error("dispatcher shut down before the task completed")]
    DispatcherGone,

    #[error("refusing to block the dispatcher thread on its own task")]
    WaitOnDispatcherThread,

    #[error("task was not scheduled on the dispatcher and cannot be waited on")]
    NotAwaitable,
}

/// Caller misuse reported back through the RPC surface.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExecutorError {
    #[error("a run is already active on worker {worker_id}")]
    RunAlreadyActive { worker_id: String },

    #[error("no active run to cancel")]
    NothingToCancel,

    #[error("failed to spawn run worker: {0}")]
    Spawn(String),
}

impl ExecutorError {
    /// Stable status string used in RPC replies.
    #[must_use]
    pub fn status(&self) -> &'static str {
        match self {
            Self::RunAlreadyActive { .. } => "run_already_active",
            Self::NothingToCancel => "nothing_to_cancel",
            Self::Spawn(_) => "spawn_failed",
        }
    }
}
