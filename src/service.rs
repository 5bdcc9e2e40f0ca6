//! The bridge as seen by a transport: construction plus the `run`/`cancel` methods.

use std::sync::Arc;

use assistant_session::{AssistantSession, DefaultAnswer, LocalConfirm};
use serde_json::{json, Value};
use time::format_description::well_known::Rfc3339;

use crate::confirm::ConfirmationChannel;
use crate::connection::ConnectionState;
use crate::executor::{RunExecutor, StartOutcome};
use crate::remote::RemotePeer;
use crate::runtime::{DispatcherHandle, TaskBridge};
use crate::session::{ObserverId, SessionRegistry};
use crate::stream_relay::StreamRelay;

/// Inbound method names served by [`CoderRelay::dispatch`].
pub mod methods {
    pub const RUN: &str = "run";
    pub const CANCEL: &str = "cancel";
}

/// Fully wired bridge between one assistant session and a remote front-end.
pub struct CoderRelay {
    relay: Arc<StreamRelay>,
    confirm: Arc<ConfirmationChannel>,
    executor: Arc<RunExecutor>,
    connection: ConnectionState,
    kind_observer: ObserverId,
}

impl CoderRelay {
    /// Wires the components around `peer`, answering confirmations with
    /// [`DefaultAnswer`] whenever the front-end cannot.
    pub fn new(
        dispatcher: Option<DispatcherHandle>,
        peer: Arc<dyn RemotePeer>,
        connection: ConnectionState,
        session: Arc<dyn AssistantSession>,
    ) -> Self {
        Self::with_fallback(dispatcher, peer, connection, session, Arc::new(DefaultAnswer))
    }

    pub fn with_fallback(
        dispatcher: Option<DispatcherHandle>,
        peer: Arc<dyn RemotePeer>,
        connection: ConnectionState,
        session: Arc<dyn AssistantSession>,
        fallback: Arc<dyn LocalConfirm>,
    ) -> Self {
        let bridge = TaskBridge::new(dispatcher);
        let relay = Arc::new(StreamRelay::new(
            bridge.clone(),
            Arc::clone(&peer),
            connection.clone(),
        ));
        let confirm = Arc::new(ConfirmationChannel::new(bridge, peer, fallback));
        let sessions = Arc::new(SessionRegistry::new(session));

        let kind_observer = {
            let relay = Arc::clone(&relay);
            sessions.register_observer(move |profile| relay.notify_coder_changed(profile))
        };
        let executor = RunExecutor::new(sessions, Arc::clone(&relay), Arc::clone(&confirm));

        Self {
            relay,
            confirm,
            executor,
            connection,
            kind_observer,
        }
    }

    /// `run(message)`: starts a run and answers before it finishes.
    pub fn run(&self, message: &str) -> Value {
        match self.executor.start(message) {
            Ok(StartOutcome::Started(handle)) => json!({
                "status": "started",
                "workerId": handle.worker_id,
                "startedAt": handle.started_at.format(&Rfc3339).ok(),
            }),
            Ok(StartOutcome::LocalCommand(command)) => json!({
                "status": "terminal_command_detected",
                "command": command,
            }),
            Err(error) => json!({
                "status": error.status(),
                "error": error.to_string(),
            }),
        }
    }

    /// `cancel()`: interrupts the active run, if any.
    pub fn cancel(&self) -> Value {
        match self.executor.cancel() {
            Ok(_) => json!({ "status": "interrupt_sent" }),
            Err(error) => json!({
                "status": error.status(),
                "error": error.to_string(),
            }),
        }
    }

    /// Routes an inbound call by name; `None` for methods this bridge does not serve.
    ///
    /// `run` takes its message as the first positional parameter; anything
    /// else is answered with `invalid_params` and starts nothing.
    pub fn dispatch(&self, method: &str, params: &[Value]) -> Option<Value> {
        match method {
            methods::RUN => Some(match params.first().and_then(Value::as_str) {
                Some(message) => self.run(message),
                None => json!({
                    "status": "invalid_params",
                    "error": "run expects the message as a string first parameter",
                }),
            }),
            methods::CANCEL => Some(self.cancel()),
            _ => None,
        }
    }

    /// Installs a new session, announcing it to the front-end if its kind changed.
    pub fn install_session(&self, session: Arc<dyn AssistantSession>) -> bool {
        self.executor.sessions().install(session)
    }

    #[must_use]
    pub fn executor(&self) -> &Arc<RunExecutor> {
        &self.executor
    }

    #[must_use]
    pub fn relay(&self) -> &Arc<StreamRelay> {
        &self.relay
    }

    #[must_use]
    pub fn confirmations(&self) -> &Arc<ConfirmationChannel> {
        &self.confirm
    }

    #[must_use]
    pub fn connection(&self) -> &ConnectionState {
        &self.connection
    }
}

impl Drop for CoderRelay {
    fn drop(&mut self) {
        self.executor.sessions().unregister_observer(self.kind_observer);
    }
}
