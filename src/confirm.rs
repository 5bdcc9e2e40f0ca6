//! Synchronous yes/no questions answered by the remote front-end.
//!
//! The assistant asks from its run worker and expects an answer before it
//! continues. [`ConfirmationChannel::ask`] submits a round trip to the
//! dispatcher and parks only that worker until the reply arrives.
//!
//! The round trip has no timeout: a user may take arbitrarily long to
//! answer. If the front-end disappears mid-question and the transport never
//! reports the loss, the asking worker stays blocked until the process exits.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard};

use assistant_session::{ConfirmationRequest, ConfirmationResponse, LocalConfirm};
use serde_json::Value;

use crate::error::{RemoteError, TaskError};
use crate::remote::{methods, RemotePeer};
use crate::runtime::TaskBridge;

type NeverAskKey = (String, Option<String>);

pub struct ConfirmationChannel {
    bridge: TaskBridge,
    peer: Arc<dyn RemotePeer>,
    fallback: Arc<dyn LocalConfirm>,
    never_ask: Mutex<HashSet<NeverAskKey>>,
}

impl ConfirmationChannel {
    /// `fallback` answers whenever the round trip cannot happen or fails.
    pub fn new(
        bridge: TaskBridge,
        peer: Arc<dyn RemotePeer>,
        fallback: Arc<dyn LocalConfirm>,
    ) -> Self {
        Self {
            bridge,
            peer,
            fallback,
            never_ask: Mutex::new(HashSet::new()),
        }
    }

    /// Asks the front-end and blocks the calling worker until it answers.
    ///
    /// Calls from the dispatcher thread, or from any thread driving a tokio
    /// runtime, get the local answer and send nothing to the front-end.
    pub fn ask(&self, request: ConfirmationRequest) -> ConfirmationResponse {
        let key = request.never_ask_key();
        if lock_unpoisoned(&self.never_ask).contains(&key) {
            tracing::debug!(question = %request.question, "suppressed by an earlier don't-ask-again");
            return ConfirmationResponse::No;
        }

        if !self.bridge.dispatcher_live() {
            tracing::warn!("no dispatcher running; answering confirmation locally");
            return self.fallback.confirm_locally(&request);
        }

        // Nothing is sent unless this thread can wait for the answer.
        if !self.bridge.can_block_current_thread() {
            tracing::warn!("confirmation asked from a runtime thread; answering locally");
            return self.fallback.confirm_locally(&request);
        }

        match self.round_trip(&request) {
            Ok(ConfirmationResponse::DontAskAgain) if request.allow_never => {
                lock_unpoisoned(&self.never_ask).insert(key);
                ConfirmationResponse::No
            }
            Ok(response) => response,
            Err(error) => {
                tracing::warn!(%error, "confirmation round trip failed; answering locally");
                self.fallback.confirm_locally(&request)
            }
        }
    }

    /// True when `(question, subject)` was answered with don't-ask-again.
    #[must_use]
    pub fn is_suppressed(&self, question: &str, subject: Option<&str>) -> bool {
        let key = (question.to_string(), subject.map(str::to_string));
        lock_unpoisoned(&self.never_ask).contains(&key)
    }

    fn round_trip(&self, request: &ConfirmationRequest) -> Result<ConfirmationResponse, TaskError> {
        let payload = serde_json::to_value(request)
            .map_err(|error| RemoteError::transport(format!("unserializable request: {error}")))?;
        let peer = Arc::clone(&self.peer);

        self.bridge
            .schedule(async move {
                let reply = peer
                    .call(methods::CONFIRMATION_REQUEST, vec![payload])
                    .await?;
                parse_reply(reply)
            })
            .wait()
    }
}

/// Interprets a front-end reply.
///
/// A single-entry object is unwrapped to its value first.
pub fn parse_reply(reply: Value) -> Result<ConfirmationResponse, RemoteError> {
    let value = match reply {
        Value::Object(map) if map.len() == 1 => map.into_iter().next().map(|(_, value)| value),
        other => Some(other),
    };

    let parsed = match &value {
        Some(Value::Bool(answer)) => Some(ConfirmationResponse::from_bool(*answer)),
        Some(Value::String(answer)) => match answer.trim().to_ascii_lowercase().as_str() {
            "y" | "yes" | "true" => Some(ConfirmationResponse::Yes),
            "n" | "no" | "false" => Some(ConfirmationResponse::No),
            "d" | "never" | "dont_ask" | "don't ask again" => {
                Some(ConfirmationResponse::DontAskAgain)
            }
            _ => None,
        },
        _ => None,
    };

    parsed.ok_or_else(|| RemoteError::InvalidReply {
        method: methods::CONFIRMATION_REQUEST.to_string(),
        reply: value.unwrap_or(Value::Null),
    })
}

fn lock_unpoisoned<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}
