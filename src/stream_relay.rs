//! Fire-and-forget delivery of run output and status events to the front-end.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};

use assistant_session::{CoderProfile, CommandKind, StreamRole};
use serde_json::{json, Value};

use crate::connection::ConnectionState;
use crate::error::RemoteError;
use crate::remote::{methods, RemotePeer, RemoteReply};
use crate::runtime::TaskBridge;

/// One piece of a streamed message. `final_chunk` is the only end-of-message marker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamChunk {
    pub payload: String,
    pub final_chunk: bool,
    pub role: StreamRole,
}

impl StreamChunk {
    #[must_use]
    pub fn assistant(payload: impl Into<String>, final_chunk: bool) -> Self {
        Self {
            payload: payload.into(),
            final_chunk,
            role: StreamRole::Assistant,
        }
    }

    /// Command output is prefixed with its kind so the front-end can style it.
    #[must_use]
    pub fn command(kind: CommandKind, text: &str) -> Self {
        Self {
            payload: format!("{}:{text}", kind.as_str()),
            final_chunk: false,
            role: StreamRole::Command,
        }
    }
}

/// Sends are issued in call order and never report failure to the caller.
pub struct StreamRelay {
    bridge: TaskBridge,
    peer: Arc<dyn RemotePeer>,
    connection: ConnectionState,
    pending: Arc<Mutex<VecDeque<Outbound>>>,
}

struct Outbound {
    method: &'static str,
    params: Vec<Value>,
}

impl StreamRelay {
    pub fn new(bridge: TaskBridge, peer: Arc<dyn RemotePeer>, connection: ConnectionState) -> Self {
        Self {
            bridge,
            peer,
            connection,
            pending: Arc::new(Mutex::new(VecDeque::new())),
        }
    }

    /// Forwards a chunk; dropped while no front-end is attached.
    pub fn emit(&self, chunk: StreamChunk) {
        if !self.connection.is_connected() {
            tracing::debug!(role = chunk.role.as_str(), "no front-end attached; chunk dropped");
            return;
        }

        self.send(
            methods::STREAM_WRITE,
            vec![
                Value::String(chunk.payload),
                Value::Bool(chunk.final_chunk),
                json!(chunk.role.as_str()),
            ],
        );
    }

    pub fn emit_command(&self, kind: CommandKind, text: &str) {
        self.emit(StreamChunk::command(kind, text));
    }

    /// A complete assistant message, sent as a single final chunk.
    pub fn emit_assistant_message(&self, text: &str) {
        self.emit(StreamChunk::assistant(text, true));
    }

    /// Tells the front-end the current run is over. Never gated on connection state.
    pub fn signal_complete(&self) {
        self.send(methods::STREAM_COMPLETE, Vec::new());
    }

    pub fn notify_coder_changed(&self, profile: &CoderProfile) {
        self.send(
            methods::CODER_TYPE_CHANGED,
            vec![json!(profile.kind), json!(profile.edit_format)],
        );
    }

    pub fn notify_files_changed(&self) {
        self.send(methods::LOAD_FILE_TREE, Vec::new());
    }

    /// Queues the call and schedules a drain if none is pending.
    fn send(&self, method: &'static str, params: Vec<Value>) {
        let should_drain = {
            let mut pending = lock_unpoisoned(&self.pending);
            let should_drain = pending.is_empty();
            pending.push_back(Outbound { method, params });
            should_drain
        };

        if should_drain {
            let pending = Arc::clone(&self.pending);
            let peer = Arc::clone(&self.peer);
            let _ = self.bridge.schedule(drain_pending(pending, peer));
        }
    }
}

/// Issues every queued call under the queue lock, then awaits the replies.
///
/// Issuing under the lock keeps delivery order equal to submission order
/// even when drains run on different threads.
async fn drain_pending(
    pending: Arc<Mutex<VecDeque<Outbound>>>,
    peer: Arc<dyn RemotePeer>,
) -> Result<(), RemoteError> {
    let replies: Vec<(&'static str, RemoteReply)> = {
        let mut pending = lock_unpoisoned(&pending);
        pending
            .drain(..)
            .map(|outbound| (outbound.method, peer.call(outbound.method, outbound.params)))
            .collect()
    };

    for (method, reply) in replies {
        if let Err(error) = reply.await {
            tracing::warn!(method, %error, "remote delivery failed");
            report_delivery_failure(peer.as_ref(), &error).await;
        }
    }

    Ok(())
}

async fn report_delivery_failure(peer: &dyn RemotePeer, error: &RemoteError) {
    let notice = peer.call(methods::STREAM_ERROR, vec![json!(error.to_string())]);
    if let Err(notice_error) = notice.await {
        tracing::warn!(error = %notice_error, "failed to send stream error notice");
    }
}

fn lock_unpoisoned<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}
