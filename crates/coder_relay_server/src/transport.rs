//! Newline-delimited JSON over TCP.
//!
//! Each line is one frame. Requests are `{"id","method","params"}`; replies
//! are `{"id","result"}` or `{"id","error"}`. Both sides may issue requests.
//! Outbound ids are strings of the form `out-<n>`.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use coder_relay::{CoderRelay, RemoteError, RemotePeer, RemoteReply};
use futures_util::future;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::net::TcpListener;
use tokio::sync::{mpsc, oneshot};

pub type PeerId = u64;

type PendingReply = (String, oneshot::Sender<Result<Value, RemoteError>>);

/// One inbound line, either a request or a reply to one of ours.
#[derive(Debug, Deserialize)]
struct Frame {
    #[serde(default)]
    id: Option<Value>,
    #[serde(default)]
    method: Option<String>,
    #[serde(default)]
    params: Vec<Value>,
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    error: Option<Value>,
}

#[derive(Debug, Serialize)]
struct OutboundRequest<'a> {
    id: &'a str,
    method: &'a str,
    params: &'a [Value],
}

#[derive(Debug, Serialize)]
struct OutboundReply {
    id: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<Value>,
}

struct PeerSlot {
    id: PeerId,
    outbound: mpsc::UnboundedSender<String>,
    pending: HashMap<String, PendingReply>,
}

/// Every attached front-end. Outbound calls go to the most recently attached one.
#[derive(Default)]
pub struct PeerRegistry {
    peers: Mutex<Vec<PeerSlot>>,
    next_peer_id: AtomicU64,
    next_call_id: AtomicU64,
}

impl PeerRegistry {
    /// Registers a peer whose outbound frames are written from `outbound`.
    pub fn attach(&self, outbound: mpsc::UnboundedSender<String>) -> PeerId {
        let id = self.next_peer_id.fetch_add(1, Ordering::SeqCst) + 1;
        lock_unpoisoned(&self.peers).push(PeerSlot {
            id,
            outbound,
            pending: HashMap::new(),
        });
        tracing::info!(peer = id, "front-end attached");
        id
    }

    /// Removes the peer and fails every call still waiting on it.
    pub fn detach(&self, peer: PeerId) {
        let slot = {
            let mut peers = lock_unpoisoned(&self.peers);
            let position = peers.iter().position(|slot| slot.id == peer);
            position.map(|position| peers.remove(position))
        };

        let Some(slot) = slot else {
            return;
        };
        tracing::info!(peer, pending = slot.pending.len(), "front-end detached");
        for (_, (method, reply)) in slot.pending {
            let _ = reply.send(Err(RemoteError::transport(format!(
                "peer disconnected before answering {method}"
            ))));
        }
    }

    /// Routes a reply frame to the call waiting on `id`. Returns false if none was.
    fn resolve(&self, peer: PeerId, id: &str, outcome: ReplyOutcome) -> bool {
        let pending = {
            let mut peers = lock_unpoisoned(&self.peers);
            peers
                .iter_mut()
                .find(|slot| slot.id == peer)
                .and_then(|slot| slot.pending.remove(id))
        };

        let Some((method, reply)) = pending else {
            return false;
        };
        let outcome = match outcome {
            ReplyOutcome::Result(value) => Ok(value),
            ReplyOutcome::Error(error) => Err(RemoteError::rejected(method, error_message(&error))),
        };
        let _ = reply.send(outcome);
        true
    }

    fn send_to(&self, peer: PeerId, line: String) {
        let peers = lock_unpoisoned(&self.peers);
        if let Some(slot) = peers.iter().find(|slot| slot.id == peer) {
            let _ = slot.outbound.send(line);
        }
    }
}

impl RemotePeer for PeerRegistry {
    fn call(&self, method: &str, params: Vec<Value>) -> RemoteReply {
        let id = format!("out-{}", self.next_call_id.fetch_add(1, Ordering::SeqCst) + 1);
        let line = match serde_json::to_string(&OutboundRequest {
            id: &id,
            method,
            params: &params,
        }) {
            Ok(line) => line,
            Err(error) => {
                return Box::pin(future::ready(Err(RemoteError::transport(error.to_string()))))
            }
        };

        let (tx, rx) = oneshot::channel();
        {
            let mut peers = lock_unpoisoned(&self.peers);
            let Some(slot) = peers.last_mut() else {
                return Box::pin(future::ready(Err(RemoteError::NotConnected)));
            };
            if slot.outbound.send(line).is_err() {
                return Box::pin(future::ready(Err(RemoteError::transport(
                    "peer writer closed",
                ))));
            }
            slot.pending.insert(id, (method.to_string(), tx));
        }

        let method = method.to_string();
        Box::pin(async move {
            match rx.await {
                Ok(outcome) => outcome,
                Err(_) => Err(RemoteError::transport(format!(
                    "peer dropped the pending {method} call"
                ))),
            }
        })
    }

    fn connected_peer_count(&self) -> usize {
        lock_unpoisoned(&self.peers).len()
    }
}

enum ReplyOutcome {
    Result(Value),
    Error(Value),
}

fn error_message(error: &Value) -> String {
    match error {
        Value::String(message) => message.clone(),
        Value::Object(map) => map
            .get("message")
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| error.to_string()),
        other => other.to_string(),
    }
}

/// Accepts front-ends until the listener fails.
pub async fn serve(listener: TcpListener, peers: Arc<PeerRegistry>, relay: Arc<CoderRelay>) {
    loop {
        match listener.accept().await {
            Ok((stream, address)) => {
                tracing::debug!(%address, "accepted connection");
                let peers = Arc::clone(&peers);
                let relay = Arc::clone(&relay);
                tokio::spawn(async move {
                    let (reader, writer) = stream.into_split();
                    serve_connection(reader, writer, peers, relay).await;
                });
            }
            Err(error) => {
                tracing::warn!(%error, "accept failed; no longer accepting front-ends");
                return;
            }
        }
    }
}

/// Drives one front-end until its stream closes.
pub async fn serve_connection<R, W>(
    reader: R,
    mut writer: W,
    peers: Arc<PeerRegistry>,
    relay: Arc<CoderRelay>,
) where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin + Send + 'static,
{
    let (outbound_tx, mut outbound_rx) = mpsc::unbounded_channel::<String>();
    let peer = peers.attach(outbound_tx);

    let writer_task = tokio::spawn(async move {
        while let Some(mut line) = outbound_rx.recv().await {
            line.push('\n');
            if let Err(error) = writer.write_all(line.as_bytes()).await {
                tracing::warn!(%error, "failed to write frame");
                return;
            }
            if let Err(error) = writer.flush().await {
                tracing::warn!(%error, "failed to flush frame");
                return;
            }
        }
    });

    let mut lines = BufReader::new(reader).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => handle_line(&line, peer, &peers, &relay),
            Ok(None) => break,
            Err(error) => {
                tracing::warn!(peer, %error, "read failed");
                break;
            }
        }
    }

    peers.detach(peer);
    writer_task.abort();
}

fn handle_line(line: &str, peer: PeerId, peers: &PeerRegistry, relay: &CoderRelay) {
    if line.trim().is_empty() {
        return;
    }

    let frame: Frame = match serde_json::from_str(line) {
        Ok(frame) => frame,
        Err(error) => {
            tracing::warn!(peer, %error, "malformed frame ignored");
            return;
        }
    };

    match frame.method {
        Some(method) => {
            let reply = match relay.dispatch(&method, &frame.params) {
                Some(result) => OutboundReply {
                    id: frame.id.unwrap_or(Value::Null),
                    result: Some(result),
                    error: None,
                },
                None => OutboundReply {
                    id: frame.id.unwrap_or(Value::Null),
                    result: None,
                    error: Some(Value::String(format!("unknown method: {method}"))),
                },
            };
            match serde_json::to_string(&reply) {
                Ok(line) => peers.send_to(peer, line),
                Err(error) => tracing::warn!(%error, "failed to encode reply"),
            }
        }
        None => {
            let Some(id) = frame.id.as_ref().and_then(Value::as_str) else {
                tracing::warn!(peer, "reply without a string id ignored");
                return;
            };
            let outcome = match frame.error {
                Some(error) => ReplyOutcome::Error(error),
                None => ReplyOutcome::Result(frame.result.unwrap_or(Value::Null)),
            };
            if !peers.resolve(peer, id, outcome) {
                tracing::debug!(peer, id, "reply for unknown call ignored");
            }
        }
    }
}

fn lock_unpoisoned<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}
