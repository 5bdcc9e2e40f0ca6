//! Capabilities consumed from the RPC transport.
//!
//! The relay never frames messages or tracks connections itself. It resolves
//! dotted method names on a connected peer and asks how many peers exist.

use futures_util::future::{self, BoxFuture};
use serde_json::Value;

use crate::error::RemoteError;

/// Outbound method names understood by the front-end.
pub mod methods {
    pub const STREAM_WRITE: &str = "MessageHandler.streamWrite";
    pub const STREAM_COMPLETE: &str = "MessageHandler.streamComplete";
    pub const STREAM_ERROR: &str = "MessageHandler.streamError";
    pub const CONFIRMATION_REQUEST: &str = "MessageHandler.confirmationRequest";
    pub const CODER_TYPE_CHANGED: &str = "MessageHandler.onCoderTypeChanged";
    pub const LOAD_FILE_TREE: &str = "RepoTree.loadFileTree";
}

/// Reply future for one outbound call.
pub type RemoteReply = BoxFuture<'static, Result<Value, RemoteError>>;

/// A transport able to reach the attached front-end.
pub trait RemotePeer: Send + Sync + 'static {
    /// Invokes `method` with positional `params` on the currently selected peer.
    ///
    /// Implementations must not block; all waiting happens in the returned future.
    fn call(&self, method: &str, params: Vec<Value>) -> RemoteReply;

    fn connected_peer_count(&self) -> usize;
}

/// Peer used when no transport is wired; every call fails with `NotConnected`.
#[derive(Debug, Default, Clone, Copy)]
pub struct DetachedPeer;

impl RemotePeer for DetachedPeer {
    fn call(&self, _method: &str, _params: Vec<Value>) -> RemoteReply {
        Box::pin(future::ready(Err(RemoteError::NotConnected)))
    }

    fn connected_peer_count(&self) -> usize {
        0
    }
}
