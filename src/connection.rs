//! Remote peer presence tracking.

use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crate::console::{ConsoleSink, NoticeLevel};
use crate::remote::RemotePeer;

/// Whether any front-end is attached.
///
/// Reads are unsynchronized and may be stale by one monitor interval.
#[derive(Debug, Clone)]
pub struct ConnectionState(Arc<AtomicBool>);

impl ConnectionState {
    #[must_use]
    pub fn new(connected: bool) -> Self {
        Self(Arc::new(AtomicBool::new(connected)))
    }

    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }

    fn replace(&self, connected: bool) -> bool {
        self.0.swap(connected, Ordering::Relaxed)
    }
}

impl Default for ConnectionState {
    /// Starts optimistic so early output is not dropped before the first poll.
    fn default() -> Self {
        Self::new(true)
    }
}

/// Background poller that owns every write to a [`ConnectionState`].
pub struct ConnectionMonitor {
    state: ConnectionState,
    stop: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
}

impl ConnectionMonitor {
    /// Starts polling `peer` every `interval` on `coder-relay-monitor`.
    pub fn spawn(
        peer: Arc<dyn RemotePeer>,
        state: ConnectionState,
        console: Arc<dyn ConsoleSink>,
        server_uri: String,
        interval: Duration,
    ) -> io::Result<Self> {
        let stop = Arc::new(AtomicBool::new(false));
        let thread = {
            let state = state.clone();
            let stop = Arc::clone(&stop);
            thread::Builder::new()
                .name("coder-relay-monitor".to_string())
                .spawn(move || {
                    while !stop.load(Ordering::SeqCst) {
                        poll_connection(peer.as_ref(), &state, console.as_ref(), &server_uri);
                        thread::park_timeout(interval);
                    }
                })?
        };

        Ok(Self {
            state,
            stop,
            thread: Some(thread),
        })
    }

    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.state.is_connected()
    }

    #[must_use]
    pub fn state(&self) -> ConnectionState {
        self.state.clone()
    }

    pub fn stop(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        self.stop.store(true, Ordering::SeqCst);
        if let Some(thread) = self.thread.take() {
            thread.thread().unpark();
            let _ = thread.join();
        }
    }
}

impl Drop for ConnectionMonitor {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Samples the peer count once and reports a transition, if any.
///
/// Returns the new connection state when it changed.
pub fn poll_connection(
    peer: &dyn RemotePeer,
    state: &ConnectionState,
    console: &dyn ConsoleSink,
    server_uri: &str,
) -> Option<bool> {
    let connected = peer.connected_peer_count() > 0;
    let was_connected = state.replace(connected);
    if was_connected == connected {
        return None;
    }

    if connected {
        tracing::info!("remote connection established; enabling input");
        console.notice(
            NoticeLevel::Success,
            "Remote connection established - input enabled",
        );
    } else {
        tracing::info!("no remote connections; disabling input");
        console.notice(NoticeLevel::Error, "No remote connections - input disabled");
        console.notice(
            NoticeLevel::Warning,
            &format!("In the front-end, use the server URI: {server_uri}"),
        );
        console.notice(
            NoticeLevel::Warning,
            "If the front-end is already running, check its connection",
        );
    }

    Some(connected)
}
