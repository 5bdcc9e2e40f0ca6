#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread;
use std::time::{Duration, Instant};

use assistant_session_mock::{MockSession, MockStep};
use coder_relay::{
    methods, CoderRelay, ConnectionState, ConsoleSink, Dispatcher, NoticeLevel, RemoteError,
    RemotePeer, RemoteReply,
};
use serde_json::Value;

pub const WAIT_TIMEOUT: Duration = Duration::from_secs(5);

type ConfirmResponder = Box<dyn Fn(&[Value]) -> (Duration, Result<Value, RemoteError>) + Send + Sync>;

#[derive(Debug, Clone, PartialEq)]
pub struct RecordedCall {
    pub method: String,
    pub params: Vec<Value>,
}

/// Front-end stand-in that records every call in invocation order.
pub struct RecordingPeer {
    calls: Mutex<Vec<RecordedCall>>,
    peer_count: AtomicUsize,
    fail_all: AtomicBool,
    confirm: Mutex<ConfirmResponder>,
}

impl Default for RecordingPeer {
    fn default() -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            peer_count: AtomicUsize::new(1),
            fail_all: AtomicBool::new(false),
            confirm: Mutex::new(Box::new(|_| (Duration::ZERO, Ok(Value::Bool(true))))),
        }
    }
}

impl RecordingPeer {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Every later call fails with a transport error.
    pub fn fail_all(&self) {
        self.fail_all.store(true, Ordering::SeqCst);
    }

    pub fn set_peer_count(&self, count: usize) {
        self.peer_count.store(count, Ordering::SeqCst);
    }

    /// Answers confirmation requests with `responder(params)` after the returned delay.
    pub fn respond_to_confirmations<F>(&self, responder: F)
    where
        F: Fn(&[Value]) -> (Duration, Result<Value, RemoteError>) + Send + Sync + 'static,
    {
        *lock_unpoisoned(&self.confirm) = Box::new(responder);
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        lock_unpoisoned(&self.calls).clone()
    }

    pub fn calls_to(&self, method: &str) -> Vec<Vec<Value>> {
        lock_unpoisoned(&self.calls)
            .iter()
            .filter(|call| call.method == method)
            .map(|call| call.params.clone())
            .collect()
    }

    pub fn count(&self, method: &str) -> usize {
        lock_unpoisoned(&self.calls)
            .iter()
            .filter(|call| call.method == method)
            .count()
    }

    /// Payloads of every `streamWrite`, in delivery order.
    pub fn streamed_payloads(&self) -> Vec<String> {
        self.calls_to(methods::STREAM_WRITE)
            .into_iter()
            .filter_map(|params| params.first().and_then(Value::as_str).map(str::to_string))
            .collect()
    }
}

impl RemotePeer for RecordingPeer {
    fn call(&self, method: &str, params: Vec<Value>) -> RemoteReply {
        let (delay, outcome) = if self.fail_all.load(Ordering::SeqCst) {
            (
                Duration::ZERO,
                Err(RemoteError::transport(format!("scripted failure for {method}"))),
            )
        } else if method == methods::CONFIRMATION_REQUEST {
            let responder = lock_unpoisoned(&self.confirm);
            (*responder)(&params)
        } else {
            (Duration::ZERO, Ok(Value::Null))
        };

        lock_unpoisoned(&self.calls).push(RecordedCall {
            method: method.to_string(),
            params,
        });

        Box::pin(async move {
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            outcome
        })
    }

    fn connected_peer_count(&self) -> usize {
        self.peer_count.load(Ordering::SeqCst)
    }
}

#[derive(Default)]
pub struct RecordingConsole {
    notices: Mutex<Vec<(NoticeLevel, String)>>,
}

impl RecordingConsole {
    pub fn notices(&self) -> Vec<(NoticeLevel, String)> {
        lock_unpoisoned(&self.notices).clone()
    }

    pub fn texts(&self) -> Vec<String> {
        self.notices().into_iter().map(|(_, text)| text).collect()
    }
}

impl ConsoleSink for RecordingConsole {
    fn notice(&self, level: NoticeLevel, text: &str) {
        lock_unpoisoned(&self.notices).push((level, text.to_string()));
    }
}

/// A relay wired to a live dispatcher and a recording peer.
pub struct Harness {
    pub relay: CoderRelay,
    pub peer: Arc<RecordingPeer>,
    pub session: Arc<MockSession>,
    pub connection: ConnectionState,
    pub dispatcher: Dispatcher,
}

impl Harness {
    pub fn new(steps: Vec<MockStep>) -> Self {
        Self::with_session(MockSession::new(steps))
    }

    pub fn with_session(session: MockSession) -> Self {
        let dispatcher = Dispatcher::spawn().expect("dispatcher should start");
        let peer = RecordingPeer::new();
        let session = Arc::new(session);
        let connection = ConnectionState::default();
        let relay = CoderRelay::new(
            Some(dispatcher.handle()),
            Arc::clone(&peer) as _,
            connection.clone(),
            Arc::clone(&session) as _,
        );

        Self {
            relay,
            peer,
            session,
            connection,
            dispatcher,
        }
    }

    pub fn completions(&self) -> usize {
        self.peer.count(methods::STREAM_COMPLETE)
    }

    /// Waits for the first completion, then lingers to catch duplicates.
    pub fn wait_for_completion(&self) -> usize {
        assert!(
            wait_until(WAIT_TIMEOUT, || self.completions() >= 1),
            "run should signal completion"
        );
        thread::sleep(Duration::from_millis(100));
        self.completions()
    }
}

pub fn wait_until(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        thread::sleep(Duration::from_millis(5));
    }
    condition()
}

pub fn lock_unpoisoned<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}
