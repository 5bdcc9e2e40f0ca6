//! Bridge between a blocking coding-assistant session and a remote front-end.
//!
//! Invariant: the dispatcher never blocks. Only a run worker may wait, and
//! only on the assistant itself or on a confirmation round trip.
//!
//! # Public API Overview
//! - Wire everything around a transport with [`CoderRelay`].
//! - Schedule work from any thread with [`TaskBridge`].
//! - Stream output with [`StreamRelay`]; ask questions with [`ConfirmationChannel`].
//! - Track front-end presence with [`ConnectionMonitor`] and gate local input with [`InputGate`].

pub mod config;
pub mod confirm;
pub mod connection;
pub mod console;
pub mod error;
pub mod executor;
pub mod logging;
pub mod remote;
pub mod runtime;
pub mod service;
pub mod session;
pub mod stream_relay;

pub use crate::config::RelayConfig;
pub use crate::confirm::{parse_reply, ConfirmationChannel};
pub use crate::connection::{poll_connection, ConnectionMonitor, ConnectionState};
pub use crate::console::{
    install_interrupt_handler, ConsoleSink, GateOutcome, InputGate, InterruptGuard, NoticeLevel,
    StderrConsole,
};
pub use crate::error::{ExecutorError, RemoteError, TaskError};
pub use crate::executor::{local_command, RunExecutor, RunHandle, RunId, StartOutcome, LOCAL_COMMANDS};
pub use crate::logging::init_tracing;
pub use crate::remote::{methods, DetachedPeer, RemotePeer, RemoteReply};
pub use crate::runtime::{Dispatcher, DispatcherHandle, ScheduledTask, TaskBridge};
pub use crate::service::CoderRelay;
pub use crate::session::{ObserverId, SessionRegistry};
pub use crate::stream_relay::{StreamChunk, StreamRelay};

pub use assistant_session;
