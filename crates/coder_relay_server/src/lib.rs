//! Demo host for `coder_relay`: a TCP front-end transport plus the operator console.
//!
//! ## Wire format
//!
//! One JSON object per line. A front-end calls `run` and `cancel`:
//!
//! ```json
//! {"id": 1, "method": "run", "params": ["add tests for foo.py"]}
//! {"id": 1, "result": {"status": "started", "workerId": "…"}}
//! ```
//!
//! The relay calls back with ids `out-<n>`, e.g.
//! `{"id": "out-3", "method": "MessageHandler.confirmationRequest", "params": [{…}]}`,
//! and expects `{"id": "out-3", "result": true}` in return.
//!
//! ## Environment
//!
//! See [`coder_relay::RelayConfig::from_env`] for the variables read at startup.

pub mod console_loop;
pub mod transport;

pub use console_loop::{run_console, spawn_stdin_reader, ConsoleExit};
pub use transport::{serve, serve_connection, PeerId, PeerRegistry};
