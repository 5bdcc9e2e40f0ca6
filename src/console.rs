//! Operator console: local notices and the connection-gated input prompt.

use std::io::{self, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use signal_hook::consts::SIGINT;
use signal_hook::iterator::Signals;

use crate::connection::ConnectionState;

const INTERRUPT_CHECK_INTERVAL: Duration = Duration::from_millis(50);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeLevel {
    Info,
    Success,
    Warning,
    Error,
}

impl NoticeLevel {
    fn ansi_color(self) -> &'static str {
        match self {
            Self::Info => "0",
            Self::Success => "32",
            Self::Warning => "33",
            Self::Error => "31",
        }
    }
}

/// Destination for human-readable operator notices.
pub trait ConsoleSink: Send + Sync {
    fn notice(&self, level: NoticeLevel, text: &str);
}

/// Colored notices on stderr.
#[derive(Debug, Default, Clone, Copy)]
pub struct StderrConsole;

impl ConsoleSink for StderrConsole {
    fn notice(&self, level: NoticeLevel, text: &str) {
        let mut stderr = io::stderr().lock();
        let _ = writeln!(stderr, "\x1b[{}m{text}\x1b[0m", level.ansi_color());
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateOutcome {
    /// A front-end is attached; local input may proceed.
    Ready,
    /// The operator interrupted while waiting.
    Interrupted,
}

/// Holds the local prompt back while no front-end is attached.
pub struct InputGate {
    state: ConnectionState,
    console: Arc<dyn ConsoleSink>,
    server_uri: String,
    poll: Duration,
    interrupted: Arc<AtomicBool>,
}

impl InputGate {
    pub fn new(
        state: ConnectionState,
        console: Arc<dyn ConsoleSink>,
        server_uri: impl Into<String>,
        poll: Duration,
    ) -> Self {
        Self {
            state,
            console,
            server_uri: server_uri.into(),
            poll,
            interrupted: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Flag set by the interrupt handler; exposed so hosts can raise it too.
    #[must_use]
    pub fn interrupt_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.interrupted)
    }

    /// Routes SIGINT into this gate's interrupt flag until the guard drops.
    pub fn install_interrupt_handler(&self) -> io::Result<InterruptGuard> {
        install_interrupt_handler(self.interrupt_flag())
    }

    /// Returns once a front-end is attached or the operator interrupts.
    ///
    /// Connection is re-checked every `poll`; the interrupt flag far more often.
    pub fn wait_until_connected(&self) -> GateOutcome {
        if self.state.is_connected() {
            return GateOutcome::Ready;
        }

        self.console
            .notice(NoticeLevel::Error, "Input disabled: No remote connections");
        self.console.notice(
            NoticeLevel::Warning,
            &format!("In your application use the server URI: {}", self.server_uri),
        );
        self.console.notice(
            NoticeLevel::Warning,
            "Waiting for connection... (Press Ctrl+C to exit)",
        );

        let mut next_check = Instant::now() + self.poll;
        loop {
            if self.interrupted.swap(false, Ordering::SeqCst) {
                self.console.notice(
                    NoticeLevel::Warning,
                    "Keyboard interrupt detected, exiting...",
                );
                return GateOutcome::Interrupted;
            }

            let now = Instant::now();
            if now >= next_check {
                if self.state.is_connected() {
                    self.console
                        .notice(NoticeLevel::Success, "Connection restored, input enabled");
                    return GateOutcome::Ready;
                }
                next_check = now + self.poll;
            }

            thread::sleep(INTERRUPT_CHECK_INTERVAL.min(self.poll));
        }
    }
}

/// Keeps the SIGINT listener thread alive.
pub struct InterruptGuard {
    handle: signal_hook::iterator::Handle,
    thread: Option<JoinHandle<()>>,
}

impl Drop for InterruptGuard {
    fn drop(&mut self) {
        self.handle.close();
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

/// Sets `flag` on every SIGINT instead of terminating the process.
pub fn install_interrupt_handler(flag: Arc<AtomicBool>) -> io::Result<InterruptGuard> {
    let mut signals = Signals::new([SIGINT])?;
    let handle = signals.handle();

    let thread = thread::Builder::new()
        .name("coder-relay-sigint".to_string())
        .spawn(move || {
            for _ in signals.forever() {
                flag.store(true, Ordering::SeqCst);
            }
        })?;

    Ok(InterruptGuard {
        handle,
        thread: Some(thread),
    })
}
