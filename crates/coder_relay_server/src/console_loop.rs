//! Local operator prompt: stdin lines become runs once a front-end is attached.

use std::io::{self, BufRead};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::thread;
use std::time::Duration;

use coder_relay::{CoderRelay, ConsoleSink, GateOutcome, InputGate, NoticeLevel};
use serde_json::Value;

const INPUT_POLL: Duration = Duration::from_millis(50);
const EXIT_COMMANDS: &[&str] = &["/exit", "/quit"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsoleExit {
    Interrupted,
    /// The operator typed an exit command.
    Requested,
    /// stdin closed.
    InputClosed,
}

/// Forwards stdin lines over a channel so the prompt can keep watching for interrupts.
pub fn spawn_stdin_reader() -> io::Result<Receiver<String>> {
    let (tx, rx) = mpsc::channel();
    thread::Builder::new()
        .name("coder-relay-stdin".to_string())
        .spawn(move || {
            for line in io::stdin().lock().lines() {
                let Ok(line) = line else {
                    return;
                };
                if tx.send(line).is_err() {
                    return;
                }
            }
        })?;
    Ok(rx)
}

/// Runs the prompt until the operator leaves.
///
/// A SIGINT while a run is active cancels that run; otherwise it exits.
pub fn run_console(
    gate: &InputGate,
    relay: &CoderRelay,
    console: &dyn ConsoleSink,
    lines: &Receiver<String>,
) -> ConsoleExit {
    let interrupted = gate.interrupt_flag();

    loop {
        if gate.wait_until_connected() == GateOutcome::Interrupted {
            return ConsoleExit::Interrupted;
        }

        match lines.recv_timeout(INPUT_POLL) {
            Ok(line) => {
                let message = line.trim();
                if message.is_empty() {
                    continue;
                }
                if EXIT_COMMANDS.contains(&message) {
                    return ConsoleExit::Requested;
                }
                report(console, &relay.run(message));
            }
            Err(RecvTimeoutError::Timeout) => {
                if !take_interrupt(&interrupted) {
                    continue;
                }
                if relay.executor().active_run().is_none() {
                    console.notice(NoticeLevel::Warning, "Keyboard interrupt detected, exiting...");
                    return ConsoleExit::Interrupted;
                }
                report(console, &relay.cancel());
            }
            Err(RecvTimeoutError::Disconnected) => return ConsoleExit::InputClosed,
        }
    }
}

fn take_interrupt(flag: &AtomicBool) -> bool {
    flag.swap(false, Ordering::SeqCst)
}

fn report(console: &dyn ConsoleSink, reply: &Value) {
    let status = reply
        .get("status")
        .and_then(Value::as_str)
        .unwrap_or("unknown");
    match reply.get("error").and_then(Value::as_str) {
        Some(error) => console.notice(NoticeLevel::Error, &format!("{status}: {error}")),
        None => console.notice(NoticeLevel::Info, status),
    }
}
