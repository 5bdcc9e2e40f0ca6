//! Runs the blocking assistant on a dedicated worker and cancels it on request.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::{self, JoinHandle};

use assistant_session::{
    AssistantSession, CancelSignal, CommandKind, ConfirmationRequest, ConfirmationResponse,
    SessionIo,
};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::confirm::ConfirmationChannel;
use crate::error::ExecutorError;
use crate::session::SessionRegistry;
use crate::stream_relay::{StreamChunk, StreamRelay};

pub type RunId = u64;

/// Commands that only make sense in the operator's terminal.
///
/// Matched exactly after trimming; `/model gpt-4o` is an ordinary message.
pub const LOCAL_COMMANDS: &[&str] = &[
    "/model",
    "/editor-model",
    "/weak-model",
    "/chat-mode",
    "/help",
    "/ask",
    "/code",
    "/architect",
    "/context",
];

/// Returns the table entry `message` names, if it is a local-only command.
#[must_use]
pub fn local_command(message: &str) -> Option<&'static str> {
    let message = message.trim();
    LOCAL_COMMANDS
        .iter()
        .copied()
        .find(|command| *command == message)
}

fn terminal_command_notice(command: &str) -> String {
    format!(
        "The command `{command}` (without suffix string) should be executed directly in your terminal, not in the web interface."
    )
}

/// Identity of the run currently executing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunHandle {
    pub run_id: RunId,
    pub worker_id: String,
    pub started_at: OffsetDateTime,
    /// Name of the worker thread.
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StartOutcome {
    Started(RunHandle),
    /// The message was a local-only command; a notice and completion were sent instead.
    LocalCommand(&'static str),
}

struct ActiveRun {
    handle: RunHandle,
    cancel: CancelSignal,
    session: Arc<dyn AssistantSession>,
    join_handle: Option<JoinHandle<()>>,
}

pub struct RunExecutor {
    sessions: Arc<SessionRegistry>,
    relay: Arc<StreamRelay>,
    confirm: Arc<ConfirmationChannel>,
    next_run_id: AtomicU64,
    active_run: Mutex<Option<ActiveRun>>,
}

impl RunExecutor {
    pub fn new(
        sessions: Arc<SessionRegistry>,
        relay: Arc<StreamRelay>,
        confirm: Arc<ConfirmationChannel>,
    ) -> Arc<Self> {
        Arc::new(Self {
            sessions,
            relay,
            confirm,
            next_run_id: AtomicU64::new(1),
            active_run: Mutex::new(None),
        })
    }

    /// Starts processing `message` and returns without waiting for it.
    ///
    /// Every started run ends with exactly one completion signal, whether the
    /// session returns, fails, panics, or is cancelled.
    pub fn start(self: &Arc<Self>, message: &str) -> Result<StartOutcome, ExecutorError> {
        if let Some(command) = local_command(message) {
            tracing::debug!(command, "local-only command routed back to the terminal");
            self.relay
                .emit_assistant_message(&terminal_command_notice(command));
            self.relay.signal_complete();
            return Ok(StartOutcome::LocalCommand(command));
        }

        // Held across the spawn so the worker cannot clear the slot before it is filled.
        let mut active_run = self.lock_active_run();
        if let Some(active) = active_run.as_ref() {
            return Err(ExecutorError::RunAlreadyActive {
                worker_id: active.handle.worker_id.clone(),
            });
        }

        let run_id = self.next_run_id.fetch_add(1, Ordering::SeqCst);
        let handle = RunHandle {
            run_id,
            worker_id: Uuid::new_v4().to_string(),
            started_at: OffsetDateTime::now_utc(),
            name: format!("coder-relay-run-{run_id}"),
        };
        let cancel: CancelSignal = Arc::new(AtomicBool::new(false));
        let session = self.sessions.current();
        let join_handle =
            self.spawn_worker(&handle, message.to_string(), Arc::clone(&session), Arc::clone(&cancel))?;

        tracing::debug!(run_id, worker_id = %handle.worker_id, "run started");
        *active_run = Some(ActiveRun {
            handle: handle.clone(),
            cancel,
            session,
            join_handle: Some(join_handle),
        });

        Ok(StartOutcome::Started(handle))
    }

    /// Requests that the active run stop.
    ///
    /// Best effort: the run may finish on its own before it notices, and a
    /// run that already finished reports [`ExecutorError::NothingToCancel`].
    pub fn cancel(&self) -> Result<RunHandle, ExecutorError> {
        let (handle, session) = {
            let active_run = self.lock_active_run();
            let active = active_run.as_ref().ok_or(ExecutorError::NothingToCancel)?;
            active.cancel.store(true, Ordering::SeqCst);
            (active.handle.clone(), Arc::clone(&active.session))
        };

        tracing::info!(run_id = handle.run_id, worker_id = %handle.worker_id, "cancellation requested");
        session.interrupt();
        Ok(handle)
    }

    #[must_use]
    pub fn active_run(&self) -> Option<RunHandle> {
        self.lock_active_run()
            .as_ref()
            .map(|active| active.handle.clone())
    }

    #[must_use]
    pub fn sessions(&self) -> &Arc<SessionRegistry> {
        &self.sessions
    }

    fn spawn_worker(
        self: &Arc<Self>,
        handle: &RunHandle,
        message: String,
        session: Arc<dyn AssistantSession>,
        cancel: CancelSignal,
    ) -> Result<JoinHandle<()>, ExecutorError> {
        let run_id = handle.run_id;
        let executor = Arc::clone(self);
        thread::Builder::new()
            .name(handle.name.clone())
            .spawn(move || executor.run_worker(run_id, message, session, cancel))
            .map_err(|error| ExecutorError::Spawn(error.to_string()))
    }

    fn run_worker(
        self: Arc<Self>,
        run_id: RunId,
        message: String,
        session: Arc<dyn AssistantSession>,
        cancel: CancelSignal,
    ) {
        let _completion = CompletionGuard {
            executor: Arc::clone(&self),
            run_id,
        };
        let io = RelayIo {
            relay: Arc::clone(&self.relay),
            confirm: Arc::clone(&self.confirm),
        };

        let outcome = catch_unwind(AssertUnwindSafe(|| {
            session.run(&message, Arc::clone(&cancel), &io)
        }));

        match outcome {
            Ok(Ok(())) => tracing::debug!(run_id, "run finished"),
            Ok(Err(error)) if cancel.load(Ordering::SeqCst) => {
                tracing::debug!(run_id, %error, "run stopped after cancellation");
            }
            Ok(Err(error)) => tracing::warn!(run_id, %error, "run failed"),
            Err(payload) => {
                tracing::warn!(run_id, panic = %panic_message(payload.as_ref()), "assistant session panicked");
            }
        }
    }

    fn clear_active_run_if_matching(&self, run_id: RunId) {
        let mut active_run = self.lock_active_run();
        let matches = active_run.as_ref().map(|active| active.handle.run_id) == Some(run_id);
        if !matches {
            return;
        }

        let mut completed = match active_run.take() {
            Some(completed) => completed,
            None => return,
        };

        if let Some(join_handle) = completed.join_handle.take() {
            let is_current_thread = join_handle.thread().id() == thread::current().id();
            if !is_current_thread && join_handle.is_finished() {
                let _ = join_handle.join();
            }
        }
    }

    fn lock_active_run(&self) -> MutexGuard<'_, Option<ActiveRun>> {
        lock_unpoisoned(&self.active_run)
    }
}

/// Clears the run slot and signals completion when the worker frame exits.
struct CompletionGuard {
    executor: Arc<RunExecutor>,
    run_id: RunId,
}

impl Drop for CompletionGuard {
    fn drop(&mut self) {
        self.executor.clear_active_run_if_matching(self.run_id);
        self.executor.relay.signal_complete();
    }
}

/// Session callbacks routed to the front-end.
struct RelayIo {
    relay: Arc<StreamRelay>,
    confirm: Arc<ConfirmationChannel>,
}

impl SessionIo for RelayIo {
    fn assistant_output(&self, text: &str) {
        self.relay.emit_assistant_message(text);
    }

    fn stream_update(&self, content: &str, final_chunk: bool) {
        self.relay.emit(StreamChunk::assistant(content, final_chunk));
    }

    fn command_output(&self, kind: CommandKind, text: &str) {
        self.relay.emit_command(kind, text);
    }

    fn confirm_ask(&self, request: ConfirmationRequest) -> ConfirmationResponse {
        self.confirm.ask(request)
    }

    fn context_files_changed(&self) {
        self.relay.notify_files_changed();
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> &str {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message
    } else {
        "non-string panic payload"
    }
}

fn lock_unpoisoned<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn local_commands_match_exactly_after_trimming() {
        assert_eq!(local_command("  /model\n"), Some("/model"));
        assert_eq!(local_command("/architect"), Some("/architect"));
        assert_eq!(local_command("/model gpt-4o"), None);
        assert_eq!(local_command("/MODEL"), None);
        assert_eq!(local_command("add tests for foo.py"), None);
    }

    #[test]
    fn notice_names_the_command() {
        assert_eq!(
            terminal_command_notice("/help"),
            "The command `/help` (without suffix string) should be executed directly in your terminal, not in the web interface."
        );
    }

    #[test]
    fn panic_message_reads_common_payloads() {
        let boxed: Box<dyn std::any::Any + Send> = Box::new("boom");
        assert_eq!(panic_message(boxed.as_ref()), "boom");
        let boxed: Box<dyn std::any::Any + Send> = Box::new(String::from("owned boom"));
        assert_eq!(panic_message(boxed.as_ref()), "owned boom");
        let boxed: Box<dyn std::any::Any + Send> = Box::new(7_u8);
        assert_eq!(panic_message(boxed.as_ref()), "non-string panic payload");
    }
}
