//! Deterministic scripted implementation of the `assistant_session` contract.
//!
//! This crate contains no transport logic and is intended for local
//! development and bridge-level integration testing.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard};
use std::thread;
use std::time::{Duration, Instant};

use assistant_session::{
    AssistantSession, CancelSignal, CoderProfile, CommandKind, ConfirmationRequest,
    ConfirmationResponse, SessionIo,
};

/// Kind reported by [`MockSession::default`].
pub const MOCK_CODER_KIND: &str = "MockCoder";

/// Error returned by a run that observed its cancellation signal.
pub const MOCK_INTERRUPTED: &str = "mock run interrupted";

/// One scripted action performed by [`MockSession::run`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MockStep {
    /// Streams the text token by token; the last token is marked final.
    Stream(String),
    /// Emits a complete assistant message.
    Reply(String),
    Command(CommandKind, String),
    /// Asks the question and records the answer.
    Confirm(ConfirmationRequest),
    FilesChanged,
    Sleep(Duration),
    /// Blocks until the run is cancelled.
    WaitForCancel,
    Fail(String),
    Panic(String),
}

/// Scripted assistant session used by tests and the demo server.
#[derive(Debug)]
pub struct MockSession {
    profile: CoderProfile,
    steps: Vec<MockStep>,
    token_delay: Duration,
    answers: Mutex<Vec<(String, ConfirmationResponse)>>,
    messages: Mutex<Vec<String>>,
    interrupts: AtomicUsize,
}

impl MockSession {
    #[must_use]
    pub fn new(steps: Vec<MockStep>) -> Self {
        Self::with_profile(CoderProfile::new(MOCK_CODER_KIND, "diff"), steps)
    }

    #[must_use]
    pub fn with_profile(profile: CoderProfile, steps: Vec<MockStep>) -> Self {
        Self {
            profile,
            steps,
            token_delay: Duration::ZERO,
            answers: Mutex::new(Vec::new()),
            messages: Mutex::new(Vec::new()),
            interrupts: AtomicUsize::new(0),
        }
    }

    #[must_use]
    pub fn with_token_delay(mut self, token_delay: Duration) -> Self {
        self.token_delay = token_delay;
        self
    }

    /// Answers received from `confirm_ask`, keyed by question, in ask order.
    #[must_use]
    pub fn answers(&self) -> Vec<(String, ConfirmationResponse)> {
        lock_unpoisoned(&self.answers).clone()
    }

    /// Messages passed to `run`, in call order.
    #[must_use]
    pub fn messages(&self) -> Vec<String> {
        lock_unpoisoned(&self.messages).clone()
    }

    /// Number of times the escalation hook fired.
    #[must_use]
    pub fn interrupt_count(&self) -> usize {
        self.interrupts.load(Ordering::SeqCst)
    }

    fn stream(&self, text: &str, cancel: &CancelSignal, io: &dyn SessionIo) -> Result<(), String> {
        let mut tokens = split_tokens(text);
        if tokens.is_empty() {
            tokens.push(String::new());
        }
        let last = tokens.len() - 1;

        for (index, token) in tokens.iter().enumerate() {
            check_cancel(cancel)?;
            io.stream_update(token, index == last);
            if !self.token_delay.is_zero() {
                sleep_unless_cancelled(self.token_delay, cancel)?;
            }
        }

        Ok(())
    }
}

impl Default for MockSession {
    fn default() -> Self {
        Self::new(vec![
            MockStep::Stream("Reading the repository map and the files in chat.\n".to_string()),
            MockStep::Command(CommandKind::Output, "Repo-map: 12 files".to_string()),
            MockStep::Stream(
                "I will add a unit test next to the function under change.\n".to_string(),
            ),
            MockStep::Confirm(
                ConfirmationRequest::new("Apply this edit?")
                    .with_subject("tests/test_foo.py")
                    .allowing_never(),
            ),
            MockStep::FilesChanged,
            MockStep::Reply("Done.".to_string()),
        ])
        .with_token_delay(Duration::from_millis(30))
    }
}

impl AssistantSession for MockSession {
    fn profile(&self) -> CoderProfile {
        self.profile.clone()
    }

    fn run(&self, message: &str, cancel: CancelSignal, io: &dyn SessionIo) -> Result<(), String> {
        lock_unpoisoned(&self.messages).push(message.to_string());

        for step in &self.steps {
            check_cancel(&cancel)?;

            match step {
                MockStep::Stream(text) => self.stream(text, &cancel, io)?,
                MockStep::Reply(text) => io.assistant_output(text),
                MockStep::Command(kind, text) => io.command_output(*kind, text),
                MockStep::Confirm(request) => {
                    let answer = io.confirm_ask(request.clone());
                    lock_unpoisoned(&self.answers).push((request.question.clone(), answer));
                }
                MockStep::FilesChanged => io.context_files_changed(),
                MockStep::Sleep(duration) => sleep_unless_cancelled(*duration, &cancel)?,
                MockStep::WaitForCancel => {
                    while !cancel.load(Ordering::SeqCst) {
                        thread::sleep(Duration::from_millis(5));
                    }
                    return Err(MOCK_INTERRUPTED.to_string());
                }
                MockStep::Fail(error) => return Err(error.clone()),
                MockStep::Panic(message) => panic!("{message}"),
            }
        }

        Ok(())
    }

    fn interrupt(&self) {
        self.interrupts.fetch_add(1, Ordering::SeqCst);
    }
}

fn split_tokens(text: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut pending_token = String::new();

    for ch in text.chars() {
        pending_token.push(ch);
        if matches!(ch, ' ' | '\n') {
            tokens.push(std::mem::take(&mut pending_token));
        }
    }

    if !pending_token.is_empty() {
        tokens.push(pending_token);
    }

    tokens
}

fn check_cancel(cancel: &CancelSignal) -> Result<(), String> {
    if cancel.load(Ordering::SeqCst) {
        Err(MOCK_INTERRUPTED.to_string())
    } else {
        Ok(())
    }
}

fn sleep_unless_cancelled(duration: Duration, cancel: &CancelSignal) -> Result<(), String> {
    let deadline = Instant::now() + duration;
    loop {
        check_cancel(cancel)?;
        let now = Instant::now();
        if now >= deadline {
            return Ok(());
        }
        thread::sleep((deadline - now).min(Duration::from_millis(5)));
    }
}

fn lock_unpoisoned<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}
