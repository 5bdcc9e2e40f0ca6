//! Minimal contract between the relay and a blocking coding-assistant session.
//!
//! This crate intentionally defines only the run lifecycle, the callbacks a
//! session makes while it runs, and the confirmation payloads. It excludes
//! transport details and any notion of which thread the callbacks land on.

use std::sync::{atomic::AtomicBool, Arc};

use serde::{Deserialize, Serialize};

/// Shared cancellation flag for a run.
///
/// Sessions check it at safe points; setting it is a request, not a guarantee.
pub type CancelSignal = Arc<AtomicBool>;

/// Identity of the assistant implementation currently installed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoderProfile {
    pub kind: String,
    pub edit_format: String,
}

impl CoderProfile {
    #[must_use]
    pub fn new(kind: impl Into<String>, edit_format: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            edit_format: edit_format.into(),
        }
    }
}

/// A yes/no question raised by the assistant mid-run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfirmationRequest {
    pub question: String,
    pub default: Option<bool>,
    pub subject: Option<String>,
    pub explicit_yes_required: bool,
    pub group: Option<String>,
    pub allow_never: bool,
}

impl ConfirmationRequest {
    #[must_use]
    pub fn new(question: impl Into<String>) -> Self {
        Self {
            question: question.into(),
            default: None,
            subject: None,
            explicit_yes_required: false,
            group: None,
            allow_never: false,
        }
    }

    #[must_use]
    pub fn with_subject(mut self, subject: impl Into<String>) -> Self {
        self.subject = Some(subject.into());
        self
    }

    #[must_use]
    pub fn with_default(mut self, default: bool) -> Self {
        self.default = Some(default);
        self
    }

    #[must_use]
    pub fn with_group(mut self, group: impl Into<String>) -> Self {
        self.group = Some(group.into());
        self
    }

    #[must_use]
    pub fn allowing_never(mut self) -> Self {
        self.allow_never = true;
        self
    }

    #[must_use]
    pub fn requiring_explicit_yes(mut self) -> Self {
        self.explicit_yes_required = true;
        self
    }

    /// Key under which a "don't ask again" answer is remembered.
    #[must_use]
    pub fn never_ask_key(&self) -> (String, Option<String>) {
        (self.question.clone(), self.subject.clone())
    }
}

/// Answer to a [`ConfirmationRequest`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfirmationResponse {
    Yes,
    No,
    /// The user asked never to be prompted with this question again.
    DontAskAgain,
}

impl ConfirmationResponse {
    #[must_use]
    pub fn from_bool(value: bool) -> Self {
        if value {
            Self::Yes
        } else {
            Self::No
        }
    }

    /// Only an explicit yes counts as consent.
    #[must_use]
    pub fn is_affirmative(self) -> bool {
        matches!(self, Self::Yes)
    }
}

/// Who produced a streamed payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StreamRole {
    Assistant,
    Command,
}

impl StreamRole {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Assistant => "assistant",
            Self::Command => "command",
        }
    }
}

/// Category of tool/command output the assistant prints outside its replies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CommandKind {
    Output,
    Error,
    Warning,
    Print,
}

impl CommandKind {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Output => "output",
            Self::Error => "error",
            Self::Warning => "warning",
            Self::Print => "print",
        }
    }
}

/// Callbacks a session makes while [`AssistantSession::run`] executes.
///
/// Every method is called synchronously on the run worker. Only
/// [`SessionIo::confirm_ask`] may block; the rest return promptly.
pub trait SessionIo: Send + Sync {
    /// A complete, non-streamed assistant message.
    fn assistant_output(&self, text: &str);

    /// Cumulative or incremental streamed content; `final_chunk` closes the message.
    fn stream_update(&self, content: &str, final_chunk: bool);

    fn command_output(&self, kind: CommandKind, text: &str);

    /// Asks the user a yes/no question and waits for the answer.
    fn confirm_ask(&self, request: ConfirmationRequest) -> ConfirmationResponse;

    /// The session's set of context files changed.
    fn context_files_changed(&self) {}
}

/// Answers a confirmation without any remote party.
pub trait LocalConfirm: Send + Sync {
    fn confirm_locally(&self, request: &ConfirmationRequest) -> ConfirmationResponse;
}

/// Answers with the request's default, or no when none is given.
///
/// Questions that require an explicit yes are always answered no.
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultAnswer;

impl LocalConfirm for DefaultAnswer {
    fn confirm_locally(&self, request: &ConfirmationRequest) -> ConfirmationResponse {
        if request.explicit_yes_required {
            return ConfirmationResponse::No;
        }

        request
            .default
            .map(ConfirmationResponse::from_bool)
            .unwrap_or(ConfirmationResponse::No)
    }
}

/// A blocking coding-assistant session.
pub trait AssistantSession: Send + Sync + 'static {
    /// Returns the kind and edit format of this session.
    fn profile(&self) -> CoderProfile;

    /// Processes one user message to completion.
    ///
    /// Implementations should poll `cancel` at safe points and return an
    /// error once they observe it set.
    fn run(&self, message: &str, cancel: CancelSignal, io: &dyn SessionIo) -> Result<(), String>;

    /// Escalation hook invoked after `cancel` has been set for the active run.
    ///
    /// Sessions that block on I/O can close or poke the handle here so the
    /// worker reaches its next cancellation check sooner.
    fn interrupt(&self) {}
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::Ordering;
    use std::sync::Mutex;

    use serde_json::json;

    use super::{
        AssistantSession, CancelSignal, CoderProfile, CommandKind, ConfirmationRequest,
        ConfirmationResponse, DefaultAnswer, LocalConfirm, SessionIo, StreamRole,
    };

    struct EchoSession;

    impl AssistantSession for EchoSession {
        fn profile(&self) -> CoderProfile {
            CoderProfile::new("EchoCoder", "whole")
        }

        fn run(
            &self,
            message: &str,
            cancel: CancelSignal,
            io: &dyn SessionIo,
        ) -> Result<(), String> {
            if cancel.load(Ordering::SeqCst) {
                return Err("interrupted".to_string());
            }
            io.stream_update(message, true);
            Ok(())
        }
    }

    #[derive(Default)]
    struct CapturingIo {
        streamed: Mutex<Vec<(String, bool)>>,
    }

    impl SessionIo for CapturingIo {
        fn assistant_output(&self, _text: &str) {}

        fn stream_update(&self, content: &str, final_chunk: bool) {
            self.streamed
                .lock()
                .expect("capture lock")
                .push((content.to_string(), final_chunk));
        }

        fn command_output(&self, _kind: CommandKind, _text: &str) {}

        fn confirm_ask(&self, _request: ConfirmationRequest) -> ConfirmationResponse {
            ConfirmationResponse::No
        }
    }

    #[test]
    fn confirmation_request_serializes_with_snake_case_fields() {
        let request = ConfirmationRequest::new("Apply this edit?")
            .with_subject("foo.py")
            .allowing_never();

        let value = serde_json::to_value(&request).expect("serialize request");
        assert_eq!(
            value,
            json!({
                "question": "Apply this edit?",
                "default": null,
                "subject": "foo.py",
                "explicit_yes_required": false,
                "group": null,
                "allow_never": true,
            })
        );
    }

    #[test]
    fn never_ask_key_pairs_question_and_subject() {
        let request = ConfirmationRequest::new("Create file?").with_subject("new.rs");
        assert_eq!(
            request.never_ask_key(),
            ("Create file?".to_string(), Some("new.rs".to_string()))
        );
    }

    #[test]
    fn only_yes_is_affirmative() {
        assert!(ConfirmationResponse::Yes.is_affirmative());
        assert!(!ConfirmationResponse::No.is_affirmative());
        assert!(!ConfirmationResponse::DontAskAgain.is_affirmative());
    }

    #[test]
    fn default_answer_uses_request_default_unless_explicit_yes_required() {
        let answer = DefaultAnswer;

        assert_eq!(
            answer.confirm_locally(&ConfirmationRequest::new("q")),
            ConfirmationResponse::No
        );
        assert_eq!(
            answer.confirm_locally(&ConfirmationRequest::new("q").with_default(true)),
            ConfirmationResponse::Yes
        );
        assert_eq!(
            answer.confirm_locally(
                &ConfirmationRequest::new("q")
                    .with_default(true)
                    .requiring_explicit_yes()
            ),
            ConfirmationResponse::No
        );
    }

    #[test]
    fn stream_role_and_command_kind_wire_names() {
        assert_eq!(StreamRole::Assistant.as_str(), "assistant");
        assert_eq!(StreamRole::Command.as_str(), "command");
        assert_eq!(CommandKind::Warning.as_str(), "warning");
        assert_eq!(
            serde_json::to_value(CommandKind::Print).expect("serialize kind"),
            json!("print")
        );
    }

    #[test]
    fn session_run_observes_cancel_signal() {
        let session = EchoSession;
        let io = CapturingIo::default();

        let cancel = CancelSignal::default();
        session
            .run("hello", cancel.clone(), &io)
            .expect("uncancelled run succeeds");
        assert_eq!(
            *io.streamed.lock().expect("capture lock"),
            vec![("hello".to_string(), true)]
        );

        cancel.store(true, Ordering::SeqCst);
        let error = session
            .run("again", cancel, &io)
            .expect_err("cancelled run reports an error");
        assert_eq!(error, "interrupted");
    }
}
