mod support;

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use assistant_session::{ConfirmationRequest, ConfirmationResponse};
use assistant_session_mock::{MockSession, MockStep};
use coder_relay::{methods, CoderRelay, ConnectionState, RemoteError};
use pretty_assertions::assert_eq;
use serde_json::{json, Value};

use support::{Harness, RecordingPeer};

fn question(params: &[Value]) -> String {
    params
        .first()
        .and_then(|request| request["question"].as_str())
        .unwrap_or_default()
        .to_string()
}

#[test]
fn overlapping_asks_from_two_workers_get_their_own_answers() {
    let harness = Harness::new(Vec::new());
    harness.peer.respond_to_confirmations(|params| {
        match question(params).as_str() {
            // Answered last even though asked first.
            "Create new file a.py?" => (Duration::from_millis(150), Ok(json!(true))),
            _ => (Duration::from_millis(10), Ok(json!(false))),
        }
    });
    let confirmations = Arc::clone(harness.relay.confirmations());

    let first = {
        let confirmations = Arc::clone(&confirmations);
        thread::spawn(move || confirmations.ask(ConfirmationRequest::new("Create new file a.py?")))
    };
    thread::sleep(Duration::from_millis(20));
    let second = {
        let confirmations = Arc::clone(&confirmations);
        thread::spawn(move || confirmations.ask(ConfirmationRequest::new("Run shell command?")))
    };

    assert_eq!(
        second.join().expect("second asker"),
        ConfirmationResponse::No
    );
    assert_eq!(first.join().expect("first asker"), ConfirmationResponse::Yes);
    assert_eq!(harness.peer.count(methods::CONFIRMATION_REQUEST), 2);
}

#[test]
fn dont_ask_again_suppresses_identical_requests_without_a_round_trip() {
    let harness = Harness::new(Vec::new());
    harness
        .peer
        .respond_to_confirmations(|_| (Duration::ZERO, Ok(json!("never"))));
    let request = ConfirmationRequest::new("Apply this edit?")
        .with_subject("foo.py")
        .allowing_never();

    let first = harness.relay.confirmations().ask(request.clone());
    let second = harness.relay.confirmations().ask(request);

    assert_eq!(first, ConfirmationResponse::No);
    assert_eq!(second, ConfirmationResponse::No);
    assert_eq!(harness.peer.count(methods::CONFIRMATION_REQUEST), 1);
    assert!(harness
        .relay
        .confirmations()
        .is_suppressed("Apply this edit?", Some("foo.py")));

    let other_subject = ConfirmationRequest::new("Apply this edit?")
        .with_subject("bar.py")
        .allowing_never();
    harness.relay.confirmations().ask(other_subject);
    assert_eq!(harness.peer.count(methods::CONFIRMATION_REQUEST), 2);
}

#[test]
fn dont_ask_again_without_allow_never_is_returned_verbatim() {
    let harness = Harness::new(Vec::new());
    harness
        .peer
        .respond_to_confirmations(|_| (Duration::ZERO, Ok(json!({ "answer": "d" }))));
    let request = ConfirmationRequest::new("Add URL to the chat?");

    let answer = harness.relay.confirmations().ask(request.clone());

    assert_eq!(answer, ConfirmationResponse::DontAskAgain);
    assert!(!answer.is_affirmative());
    harness.relay.confirmations().ask(request);
    assert_eq!(harness.peer.count(methods::CONFIRMATION_REQUEST), 2);
}

#[test]
fn request_is_sent_with_snake_case_fields() {
    let harness = Harness::new(Vec::new());

    harness.relay.confirmations().ask(
        ConfirmationRequest::new("Run shell command?")
            .with_group("shell")
            .with_default(true)
            .requiring_explicit_yes(),
    );

    assert_eq!(
        harness.peer.calls_to(methods::CONFIRMATION_REQUEST),
        vec![vec![json!({
            "question": "Run shell command?",
            "default": true,
            "subject": null,
            "explicit_yes_required": true,
            "group": "shell",
            "allow_never": false,
        })]]
    );
}

#[test]
fn transport_failure_falls_back_to_the_local_answer() {
    let harness = Harness::new(Vec::new());
    harness.peer.fail_all();

    let with_default = harness
        .relay
        .confirmations()
        .ask(ConfirmationRequest::new("Lint the file?").with_default(true));
    let explicit = harness.relay.confirmations().ask(
        ConfirmationRequest::new("Delete the file?")
            .with_default(true)
            .requiring_explicit_yes(),
    );

    assert_eq!(with_default, ConfirmationResponse::Yes);
    assert_eq!(explicit, ConfirmationResponse::No);
}

#[test]
fn rejected_and_unusable_replies_fall_back_too() {
    let harness = Harness::new(Vec::new());
    harness.peer.respond_to_confirmations(|params| {
        if question(params) == "first?" {
            (
                Duration::ZERO,
                Err(RemoteError::rejected(
                    methods::CONFIRMATION_REQUEST,
                    "no handler",
                )),
            )
        } else {
            (Duration::ZERO, Ok(json!(42)))
        }
    });

    assert_eq!(
        harness
            .relay
            .confirmations()
            .ask(ConfirmationRequest::new("first?").with_default(true)),
        ConfirmationResponse::Yes
    );
    assert_eq!(
        harness
            .relay
            .confirmations()
            .ask(ConfirmationRequest::new("second?")),
        ConfirmationResponse::No
    );
}

#[test]
fn without_a_dispatcher_the_local_answer_is_used_and_nothing_is_sent() {
    let peer = RecordingPeer::new();
    let relay = CoderRelay::new(
        None,
        Arc::clone(&peer) as _,
        ConnectionState::default(),
        Arc::new(MockSession::new(Vec::new())),
    );

    let answer = relay
        .confirmations()
        .ask(ConfirmationRequest::new("Create new file?").with_default(true));

    assert_eq!(answer, ConfirmationResponse::Yes);
    assert_eq!(peer.count(methods::CONFIRMATION_REQUEST), 0);
}

#[test]
fn run_worker_blocks_on_the_question_and_continues_with_the_answer() {
    let harness = Harness::new(vec![
        MockStep::Confirm(
            ConfirmationRequest::new("Apply this edit?")
                .with_subject("foo.py")
                .allowing_never(),
        ),
        MockStep::Confirm(
            ConfirmationRequest::new("Apply this edit?")
                .with_subject("foo.py")
                .allowing_never(),
        ),
        MockStep::Reply("applied".to_string()),
    ]);
    harness
        .peer
        .respond_to_confirmations(|_| (Duration::from_millis(50), Ok(json!("d"))));

    harness.relay.run("add tests for foo.py");

    assert_eq!(harness.wait_for_completion(), 1);
    assert_eq!(
        harness.session.answers(),
        vec![
            ("Apply this edit?".to_string(), ConfirmationResponse::No),
            ("Apply this edit?".to_string(), ConfirmationResponse::No),
        ]
    );
    assert_eq!(harness.peer.count(methods::CONFIRMATION_REQUEST), 1);
    assert_eq!(harness.peer.streamed_payloads(), vec!["applied".to_string()]);
}

#[test]
fn asking_from_inside_a_runtime_sends_nothing_and_answers_locally() {
    let harness = Harness::new(Vec::new());
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .expect("runtime should build");

    let answer = runtime.block_on(async {
        harness
            .relay
            .confirmations()
            .ask(ConfirmationRequest::new("Create new file?").with_default(true))
    });

    assert_eq!(answer, ConfirmationResponse::Yes);
    thread::sleep(Duration::from_millis(50));
    assert_eq!(harness.peer.count(methods::CONFIRMATION_REQUEST), 0);
}
