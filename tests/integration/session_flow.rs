//! Integration tests for the prompt → stream → session flow
//!
//! Tests the flow: MockTransport -> StreamDispatcher -> Session -> UI events

use gula::agent::mock::{MockConfig, MockSseBuilder, MockTransport};
use gula::agent::{Notice, Role, SessionState, REJECTED_MESSAGE};
use gula::ui::{UiEvent, UserAction};
use serde_json::json;

use super::common::{Harness, RecordingExecutor};

fn scripted(builder: MockSseBuilder) -> MockTransport {
    MockTransport::new(MockConfig::default().with_chunks(builder.build()))
}

/// A plain answer ends Idle with the user and assistant messages in order
#[tokio::test]
async fn test_hello_round_trip() {
    let mut harness = Harness::new(scripted(
        MockSseBuilder::new()
            .started("c1", "gpt")
            .text("Hi")
            .complete(10, 0.01),
    ));

    harness
        .app
        .handle_action(UserAction::Prompt("hello".into()))
        .await;
    harness.drain().await;

    let session = harness.app.session();
    assert_eq!(session.state(), SessionState::Idle);
    assert_eq!(session.conversation_id(), Some("c1"));

    let messages = session.messages();
    assert_eq!(messages.len(), 2);
    assert_eq!(messages[0].role, Role::User);
    assert_eq!(messages[0].content, "hello");
    assert_eq!(messages[1].role, Role::Assistant);
    assert_eq!(messages[1].content, "Hi");
    assert_eq!(messages[1].model.as_deref(), Some("gpt"));

    assert_eq!(session.tokens().total, 10);
    assert!((session.cost() - 0.01).abs() < f64::EPSILON);
    assert!(session.streaming_buffer().is_empty());
    assert!(harness.transport.was_released());
}

/// Rejecting a gated call reports an error result and never runs the tool
#[tokio::test]
async fn test_rejected_write_is_reported_without_execution() {
    let mut harness = Harness::new(scripted(
        MockSseBuilder::new()
            .started("c1", "gpt")
            .tool_requests(&[(
                "t1",
                "write_file",
                json!({"path": "notes.txt", "content": "x"}),
            )])
            .complete(3, 0.0),
    ));

    harness
        .app
        .handle_action(UserAction::Prompt("save notes".into()))
        .await;
    harness.drain().await;
    assert_eq!(harness.app.session().state(), SessionState::WaitingApproval);

    harness.app.handle_action(UserAction::Reject).await;

    assert!(harness.executor.calls().is_empty());
    let posted = harness.transport.captured_tool_results();
    assert_eq!(posted.len(), 1);
    let (conversation_id, results) = &posted[0];
    assert_eq!(conversation_id, "c1");
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].id, "t1");
    assert_eq!(results[0].error.as_deref(), Some(REJECTED_MESSAGE));
    assert!(results[0].result.is_none());

    harness.drain().await;
    assert_eq!(harness.app.session().state(), SessionState::Idle);
}

/// A 500 on open leaves one error message and no assistant reply
#[tokio::test]
async fn test_server_error_enters_error_state() {
    let mut harness = Harness::new(MockTransport::new(
        MockConfig::default().failing_with_status(500, "internal"),
    ));

    harness
        .app
        .handle_action(UserAction::Prompt("hello".into()))
        .await;
    harness.drain().await;

    let session = harness.app.session();
    assert_eq!(session.state(), SessionState::Error);
    let errors: Vec<_> = session
        .messages()
        .iter()
        .filter(|m| m.role == Role::Error)
        .collect();
    assert_eq!(errors.len(), 1);
    assert!(errors[0].content.contains("500"));
    assert!(!session.messages().iter().any(|m| m.role == Role::Assistant));

    harness.app.handle_action(UserAction::Acknowledge).await;
    assert_eq!(harness.app.session().state(), SessionState::Idle);
}

/// An error event mid-stream discards partial text
#[tokio::test]
async fn test_error_event_discards_partial_text() {
    let mut harness = Harness::new(scripted(
        MockSseBuilder::new()
            .started("c1", "gpt")
            .text("partial")
            .error("model overloaded", Some("overloaded")),
    ));

    harness
        .app
        .handle_action(UserAction::Prompt("hello".into()))
        .await;
    harness.drain().await;

    let session = harness.app.session();
    assert_eq!(session.state(), SessionState::Error);
    assert!(session.streaming_buffer().is_empty());
    assert!(!session.messages().iter().any(|m| m.role == Role::Assistant));
}

/// New conversation resets everything, even while waiting for approval
#[tokio::test]
async fn test_new_conversation_from_waiting_approval() {
    let mut harness = Harness::new(
        MockTransport::new(
            MockConfig::default()
                .with_chunks(
                    MockSseBuilder::new()
                        .started("c1", "gpt")
                        .tool_requests(&[("t1", "run_command", json!({"command": "ls"}))])
                        .build(),
                )
                .held_open(),
        ),
    );

    harness
        .app
        .handle_action(UserAction::Prompt("list".into()))
        .await;
    harness.drain().await;
    assert_eq!(harness.app.session().state(), SessionState::WaitingApproval);

    harness.app.handle_action(UserAction::NewConversation).await;

    let session = harness.app.session();
    assert_eq!(session.state(), SessionState::Idle);
    assert!(session.messages().is_empty());
    assert!(session.conversation_id().is_none());
    assert!(session.pending_tools().is_empty());
    assert_eq!(session.tokens().total, 0);
    assert!(!harness.app.has_stream());
    assert!(harness.executor.calls().is_empty());
}

/// Gated calls are presented one at a time in arrival order, with a single approval wait
#[tokio::test]
async fn test_batch_approvals_in_order() {
    let mut harness = Harness::new(scripted(
        MockSseBuilder::new()
            .started("c1", "gpt")
            .tool_requests(&[
                ("t1", "write_file", json!({"path": "a", "content": "1"})),
                ("t2", "read_file", json!({"path": "a"})),
                ("t3", "run_command", json!({"command": "true"})),
            ])
            .complete(7, 0.0),
    ));

    harness
        .app
        .handle_action(UserAction::Prompt("do it".into()))
        .await;
    harness.drain().await;

    let mut approval_ids = Vec::new();
    let mut waits = 0;
    let mut collect = |events: Vec<UiEvent>| {
        for event in events {
            match event {
                UiEvent::ApprovalRequested { id, .. } => approval_ids.push(id),
                UiEvent::StateChanged(SessionState::WaitingApproval) => waits += 1,
                _ => {}
            }
        }
    };

    collect(harness.ui_events());
    harness.app.handle_action(UserAction::Approve).await;
    collect(harness.ui_events());
    harness.app.handle_action(UserAction::Approve).await;
    collect(harness.ui_events());

    assert_eq!(approval_ids, vec!["t1", "t3"]);
    assert_eq!(waits, 1);
    assert_eq!(
        harness.executor.calls(),
        vec!["write_file", "read_file", "run_command"]
    );

    let posted = harness.transport.captured_tool_results();
    assert_eq!(posted.len(), 1);
    let ids: Vec<_> = posted[0].1.iter().map(|r| r.id.as_str()).collect();
    assert_eq!(ids, vec!["t1", "t2", "t3"]);

    harness.drain().await;
    assert_eq!(harness.app.session().state(), SessionState::Idle);
}

/// A new prompt while streaming cancels the turn and opens a new stream
#[tokio::test]
async fn test_prompt_while_streaming_cancels_first() {
    let held = MockConfig::default()
        .with_chunks(MockSseBuilder::new().started("c1", "gpt").text("slow").build())
        .held_open();
    let answer = MockConfig::default().with_chunks(
        MockSseBuilder::new()
            .started("c1", "gpt")
            .text("second")
            .complete(2, 0.0)
            .build(),
    );
    let mut harness = Harness::new(MockTransport::new(held).then(answer));

    harness
        .app
        .handle_action(UserAction::Prompt("first".into()))
        .await;
    for _ in 0..2 {
        let message = harness.app.next_stream_message().await;
        harness.app.handle_stream_message(message).await;
    }
    assert_eq!(harness.app.session().streaming_buffer(), "slow");

    harness
        .app
        .handle_action(UserAction::Prompt("second".into()))
        .await;
    harness.drain().await;

    let contents: Vec<_> = harness
        .app
        .session()
        .messages()
        .iter()
        .map(|m| (m.role, m.content.as_str()))
        .collect();
    assert_eq!(
        contents,
        vec![
            (Role::User, "first"),
            (Role::System, "Cancelled"),
            (Role::User, "second"),
            (Role::Assistant, "second"),
        ]
    );
    assert_eq!(harness.transport.captured_requests().len(), 2);
    assert_eq!(
        harness.transport.last_request().unwrap().conversation_id.as_deref(),
        Some("c1")
    );
}

/// Tool results that cannot be posted are sent with the next prompt
#[tokio::test]
async fn test_results_deferred_without_conversation_id() {
    // No started event, so there is no conversation to post results to
    let batch = MockConfig::default().with_chunks(
        MockSseBuilder::new()
            .tool_requests(&[("t1", "git_info", json!({"action": "status"}))])
            .build(),
    );
    let follow_up = MockConfig::default().with_chunks(
        MockSseBuilder::new()
            .started("c1", "gpt")
            .complete(1, 0.0)
            .build(),
    );
    let mut harness = Harness::new(MockTransport::new(batch).then(follow_up));

    harness
        .app
        .handle_action(UserAction::Prompt("status?".into()))
        .await;
    harness.drain().await;

    assert_eq!(harness.executor.calls(), vec!["git_info"]);
    assert_eq!(harness.app.session().state(), SessionState::Idle);
    assert_eq!(harness.app.session().deferred_results().len(), 1);
    assert!(harness.transport.captured_tool_results().is_empty());

    harness
        .app
        .handle_action(UserAction::Prompt("next".into()))
        .await;
    harness.drain().await;

    let requests = harness.transport.captured_requests();
    assert_eq!(requests.len(), 2);
    assert_eq!(requests[1].tool_results.len(), 1);
    assert_eq!(requests[1].tool_results[0].id, "t1");
    assert!(harness.app.session().deferred_results().is_empty());
}

/// A malformed payload fails the turn, discards partial text and stops reading
#[tokio::test]
async fn test_malformed_event_fails_turn() {
    let mut harness = Harness::new(scripted(
        MockSseBuilder::new()
            .started("c1", "gpt")
            .text("partial")
            .raw("event: text\ndata: {not json}\n\n")
            .text("later")
            .complete(9, 0.5),
    ));

    harness
        .app
        .handle_action(UserAction::Prompt("hello".into()))
        .await;
    harness.drain().await;

    let session = harness.app.session();
    assert_eq!(session.state(), SessionState::Error);
    assert!(session.streaming_buffer().is_empty());
    assert_eq!(session.tokens().total, 0);

    let roles: Vec<_> = session.messages().iter().map(|m| m.role).collect();
    assert_eq!(roles, vec![Role::User, Role::Error]);
    assert!(session.messages()[1].content.contains("text event"));
    assert!(!harness.app.has_stream());
}

/// A rejected tool-result post fails the turn and closes the stream
#[tokio::test]
async fn test_tool_result_post_failure_enters_error_state() {
    let transport = MockTransport::new(
        MockConfig::default()
            .with_chunks(
                MockSseBuilder::new()
                    .started("c1", "gpt")
                    .tool_requests(&[("t1", "git_info", json!({"action": "status"}))])
                    .build(),
            )
            .held_open(),
    )
    .failing_tool_results();
    let mut harness = Harness::new(transport);

    harness
        .app
        .handle_action(UserAction::Prompt("status?".into()))
        .await;
    harness.drain().await;

    assert_eq!(harness.executor.calls(), vec!["git_info"]);
    assert_eq!(harness.transport.captured_tool_results().len(), 1);

    let session = harness.app.session();
    assert_eq!(session.state(), SessionState::Error);
    let errors: Vec<_> = session
        .messages()
        .iter()
        .filter(|m| m.role == Role::Error)
        .collect();
    assert_eq!(errors.len(), 1);
    assert!(errors[0].content.contains("502"));
    assert!(errors[0].content.contains("tool results rejected"));
    assert!(!harness.app.has_stream());
}

/// A failing tool is reported as an error result without stopping the batch
#[tokio::test]
async fn test_failing_tool_keeps_batch_going() {
    let mut harness = Harness::with_executor(
        scripted(
            MockSseBuilder::new()
                .started("c1", "gpt")
                .tool_requests(&[
                    ("t1", "read_file", json!({"path": "a"})),
                    ("t2", "git_info", json!({"action": "status"})),
                    ("t3", "list_files", json!({})),
                ])
                .complete(4, 0.0),
        ),
        RecordingExecutor::failing("git_info"),
    );

    harness
        .app
        .handle_action(UserAction::Prompt("look around".into()))
        .await;
    harness.drain().await;

    assert_eq!(
        harness.executor.calls(),
        vec!["read_file", "git_info", "list_files"]
    );

    let posted = harness.transport.captured_tool_results();
    assert_eq!(posted.len(), 1);
    let results = &posted[0].1;
    let ids: Vec<_> = results.iter().map(|r| r.id.as_str()).collect();
    assert_eq!(ids, vec!["t1", "t2", "t3"]);

    assert_eq!(results[0].result.as_deref(), Some("read_file done"));
    assert!(results[0].error.is_none());
    assert!(results[1].result.is_none());
    assert!(results[1]
        .error
        .as_deref()
        .is_some_and(|e| e.contains("not a git repository")));
    assert_eq!(results[2].result.as_deref(), Some("list_files done"));

    assert_eq!(harness.app.session().state(), SessionState::Idle);
}

/// Informational events surface as notices and never move the state machine
#[tokio::test]
async fn test_notices_leave_state_untouched() {
    let mut harness = Harness::new(scripted(
        MockSseBuilder::new()
            .started("c1", "gpt")
            .thinking("pondering")
            .raw(": keepalive\n\n")
            .rate_limited(3, "slow down")
            .cost_warning("budget close", 0.9)
            .text("done")
            .complete(5, 0.9),
    ));

    harness
        .app
        .handle_action(UserAction::Prompt("hello".into()))
        .await;
    harness.drain().await;

    let mut notices = Vec::new();
    let mut states = Vec::new();
    for event in harness.ui_events() {
        match event {
            UiEvent::Notice(notice) => notices.push(notice),
            UiEvent::StateChanged(state) => states.push(state),
            _ => {}
        }
    }

    assert_eq!(notices.len(), 3);
    assert_eq!(notices[0], Notice::Thinking(Some("pondering".into())));
    assert!(matches!(
        &notices[1],
        Notice::RateLimited { retry_after: 3, message } if message == "slow down"
    ));
    assert!(matches!(
        &notices[2],
        Notice::CostWarning { message, cost_limit: None, .. } if message == "budget close"
    ));
    assert_eq!(
        states,
        vec![
            SessionState::Connecting,
            SessionState::Streaming,
            SessionState::Idle
        ]
    );

    let roles: Vec<_> = harness
        .app
        .session()
        .messages()
        .iter()
        .map(|m| m.role)
        .collect();
    assert_eq!(roles, vec![Role::User, Role::Assistant]);
}

/// /health reports the transport's verdict without touching the conversation
#[tokio::test]
async fn test_health_command_reports_status() {
    let mut harness = Harness::new(MockTransport::new(MockConfig::default()).unhealthy());
    harness.app.handle_action(UserAction::Health).await;
    let events = harness.ui_events();
    assert!(matches!(
        events.as_slice(),
        [UiEvent::Error(text)] if text.contains("health check failed")
    ));
    assert!(harness.app.session().messages().is_empty());

    let mut harness = Harness::new(MockTransport::new(MockConfig::default()));
    harness.app.handle_action(UserAction::Health).await;
    assert!(matches!(
        harness.ui_events().as_slice(),
        [UiEvent::Info(text)] if text.contains("healthy")
    ));
}
