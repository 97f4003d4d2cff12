use chrono::{TimeZone, Utc};
use relay_core::model::{Message, MessageInfo, MessageTime, SessionTime};
use relay_core::transport::TransportCall;
use relay_core::{
    ConversationError, MemoryTransport, ModelSelection, Orchestrator, Part, Role, Session,
};
use serde_json::json;
use std::sync::Arc;

fn test_runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .expect("runtime")
}

fn orchestrator(transport: &MemoryTransport) -> Orchestrator {
    Orchestrator::new(Arc::new(transport.clone()), "http://127.0.0.1:4096")
}

fn dated_session(id: &str, year: i32, month: u32, day: u32) -> Session {
    Session {
        id: id.to_string(),
        title: None,
        time: SessionTime::at(Utc.with_ymd_and_hms(year, month, day, 12, 0, 0).unwrap()),
        share: None,
        parent_id: None,
        version: None,
    }
}

#[test]
fn first_prompt_yields_user_and_assistant_entries() {
    let runtime = test_runtime();
    let transport = MemoryTransport::new();
    let orchestrator = orchestrator(&transport);

    for prompt in ["hello", "  spaced out  ", "multi\nline prompt", "ünïcödé ✓"] {
        let conversation = runtime
            .block_on(orchestrator.start_conversation(prompt, None))
            .expect("conversation");
        let roles: Vec<Role> = conversation
            .transcript()
            .entries()
            .iter()
            .map(|entry| entry.role)
            .collect();
        assert_eq!(roles, [Role::User, Role::Assistant]);
    }
}

#[test]
fn whitespace_prompts_make_no_requests() {
    let runtime = test_runtime();
    let transport = MemoryTransport::new();
    let orchestrator = orchestrator(&transport);

    for prompt in ["", " ", "\t", "\n\n", " \r\n "] {
        let err = runtime
            .block_on(orchestrator.start_conversation(prompt, None))
            .unwrap_err();
        assert!(matches!(err, ConversationError::Validation(_)));
    }
    assert!(transport.calls().is_empty());
}

#[test]
fn browsing_orders_sessions_by_last_update() {
    let runtime = test_runtime();
    let transport = MemoryTransport::new();
    transport.insert_session(dated_session("T1", 2024, 1, 1));
    transport.insert_session(dated_session("T2", 2024, 1, 3));
    transport.insert_session(dated_session("T3", 2024, 1, 2));

    let sessions = runtime
        .block_on(orchestrator(&transport).browse_sessions())
        .expect("sessions");
    let ids: Vec<&str> = sessions.iter().map(|s| s.id.as_str()).collect();
    assert_eq!(ids, ["T2", "T3", "T1"]);
}

#[test]
fn reopened_session_renders_tool_traffic_as_nothing() {
    let runtime = test_runtime();
    let transport = MemoryTransport::new();
    transport.insert_session(dated_session("ses_tools", 2024, 2, 1));
    let created = MessageTime {
        created: Utc.with_ymd_and_hms(2024, 2, 1, 12, 0, 0).unwrap(),
    };
    let parts: Vec<Part> = serde_json::from_value(json!([
        {"type": "tool-invocation", "toolInvocation": {"toolName": "bash"}},
        {"type": "tool-result", "result": "rm -rf output"},
        {"type": "text", "text": "All tests pass."}
    ]))
    .unwrap();
    transport.insert_message(Message {
        info: MessageInfo {
            id: "msg_1".into(),
            session_id: "ses_tools".into(),
            role: Role::User,
            time: created.clone(),
        },
        parts: vec![Part::text("run the tests")],
    });
    transport.insert_message(Message {
        info: MessageInfo {
            id: "msg_2".into(),
            session_id: "ses_tools".into(),
            role: Role::Assistant,
            time: created,
        },
        parts,
    });

    let conversation = runtime
        .block_on(orchestrator(&transport).open_session("ses_tools", None))
        .expect("open");
    let contents: Vec<&str> = conversation
        .transcript()
        .entries()
        .iter()
        .map(|entry| entry.content.as_str())
        .collect();
    assert_eq!(contents, ["run the tests", "All tests pass."]);
}

#[test]
fn deleted_session_fails_cleanly_everywhere() {
    let runtime = test_runtime();
    let transport = MemoryTransport::new();
    let orchestrator = orchestrator(&transport);
    let conversation = runtime
        .block_on(orchestrator.start_conversation("short lived", None))
        .expect("conversation");
    let id = conversation.session_id().to_string();

    runtime
        .block_on(orchestrator.delete_session_by_id(&id))
        .expect("delete");

    let errors = [
        runtime.block_on(orchestrator.open_session(&id, None)).err(),
        runtime.block_on(orchestrator.abort_by_id(&id)).err(),
        runtime.block_on(orchestrator.delete_session_by_id(&id)).err(),
    ];
    for err in errors {
        match err {
            Some(ConversationError::Transport(inner)) => assert!(inner.is_not_found()),
            other => panic!("expected a not-found failure, got {other:?}"),
        }
    }

    let mut stale = conversation;
    let err = runtime
        .block_on(orchestrator.continue_conversation(&mut stale, "hello?", None))
        .unwrap_err();
    assert!(matches!(
        err,
        ConversationError::Transport(ref inner) if inner.status() == Some(404)
    ));
    assert_eq!(stale.transcript().len(), 3);
}

#[test]
fn model_selection_is_forwarded_verbatim() {
    let runtime = test_runtime();
    let transport = MemoryTransport::new();
    let orchestrator = orchestrator(&transport);
    let model = ModelSelection::parse("openrouter/anthropic/claude").expect("selection");

    runtime
        .block_on(orchestrator.start_conversation("hi", Some(&model)))
        .expect("conversation");
    let forwarded = transport.calls().into_iter().find_map(|call| match call {
        TransportCall::SendMessage { model, .. } => model,
        _ => None,
    });
    assert_eq!(forwarded, Some(ModelSelection::new("openrouter", "anthropic/claude")));
}
