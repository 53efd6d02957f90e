use super::*;
use crate::testing::RecordingBackendFactory;
use crate::{ParamKind, ParamSpec, Tool, ToolError, python_tool};
use parley_realtime::testing::ScriptedConnector;
use serde_json::{Value, json};
use std::time::Duration;

fn test_config() -> SessionConfig {
    SessionConfig {
        api_key: "sk-test".to_string(),
        read_timeout: Some(Duration::from_millis(200)),
        ..SessionConfig::default()
    }
}

fn add_tool() -> ToolSpec {
    ToolSpec::new(
        "add",
        "Add two integers",
        Tool::plain_sync(|args| {
            let a = args.get("a").and_then(Value::as_i64);
            let b = args.get("b").and_then(Value::as_i64);
            match (a, b) {
                (Some(a), Some(b)) => Ok(json!(a + b)),
                _ => Err(ToolError::Execution("a and b must be integers".to_string())),
            }
        }),
    )
    .param(ParamSpec::required("a", ParamKind::Integer))
    .param(ParamSpec::required("b", ParamKind::Integer))
}

fn test_catalog() -> ToolCatalog {
    let mut catalog = ToolCatalog::default();
    catalog.add(add_tool());
    catalog.add(python_tool());
    catalog
}

fn session_with(
    connector: &ScriptedConnector,
    factory: &RecordingBackendFactory,
) -> RealtimeSession {
    RealtimeSession::new(
        test_config(),
        Arc::new(connector.clone()),
        Arc::new(factory.clone()),
        test_catalog(),
    )
}

fn push_handshake(connector: &ScriptedConnector) {
    connector
        .push_json(json!({"type": "session.created"}))
        .push_json(json!({"type": "session.updated"}));
}

fn push_plain_reply(connector: &ScriptedConnector, user_item: &str, reply_item: &str, pcm: &[u8]) {
    connector
        .push_json(json!({"type": "conversation.item.created", "item": {"id": user_item}}))
        .push_json(json!({"type": "response.audio.delta", "delta": encode_audio(pcm)}))
        .push_json(json!({"type": "response.audio_transcript.delta", "delta": "hi"}))
        .push_json(json!({
            "type": "response.done",
            "response": {"output": [{"type": "message", "id": reply_item}]}
        }))
        .push_json(json!({"type": "response.audio.done"}));
}

#[tokio::test(flavor = "current_thread")]
async fn connect_sends_configuration_and_becomes_active() {
    let connector = ScriptedConnector::new();
    let factory = RecordingBackendFactory::new();
    push_handshake(&connector);
    let mut session = session_with(&connector, &factory);

    session.connect().await.expect("handshake should succeed");

    assert_eq!(session.state(), SessionState::Active);
    assert!(session.is_connected());
    let sent = connector.sent_json();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0]["type"], "session.update");
    assert_eq!(sent[0]["session"]["turn_detection"], Value::Null);
    assert_eq!(sent[0]["session"]["tool_choice"], "none");
    assert_eq!(sent[0]["session"]["voice"], "alloy");

    let requests = connector.requests();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].api_key, "sk-test");
}

#[tokio::test(flavor = "current_thread")]
async fn connect_is_a_no_op_while_active() {
    let connector = ScriptedConnector::new();
    let factory = RecordingBackendFactory::new();
    push_handshake(&connector);
    let mut session = session_with(&connector, &factory);

    session.connect().await.expect("first connect should succeed");
    session.connect().await.expect("second connect should be a no-op");

    assert_eq!(connector.connect_count(), 1);
    assert_eq!(connector.sent_types(), vec!["session.update".to_string()]);
}

#[tokio::test(flavor = "current_thread")]
async fn connect_without_api_key_is_rejected_before_dialing() {
    let connector = ScriptedConnector::new();
    let factory = RecordingBackendFactory::new();
    let mut session = RealtimeSession::new(
        SessionConfig::default(),
        Arc::new(connector.clone()),
        Arc::new(factory.clone()),
        test_catalog(),
    );

    let error = session.connect().await.expect_err("no key configured");
    assert!(matches!(error, AgentError::InvalidConfiguration(_)));
    assert_eq!(connector.connect_count(), 0);
    assert_eq!(session.state(), SessionState::Disconnected);
}

#[tokio::test(flavor = "current_thread")]
async fn failed_dial_leaves_session_disconnected() {
    let connector = ScriptedConnector::new();
    let factory = RecordingBackendFactory::new();
    connector.fail_next_connect("connection refused");
    let mut session = session_with(&connector, &factory);

    let error = session.connect().await.expect_err("dial should fail");
    assert!(error.is_connection_level());
    assert_eq!(session.state(), SessionState::Disconnected);
}

#[tokio::test(flavor = "current_thread")]
async fn send_before_connect_is_not_connected() {
    let connector = ScriptedConnector::new();
    let factory = RecordingBackendFactory::new();
    let mut session = session_with(&connector, &factory);

    let error = session.send_text("hello").await.expect_err("not connected");
    assert!(matches!(error, AgentError::NotConnected));
    assert!(connector.sent().is_empty());
}

#[tokio::test(flavor = "current_thread")]
async fn text_turn_collects_audio_and_transcript() {
    let connector = ScriptedConnector::new();
    let factory = RecordingBackendFactory::new();
    push_handshake(&connector);
    push_plain_reply(&connector, "item_user_1", "item_reply_1", &[1, 0, 2, 0]);
    let mut session = session_with(&connector, &factory);
    session.connect().await.expect("handshake should succeed");

    let turn = session.send_text("hello").await.expect("turn should complete");

    assert_eq!(turn.audio.pcm, vec![1, 0, 2, 0]);
    assert_eq!(turn.transcript, "hi");
    assert_eq!(turn.response_item_id.as_deref(), Some("item_reply_1"));
    assert_eq!(turn.tool_calls, 0);
    assert_eq!(session.state(), SessionState::Active);
    assert_eq!(session.last_user_item_id(), Some("item_user_1"));
    assert_eq!(session.last_assistant_item_id(), Some("item_reply_1"));

    let sent = connector.sent_json();
    assert_eq!(sent[1]["type"], "conversation.item.create");
    assert!(sent[1].get("previous_item_id").is_none());
    assert_eq!(sent[1]["item"]["content"][0]["text"], "hello");
    assert_eq!(sent[2]["type"], "response.create");
}

#[tokio::test(flavor = "current_thread")]
async fn second_turn_is_chained_to_previous_reply() {
    let connector = ScriptedConnector::new();
    let factory = RecordingBackendFactory::new();
    push_handshake(&connector);
    push_plain_reply(&connector, "item_user_1", "item_reply_1", &[0, 0]);
    push_plain_reply(&connector, "item_user_2", "item_reply_2", &[0, 0]);
    let mut session = session_with(&connector, &factory);
    session.connect().await.expect("handshake should succeed");

    session.send_text("one").await.expect("first turn should complete");
    session.send_text("two").await.expect("second turn should complete");

    let items: Vec<Value> = connector
        .sent_json()
        .into_iter()
        .filter(|event| event["type"] == "conversation.item.create")
        .collect();
    assert_eq!(items.len(), 2);
    assert_eq!(items[1]["previous_item_id"], "item_reply_1");
    assert_eq!(session.last_assistant_item_id(), Some("item_reply_2"));
}

#[tokio::test(flavor = "current_thread")]
async fn tool_call_is_answered_and_response_resumed() {
    let connector = ScriptedConnector::new();
    let factory = RecordingBackendFactory::new();
    let mut session = session_with(&connector, &factory);
    let rejected = session
        .select_tools(&["add".to_string()])
        .await
        .expect("add should be selectable");
    assert!(rejected.is_empty());

    push_handshake(&connector);
    connector
        .push_json(json!({"type": "conversation.item.created", "item": {"id": "item_user_1"}}))
        .push_json(json!({
            "type": "response.done",
            "response": {"output": [{
                "type": "function_call",
                "id": "item_call_1",
                "name": "add",
                "arguments": "{\"a\": 2, \"b\": 3}",
                "call_id": "call_1"
            }]}
        }))
        .push_json(json!({"type": "conversation.item.created", "item": {"id": "item_output_1"}}))
        .push_json(json!({"type": "response.audio.delta", "delta": encode_audio(&[5, 0])}))
        .push_json(json!({
            "type": "response.done",
            "response": {"output": [{"type": "message", "id": "item_reply_1"}]}
        }))
        .push_json(json!({"type": "response.audio.done"}));

    session.connect().await.expect("handshake should succeed");
    let sent = connector.sent_json();
    assert_eq!(sent[0]["session"]["tool_choice"], "auto");
    assert_eq!(sent[0]["session"]["tools"][0]["name"], "add");

    let turn = session.send_text("what is 2 + 3").await.expect("turn should complete");

    assert_eq!(turn.tool_calls, 1);
    assert_eq!(turn.audio.pcm, vec![5, 0]);
    assert_eq!(turn.response_item_id.as_deref(), Some("item_reply_1"));
    assert_eq!(
        connector.sent_types(),
        vec![
            "session.update",
            "conversation.item.create",
            "response.create",
            "conversation.item.create",
            "response.create",
        ]
    );
    let output = &connector.sent_json()[3];
    assert_eq!(output["item"]["type"], "function_call_output");
    assert_eq!(output["item"]["call_id"], "call_1");
    assert_eq!(output["item"]["output"], "5");

    let history = session.tool_history();
    assert_eq!(history.len(), 1);
    assert!(history[0].success);
    assert_eq!(history[0].arguments, json!({"a": 2, "b": 3}));
}

#[tokio::test(flavor = "current_thread")]
async fn unparseable_tool_arguments_fail_the_turn_but_keep_the_session() {
    let connector = ScriptedConnector::new();
    let factory = RecordingBackendFactory::new();
    let mut session = session_with(&connector, &factory);
    session
        .select_tools(&["add".to_string()])
        .await
        .expect("add should be selectable");
    push_handshake(&connector);
    connector
        .push_json(json!({"type": "conversation.item.created", "item": {"id": "item_user_1"}}))
        .push_json(json!({
            "type": "response.done",
            "response": {"output": [{
                "type": "function_call",
                "name": "add",
                "arguments": "{a: 2",
                "call_id": "call_1"
            }]}
        }));
    session.connect().await.expect("handshake should succeed");

    let error = session.send_text("add").await.expect_err("arguments are not JSON");
    assert!(matches!(error, AgentError::Protocol(_)));
    assert_eq!(session.state(), SessionState::Active);
    assert!(session.tool_history().is_empty());
}

#[tokio::test(flavor = "current_thread")]
async fn malformed_call_after_an_answered_call_disconnects() {
    let connector = ScriptedConnector::new();
    let factory = RecordingBackendFactory::new();
    let mut session = session_with(&connector, &factory);
    session
        .select_tools(&["add".to_string()])
        .await
        .expect("add should be selectable");
    push_handshake(&connector);
    connector
        .push_json(json!({"type": "conversation.item.created", "item": {"id": "item_user_1"}}))
        .push_json(json!({
            "type": "response.done",
            "response": {"output": [
                {"type": "function_call", "name": "add", "arguments": "{\"a\": 1, \"b\": 1}", "call_id": "call_1"},
                {"type": "function_call", "name": "add", "arguments": "{bad", "call_id": "call_2"}
            ]}
        }))
        .push_json(json!({"type": "conversation.item.created", "item": {"id": "item_output_1"}}))
        .push_json(json!({"type": "response.audio.delta", "delta": encode_audio(&[9, 9])}))
        .push_json(json!({"type": "response.audio.done"}));
    session.connect().await.expect("handshake should succeed");

    let error = session.send_text("add twice").await.expect_err("second call is malformed");

    assert!(matches!(error, AgentError::Protocol(_)));
    assert_eq!(session.state(), SessionState::Disconnected);
    assert_eq!(session.last_user_item_id(), None);
    assert_eq!(connector.close_count(), 1);
    assert_eq!(session.tool_history().len(), 1);

    let next = session.send_text("again").await.expect_err("session was torn down");
    assert!(matches!(next, AgentError::NotConnected));
}

#[tokio::test(flavor = "current_thread")]
async fn tool_calls_chain_within_one_turn() {
    let connector = ScriptedConnector::new();
    let factory = RecordingBackendFactory::new();
    let mut session = session_with(&connector, &factory);
    session
        .select_tools(&["add".to_string()])
        .await
        .expect("add should be selectable");
    push_handshake(&connector);
    connector
        .push_json(json!({"type": "conversation.item.created", "item": {"id": "item_user_1"}}))
        .push_json(json!({
            "type": "response.done",
            "response": {"output": [
                {"type": "function_call", "id": "item_call_1", "name": "add", "arguments": "{\"a\": 1, \"b\": 2}", "call_id": "call_1"},
                {"type": "function_call", "id": "item_call_2", "name": "add", "arguments": "{\"a\": 3, \"b\": 4}", "call_id": "call_2"}
            ]}
        }))
        .push_json(json!({
            "type": "response.done",
            "response": {"output": [
                {"type": "function_call", "id": "item_call_3", "name": "add", "arguments": "{\"a\": 5, \"b\": 6}", "call_id": "call_3"}
            ]}
        }))
        .push_json(json!({"type": "response.audio.delta", "delta": encode_audio(&[3, 0])}))
        .push_json(json!({
            "type": "response.done",
            "response": {"output": [{"type": "message", "id": "item_reply_1"}]}
        }))
        .push_json(json!({"type": "response.audio.done"}));
    session.connect().await.expect("handshake should succeed");

    let turn = session.send_text("sum things").await.expect("turn should complete");

    assert_eq!(turn.tool_calls, 3);
    assert_eq!(turn.response_item_id.as_deref(), Some("item_reply_1"));
    assert_eq!(session.tool_history().len(), 3);
    assert_eq!(
        connector.sent_types(),
        vec![
            "session.update",
            "conversation.item.create",
            "response.create",
            "conversation.item.create",
            "response.create",
            "conversation.item.create",
            "response.create",
            "conversation.item.create",
            "response.create",
        ]
    );
    let outputs: Vec<(String, String)> = connector
        .sent_json()
        .iter()
        .filter(|event| event["item"]["type"] == "function_call_output")
        .map(|event| {
            (
                event["item"]["call_id"].as_str().unwrap_or_default().to_string(),
                event["item"]["output"].as_str().unwrap_or_default().to_string(),
            )
        })
        .collect();
    assert_eq!(
        outputs,
        vec![
            ("call_1".to_string(), "3".to_string()),
            ("call_2".to_string(), "7".to_string()),
            ("call_3".to_string(), "11".to_string()),
        ]
    );
}

#[tokio::test(flavor = "current_thread")]
async fn stalled_stream_times_out_and_disconnects() {
    let connector = ScriptedConnector::new();
    let factory = RecordingBackendFactory::new();
    push_handshake(&connector);
    connector
        .push_json(json!({"type": "conversation.item.created", "item": {"id": "item_user_1"}}))
        .push_stall();
    let mut session = session_with(&connector, &factory);
    session.connect().await.expect("handshake should succeed");
    let first_id = session.session_id().to_string();

    let error = session.send_text("hello").await.expect_err("stream stalls");

    assert!(matches!(
        error,
        AgentError::Realtime(RealtimeError::TimedOut {
            waiting_for: AUDIO_DONE,
            ..
        })
    ));
    assert!(error.is_connection_level());
    assert_eq!(session.state(), SessionState::Disconnected);
    assert_eq!(session.last_assistant_item_id(), None);
    assert_ne!(session.session_id(), first_id);
    assert_eq!(connector.close_count(), 1);
}

#[tokio::test(flavor = "current_thread")]
async fn remote_close_mid_turn_disconnects() {
    let connector = ScriptedConnector::new();
    let factory = RecordingBackendFactory::new();
    push_handshake(&connector);
    connector.push_close();
    let mut session = session_with(&connector, &factory);
    session.connect().await.expect("handshake should succeed");

    let error = session.send_text("hello").await.expect_err("remote closed");
    assert!(matches!(
        error,
        AgentError::Realtime(RealtimeError::ConnectionClosed)
    ));
    assert_eq!(session.state(), SessionState::Disconnected);
}

#[tokio::test(flavor = "current_thread")]
async fn malformed_frame_disconnects() {
    let connector = ScriptedConnector::new();
    let factory = RecordingBackendFactory::new();
    push_handshake(&connector);
    connector.push_frame("not json");
    let mut session = session_with(&connector, &factory);
    session.connect().await.expect("handshake should succeed");

    let error = session.send_text("hello").await.expect_err("frame is garbage");
    assert!(matches!(
        error,
        AgentError::Realtime(RealtimeError::Protocol(_))
    ));
    assert_eq!(session.state(), SessionState::Disconnected);
}

#[tokio::test(flavor = "current_thread")]
async fn disconnect_is_idempotent() {
    let connector = ScriptedConnector::new();
    let factory = RecordingBackendFactory::new();
    let mut session = session_with(&connector, &factory);
    session
        .select_tools(&["python".to_string()])
        .await
        .expect("python should be selectable");
    push_handshake(&connector);
    session.connect().await.expect("handshake should succeed");

    session.disconnect().await.expect("first disconnect");
    session.disconnect().await.expect("second disconnect");

    assert_eq!(connector.close_count(), 1);
    assert_eq!(factory.shutdown_count(), 1);
    assert_eq!(session.state(), SessionState::Disconnected);
    assert!(session.backend().is_none());
}

#[tokio::test(flavor = "current_thread")]
async fn selecting_code_tool_starts_one_backend_and_deselecting_stops_it() {
    let connector = ScriptedConnector::new();
    let factory = RecordingBackendFactory::new();
    let mut session = session_with(&connector, &factory);

    let rejected = session
        .select_tools(&["python".to_string(), "add".to_string()])
        .await
        .expect("both tools exist");
    assert!(rejected.is_empty());
    assert_eq!(factory.created_count(), 1);
    let backend = factory.latest().expect("a backend was created");
    assert_eq!(backend.session_id(), session.session_id());

    session
        .select_tools(&["python".to_string()])
        .await
        .expect("python still selectable");
    assert_eq!(factory.created_count(), 1);

    session
        .select_tools(&["add".to_string()])
        .await
        .expect("add still selectable");
    assert_eq!(backend.shutdown_count(), 1);
    assert!(session.backend().is_none());
    assert_eq!(session.registry().names(), vec!["add".to_string()]);
}

#[tokio::test(flavor = "current_thread")]
async fn reconnect_restarts_backend_for_new_session_id() {
    let connector = ScriptedConnector::new();
    let factory = RecordingBackendFactory::new();
    let mut session = session_with(&connector, &factory);
    session
        .select_tools(&["python".to_string()])
        .await
        .expect("python should be selectable");
    push_handshake(&connector);
    session.connect().await.expect("first handshake");
    session.disconnect().await.expect("disconnect");

    push_handshake(&connector);
    session.connect().await.expect("second handshake");

    assert_eq!(factory.created_count(), 2);
    let latest = factory.latest().expect("second backend");
    assert_eq!(latest.session_id(), session.session_id());
    assert!(session.registry().contains("python"));
}

#[tokio::test(flavor = "current_thread")]
async fn tools_cannot_change_while_connected() {
    let connector = ScriptedConnector::new();
    let factory = RecordingBackendFactory::new();
    push_handshake(&connector);
    let mut session = session_with(&connector, &factory);
    session.connect().await.expect("handshake should succeed");

    let error = session
        .select_tools(&["add".to_string()])
        .await
        .expect_err("connected");
    assert!(matches!(error, AgentError::InvalidConfiguration(_)));
}

#[tokio::test(flavor = "current_thread")]
async fn event_log_redacts_audio_payloads() {
    let connector = ScriptedConnector::new();
    let factory = RecordingBackendFactory::new();
    push_handshake(&connector);
    push_plain_reply(&connector, "item_user_1", "item_reply_1", &[9, 9, 9, 9]);
    let mut session = session_with(&connector, &factory);
    session.connect().await.expect("handshake should succeed");

    session
        .send_audio(&[7, 7, 7, 7])
        .await
        .expect("turn should complete");

    let rendered = session.render_event_log();
    assert!(rendered.contains("SENDING WebSocket Event"));
    assert!(rendered.contains("RECEIVED WebSocket Event"));
    assert!(rendered.contains(crate::AUDIO_REDACTION_MARKER));
    assert!(!rendered.contains(&encode_audio(&[7, 7, 7, 7])));
    assert!(!rendered.contains(&encode_audio(&[9, 9, 9, 9])));
}

#[tokio::test(flavor = "current_thread")]
async fn instructions_are_expanded_when_connecting() {
    let connector = ScriptedConnector::new();
    let factory = RecordingBackendFactory::new();
    push_handshake(&connector);
    let mut magic = MagicText::new();
    magic.register("city", "Where the user is", || Ok("Austin".to_string()));
    let mut session = session_with(&connector, &factory).with_magic(magic);

    session.set_instructions("You help people in {city}. {unknown} stays.");
    assert_eq!(
        session.expanded_instructions(),
        "You help people in Austin. {unknown} stays."
    );
    session.connect().await.expect("handshake should succeed");

    assert_eq!(
        connector.sent_json()[0]["session"]["instructions"],
        "You help people in Austin. {unknown} stays."
    );
}

#[tokio::test(flavor = "current_thread")]
async fn settings_are_validated() {
    let connector = ScriptedConnector::new();
    let factory = RecordingBackendFactory::new();
    let mut session = session_with(&connector, &factory);

    assert!(session.set_voice("shimmer").is_ok());
    assert!(session.set_voice("robot").is_err());
    assert_eq!(session.voice(), "shimmer");
    assert!(session.set_temperature(1.2).is_ok());
    assert!(session.set_temperature(2.5).is_err());
    assert_eq!(session.temperature(), 1.2);
}

#[test]
fn session_ids_have_timestamp_and_suffix() {
    let id = new_session_id();
    let parts: Vec<&str> = id.split('_').collect();
    assert_eq!(parts.len(), 3);
    assert_eq!(parts[0].len(), 8);
    assert_eq!(parts[1].len(), 6);
    assert_eq!(parts[2].len(), 8);
    assert!(parts[2].chars().all(|c| c.is_ascii_hexdigit()));
}
