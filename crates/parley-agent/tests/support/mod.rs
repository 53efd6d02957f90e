#![allow(dead_code)]

use parley_agent::testing::RecordingBackendFactory;
use parley_agent::{RealtimeSession, SessionConfig, ToolCatalog};
use parley_realtime::encode_audio;
use parley_realtime::testing::ScriptedConnector;
use serde_json::{Value, json};
use std::sync::Arc;
use std::time::Duration;

pub struct Harness {
    pub connector: ScriptedConnector,
    pub factory: RecordingBackendFactory,
    pub session: RealtimeSession,
}

pub fn config() -> SessionConfig {
    SessionConfig {
        api_key: "sk-integration".to_string(),
        read_timeout: Some(Duration::from_millis(250)),
        ..SessionConfig::default()
    }
}

pub fn harness(catalog: ToolCatalog) -> Harness {
    let connector = ScriptedConnector::new();
    let factory = RecordingBackendFactory::new();
    let session = RealtimeSession::new(
        config(),
        Arc::new(connector.clone()),
        Arc::new(factory.clone()),
        catalog,
    );
    Harness {
        connector,
        factory,
        session,
    }
}

pub fn push_handshake(connector: &ScriptedConnector) {
    connector
        .push_json(json!({"type": "session.created", "session": {"id": "sess_1"}}))
        .push_json(json!({"type": "session.updated", "session": {"id": "sess_1"}}));
}

pub fn push_item_ack(connector: &ScriptedConnector, item_id: &str) {
    connector.push_json(json!({
        "type": "conversation.item.created",
        "item": {"id": item_id, "type": "message"}
    }));
}

pub fn push_function_call(connector: &ScriptedConnector, name: &str, arguments: &str, call_id: &str) {
    connector.push_json(json!({
        "type": "response.done",
        "response": {"output": [{
            "type": "function_call",
            "id": format!("item_{call_id}"),
            "name": name,
            "arguments": arguments,
            "call_id": call_id
        }]}
    }));
}

/// Audio in the given chunks, then the closing pair of a spoken reply.
pub fn push_spoken_reply(connector: &ScriptedConnector, reply_item: &str, chunks: &[&[u8]]) {
    for chunk in chunks {
        connector.push_json(json!({"type": "response.audio.delta", "delta": encode_audio(chunk)}));
    }
    connector
        .push_json(json!({
            "type": "response.done",
            "response": {"output": [{"type": "message", "id": reply_item}]}
        }))
        .push_json(json!({"type": "response.audio.done"}));
}

pub fn sent_of_type(connector: &ScriptedConnector, event_type: &str) -> Vec<Value> {
    connector
        .sent_json()
        .into_iter()
        .filter(|event| event["type"] == event_type)
        .collect()
}
