use chrono::{DateTime, Utc};
use parley_realtime::AUDIO_DELTA;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt::{self, Display};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

pub const AUDIO_REDACTION_MARKER: &str = "<base64_audio_omitted>";
const RULE: &str = "========================================";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventDirection {
    Sent,
    Received,
}

impl EventDirection {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Sent => "SENDING",
            Self::Received => "RECEIVED",
        }
    }
}

impl Display for EventDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LoggedEvent {
    pub direction: EventDirection,
    pub timestamp: DateTime<Utc>,
    /// Pretty JSON with audio redacted, or the raw frame when it is not JSON.
    pub payload: String,
}

impl LoggedEvent {
    pub fn render(&self) -> String {
        format!(
            "{} WebSocket Event ({}):\n{RULE}\n{}\n{RULE}",
            self.direction,
            self.timestamp.to_rfc3339(),
            self.payload
        )
    }
}

/// Ordered diagnostic log of every frame sent or received on a session.
#[derive(Clone, Debug, Default)]
pub struct EventLog {
    inner: Arc<Mutex<Vec<LoggedEvent>>>,
}

impl EventLog {
    fn entries(&self) -> MutexGuard<'_, Vec<LoggedEvent>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn record(&self, direction: EventDirection, frame: &str) {
        let payload = redacted_payload(frame);
        tracing::debug!(direction = %direction, payload = %payload, "realtime frame");
        self.entries().push(LoggedEvent {
            direction,
            timestamp: Utc::now(),
            payload,
        });
    }

    pub fn snapshot(&self) -> Vec<LoggedEvent> {
        self.entries().clone()
    }

    pub fn len(&self) -> usize {
        self.entries().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries().is_empty()
    }

    pub fn render(&self) -> String {
        self.entries()
            .iter()
            .map(LoggedEvent::render)
            .collect::<Vec<_>>()
            .join("\n\n")
    }
}

fn redacted_payload(frame: &str) -> String {
    match serde_json::from_str::<Value>(frame) {
        Ok(mut value) => {
            redact_audio(&mut value);
            serde_json::to_string_pretty(&value).unwrap_or_else(|_| frame.to_string())
        }
        Err(_) => frame.to_string(),
    }
}

/// Replaces base64 audio in user content items and in audio deltas.
pub fn redact_audio(event: &mut Value) {
    if let Some(content) = event
        .get_mut("item")
        .and_then(|item| item.get_mut("content"))
        .and_then(Value::as_array_mut)
    {
        for part in content {
            if let Some(audio) = part.get_mut("audio") {
                *audio = Value::String(AUDIO_REDACTION_MARKER.to_string());
            }
        }
    }

    if event.get("type").and_then(Value::as_str) == Some(AUDIO_DELTA) {
        if let Some(delta) = event.get_mut("delta") {
            *delta = Value::String(AUDIO_REDACTION_MARKER.to_string());
        }
    }
}
