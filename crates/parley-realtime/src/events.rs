use crate::{RealtimeError, SessionParameters};
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const SESSION_UPDATED: &str = "session.updated";
pub const ITEM_CREATED: &str = "conversation.item.created";
pub const AUDIO_DELTA: &str = "response.audio.delta";
pub const AUDIO_DONE: &str = "response.audio.done";
pub const RESPONSE_DONE: &str = "response.done";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    System,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentPart {
    InputText { text: String },
    InputAudio { audio: String },
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ConversationItem {
    Message {
        role: Role,
        content: Vec<ContentPart>,
    },
    FunctionCallOutput {
        call_id: String,
        output: String,
    },
}

impl ConversationItem {
    pub fn user_text(text: impl Into<String>) -> Self {
        Self::Message {
            role: Role::User,
            content: vec![ContentPart::InputText { text: text.into() }],
        }
    }

    /// `audio` is already base64 encoded PCM16.
    pub fn user_audio(audio: impl Into<String>) -> Self {
        Self::Message {
            role: Role::User,
            content: vec![ContentPart::InputAudio {
                audio: audio.into(),
            }],
        }
    }
}

/// Events the client writes to the realtime stream.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ClientEvent {
    #[serde(rename = "session.update")]
    SessionUpdate { session: SessionParameters },
    #[serde(rename = "conversation.item.create")]
    ConversationItemCreate {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        previous_item_id: Option<String>,
        item: ConversationItem,
    },
    #[serde(rename = "response.create")]
    ResponseCreate,
}

impl ClientEvent {
    pub fn item(item: ConversationItem) -> Self {
        Self::ConversationItemCreate {
            previous_item_id: None,
            item,
        }
    }

    pub fn function_call_output(call_id: impl Into<String>, output: impl Into<String>) -> Self {
        Self::item(ConversationItem::FunctionCallOutput {
            call_id: call_id.into(),
            output: output.into(),
        })
    }

    /// Threads the causal predecessor onto an item event. Other events are returned unchanged.
    pub fn with_previous_item_id(self, id: Option<String>) -> Self {
        match self {
            Self::ConversationItemCreate { item, .. } if id.is_some() => {
                Self::ConversationItemCreate {
                    previous_item_id: id,
                    item,
                }
            }
            other => other,
        }
    }

    pub fn event_type(&self) -> &'static str {
        match self {
            Self::SessionUpdate { .. } => "session.update",
            Self::ConversationItemCreate { .. } => "conversation.item.create",
            Self::ResponseCreate => "response.create",
        }
    }

    pub fn to_json(&self) -> Result<String, RealtimeError> {
        Ok(serde_json::to_string(self)?)
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum OutputItem {
    FunctionCall {
        id: Option<String>,
        name: String,
        arguments: String,
        call_id: String,
    },
    Message {
        id: Option<String>,
    },
    Other {
        id: Option<String>,
        item_type: String,
    },
}

impl OutputItem {
    pub fn id(&self) -> Option<&str> {
        match self {
            Self::FunctionCall { id, .. } | Self::Message { id } | Self::Other { id, .. } => {
                id.as_deref()
            }
        }
    }

    fn from_value(value: &Value) -> Result<Self, RealtimeError> {
        let id = string_field(value, "id");
        let item_type = string_field(value, "type").unwrap_or_default();
        match item_type.as_str() {
            "function_call" => Ok(Self::FunctionCall {
                id,
                name: required_string(value, "name", "function_call")?,
                arguments: string_field(value, "arguments").unwrap_or_default(),
                call_id: required_string(value, "call_id", "function_call")?,
            }),
            "message" => Ok(Self::Message { id }),
            _ => Ok(Self::Other { id, item_type }),
        }
    }
}

/// Inbound events the session manager reacts to. Anything else is kept as
/// [`ServerEvent::Other`] so callers can log it and move on.
#[derive(Clone, Debug, PartialEq)]
pub enum ServerEvent {
    SessionCreated,
    SessionUpdated,
    ConversationItemCreated {
        item_id: Option<String>,
    },
    AudioDelta {
        delta: String,
    },
    AudioDone,
    AudioTranscriptDelta {
        delta: String,
    },
    TextDelta {
        delta: String,
    },
    ResponseDone {
        item_id: Option<String>,
        output: Vec<OutputItem>,
    },
    Error {
        message: String,
    },
    Other {
        event_type: String,
    },
}

impl ServerEvent {
    pub fn parse(text: &str) -> Result<Self, RealtimeError> {
        let value: Value = serde_json::from_str(text)
            .map_err(|error| RealtimeError::Protocol(format!("inbound frame is not JSON: {error}")))?;
        Self::from_value(&value)
    }

    pub fn from_value(value: &Value) -> Result<Self, RealtimeError> {
        let Some(event_type) = value.get("type").and_then(Value::as_str) else {
            return Err(RealtimeError::Protocol(
                "inbound event has no type field".to_string(),
            ));
        };

        let event = match event_type {
            "session.created" => Self::SessionCreated,
            SESSION_UPDATED => Self::SessionUpdated,
            ITEM_CREATED => Self::ConversationItemCreated {
                item_id: value
                    .get("item")
                    .and_then(|item| item.get("id"))
                    .and_then(Value::as_str)
                    .map(str::to_string),
            },
            AUDIO_DELTA => Self::AudioDelta {
                delta: required_string(value, "delta", AUDIO_DELTA)?,
            },
            AUDIO_DONE => Self::AudioDone,
            "response.audio_transcript.delta" => Self::AudioTranscriptDelta {
                delta: string_field(value, "delta").unwrap_or_default(),
            },
            "response.text.delta" => Self::TextDelta {
                delta: string_field(value, "delta").unwrap_or_default(),
            },
            RESPONSE_DONE => {
                let output = match value
                    .get("response")
                    .and_then(|response| response.get("output"))
                {
                    Some(Value::Array(items)) => items
                        .iter()
                        .map(OutputItem::from_value)
                        .collect::<Result<Vec<_>, _>>()?,
                    Some(Value::Null) | None => Vec::new(),
                    Some(_) => {
                        return Err(RealtimeError::Protocol(
                            "response.done output is not an array".to_string(),
                        ));
                    }
                };
                Self::ResponseDone {
                    item_id: string_field(value, "item_id"),
                    output,
                }
            }
            "error" => Self::Error {
                message: value
                    .get("error")
                    .and_then(|error| error.get("message"))
                    .and_then(Value::as_str)
                    .map(str::to_string)
                    .unwrap_or_else(|| value.to_string()),
            },
            other => Self::Other {
                event_type: other.to_string(),
            },
        };
        Ok(event)
    }

    pub fn event_type(&self) -> &str {
        match self {
            Self::SessionCreated => "session.created",
            Self::SessionUpdated => SESSION_UPDATED,
            Self::ConversationItemCreated { .. } => ITEM_CREATED,
            Self::AudioDelta { .. } => AUDIO_DELTA,
            Self::AudioDone => AUDIO_DONE,
            Self::AudioTranscriptDelta { .. } => "response.audio_transcript.delta",
            Self::TextDelta { .. } => "response.text.delta",
            Self::ResponseDone { .. } => RESPONSE_DONE,
            Self::Error { .. } => "error",
            Self::Other { event_type } => event_type,
        }
    }

    /// Id of the item a completed response produced: the top-level `item_id`
    /// when present, otherwise the last output item carrying an id.
    pub fn produced_item_id(&self) -> Option<String> {
        let Self::ResponseDone { item_id, output } = self else {
            return None;
        };
        item_id.clone().or_else(|| {
            output
                .iter()
                .rev()
                .find_map(|item| item.id().map(str::to_string))
        })
    }
}

fn string_field(value: &Value, key: &str) -> Option<String> {
    value.get(key).and_then(Value::as_str).map(str::to_string)
}

fn required_string(value: &Value, key: &str, context: &str) -> Result<String, RealtimeError> {
    string_field(value, key)
        .ok_or_else(|| RealtimeError::Protocol(format!("{context} is missing string field '{key}'")))
}
