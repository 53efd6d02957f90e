use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const DEFAULT_TRANSCRIPTION_MODEL: &str = "whisper-1";

/// Function tool advertised to the remote model in `session.update`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ToolDefinition {
    #[serde(rename = "type")]
    pub kind: String,
    pub name: String,
    pub description: String,
    pub parameters: Value,
}

impl ToolDefinition {
    pub fn function(
        name: impl Into<String>,
        description: impl Into<String>,
        parameters: Value,
    ) -> Self {
        Self {
            kind: "function".to_string(),
            name: name.into(),
            description: description.into(),
            parameters,
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ToolChoice {
    Auto,
    #[default]
    None,
}

impl ToolChoice {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Auto => "auto",
            Self::None => "none",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Modality {
    Audio,
    Text,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AudioFormat {
    #[default]
    Pcm16,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct InputAudioTranscription {
    pub model: String,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TurnDetection {
    #[serde(rename = "type")]
    pub kind: String,
}

/// Body of the `session.update` event.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SessionParameters {
    pub modalities: Vec<Modality>,
    pub instructions: String,
    pub voice: String,
    pub input_audio_format: AudioFormat,
    pub output_audio_format: AudioFormat,
    pub input_audio_transcription: InputAudioTranscription,
    /// `None` serializes as `null`, which disables server-side turn detection.
    pub turn_detection: Option<TurnDetection>,
    pub tools: Vec<ToolDefinition>,
    pub tool_choice: ToolChoice,
    pub temperature: f64,
}

impl SessionParameters {
    pub fn caller_driven(
        instructions: impl Into<String>,
        voice: impl Into<String>,
        tools: Vec<ToolDefinition>,
        tool_choice: ToolChoice,
        temperature: f64,
    ) -> Self {
        Self {
            modalities: vec![Modality::Audio, Modality::Text],
            instructions: instructions.into(),
            voice: voice.into(),
            input_audio_format: AudioFormat::Pcm16,
            output_audio_format: AudioFormat::Pcm16,
            input_audio_transcription: InputAudioTranscription {
                model: DEFAULT_TRANSCRIPTION_MODEL.to_string(),
            },
            turn_detection: None,
            tools,
            tool_choice,
            temperature,
        }
    }

    pub fn with_transcription_model(mut self, model: impl Into<String>) -> Self {
        self.input_audio_transcription.model = model.into();
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn caller_driven_parameters_disable_turn_detection_explicitly() {
        let params = SessionParameters::caller_driven(
            "be brief",
            "alloy",
            vec![ToolDefinition::function(
                "add",
                "adds",
                json!({"type": "object", "properties": {}}),
            )],
            ToolChoice::Auto,
            0.6,
        );
        let value = serde_json::to_value(&params).expect("parameters should serialize");

        assert_eq!(value["modalities"], json!(["audio", "text"]));
        assert_eq!(value["input_audio_format"], "pcm16");
        assert_eq!(value["output_audio_format"], "pcm16");
        assert_eq!(value["input_audio_transcription"]["model"], "whisper-1");
        assert!(value.get("turn_detection").is_some_and(Value::is_null));
        assert_eq!(value["tool_choice"], "auto");
        assert_eq!(value["tools"][0]["type"], "function");
        assert_eq!(value["tools"][0]["name"], "add");
    }
}
