use crate::{AVAILABLE_VOICES, AgentError};
use parley_realtime::{DEFAULT_REALTIME_URL, DEFAULT_TRANSCRIPTION_MODEL};
use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_VOICE: &str = "alloy";
pub const DEFAULT_TEMPERATURE: f64 = 0.6;
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(60);
pub const DEFAULT_EXEC_TIMEOUT: Duration = Duration::from_secs(30);
pub const DEFAULT_INSTRUCTIONS: &str = "You are a helpful assistant.";

/// Runtime configuration for a realtime session.
#[derive(Clone, Debug, PartialEq)]
pub struct SessionConfig {
    pub api_key: String,
    pub realtime_url: String,
    pub instructions: String,
    pub voice: String,
    pub temperature: f64,
    pub transcription_model: String,
    /// Bound on every blocking read from the remote endpoint. `None` waits forever.
    pub read_timeout: Option<Duration>,
    pub connect_timeout: Option<Duration>,
    pub notebooks_root: PathBuf,
    pub python_program: String,
    pub exec_timeout: Duration,
    pub user_location: Option<String>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            realtime_url: DEFAULT_REALTIME_URL.to_string(),
            instructions: DEFAULT_INSTRUCTIONS.to_string(),
            voice: DEFAULT_VOICE.to_string(),
            temperature: DEFAULT_TEMPERATURE,
            transcription_model: DEFAULT_TRANSCRIPTION_MODEL.to_string(),
            read_timeout: Some(DEFAULT_READ_TIMEOUT),
            connect_timeout: Some(Duration::from_secs(15)),
            notebooks_root: PathBuf::from("./notebooks"),
            python_program: "python3".to_string(),
            exec_timeout: DEFAULT_EXEC_TIMEOUT,
            user_location: None,
        }
    }
}

impl SessionConfig {
    pub fn from_env() -> Result<Self, AgentError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds a config from any key lookup. Unset or blank keys keep their defaults.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, AgentError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| {
            lookup(key)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };
        let mut config = Self::default();

        if let Some(api_key) = get("OPENAI_API_KEY") {
            config.api_key = api_key;
        }
        if let Some(url) = get("PARLEY_REALTIME_URL") {
            config.realtime_url = url;
        }
        if let Some(voice) = get("PARLEY_VOICE") {
            config.voice = voice;
        }
        if let Some(raw) = get("PARLEY_TEMPERATURE") {
            config.temperature = raw.parse().map_err(|_| {
                AgentError::InvalidConfiguration(format!(
                    "PARLEY_TEMPERATURE must be a number, got '{raw}'"
                ))
            })?;
        }
        if let Some(raw) = get("PARLEY_READ_TIMEOUT_SECS") {
            config.read_timeout = parse_timeout_secs(&raw)?;
        }
        if let Some(root) = get("PARLEY_NOTEBOOKS_DIR") {
            config.notebooks_root = PathBuf::from(root);
        }
        if let Some(program) = get("PARLEY_PYTHON") {
            config.python_program = program;
        }
        config.user_location = get("PARLEY_USER_LOCATION");

        Ok(config)
    }

    pub fn validate(&self) -> Result<(), AgentError> {
        if !AVAILABLE_VOICES.contains(&self.voice.as_str()) {
            return Err(AgentError::InvalidConfiguration(format!(
                "unknown voice '{}', expected one of: {}",
                self.voice,
                AVAILABLE_VOICES.join(", ")
            )));
        }
        if !(0.0..=2.0).contains(&self.temperature) {
            return Err(AgentError::InvalidConfiguration(format!(
                "temperature {} is outside 0.0..=2.0",
                self.temperature
            )));
        }
        if !(self.realtime_url.starts_with("wss://") || self.realtime_url.starts_with("ws://")) {
            return Err(AgentError::InvalidConfiguration(format!(
                "realtime url '{}' must use ws:// or wss://",
                self.realtime_url
            )));
        }
        Ok(())
    }
}

/// `0` disables the timeout.
pub fn parse_timeout_secs(raw: &str) -> Result<Option<Duration>, AgentError> {
    let secs: u64 = raw.trim().parse().map_err(|_| {
        AgentError::InvalidConfiguration(format!(
            "read timeout must be a whole number of seconds, got '{raw}'"
        ))
    })?;
    Ok((secs > 0).then(|| Duration::from_secs(secs)))
}
