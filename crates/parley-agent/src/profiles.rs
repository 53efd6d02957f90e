use crate::{AgentError, DEFAULT_VOICE};

pub const AVAILABLE_VOICES: &[&str] = &[
    "alloy", "ash", "ballad", "coral", "echo", "sage", "shimmer", "verse",
];

pub const GENERAL_ASSISTANT: &str = "General Assistant";

/// Named preset of instructions, voice and tool selection.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AssistantProfile {
    pub name: String,
    pub instructions: String,
    pub voice: String,
    pub tools: Vec<String>,
}

impl AssistantProfile {
    pub fn new(name: impl Into<String>, instructions: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            instructions: instructions.into(),
            voice: DEFAULT_VOICE.to_string(),
            tools: Vec::new(),
        }
    }

    pub fn with_voice(mut self, voice: impl Into<String>) -> Self {
        self.voice = voice.into();
        self
    }

    pub fn with_tools<I, S>(mut self, tools: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tools = tools.into_iter().map(Into::into).collect();
        self
    }
}

pub fn default_profiles() -> Vec<AssistantProfile> {
    vec![
        AssistantProfile::new(GENERAL_ASSISTANT, "You are a helpful assistant."),
        AssistantProfile::new(
            "Spanish Language Teacher",
            "You are a Spanish (MX) language teacher. Help users practice speaking and correct their grammar and pronunciation.",
        ),
        AssistantProfile::new(
            "Technical Expert",
            "You are a technical expert. Provide detailed technical explanations and help debug problems.",
        ),
    ]
}

/// In-memory preset store, kept in insertion order.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AssistantProfiles {
    profiles: Vec<AssistantProfile>,
}

impl Default for AssistantProfiles {
    fn default() -> Self {
        Self {
            profiles: default_profiles(),
        }
    }
}

impl AssistantProfiles {
    pub fn empty() -> Self {
        Self {
            profiles: Vec::new(),
        }
    }

    pub fn get(&self, name: &str) -> Option<&AssistantProfile> {
        self.profiles.iter().find(|profile| profile.name == name)
    }

    pub fn names(&self) -> Vec<String> {
        self.profiles
            .iter()
            .map(|profile| profile.name.clone())
            .collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &AssistantProfile> {
        self.profiles.iter()
    }

    /// Inserts or replaces the preset with the same name.
    pub fn upsert(&mut self, profile: AssistantProfile) -> Result<(), AgentError> {
        if profile.name.trim().is_empty() {
            return Err(AgentError::InvalidConfiguration(
                "assistant name must not be empty".to_string(),
            ));
        }
        if !AVAILABLE_VOICES.contains(&profile.voice.as_str()) {
            return Err(AgentError::InvalidConfiguration(format!(
                "unknown voice '{}'",
                profile.voice
            )));
        }
        match self
            .profiles
            .iter_mut()
            .find(|existing| existing.name == profile.name)
        {
            Some(existing) => *existing = profile,
            None => self.profiles.push(profile),
        }
        Ok(())
    }

    /// True for the built-in preset names, which can be replaced but not removed.
    pub fn is_default(name: &str) -> bool {
        default_profiles().iter().any(|profile| profile.name == name)
    }

    pub fn remove(&mut self, name: &str) -> Result<Option<AssistantProfile>, AgentError> {
        if Self::is_default(name) {
            return Err(AgentError::InvalidConfiguration(format!(
                "built-in assistant '{name}' cannot be removed"
            )));
        }
        Ok(self
            .profiles
            .iter()
            .position(|profile| profile.name == name)
            .map(|index| self.profiles.remove(index)))
    }
}
