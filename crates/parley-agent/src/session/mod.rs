use crate::{
    AVAILABLE_VOICES, AgentError, AssistantProfile, BackendFactory, EventDirection, EventLog,
    ExecutionBackend, MagicText, PythonKernelFactory, RejectedTool, SessionConfig, ToolCatalog,
    ToolInvocationRecord, ToolRegistry, ToolSpec, TurnResult,
};
use chrono::Local;
use parley_realtime::{
    AUDIO_DONE, AudioAccumulator, ClientEvent, ConnectRequest, Connector, ConversationItem,
    ITEM_CREATED, OutputItem, RealtimeError, RealtimeTransport, SESSION_UPDATED,
    ServerEvent, SessionParameters, WebSocketConnector, encode_audio,
};
use std::sync::Arc;
use uuid::Uuid;

mod types;
pub use types::SessionState;

#[cfg(test)]
mod tests;

/// Owns one realtime connection at a time and drives turns over it.
///
/// Turns are strictly sequential: `send_and_receive` takes `&mut self`, so a
/// second turn cannot start before the first returns.
pub struct RealtimeSession {
    config: SessionConfig,
    connector: Arc<dyn Connector>,
    backend_factory: Arc<dyn BackendFactory>,
    catalog: ToolCatalog,
    magic: MagicText,
    registry: ToolRegistry,
    selected: Vec<ToolSpec>,
    selected_names: Vec<String>,
    backend: Option<Arc<dyn ExecutionBackend>>,
    transport: Option<Box<dyn RealtimeTransport>>,
    state: SessionState,
    session_id: String,
    last_user_item_id: Option<String>,
    last_assistant_item_id: Option<String>,
    instructions: String,
    expanded_instructions: String,
    voice: String,
    temperature: f64,
    event_log: EventLog,
}

/// `YYYYMMDD_HHMMSS_<8 hex>`.
pub fn new_session_id() -> String {
    let suffix = Uuid::new_v4().simple().to_string();
    format!("{}_{}", Local::now().format("%Y%m%d_%H%M%S"), &suffix[..8])
}

impl RealtimeSession {
    pub fn new(
        config: SessionConfig,
        connector: Arc<dyn Connector>,
        backend_factory: Arc<dyn BackendFactory>,
        catalog: ToolCatalog,
    ) -> Self {
        let magic = MagicText::with_defaults(config.user_location.clone());
        let instructions = config.instructions.clone();
        let expanded_instructions = magic.expand(&instructions);
        Self {
            voice: config.voice.clone(),
            temperature: config.temperature,
            config,
            connector,
            backend_factory,
            catalog,
            magic,
            registry: ToolRegistry::new(),
            selected: Vec::new(),
            selected_names: Vec::new(),
            backend: None,
            transport: None,
            state: SessionState::Disconnected,
            session_id: new_session_id(),
            last_user_item_id: None,
            last_assistant_item_id: None,
            instructions,
            expanded_instructions,
            event_log: EventLog::default(),
        }
    }

    /// Production wiring: WebSocket transport, Python kernels, built-in tools.
    pub fn from_config(config: SessionConfig) -> Result<Self, AgentError> {
        config.validate()?;
        let factory = PythonKernelFactory::from_config(&config);
        Ok(Self::new(
            config,
            Arc::new(WebSocketConnector),
            Arc::new(factory),
            ToolCatalog::discover(),
        ))
    }

    pub fn with_magic(mut self, magic: MagicText) -> Self {
        self.magic = magic;
        self.expanded_instructions = self.magic.expand(&self.instructions);
        self
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn is_connected(&self) -> bool {
        self.state == SessionState::Active
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn last_user_item_id(&self) -> Option<&str> {
        self.last_user_item_id.as_deref()
    }

    pub fn last_assistant_item_id(&self) -> Option<&str> {
        self.last_assistant_item_id.as_deref()
    }

    pub fn instructions(&self) -> &str {
        &self.instructions
    }

    pub fn expanded_instructions(&self) -> &str {
        &self.expanded_instructions
    }

    pub fn voice(&self) -> &str {
        &self.voice
    }

    pub fn temperature(&self) -> f64 {
        self.temperature
    }

    pub fn catalog(&self) -> &ToolCatalog {
        &self.catalog
    }

    pub fn magic(&self) -> &MagicText {
        &self.magic
    }

    pub fn registry(&self) -> &ToolRegistry {
        &self.registry
    }

    pub fn selected_tools(&self) -> &[String] {
        &self.selected_names
    }

    pub fn backend(&self) -> Option<&Arc<dyn ExecutionBackend>> {
        self.backend.as_ref()
    }

    pub fn tool_history(&self) -> &[ToolInvocationRecord] {
        self.registry.history()
    }

    pub fn render_tool_history(&self) -> String {
        self.registry.render_history()
    }

    pub fn event_log(&self) -> &EventLog {
        &self.event_log
    }

    pub fn render_event_log(&self) -> String {
        self.event_log.render()
    }

    /// Takes effect on the next connect.
    pub fn set_instructions(&mut self, instructions: impl Into<String>) {
        self.instructions = instructions.into();
        self.expanded_instructions = self.magic.expand(&self.instructions);
    }

    /// Takes effect on the next connect.
    pub fn set_voice(&mut self, voice: impl Into<String>) -> Result<(), AgentError> {
        let voice = voice.into();
        if !AVAILABLE_VOICES.contains(&voice.as_str()) {
            return Err(AgentError::InvalidConfiguration(format!(
                "unknown voice '{voice}'"
            )));
        }
        self.voice = voice;
        Ok(())
    }

    /// Takes effect on the next connect.
    pub fn set_temperature(&mut self, temperature: f64) -> Result<(), AgentError> {
        if !(0.0..=2.0).contains(&temperature) {
            return Err(AgentError::InvalidConfiguration(format!(
                "temperature {temperature} is outside 0.0..=2.0"
            )));
        }
        self.temperature = temperature;
        Ok(())
    }

    /// Applies a preset's instructions, voice and tool selection.
    pub async fn apply_profile(
        &mut self,
        profile: &AssistantProfile,
    ) -> Result<Vec<RejectedTool>, AgentError> {
        self.set_voice(profile.voice.clone())?;
        let rejected = self.select_tools(&profile.tools).await?;
        self.set_instructions(profile.instructions.clone());
        Ok(rejected)
    }

    /// Replaces the active tool set. Only allowed while disconnected.
    ///
    /// Selecting the code tool starts an execution backend before the registry
    /// is rebuilt; deselecting it shuts the backend down.
    pub async fn select_tools(
        &mut self,
        names: &[String],
    ) -> Result<Vec<RejectedTool>, AgentError> {
        if self.state != SessionState::Disconnected {
            return Err(AgentError::InvalidConfiguration(
                "tools can only be selected while disconnected".to_string(),
            ));
        }
        let specs = self.catalog.select(names)?;
        let needs_backend = specs.iter().any(|spec| spec.tool.needs_backend());

        if needs_backend && self.backend.is_none() {
            self.backend = Some(self.backend_factory.create(&self.session_id).await?);
        }
        if !needs_backend {
            self.release_backend().await;
        }

        self.selected = specs;
        self.selected_names = names.to_vec();
        Ok(self.registry.register(&self.selected, self.backend.clone()))
    }

    /// Opens the connection and waits for the configuration ack. A no-op while active.
    pub async fn connect(&mut self) -> Result<(), AgentError> {
        if self.state == SessionState::Active {
            tracing::debug!(session_id = %self.session_id, "already connected");
            return Ok(());
        }
        if self.state != SessionState::Disconnected {
            self.teardown().await;
        }
        if self.config.api_key.is_empty() {
            return Err(AgentError::InvalidConfiguration(
                "no API key configured (set OPENAI_API_KEY)".to_string(),
            ));
        }

        self.ensure_backend().await?;
        self.expanded_instructions = self.magic.expand(&self.instructions);

        if let Err(error) = self.handshake().await {
            self.teardown().await;
            return Err(error);
        }
        Ok(())
    }

    async fn handshake(&mut self) -> Result<(), AgentError> {
        self.transition(SessionState::Connecting)?;
        let request = ConnectRequest::new(&self.config.realtime_url, &self.config.api_key)
            .with_connect_timeout(self.config.connect_timeout);
        tracing::info!(session_id = %self.session_id, url = %request.url, "connecting");
        self.transport = Some(self.connector.connect(&request).await?);

        let update = ClientEvent::SessionUpdate {
            session: self.session_parameters(),
        };
        self.send_event(&update).await?;
        self.transition(SessionState::AwaitingConfigAck)?;

        loop {
            match self.read_event(SESSION_UPDATED).await? {
                ServerEvent::SessionUpdated => break,
                ServerEvent::Error { message } => {
                    tracing::warn!(message = %message, "server error while awaiting configuration ack");
                }
                other => {
                    tracing::debug!(event_type = other.event_type(), "ignored while awaiting configuration ack");
                }
            }
        }

        self.transition(SessionState::Active)?;
        tracing::info!(session_id = %self.session_id, "session active");
        Ok(())
    }

    /// Shuts the backend down, closes the connection and clears turn chaining.
    /// A no-op when already disconnected.
    pub async fn disconnect(&mut self) -> Result<(), AgentError> {
        if self.state == SessionState::Disconnected && self.transport.is_none() {
            return Ok(());
        }
        self.teardown().await;
        tracing::info!("disconnected");
        Ok(())
    }

    pub async fn send_text(&mut self, text: impl Into<String>) -> Result<TurnResult, AgentError> {
        self.send_and_receive(ClientEvent::item(ConversationItem::user_text(text)))
            .await
    }

    /// `pcm` is raw 24 kHz mono PCM16.
    pub async fn send_audio(&mut self, pcm: &[u8]) -> Result<TurnResult, AgentError> {
        self.send_and_receive(ClientEvent::item(ConversationItem::user_audio(
            encode_audio(pcm),
        )))
        .await
    }

    /// Runs one turn: send the input, wait for its ack, trigger a response,
    /// then drain until the audio is complete, answering tool calls on the way.
    pub async fn send_and_receive(&mut self, event: ClientEvent) -> Result<TurnResult, AgentError> {
        if self.state != SessionState::Active || self.transport.is_none() {
            return Err(AgentError::NotConnected);
        }

        let event = event.with_previous_item_id(self.last_assistant_item_id.clone());
        self.transition(SessionState::AwaitingItemAck)?;
        self.send_event(&event).await?;

        loop {
            match self.read_event(ITEM_CREATED).await? {
                ServerEvent::ConversationItemCreated { item_id } => {
                    self.last_user_item_id = item_id;
                    break;
                }
                ServerEvent::Error { message } => {
                    tracing::warn!(message = %message, "server error while awaiting item ack");
                }
                other => {
                    tracing::debug!(event_type = other.event_type(), "ignored while awaiting item ack");
                }
            }
        }
        self.send_event(&ClientEvent::ResponseCreate).await?;
        self.transition(SessionState::AwaitingResponse)?;

        let mut audio = AudioAccumulator::default();
        let mut turn = TurnResult::default();
        loop {
            match self.read_event(AUDIO_DONE).await? {
                ServerEvent::AudioDelta { delta } => {
                    if let Err(error) = audio.push_encoded(&delta) {
                        self.teardown().await;
                        return Err(error.into());
                    }
                }
                ServerEvent::AudioTranscriptDelta { delta } | ServerEvent::TextDelta { delta } => {
                    turn.transcript.push_str(&delta);
                }
                done @ ServerEvent::ResponseDone { .. } => {
                    if let Some(item_id) = done.produced_item_id() {
                        self.last_assistant_item_id = Some(item_id.clone());
                        turn.response_item_id = Some(item_id);
                    }
                    let ServerEvent::ResponseDone { output, .. } = done else {
                        continue;
                    };
                    for item in output {
                        if let OutputItem::FunctionCall {
                            name,
                            arguments,
                            call_id,
                            ..
                        } = item
                        {
                            let answered = turn.tool_calls > 0;
                            self.run_tool_call(&name, &arguments, call_id, answered)
                                .await?;
                            turn.tool_calls += 1;
                        }
                    }
                }
                ServerEvent::AudioDone => {
                    self.transition(SessionState::ResponseComplete)?;
                    turn.audio = audio.finish();
                    self.transition(SessionState::Active)?;
                    tracing::info!(
                        audio_bytes = turn.audio.pcm.len(),
                        tool_calls = turn.tool_calls,
                        "turn complete"
                    );
                    return Ok(turn);
                }
                ServerEvent::Error { message } => {
                    tracing::warn!(message = %message, "server error during response");
                }
                other => {
                    tracing::debug!(event_type = other.event_type(), "ignored during response");
                }
            }
        }
    }

    /// `answered` is true once this turn has already sent a tool output. A
    /// response triggered by that output is still streaming, so a bad call at
    /// that point ends the session instead of leaving its frames for the next turn.
    async fn run_tool_call(
        &mut self,
        name: &str,
        raw_arguments: &str,
        call_id: String,
        answered: bool,
    ) -> Result<(), AgentError> {
        self.transition(SessionState::ToolRoundTrip)?;
        let arguments = match self.registry.parse_arguments(name, raw_arguments) {
            Ok(arguments) => arguments,
            Err(error) if answered => {
                tracing::warn!(tool = name, error = %error, "malformed tool call after answered calls; disconnecting");
                self.teardown().await;
                return Err(AgentError::Protocol(error.to_string()));
            }
            Err(error) => {
                self.transition(SessionState::Active)?;
                return Err(AgentError::Protocol(error.to_string()));
            }
        };

        tracing::info!(tool = name, call_id = %call_id, "running tool");
        let result = self.registry.invoke(name, arguments).await;
        let output = serde_json::to_string(&result).map_err(RealtimeError::from)?;
        self.send_event(&ClientEvent::function_call_output(call_id, output))
            .await?;
        self.send_event(&ClientEvent::ResponseCreate).await?;
        self.transition(SessionState::AwaitingResponse)?;
        Ok(())
    }

    fn session_parameters(&self) -> SessionParameters {
        SessionParameters::caller_driven(
            self.expanded_instructions.clone(),
            self.voice.clone(),
            self.registry.definitions(),
            self.registry.tool_choice(),
            self.temperature,
        )
        .with_transcription_model(self.config.transcription_model.clone())
    }

    fn transition(&mut self, next: SessionState) -> Result<(), AgentError> {
        if !self.state.can_transition_to(&next) {
            return Err(AgentError::InvalidStateTransition {
                from: self.state.to_string(),
                to: next.to_string(),
            });
        }
        if self.state != next {
            tracing::debug!(from = %self.state, to = %next, "session state");
        }
        self.state = next;
        Ok(())
    }

    async fn send_event(&mut self, event: &ClientEvent) -> Result<(), AgentError> {
        let text = event.to_json()?;
        self.event_log.record(EventDirection::Sent, &text);
        let sent = match self.transport.as_mut() {
            Some(transport) => transport.send_text(text).await,
            None => Err(RealtimeError::ConnectionClosed),
        };
        if let Err(error) = sent {
            self.teardown().await;
            return Err(error.into());
        }
        Ok(())
    }

    /// Reads the next inbound event. Any read failure, including a timeout or
    /// a frame that is not a valid event, tears the session down.
    async fn read_event(&mut self, waiting_for: &'static str) -> Result<ServerEvent, AgentError> {
        let read_timeout = self.config.read_timeout;
        let received = match self.transport.as_mut() {
            None => Err(RealtimeError::ConnectionClosed),
            Some(transport) => match read_timeout {
                Some(limit) => tokio::time::timeout(limit, transport.next_text())
                    .await
                    .unwrap_or(Err(RealtimeError::TimedOut {
                        waiting_for,
                        waited_ms: limit.as_millis(),
                    })),
                None => transport.next_text().await,
            },
        };

        let parsed = match received {
            Ok(Some(text)) => {
                self.event_log.record(EventDirection::Received, &text);
                ServerEvent::parse(&text)
            }
            Ok(None) => Err(RealtimeError::ConnectionClosed),
            Err(error) => Err(error),
        };

        match parsed {
            Ok(event) => Ok(event),
            Err(error) => {
                tracing::warn!(error = %error, waiting_for, "realtime read failed; disconnecting");
                self.teardown().await;
                Err(error.into())
            }
        }
    }

    async fn ensure_backend(&mut self) -> Result<(), AgentError> {
        let needs_backend = self.selected.iter().any(|spec| spec.tool.needs_backend());
        if !needs_backend || self.backend.is_some() {
            return Ok(());
        }
        self.backend = Some(self.backend_factory.create(&self.session_id).await?);
        let rejected = self.registry.register(&self.selected, self.backend.clone());
        if !rejected.is_empty() {
            tracing::warn!(rejected = rejected.len(), "tools rejected while rebinding backend");
        }
        Ok(())
    }

    async fn release_backend(&mut self) {
        if let Some(backend) = self.backend.take() {
            if let Err(error) = backend.shutdown().await {
                tracing::warn!(error = %error, "execution backend shutdown failed");
            }
        }
    }

    async fn teardown(&mut self) {
        self.release_backend().await;
        if let Some(mut transport) = self.transport.take() {
            if let Err(error) = transport.close().await {
                tracing::warn!(error = %error, "closing realtime transport failed");
            }
        }
        self.last_user_item_id = None;
        self.last_assistant_item_id = None;
        self.state = SessionState::Disconnected;
        self.session_id = new_session_id();
    }
}
