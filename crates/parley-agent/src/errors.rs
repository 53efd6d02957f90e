use parley_realtime::RealtimeError;
use thiserror::Error;

/// Raised while turning a tool spec into a descriptor. Fatal to that tool only.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum SchemaError {
    #[error("tool name is empty")]
    EmptyToolName,
    #[error("tool name '{0}' must match ^[a-zA-Z0-9_-]{{1,64}}$")]
    InvalidToolName(String),
    #[error("tool '{tool}' declares a parameter with an empty name")]
    EmptyParameterName { tool: String },
    #[error("tool '{tool}' declares parameter '{parameter}' more than once")]
    DuplicateParameter { tool: String, parameter: String },
    #[error("tool '{tool}' parameter '{parameter}' default does not match declared type {expected}")]
    DefaultTypeMismatch {
        tool: String,
        parameter: String,
        expected: &'static str,
    },
    #[error("tool '{tool}' schema override must be an object schema")]
    InvalidSchemaOverride { tool: String },
    #[error("tool '{0}' needs an execution backend but none is attached")]
    MissingBackend(String),
    #[error("tool '{0}' is already registered")]
    DuplicateTool(String),
}

#[derive(Debug, Error)]
pub enum BackendError {
    #[error("failed to start execution backend: {0}")]
    Spawn(String),
    #[error("execution backend i/o failed: {0}")]
    Io(String),
    #[error("execution backend protocol error: {0}")]
    Protocol(String),
    #[error("execution timed out after {timeout_ms} ms")]
    TimedOut { timeout_ms: u128 },
    #[error("execution backend is shut down")]
    Closed,
}

impl From<std::io::Error> for BackendError {
    fn from(error: std::io::Error) -> Self {
        Self::Io(error.to_string())
    }
}

#[derive(Debug, Error)]
pub enum ToolError {
    #[error("Tool {0} not found")]
    NotFound(String),
    #[error("invalid arguments for tool '{tool}': {message}")]
    InvalidArguments { tool: String, message: String },
    #[error("{0}")]
    Execution(String),
    #[error(transparent)]
    Backend(#[from] BackendError),
}

/// Top-level error type for the parley-agent crate.
#[derive(Debug, Error)]
pub enum AgentError {
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),
    #[error("invalid session state transition: {from} -> {to}")]
    InvalidStateTransition { from: String, to: String },
    #[error("session is not connected")]
    NotConnected,
    #[error("protocol error: {0}")]
    Protocol(String),
    #[error(transparent)]
    Schema(#[from] SchemaError),
    #[error(transparent)]
    Tool(#[from] ToolError),
    #[error(transparent)]
    Backend(#[from] BackendError),
    #[error(transparent)]
    Realtime(#[from] RealtimeError),
}

impl AgentError {
    /// True when the connection itself failed: unreachable, closed or timed out.
    pub fn is_connection_level(&self) -> bool {
        matches!(self, Self::Realtime(error) if error.is_connection_level())
    }
}
