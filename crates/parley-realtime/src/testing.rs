use crate::{ConnectRequest, Connector, RealtimeError, RealtimeTransport};
use async_trait::async_trait;
use serde_json::Value;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};

/// One entry of the scripted transport's shared journal.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Exchange {
    Sent(String),
    Received(String),
}

#[derive(Clone, Debug)]
enum Step {
    Frame(String),
    Stall,
    Close,
    Fail(String),
}

#[derive(Debug, Default)]
struct ScriptState {
    inbound: VecDeque<Step>,
    journal: Vec<Exchange>,
    requests: Vec<ConnectRequest>,
    connect_failures: VecDeque<String>,
    close_count: usize,
}

/// In-memory connector whose connections replay a queue of inbound frames and
/// record every outbound frame. All connections share one queue and journal.
#[derive(Clone, Debug, Default)]
pub struct ScriptedConnector {
    inner: Arc<Mutex<ScriptState>>,
}

impl ScriptedConnector {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> Result<MutexGuard<'_, ScriptState>, RealtimeError> {
        self.inner
            .lock()
            .map_err(|_| RealtimeError::Connection("scripted transport mutex poisoned".to_string()))
    }

    fn push(&self, step: Step) {
        if let Ok(mut state) = self.state() {
            state.inbound.push_back(step);
        }
    }

    pub fn push_frame(&self, frame: impl Into<String>) -> &Self {
        self.push(Step::Frame(frame.into()));
        self
    }

    pub fn push_json(&self, event: Value) -> &Self {
        self.push_frame(event.to_string())
    }

    /// The next read never completes.
    pub fn push_stall(&self) -> &Self {
        self.push(Step::Stall);
        self
    }

    /// The next read reports a remote close.
    pub fn push_close(&self) -> &Self {
        self.push(Step::Close);
        self
    }

    /// The next read fails with a connection error.
    pub fn push_failure(&self, message: impl Into<String>) -> &Self {
        self.push(Step::Fail(message.into()));
        self
    }

    pub fn fail_next_connect(&self, message: impl Into<String>) {
        if let Ok(mut state) = self.state() {
            state.connect_failures.push_back(message.into());
        }
    }

    pub fn journal(&self) -> Vec<Exchange> {
        self.state()
            .map(|state| state.journal.clone())
            .unwrap_or_default()
    }

    pub fn sent(&self) -> Vec<String> {
        self.journal()
            .into_iter()
            .filter_map(|exchange| match exchange {
                Exchange::Sent(text) => Some(text),
                Exchange::Received(_) => None,
            })
            .collect()
    }

    /// Outbound frames that parse as JSON, in send order.
    pub fn sent_json(&self) -> Vec<Value> {
        self.sent()
            .iter()
            .filter_map(|text| serde_json::from_str(text).ok())
            .collect()
    }

    pub fn sent_types(&self) -> Vec<String> {
        self.sent_json()
            .iter()
            .filter_map(|event| event.get("type").and_then(Value::as_str))
            .map(str::to_string)
            .collect()
    }

    pub fn requests(&self) -> Vec<ConnectRequest> {
        self.state()
            .map(|state| state.requests.clone())
            .unwrap_or_default()
    }

    pub fn connect_count(&self) -> usize {
        self.requests().len()
    }

    pub fn close_count(&self) -> usize {
        self.state().map(|state| state.close_count).unwrap_or_default()
    }

    pub fn pending_frames(&self) -> usize {
        self.state()
            .map(|state| state.inbound.len())
            .unwrap_or_default()
    }
}

#[async_trait]
impl Connector for ScriptedConnector {
    async fn connect(
        &self,
        request: &ConnectRequest,
    ) -> Result<Box<dyn RealtimeTransport>, RealtimeError> {
        let mut state = self.state()?;
        if let Some(message) = state.connect_failures.pop_front() {
            return Err(RealtimeError::Connection(message));
        }
        state.requests.push(request.clone());
        Ok(Box::new(ScriptedTransport {
            inner: self.inner.clone(),
            closed: false,
        }))
    }
}

pub struct ScriptedTransport {
    inner: Arc<Mutex<ScriptState>>,
    closed: bool,
}

impl ScriptedTransport {
    fn state(&self) -> Result<MutexGuard<'_, ScriptState>, RealtimeError> {
        self.inner
            .lock()
            .map_err(|_| RealtimeError::Connection("scripted transport mutex poisoned".to_string()))
    }
}

#[async_trait]
impl RealtimeTransport for ScriptedTransport {
    async fn send_text(&mut self, text: String) -> Result<(), RealtimeError> {
        if self.closed {
            return Err(RealtimeError::ConnectionClosed);
        }
        self.state()?.journal.push(Exchange::Sent(text));
        Ok(())
    }

    async fn next_text(&mut self) -> Result<Option<String>, RealtimeError> {
        if self.closed {
            return Ok(None);
        }
        let step = self.state()?.inbound.pop_front();
        match step {
            Some(Step::Frame(text)) => {
                self.state()?.journal.push(Exchange::Received(text.clone()));
                Ok(Some(text))
            }
            Some(Step::Stall) => std::future::pending().await,
            Some(Step::Fail(message)) => Err(RealtimeError::Connection(message)),
            Some(Step::Close) | None => {
                self.closed = true;
                Ok(None)
            }
        }
    }

    async fn close(&mut self) -> Result<(), RealtimeError> {
        self.closed = true;
        self.state()?.close_count += 1;
        Ok(())
    }
}
