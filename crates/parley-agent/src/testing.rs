//! In-process execution backend for tests and offline hosts.

use crate::{BackendError, BackendFactory, ExecOutcome, ExecutionBackend};
use async_trait::async_trait;
use serde_json::Value;
use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

/// Backend that records the code it is asked to run and answers from a queue
/// of canned outcomes. An empty queue answers with a `null` result.
#[derive(Debug)]
pub struct RecordingBackend {
    session_id: String,
    working_directory: PathBuf,
    executed: Mutex<Vec<String>>,
    outcomes: Mutex<VecDeque<Result<ExecOutcome, String>>>,
    shutdowns: AtomicUsize,
}

impl RecordingBackend {
    pub fn new(session_id: impl Into<String>) -> Self {
        let session_id = session_id.into();
        Self {
            working_directory: PathBuf::from("notebooks").join(&session_id),
            session_id,
            executed: Mutex::new(Vec::new()),
            outcomes: Mutex::new(VecDeque::new()),
            shutdowns: AtomicUsize::new(0),
        }
    }

    pub fn push_outcome(&self, outcome: ExecOutcome) {
        if let Ok(mut outcomes) = self.outcomes.lock() {
            outcomes.push_back(Ok(outcome));
        }
    }

    pub fn push_result(&self, result: Value) {
        self.push_outcome(ExecOutcome {
            result,
            ..ExecOutcome::default()
        });
    }

    /// The next execution fails at the backend level.
    pub fn push_failure(&self, message: impl Into<String>) {
        if let Ok(mut outcomes) = self.outcomes.lock() {
            outcomes.push_back(Err(message.into()));
        }
    }

    pub fn executed(&self) -> Vec<String> {
        self.executed
            .lock()
            .map(|executed| executed.clone())
            .unwrap_or_default()
    }

    pub fn shutdown_count(&self) -> usize {
        self.shutdowns.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ExecutionBackend for RecordingBackend {
    fn session_id(&self) -> &str {
        &self.session_id
    }

    fn working_directory(&self) -> &Path {
        &self.working_directory
    }

    async fn execute(&self, code: &str) -> Result<ExecOutcome, BackendError> {
        if self.shutdown_count() > 0 {
            return Err(BackendError::Closed);
        }
        if let Ok(mut executed) = self.executed.lock() {
            executed.push(code.to_string());
        }
        let next = self
            .outcomes
            .lock()
            .ok()
            .and_then(|mut outcomes| outcomes.pop_front());
        match next {
            Some(Ok(outcome)) => Ok(outcome),
            Some(Err(message)) => Err(BackendError::Protocol(message)),
            None => Ok(ExecOutcome::default()),
        }
    }

    async fn shutdown(&self) -> Result<(), BackendError> {
        self.shutdowns.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Factory handing out [`RecordingBackend`]s and keeping every one it created.
#[derive(Clone, Debug, Default)]
pub struct RecordingBackendFactory {
    created: Arc<Mutex<Vec<Arc<RecordingBackend>>>>,
}

impl RecordingBackendFactory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn created(&self) -> Vec<Arc<RecordingBackend>> {
        self.created
            .lock()
            .map(|created| created.clone())
            .unwrap_or_default()
    }

    pub fn created_count(&self) -> usize {
        self.created().len()
    }

    pub fn latest(&self) -> Option<Arc<RecordingBackend>> {
        self.created().last().cloned()
    }

    /// Total shutdown calls across every backend handed out.
    pub fn shutdown_count(&self) -> usize {
        self.created()
            .iter()
            .map(|backend| backend.shutdown_count())
            .sum()
    }
}

#[async_trait]
impl BackendFactory for RecordingBackendFactory {
    async fn create(&self, session_id: &str) -> Result<Arc<dyn ExecutionBackend>, BackendError> {
        let backend = Arc::new(RecordingBackend::new(session_id));
        self.created
            .lock()
            .map_err(|_| BackendError::Spawn("recording factory mutex poisoned".to_string()))?
            .push(backend.clone());
        Ok(backend)
    }
}
