use crate::{BackendError, PythonKernel, SessionConfig};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

/// Result of one code execution: the value of the trailing expression and any
/// text written to stdout/stderr along the way. `error` holds the traceback of a
/// failed cell; the kernel itself stays usable.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ExecOutcome {
    pub result: Value,
    pub output: String,
    pub error: Option<String>,
}

/// Stateful code-execution sandbox owned by a single session.
#[async_trait]
pub trait ExecutionBackend: Send + Sync {
    fn session_id(&self) -> &str;
    fn working_directory(&self) -> &Path;

    async fn execute(&self, code: &str) -> Result<ExecOutcome, BackendError>;

    /// Releases the backend's process. Safe to call more than once.
    async fn shutdown(&self) -> Result<(), BackendError>;
}

#[async_trait]
pub trait BackendFactory: Send + Sync {
    async fn create(&self, session_id: &str) -> Result<Arc<dyn ExecutionBackend>, BackendError>;
}

/// Starts one [`PythonKernel`] per session under `<notebooks_root>/<session id>`.
#[derive(Clone, Debug)]
pub struct PythonKernelFactory {
    pub python_program: String,
    pub notebooks_root: PathBuf,
    pub exec_timeout: Duration,
}

impl PythonKernelFactory {
    pub fn from_config(config: &SessionConfig) -> Self {
        Self {
            python_program: config.python_program.clone(),
            notebooks_root: config.notebooks_root.clone(),
            exec_timeout: config.exec_timeout,
        }
    }
}

#[async_trait]
impl BackendFactory for PythonKernelFactory {
    async fn create(&self, session_id: &str) -> Result<Arc<dyn ExecutionBackend>, BackendError> {
        let kernel = PythonKernel::start(
            &self.python_program,
            self.notebooks_root.join(session_id),
            session_id,
            self.exec_timeout,
        )
        .await?;
        Ok(Arc::new(kernel))
    }
}
