use crate::{BackendError, ExecOutcome, ExecutionBackend};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{Value, json};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tokio::sync::Mutex;

const REPLY_PREFIX: &str = "\u{1e}parley ";
const SHUTDOWN_GRACE: Duration = Duration::from_secs(2);

// Reads one JSON request per line and answers with one prefixed JSON line.
// Anything else on stdout is cell output that escaped the redirect.
const DRIVER: &str = r#"
import ast, contextlib, io, json, sys, traceback
_ns = {"__name__": "__main__"}
_out = sys.stdout
for _line in sys.stdin:
    try:
        _req = json.loads(_line)
    except Exception as _e:
        continue
    _buf = io.StringIO()
    _result = None
    _error = None
    try:
        _tree = ast.parse(_req.get("code", ""), mode="exec")
        _tail = None
        if _tree.body and isinstance(_tree.body[-1], ast.Expr):
            _tail = ast.Expression(_tree.body.pop().value)
        with contextlib.redirect_stdout(_buf), contextlib.redirect_stderr(_buf):
            exec(compile(_tree, "<cell>", "exec"), _ns)
            if _tail is not None:
                _result = eval(compile(_tail, "<cell>", "eval"), _ns)
    except BaseException:
        _error = traceback.format_exc()
    try:
        json.dumps(_result)
    except Exception:
        _result = repr(_result)
    _out.write("\x1eparley " + json.dumps({"id": _req.get("id"), "result": _result, "output": _buf.getvalue(), "error": _error}) + "\n")
    _out.flush()
"#;

#[derive(Debug, Deserialize)]
struct KernelReply {
    id: Option<u64>,
    #[serde(default)]
    result: Value,
    #[serde(default)]
    output: String,
    #[serde(default)]
    error: Option<String>,
}

struct KernelIo {
    child: Child,
    stdin: Option<ChildStdin>,
    stdout: BufReader<ChildStdout>,
    next_id: u64,
}

/// Long-lived Python interpreter holding one namespace across executions.
pub struct PythonKernel {
    session_id: String,
    working_directory: PathBuf,
    exec_timeout: Duration,
    io: Mutex<Option<KernelIo>>,
}

impl PythonKernel {
    pub async fn start(
        python_program: &str,
        working_directory: impl Into<PathBuf>,
        session_id: impl Into<String>,
        exec_timeout: Duration,
    ) -> Result<Self, BackendError> {
        let working_directory = working_directory.into();
        let session_id = session_id.into();
        tokio::fs::create_dir_all(&working_directory).await?;

        let mut child = Command::new(python_program)
            .arg("-u")
            .arg("-c")
            .arg(DRIVER)
            .current_dir(&working_directory)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|error| BackendError::Spawn(format!("{python_program}: {error}")))?;
        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| BackendError::Spawn("kernel stdin unavailable".to_string()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| BackendError::Spawn("kernel stdout unavailable".to_string()))?;

        tracing::info!(
            session_id = %session_id,
            working_directory = %working_directory.display(),
            "python kernel started"
        );
        Ok(Self {
            session_id,
            working_directory,
            exec_timeout,
            io: Mutex::new(Some(KernelIo {
                child,
                stdin: Some(stdin),
                stdout: BufReader::new(stdout),
                next_id: 1,
            })),
        })
    }

    pub async fn is_running(&self) -> bool {
        self.io.lock().await.is_some()
    }
}

async fn round_trip(io: &mut KernelIo, code: &str) -> Result<ExecOutcome, BackendError> {
    let id = io.next_id;
    io.next_id += 1;
    let request = json!({ "id": id, "code": code }).to_string();
    let stdin = io.stdin.as_mut().ok_or(BackendError::Closed)?;
    stdin.write_all(request.as_bytes()).await?;
    stdin.write_all(b"\n").await?;
    stdin.flush().await?;

    let mut stray_output = String::new();
    loop {
        let mut line = String::new();
        if io.stdout.read_line(&mut line).await? == 0 {
            return Err(BackendError::Closed);
        }
        let Some(reply) = line.strip_prefix(REPLY_PREFIX) else {
            stray_output.push_str(&line);
            continue;
        };
        let reply: KernelReply = serde_json::from_str(reply.trim_end())
            .map_err(|error| BackendError::Protocol(error.to_string()))?;
        if reply.id != Some(id) {
            return Err(BackendError::Protocol(format!(
                "expected reply {id}, got {:?}",
                reply.id
            )));
        }
        stray_output.push_str(&reply.output);
        return Ok(ExecOutcome {
            result: reply.result,
            output: stray_output,
            error: reply.error,
        });
    }
}

async fn stop_child(mut io: KernelIo) -> Result<(), BackendError> {
    drop(io.stdin.take());
    if let Ok(status) = tokio::time::timeout(SHUTDOWN_GRACE, io.child.wait()).await {
        status?;
        return Ok(());
    }

    if terminate(&io.child)
        && tokio::time::timeout(SHUTDOWN_GRACE, io.child.wait())
            .await
            .is_ok()
    {
        return Ok(());
    }

    io.child.kill().await?;
    Ok(())
}

#[cfg(unix)]
fn terminate(child: &Child) -> bool {
    use nix::sys::signal::{Signal, kill};
    use nix::unistd::Pid;

    let Some(pid) = child.id() else {
        return false;
    };
    kill(Pid::from_raw(pid as i32), Signal::SIGTERM).is_ok()
}

#[cfg(not(unix))]
fn terminate(_child: &Child) -> bool {
    false
}

#[async_trait]
impl ExecutionBackend for PythonKernel {
    fn session_id(&self) -> &str {
        &self.session_id
    }

    fn working_directory(&self) -> &Path {
        &self.working_directory
    }

    async fn execute(&self, code: &str) -> Result<ExecOutcome, BackendError> {
        let mut guard = self.io.lock().await;
        let io = guard.as_mut().ok_or(BackendError::Closed)?;

        match tokio::time::timeout(self.exec_timeout, round_trip(io, code)).await {
            Ok(Ok(outcome)) => Ok(outcome),
            Ok(Err(error)) => {
                if let Some(io) = guard.take() {
                    let _ = stop_child(io).await;
                }
                Err(error)
            }
            Err(_) => {
                tracing::warn!(
                    session_id = %self.session_id,
                    timeout_ms = self.exec_timeout.as_millis() as u64,
                    "python execution timed out; killing kernel"
                );
                if let Some(mut io) = guard.take() {
                    let _ = io.child.kill().await;
                }
                Err(BackendError::TimedOut {
                    timeout_ms: self.exec_timeout.as_millis(),
                })
            }
        }
    }

    async fn shutdown(&self) -> Result<(), BackendError> {
        let Some(io) = self.io.lock().await.take() else {
            return Ok(());
        };
        tracing::info!(session_id = %self.session_id, "shutting down python kernel");
        stop_child(io).await
    }
}
