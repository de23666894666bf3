//! The sandbox session: one screened script running in one child process.
//!
//! The session persists the screened script to a private temp file,
//! launches a bundled Python shim over it with piped stdio, and exchanges
//! one JSON object per line: a synchronous request/response protocol, not
//! a streaming one. The child process and its pipes are exclusively owned
//! by one operator instance.

use crate::context::ExecutionContext;
use crate::errors::{SandboxCommError, WeirError};
use crate::sandbox::screen::screen_code;
use crate::Config;
use serde::Deserialize;
use serde_json::{json, Value};
use std::process::Stdio;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tracing::warn;

/// The shim source launched in the child process.
const SHIM_SOURCE: &str = include_str!("runner.py");

/// Bounded wait for the child to exit during teardown.
const SHUTDOWN_WAIT: Duration = Duration::from_secs(2);

/// Options for launching a sandbox session.
#[derive(Debug, Clone)]
pub struct SandboxOptions {
    /// The interpreter binary.
    pub interpreter: String,
    /// Bounded read for each response line.
    pub response_timeout: Duration,
}

impl Default for SandboxOptions {
    fn default() -> Self {
        Self {
            interpreter: "python3".to_string(),
            response_timeout: Duration::from_secs(30),
        }
    }
}

#[derive(Debug, Deserialize)]
struct WireResponse {
    data: Value,
    #[serde(default)]
    context: ExecutionContext,
}

/// One live child process bound to exactly one operator instance.
#[derive(Debug)]
pub struct SandboxSession {
    child: Child,
    stdin: Option<ChildStdin>,
    stdout: BufReader<ChildStdout>,
    response_timeout: Duration,
    // temp files are removed when the session is dropped
    _script: tempfile::TempPath,
    _shim: tempfile::TempPath,
}

impl SandboxSession {
    /// Screens `code` and, if it passes, spawns the child process.
    ///
    /// Screening happens before any process exists; a rejected script
    /// never reaches the interpreter. Must be called within a tokio
    /// runtime.
    ///
    /// # Errors
    ///
    /// Returns [`UnsafeCodeError`](crate::errors::UnsafeCodeError) when
    /// screening rejects the script, or an IO error when the child cannot
    /// be spawned.
    pub fn launch(code: &str, options: &SandboxOptions) -> Result<Self, WeirError> {
        screen_code(code)?;

        let script = persist(code)?;
        let shim = persist(SHIM_SOURCE)?;

        let mut child = Command::new(&options.interpreter)
            .arg("-u")
            .arg(&*shim)
            .arg(&*script)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()?;

        let stdin = child.stdin.take().ok_or(SandboxCommError::NotRunning)?;
        let stdout = child.stdout.take().ok_or(SandboxCommError::NotRunning)?;

        Ok(Self {
            child,
            stdin: Some(stdin),
            stdout: BufReader::new(stdout),
            response_timeout: options.response_timeout,
            _script: script,
            _shim: shim,
        })
    }

    /// Sends one row and blocks for exactly one response line.
    ///
    /// # Errors
    ///
    /// Returns a [`SandboxCommError`] when the child produced no line
    /// (crash), an invalid line, or no line within the response timeout.
    pub async fn roundtrip(
        &mut self,
        data: &Value,
        context: &ExecutionContext,
        flow_config: &Config,
    ) -> Result<(Value, ExecutionContext), WeirError> {
        let stdin = self.stdin.as_mut().ok_or(SandboxCommError::NotRunning)?;

        let request = serde_json::to_string(&json!({
            "data": data,
            "context": context,
            "flow_config": flow_config,
        }))?;
        stdin
            .write_all(request.as_bytes())
            .await
            .map_err(stream_error)?;
        stdin.write_all(b"\n").await.map_err(stream_error)?;
        stdin.flush().await.map_err(stream_error)?;

        let mut line = String::new();
        let read = tokio::time::timeout(self.response_timeout, self.stdout.read_line(&mut line))
            .await
            .map_err(|_| SandboxCommError::Timeout {
                timeout_secs: self.response_timeout.as_secs(),
            })?
            .map_err(stream_error)?;
        if read == 0 {
            return Err(SandboxCommError::NoResponse.into());
        }

        let response: WireResponse = serde_json::from_str(line.trim())
            .map_err(|err| SandboxCommError::MalformedResponse(err.to_string()))?;
        Ok((response.data, response.context))
    }

    /// Tears the session down: closes the input stream, requests
    /// termination, and waits with a bounded timeout.
    pub async fn close(&mut self) {
        drop(self.stdin.take());
        if self.child.start_kill().is_err() {
            // already exited
            return;
        }
        if tokio::time::timeout(SHUTDOWN_WAIT, self.child.wait())
            .await
            .is_err()
        {
            warn!("sandbox child did not exit within the shutdown wait");
        }
    }
}

fn persist(source: &str) -> Result<tempfile::TempPath, WeirError> {
    use std::io::Write;
    let mut file = tempfile::Builder::new().suffix(".py").tempfile()?;
    file.write_all(source.as_bytes())?;
    file.flush()?;
    Ok(file.into_temp_path())
}

fn stream_error(err: std::io::Error) -> SandboxCommError {
    SandboxCommError::Stream(err.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    /// Sandbox tests need a python3 binary; hosts without one skip them.
    fn python_available() -> bool {
        std::process::Command::new("python3")
            .arg("--version")
            .output()
            .is_ok()
    }

    const DOUBLER: &str = "\
def execute(data, context):
    return {\"result\": data[\"input\"] * 2}, context
";

    #[tokio::test]
    async fn test_round_trip_doubles_input() {
        if !python_available() {
            return;
        }
        let mut session = SandboxSession::launch(DOUBLER, &SandboxOptions::default()).unwrap();

        let (data, context) = session
            .roundtrip(&json!({"input": 5}), &ExecutionContext::new(), &Config::new())
            .await
            .unwrap();

        assert_eq!(data, json!({"result": 10}));
        assert!(context.is_empty());
        session.close().await;
    }

    #[tokio::test]
    async fn test_child_keeps_serving_after_user_error() {
        if !python_available() {
            return;
        }
        let code = "\
def execute(data, context):
    return {\"result\": 10 // data[\"divisor\"]}, context
";
        let mut session = SandboxSession::launch(code, &SandboxOptions::default()).unwrap();

        let (data, context) = session
            .roundtrip(&json!({"divisor": 0}), &ExecutionContext::new(), &Config::new())
            .await
            .unwrap();
        assert_eq!(data, Value::Null);
        assert_eq!(
            context.get("error"),
            Some(&json!("exception in user code"))
        );

        // next line is served normally
        let (data, _) = session
            .roundtrip(&json!({"divisor": 2}), &ExecutionContext::new(), &Config::new())
            .await
            .unwrap();
        assert_eq!(data, json!({"result": 5}));
        session.close().await;
    }

    #[tokio::test]
    async fn test_unscreened_code_never_spawns() {
        let err = SandboxSession::launch("import os\n", &SandboxOptions::default()).unwrap_err();
        assert!(matches!(err, WeirError::UnsafeCode(_)));
    }

    #[tokio::test]
    async fn test_script_without_entry_function_fails_roundtrip() {
        if !python_available() {
            return;
        }
        // loads fine, screens fine, but defines no execute(); the child
        // exits 1 and the roundtrip observes a closed stream
        let mut session =
            SandboxSession::launch("value = 1\n", &SandboxOptions::default()).unwrap();
        let err = session
            .roundtrip(&json!({}), &ExecutionContext::new(), &Config::new())
            .await
            .unwrap_err();
        assert!(matches!(err, WeirError::SandboxComm(_)));
        session.close().await;
    }
}
