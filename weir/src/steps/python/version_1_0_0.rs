use crate::context::ExecutionContext;
use crate::engine::{Outcome, Payload, Transform};
use crate::errors::WeirError;
use crate::sandbox::{SandboxOptions, SandboxSession};
use crate::Config;
use async_trait::async_trait;
use serde_json::Value;
use std::time::Duration;

/// Runs user-provided Python in a persistent, sandboxed child process:
/// one row in, one row out per invocation. The script is screened and the
/// child spawned at construction time; the operator wrapper's retry policy
/// applies around each row exchange, not the process lifetime.
#[derive(Debug)]
pub struct PythonStep {
    code: String,
    flow_config: Config,
    session: SandboxSession,
}

pub(crate) fn factory(config: Config, flow_config: Config) -> Result<Box<dyn Transform>, WeirError> {
    let code = config
        .get("code")
        .and_then(Value::as_str)
        .ok_or_else(|| {
            WeirError::Step("python step requires 'code' in its configuration".to_string())
        })?
        .to_string();

    let mut options = SandboxOptions::default();
    if let Some(interpreter) = config.get("interpreter").and_then(Value::as_str) {
        options.interpreter = interpreter.to_string();
    }
    if let Some(timeout) = config.get("timeout_secs").and_then(Value::as_u64) {
        options.response_timeout = Duration::from_secs(timeout);
    }

    let session = SandboxSession::launch(&code, &options)?;
    Ok(Box::new(PythonStep {
        code,
        flow_config,
        session,
    }))
}

#[async_trait]
impl Transform for PythonStep {
    fn name(&self) -> &'static str {
        "PythonStep"
    }

    /// The user script is the transform logic, so the version fingerprint
    /// follows the script content.
    fn source_text(&self) -> String {
        self.code.clone()
    }

    async fn apply(
        &mut self,
        data: &Payload,
        context: &ExecutionContext,
    ) -> Result<Outcome, WeirError> {
        let Some(record) = data.record() else {
            return Ok(Outcome::Stop);
        };
        let (out_data, out_context) = self
            .session
            .roundtrip(record, context, &self.flow_config)
            .await?;
        Ok(Outcome::One(Payload::Record(out_data), out_context))
    }

    async fn shutdown(&mut self) {
        self.session.close().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn python_available() -> bool {
        std::process::Command::new("python3")
            .arg("--version")
            .output()
            .is_ok()
    }

    fn config_with_code(code: &str) -> Config {
        let mut config = Config::new();
        config.insert("code".to_string(), json!(code));
        config
    }

    #[test]
    fn test_factory_requires_code() {
        let err = factory(Config::new(), Config::new()).unwrap_err();
        assert!(err.to_string().contains("code"));
    }

    #[tokio::test]
    async fn test_unsafe_code_is_rejected_at_construction() {
        let err = factory(config_with_code("import os\n"), Config::new()).unwrap_err();
        assert!(matches!(err, WeirError::UnsafeCode(_)));
    }

    #[tokio::test]
    async fn test_python_step_round_trip() {
        if !python_available() {
            return;
        }
        let code = "\
def execute(data, context):
    return {\"result\": data[\"input\"] * 2}, context
";
        let mut step = factory(config_with_code(code), Config::new()).unwrap();

        let outcome = step
            .apply(
                &Payload::Record(json!({"input": 5})),
                &ExecutionContext::new(),
            )
            .await
            .unwrap();

        let Outcome::One(Payload::Record(data), context) = outcome else {
            panic!("expected a single outcome pair");
        };
        assert_eq!(data, json!({"result": 10}));
        assert!(context.is_empty());
        step.shutdown().await;
    }

    #[tokio::test]
    async fn test_fingerprint_follows_script_content() {
        if !python_available() {
            return;
        }
        let a = factory(
            config_with_code("def execute(data, context):\n    return data, context\n"),
            Config::new(),
        )
        .unwrap();
        let b = factory(
            config_with_code("def execute(data, context):\n    return None, context\n"),
            Config::new(),
        )
        .unwrap();
        assert_ne!(
            crate::engine::fingerprint(&a.source_text()),
            crate::engine::fingerprint(&b.source_text())
        );
    }
}
