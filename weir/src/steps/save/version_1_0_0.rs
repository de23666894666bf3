use crate::context::ExecutionContext;
use crate::engine::{Outcome, Payload, Transform};
use crate::errors::WeirError;
use crate::Config;
use async_trait::async_trait;
use serde_json::Value;
use std::path::PathBuf;
use tokio::io::AsyncWriteExt;
use tracing::info;

/// Appends each record as one newline-delimited JSON row, then passes it
/// through unchanged. Without a configured `path` the record is written to
/// the output log instead.
#[derive(Debug)]
pub struct SaveStep {
    path: Option<PathBuf>,
}

pub(crate) fn factory(config: Config, _flow_config: Config) -> Result<Box<dyn Transform>, WeirError> {
    let path = config
        .get("path")
        .and_then(Value::as_str)
        .map(PathBuf::from);
    Ok(Box::new(SaveStep { path }))
}

#[async_trait]
impl Transform for SaveStep {
    fn name(&self) -> &'static str {
        "SaveStep"
    }

    fn source_text(&self) -> String {
        include_str!("version_1_0_0.rs").to_string()
    }

    async fn apply(
        &mut self,
        data: &Payload,
        context: &ExecutionContext,
    ) -> Result<Outcome, WeirError> {
        if let Some(record) = data.record() {
            let line = serde_json::to_string(record)?;
            match &self.path {
                Some(path) => {
                    let mut file = tokio::fs::OpenOptions::new()
                        .create(true)
                        .append(true)
                        .open(path)
                        .await?;
                    file.write_all(line.as_bytes()).await?;
                    file.write_all(b"\n").await?;
                    file.flush().await?;
                }
                None => info!(target: "weir::output", record = %line),
            }
        }
        Ok(Outcome::One(data.clone(), context.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_save_appends_rows_and_passes_through() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.jsonl");
        let mut step = SaveStep {
            path: Some(path.clone()),
        };

        for id in [1, 2] {
            let data = Payload::Record(json!({"id": id}));
            let outcome = step.apply(&data, &ExecutionContext::new()).await.unwrap();
            assert_eq!(outcome, Outcome::One(data, ExecutionContext::new()));
        }

        let written = std::fs::read_to_string(&path).unwrap();
        let rows: Vec<&str> = written.lines().collect();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0], json!({"id": 1}).to_string());
    }

    #[tokio::test]
    async fn test_save_without_path_logs_only() {
        let mut step = SaveStep { path: None };
        let data = Payload::Record(json!({"id": 1}));
        assert!(step.apply(&data, &ExecutionContext::new()).await.is_ok());
    }
}
