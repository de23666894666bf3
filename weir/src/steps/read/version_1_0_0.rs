use crate::context::ExecutionContext;
use crate::engine::{Outcome, Payload, Transform};
use crate::errors::WeirError;
use crate::Config;
use async_trait::async_trait;
use serde_json::Value;
use std::path::PathBuf;

/// Reads newline-delimited JSON records from a file, producing one
/// `(data, context)` pair per row. A source step: its own input payload is
/// ignored.
#[derive(Debug)]
pub struct ReadStep {
    path: PathBuf,
}

pub(crate) fn factory(config: Config, _flow_config: Config) -> Result<Box<dyn Transform>, WeirError> {
    let path = config
        .get("path")
        .and_then(Value::as_str)
        .ok_or_else(|| WeirError::Step("read step requires a 'path' in its configuration".to_string()))?;
    Ok(Box::new(ReadStep {
        path: PathBuf::from(path),
    }))
}

#[async_trait]
impl Transform for ReadStep {
    fn name(&self) -> &'static str {
        "ReadStep"
    }

    fn source_text(&self) -> String {
        include_str!("version_1_0_0.rs").to_string()
    }

    async fn apply(
        &mut self,
        _data: &Payload,
        context: &ExecutionContext,
    ) -> Result<Outcome, WeirError> {
        let raw = tokio::fs::read_to_string(&self.path).await?;
        let mut rows = Vec::new();
        for line in raw.lines() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            let record: Value = serde_json::from_str(line)?;
            rows.push((Payload::Record(record), context.clone()));
        }
        Ok(Outcome::Many(rows))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::io::Write;

    #[tokio::test]
    async fn test_read_yields_one_pair_per_row() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "{}", json!({"id": 1})).unwrap();
        writeln!(file).unwrap();
        writeln!(file, "{}", json!({"id": 2})).unwrap();
        file.flush().unwrap();

        let mut step = ReadStep {
            path: file.path().to_path_buf(),
        };
        let outcome = step
            .apply(&Payload::Record(Value::Null), &ExecutionContext::new())
            .await
            .unwrap();

        let Outcome::Many(rows) = outcome else {
            panic!("expected fan-out outcome");
        };
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].0, Payload::Record(json!({"id": 1})));
        assert_eq!(rows[1].0, Payload::Record(json!({"id": 2})));
    }

    #[tokio::test]
    async fn test_missing_file_is_an_error() {
        let mut step = ReadStep {
            path: PathBuf::from("/definitely/not/here.jsonl"),
        };
        let err = step
            .apply(&Payload::Record(Value::Null), &ExecutionContext::new())
            .await
            .unwrap_err();
        assert!(matches!(err, WeirError::Io(_)));
    }

    #[test]
    fn test_factory_requires_path() {
        assert!(factory(Config::new(), Config::new()).is_err());
    }
}
