use crate::context::ExecutionContext;
use crate::engine::{Outcome, Payload, Transform};
use crate::errors::WeirError;
use crate::Config;
use async_trait::async_trait;

/// Terminal marker: every flow path must end here. Consumes its input and
/// terminates the path.
#[derive(Debug, Default)]
pub struct EndStep;

pub(crate) fn factory(_config: Config, _flow_config: Config) -> Result<Box<dyn Transform>, WeirError> {
    Ok(Box::new(EndStep))
}

#[async_trait]
impl Transform for EndStep {
    fn name(&self) -> &'static str {
        "EndStep"
    }

    fn source_text(&self) -> String {
        include_str!("version_1_0_0.rs").to_string()
    }

    async fn apply(
        &mut self,
        _data: &Payload,
        _context: &ExecutionContext,
    ) -> Result<Outcome, WeirError> {
        Ok(Outcome::Stop)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_end_terminates_the_path() {
        let mut step = EndStep;
        let outcome = step
            .apply(&Payload::Record(json!({"a": 1})), &ExecutionContext::new())
            .await
            .unwrap();
        assert_eq!(outcome, Outcome::Stop);
    }
}
