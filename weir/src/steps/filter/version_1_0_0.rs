use crate::context::ExecutionContext;
use crate::engine::{Outcome, Payload, Transform};
use crate::errors::WeirError;
use crate::Config;
use async_trait::async_trait;

/// Passes every record through unchanged. Placeholder semantics; selection
/// predicates belong in a future version unit.
#[derive(Debug, Default)]
pub struct FilterStep;

pub(crate) fn factory(_config: Config, _flow_config: Config) -> Result<Box<dyn Transform>, WeirError> {
    Ok(Box::new(FilterStep))
}

#[async_trait]
impl Transform for FilterStep {
    fn name(&self) -> &'static str {
        "FilterStep"
    }

    fn source_text(&self) -> String {
        include_str!("version_1_0_0.rs").to_string()
    }

    async fn apply(
        &mut self,
        data: &Payload,
        context: &ExecutionContext,
    ) -> Result<Outcome, WeirError> {
        Ok(Outcome::One(data.clone(), context.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_filter_passes_data_through() {
        let mut step = FilterStep;
        let data = Payload::Record(json!({"a": 1}));
        let outcome = step.apply(&data, &ExecutionContext::new()).await.unwrap();
        assert_eq!(outcome, Outcome::One(data, ExecutionContext::new()));
    }
}
