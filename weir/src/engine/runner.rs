//! The flow runner: sequential depth-first execution of a flow.

use crate::context::ExecutionContext;
use crate::engine::flow::Flow;
use crate::engine::operator::{Outcome, Payload};
use crate::errors::{FlowError, WeirError};
use crate::sink::{ErrorSink, FailureReport};
use futures::future::{BoxFuture, FutureExt};
use rand::Rng;
use std::sync::Arc;
use tracing::{debug, error};

/// Executes a [`Flow`] by walking from its entry points.
///
/// Traversal is single-threaded and depth-first: fan-out is realized by
/// sequential recursive descent, and each branch receives its own copy of
/// the execution context, so no locking is needed for context data.
pub struct FlowRunner<'f> {
    flow: &'f mut Flow,
    cycles: u64,
    error_sink: Option<Arc<dyn ErrorSink>>,
}

impl std::fmt::Debug for FlowRunner<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FlowRunner")
            .field("cycles", &self.cycles)
            .finish_non_exhaustive()
    }
}

impl<'f> FlowRunner<'f> {
    pub(crate) fn new(flow: &'f mut Flow) -> Self {
        Self {
            flow,
            cycles: 0,
            error_sink: None,
        }
    }

    /// Attaches an error sink for run-level failure reports.
    #[must_use]
    pub fn with_error_sink(mut self, sink: Arc<dyn ErrorSink>) -> Self {
        self.error_sink = Some(sink);
        self
    }

    /// Number of operator invocations performed so far.
    #[must_use]
    pub const fn cycles(&self) -> u64 {
        self.cycles
    }

    /// Creates a run of the flow and executes it with a specific payload.
    ///
    /// A run identifier is assigned into the context if absent. Entry
    /// points are walked in lexicographic order. `trace_sample_rate` is
    /// the probability of emitting a trace event per walked step.
    ///
    /// # Errors
    ///
    /// [`TimeExceeded`](crate::errors::TimeExceeded) aborts the whole run
    /// and is re-raised unchanged. Any other failure, including the
    /// circuit-breaker signal, is reported best-effort through the error
    /// sink and then re-raised.
    pub async fn run(
        &mut self,
        data: Payload,
        mut context: ExecutionContext,
        trace_sample_rate: f64,
    ) -> Result<(), WeirError> {
        context.ensure_run_id();

        let result = self
            .walk_entries(data.clone(), context.clone(), trace_sample_rate)
            .await;

        match result {
            Err(err) if err.is_time_exceeded() => Err(err),
            Err(err) => {
                self.report_abend(&err, &data, &context);
                Err(err)
            }
            Ok(()) => Ok(()),
        }
    }

    async fn walk_entries(
        &mut self,
        data: Payload,
        context: ExecutionContext,
        trace_sample_rate: f64,
    ) -> Result<(), WeirError> {
        for entry in self.flow.entry_points() {
            self.walk(entry, data.clone(), context.clone(), trace_sample_rate)
                .await?;
        }
        Ok(())
    }

    /// Walks the flow from one step: invoke the operator, classify the
    /// outcome, recurse into each outgoing edge for every produced pair.
    ///
    /// Branch N+1 does not start until branch N's entire subtree has
    /// completed; recursion depth equals the longest path through the
    /// flow.
    fn walk(
        &mut self,
        name: String,
        data: Payload,
        context: ExecutionContext,
        trace_sample_rate: f64,
    ) -> BoxFuture<'_, Result<(), WeirError>> {
        async move {
            self.cycles += 1;
            if trace_sample_rate > 0.0 && rand::thread_rng().gen::<f64>() < trace_sample_rate {
                debug!(
                    step = %name,
                    run_id = context.run_id().unwrap_or(""),
                    cycle = self.cycles,
                    "walking step"
                );
            }

            let outgoing = self.flow.outgoing(&name);
            let operator = self.flow.operator_mut(&name).ok_or_else(|| {
                WeirError::from(FlowError::new(format!(
                    "Invalid Flow - Operator {name} is invalid"
                )))
            })?;

            let outcome = operator.invoke(&data, &context).await?;

            let pairs = match outcome {
                Outcome::Stop => return Ok(()),
                Outcome::One(out_data, out_context) => vec![(out_data, out_context)],
                Outcome::Many(pairs) => pairs,
            };

            for (out_data, out_context) in pairs {
                for successor in &outgoing {
                    // each branch mutates an independent copy of the context
                    self.walk(
                        successor.clone(),
                        out_data.clone(),
                        out_context.clone(),
                        trace_sample_rate,
                    )
                    .await?;
                }
            }
            Ok(())
        }
        .boxed()
    }

    /// Best-effort abend report; sink failures are logged, never raised.
    fn report_abend(&self, err: &WeirError, data: &Payload, context: &ExecutionContext) {
        let Some(sink) = &self.error_sink else {
            error!(
                error_kind = %err.kind_name(),
                error = %err,
                "FLOW ABEND (NOT LOGGED)"
            );
            return;
        };
        let report = FailureReport::new("flow_runner", err)
            .with_context(context)
            .with_data(data);
        let reference = sink
            .record(&report)
            .unwrap_or_else(|_| "NOT LOGGED".to_string());
        error!(
            error_kind = %err.kind_name(),
            error = %err,
            log_reference = %reference,
            "FLOW ABEND"
        );
    }
}
