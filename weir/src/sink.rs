//! Error sink trait and implementations.
//!
//! When an operator exhausts its retries, or the runner unwinds with a
//! failure, a structured failure report is written to an error sink. The
//! write is best-effort: a sink failure is logged and never escalated.

use crate::context::ExecutionContext;
use crate::engine::Payload;
use crate::errors::WeirError;
use chrono::{DateTime, Utc};
use thiserror::Error;
use tracing::error;

/// Error returned when a sink cannot record a report.
#[derive(Debug, Clone, Error)]
#[error("{0}")]
pub struct SinkError(pub String);

/// A structured record of one failed invocation.
#[derive(Debug, Clone)]
pub struct FailureReport {
    /// When the failure was recorded.
    pub timestamp: DateTime<Utc>,
    /// Where the failure happened (operator name or `flow_runner`).
    pub location: String,
    /// Short error class name.
    pub error_kind: String,
    /// Error details.
    pub details: String,
    /// Rendered execution context.
    pub context: String,
    /// Rendered data payload.
    pub data: String,
}

impl FailureReport {
    /// Creates a report for an error observed at `location`.
    #[must_use]
    pub fn new(location: impl Into<String>, err: &WeirError) -> Self {
        Self {
            timestamp: Utc::now(),
            location: location.into(),
            error_kind: err.kind_name().to_string(),
            details: err.to_string(),
            context: String::new(),
            data: String::new(),
        }
    }

    /// Attaches the execution context.
    #[must_use]
    pub fn with_context(mut self, context: &ExecutionContext) -> Self {
        self.context = serde_json::to_string(context).unwrap_or_default();
        self
    }

    /// Attaches the data payload.
    #[must_use]
    pub fn with_data(mut self, data: &Payload) -> Self {
        self.data = format!("{data:?}");
        self
    }

    /// Renders the report as a framed text block.
    #[must_use]
    pub fn render(&self) -> String {
        let rule = "-".repeat(120);
        format!(
            "timestamp  : {}\n\
             location   : {}\n\
             error type : {}\n\
             details    : {}\n\
             {rule}\n\
             context: {}\n\
             {rule}\n\
             data: {}\n\
             {rule}\n",
            self.timestamp.to_rfc3339(),
            self.location,
            self.error_kind,
            self.details,
            self.context,
            self.data,
        )
    }
}

/// Destination for structured failure reports.
///
/// Returns a log reference on success so alerts can point at the stored
/// record.
#[cfg_attr(test, mockall::automock)]
pub trait ErrorSink: Send + Sync {
    /// Records one failure report.
    ///
    /// # Errors
    ///
    /// Returns a [`SinkError`] when the report could not be stored; callers
    /// log the loss and continue.
    fn record(&self, report: &FailureReport) -> Result<String, SinkError>;
}

/// Sink that writes reports to the tracing log.
#[derive(Debug, Clone, Copy, Default)]
pub struct LoggingErrorSink;

impl ErrorSink for LoggingErrorSink {
    fn record(&self, report: &FailureReport) -> Result<String, SinkError> {
        error!(
            target: "weir::errors",
            location = %report.location,
            error_kind = %report.error_kind,
            "{}",
            report.render()
        );
        Ok("logged".to_string())
    }
}

/// Sink that collects reports in memory, for tests and diagnostics.
#[derive(Debug, Default)]
pub struct CollectingErrorSink {
    reports: parking_lot::RwLock<Vec<FailureReport>>,
}

impl CollectingErrorSink {
    /// Creates a new collecting sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns all collected reports.
    #[must_use]
    pub fn reports(&self) -> Vec<FailureReport> {
        self.reports.read().clone()
    }

    /// Number of collected reports.
    #[must_use]
    pub fn len(&self) -> usize {
        self.reports.read().len()
    }

    /// Returns true if no reports have been collected.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.reports.read().is_empty()
    }
}

impl ErrorSink for CollectingErrorSink {
    fn record(&self, report: &FailureReport) -> Result<String, SinkError> {
        let mut reports = self.reports.write();
        reports.push(report.clone());
        Ok(format!("report-{}", reports.len()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::FlowError;
    use serde_json::json;

    fn sample_report() -> FailureReport {
        let mut ctx = ExecutionContext::new();
        ctx.insert("run_id", json!("abc"));
        FailureReport::new("ReadStep", &WeirError::from(FlowError::new("boom")))
            .with_context(&ctx)
            .with_data(&Payload::Record(json!({"row": 1})))
    }

    #[test]
    fn test_render_includes_sections() {
        let rendered = sample_report().render();
        assert!(rendered.contains("location   : ReadStep"));
        assert!(rendered.contains("error type : FlowError"));
        assert!(rendered.contains("boom"));
        assert!(rendered.contains("run_id"));
    }

    #[test]
    fn test_collecting_sink() {
        let sink = CollectingErrorSink::new();
        assert!(sink.is_empty());

        let reference = sink.record(&sample_report()).unwrap();
        assert_eq!(reference, "report-1");
        assert_eq!(sink.len(), 1);
        assert_eq!(sink.reports()[0].location, "ReadStep");
    }

    #[test]
    fn test_logging_sink_returns_reference() {
        let sink = LoggingErrorSink;
        assert!(sink.record(&sample_report()).is_ok());
    }

    #[test]
    fn test_mocked_sink_failure() {
        let mut mock = MockErrorSink::new();
        mock.expect_record()
            .returning(|_| Err(SinkError("bin unavailable".to_string())));
        let err = mock.record(&sample_report()).unwrap_err();
        assert_eq!(err.to_string(), "bin unavailable");
    }
}
