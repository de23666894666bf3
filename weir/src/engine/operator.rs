//! The operator execution wrapper.
//!
//! An [`Operator`] wraps a user-supplied [`Transform`] with retry logic,
//! a rolling-failure circuit breaker, cumulative sensors, and a
//! content-addressed version fingerprint. Engineers implementing a step
//! only write the transform; the wrapper owns everything else.

use crate::context::ExecutionContext;
use crate::errors::{CircuitBreakerTrip, WeirError};
use crate::registry::{StepDescriptor, StepKind, Version};
use crate::sink::{ErrorSink, FailureReport};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{error, info, warn};

/// The message travelling along flow edges.
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    /// One row of data.
    Record(Value),
    /// The synthetic terminal signal walked through the flow at finalize
    /// time so every operator observes a clean-shutdown call.
    Shutdown,
}

impl Payload {
    /// Returns the record value, if this is a data payload.
    #[must_use]
    pub const fn record(&self) -> Option<&Value> {
        match self {
            Self::Record(value) => Some(value),
            Self::Shutdown => None,
        }
    }
}

/// What a transform produced for the downstream flow.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    /// Terminate this path; successors are not invoked.
    Stop,
    /// Exactly one successor invocation.
    One(Payload, ExecutionContext),
    /// Zero or more successor invocations, in production order.
    Many(Vec<(Payload, ExecutionContext)>),
}

/// A unit of pipeline work.
///
/// Implementations receive one payload and context per invocation and
/// return an [`Outcome`]. Retries, failure accounting and shutdown
/// propagation are handled by the wrapping [`Operator`].
#[async_trait]
pub trait Transform: Send + std::fmt::Debug {
    /// Implementation name, e.g. `ReadStep`.
    fn name(&self) -> &'static str;

    /// The source text fingerprinted into the operator version. Builtin
    /// steps return their own implementation source; the sandboxed step
    /// returns the user script.
    fn source_text(&self) -> String;

    /// Processes one payload.
    async fn apply(
        &mut self,
        data: &Payload,
        context: &ExecutionContext,
    ) -> Result<Outcome, WeirError>;

    /// Releases resources on clean shutdown. Called once, when the
    /// terminal signal reaches this operator.
    async fn shutdown(&mut self) {}
}

/// Fixed-size history of recent invocation outcomes.
#[derive(Debug, Clone)]
pub struct RollingWindow {
    results: VecDeque<bool>,
}

impl RollingWindow {
    /// Creates a window of `size` entries, seeded with successes.
    #[must_use]
    pub fn new(size: usize) -> Self {
        Self {
            results: VecDeque::from(vec![true; size]),
        }
    }

    /// Pushes an outcome, dropping the oldest entry.
    pub fn push(&mut self, success: bool) {
        self.results.push_back(success);
        self.results.pop_front();
    }

    /// Number of successes currently in the window.
    #[must_use]
    pub fn successes(&self) -> usize {
        self.results.iter().filter(|outcome| **outcome).count()
    }

    /// Number of failures currently in the window.
    #[must_use]
    pub fn failures(&self) -> usize {
        self.len() - self.successes()
    }

    /// The window length.
    #[must_use]
    pub fn len(&self) -> usize {
        self.results.len()
    }

    /// Windows are never empty; sizes are clamped to at least one entry.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    /// True when fewer than half of the recent outcomes succeeded.
    #[must_use]
    pub fn tripped(&self) -> bool {
        self.successes() * 2 < self.len()
    }
}

/// Snapshot of an operator's cumulative counters, emitted to the audit log
/// when a flow is finalized.
#[derive(Debug, Clone, Serialize)]
pub struct Sensors {
    /// Implementation name.
    pub operator: String,
    /// Content-addressed version fingerprint.
    pub version: String,
    /// Number of invocations.
    pub records_processed: u64,
    /// Number of failed executions (including retried attempts).
    pub error_count: u64,
    /// Cumulative transform execution time in seconds.
    pub execution_sec: f64,
    /// When the first record was processed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub commencement_time: Option<String>,
}

/// Default retry attempts.
const DEFAULT_RETRY_COUNT: i64 = 2;
/// Default seconds between retries.
const DEFAULT_RETRY_WAIT: i64 = 5;
/// Default rolling window length.
const DEFAULT_WINDOW: i64 = 10;

/// A named, versioned, retry-wrapped unit of pipeline work.
pub struct Operator {
    name: String,
    descriptor: StepDescriptor,
    fingerprint: String,
    retry_count: u32,
    retry_wait: Duration,
    window: RollingWindow,
    records_processed: u64,
    errors: u64,
    execution_time: Duration,
    commencement_time: Option<DateTime<Utc>>,
    transform: Box<dyn Transform>,
    error_sink: Option<Arc<dyn ErrorSink>>,
}

impl Operator {
    /// Wraps a transform with retry and circuit-breaking policy.
    ///
    /// Policy knobs are read from `config` and clamped to practical
    /// ranges: `retry_count` to [1, 5], `retry_wait` seconds to [1, 300],
    /// `rolling_failure_window` to [1, 100].
    #[must_use]
    pub fn new(
        descriptor: StepDescriptor,
        transform: Box<dyn Transform>,
        config: &serde_json::Map<String, Value>,
    ) -> Self {
        let retry_count = clamp(config_int(config, "retry_count", DEFAULT_RETRY_COUNT), 1, 5);
        let retry_wait = clamp(config_int(config, "retry_wait", DEFAULT_RETRY_WAIT), 1, 300);
        let window = clamp(
            config_int(config, "rolling_failure_window", DEFAULT_WINDOW),
            1,
            100,
        );

        // The fingerprint is computed once here and never recomputed; it
        // identifies the transform logic for audit, not security.
        let fingerprint = fingerprint(&transform.source_text());
        let name = transform.name().to_string();

        info!(
            target: "weir::audit",
            operator = %name,
            step_version = %descriptor.version,
            version = %fingerprint,
            "operator constructed"
        );

        Self {
            name,
            descriptor,
            fingerprint,
            retry_count: retry_count as u32,
            retry_wait: Duration::from_secs(retry_wait as u64),
            window: RollingWindow::new(window as usize),
            records_processed: 0,
            errors: 0,
            execution_time: Duration::ZERO,
            commencement_time: None,
            transform,
            error_sink: None,
        }
    }

    /// Attaches an error sink for structured failure reports.
    #[must_use]
    pub fn with_error_sink(mut self, sink: Arc<dyn ErrorSink>) -> Self {
        self.error_sink = Some(sink);
        self
    }

    /// Implementation name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The step kind this operator was resolved from.
    #[must_use]
    pub const fn kind(&self) -> StepKind {
        self.descriptor.kind
    }

    /// The registry version this operator was resolved from.
    #[must_use]
    pub const fn step_version(&self) -> Version {
        self.descriptor.version
    }

    /// The memoized content fingerprint of the transform logic.
    #[must_use]
    pub fn version(&self) -> &str {
        &self.fingerprint
    }

    /// Configured retry attempts, after clamping.
    #[must_use]
    pub const fn retry_count(&self) -> u32 {
        self.retry_count
    }

    /// Configured wait between retries, after clamping.
    #[must_use]
    pub const fn retry_wait(&self) -> Duration {
        self.retry_wait
    }

    /// The rolling outcome window.
    #[must_use]
    pub const fn window(&self) -> &RollingWindow {
        &self.window
    }

    /// Invokes the wrapped transform with retry and circuit-breaking
    /// policy applied.
    ///
    /// On retry exhaustion the failure is recorded best-effort and the
    /// path continues with [`Outcome::Stop`] rather than an error. The
    /// two exceptions are [`TimeExceeded`](crate::errors::TimeExceeded),
    /// which propagates unchanged without retries, and the circuit
    /// breaker, which yields the fatal [`CircuitBreakerTrip`] signal.
    ///
    /// # Errors
    ///
    /// Returns `TimeExceeded` or `CircuitBreakerTrip` as described above.
    pub async fn invoke(
        &mut self,
        data: &Payload,
        context: &ExecutionContext,
    ) -> Result<Outcome, WeirError> {
        if matches!(data, Payload::Shutdown) {
            self.transform.shutdown().await;
            return Ok(Outcome::One(Payload::Shutdown, context.clone()));
        }

        if self.commencement_time.is_none() {
            self.commencement_time = Some(Utc::now());
        }
        self.records_processed += 1;

        let mut outcome = Outcome::Stop;
        let mut attempts_to_go = self.retry_count;
        while attempts_to_go > 0 {
            let started = Instant::now();
            match self.transform.apply(data, context).await {
                Ok(result) => {
                    self.execution_time += started.elapsed();
                    self.window.push(true);
                    outcome = result;
                    break;
                }
                Err(err) if err.is_time_exceeded() => return Err(err),
                Err(err) => {
                    self.errors += 1;
                    attempts_to_go -= 1;
                    if attempts_to_go > 0 {
                        warn!(
                            operator = %self.name,
                            error = %err,
                            run_id = context.run_id().unwrap_or(""),
                            "retry in {} seconds",
                            self.retry_wait.as_secs()
                        );
                        tokio::time::sleep(self.retry_wait).await;
                    } else {
                        let reference = self.record_failure(&err, data, context);
                        error!(
                            operator = %self.name,
                            error = %err,
                            run_id = context.run_id().unwrap_or(""),
                            log_reference = %reference,
                            "tried {} times before aborting",
                            self.retry_count
                        );
                        self.window.push(false);
                        outcome = Outcome::Stop;
                    }
                }
            }
        }

        if self.window.tripped() {
            error!(
                operator = %self.name,
                window = self.window.len(),
                successes = self.window.successes(),
                "failure rate over last {} executions is over 50%, aborting",
                self.window.len()
            );
            return Err(CircuitBreakerTrip {
                operator: self.name.clone(),
                window: self.window.len(),
                successes: self.window.successes(),
            }
            .into());
        }

        Ok(outcome)
    }

    /// Writes a structured failure report to the error sink. The write is
    /// best-effort: sink failures are logged, never escalated.
    fn record_failure(
        &self,
        err: &WeirError,
        data: &Payload,
        context: &ExecutionContext,
    ) -> String {
        let report = FailureReport::new(&self.name, err)
            .with_context(context)
            .with_data(data);
        match &self.error_sink {
            Some(sink) => match sink.record(&report) {
                Ok(reference) => reference,
                Err(sink_err) => {
                    error!(
                        operator = %self.name,
                        error = %sink_err,
                        "problem writing to the error bin, a record has been lost"
                    );
                    "NOT LOGGED".to_string()
                }
            },
            None => "NOT LOGGED".to_string(),
        }
    }

    /// Reads the operator's cumulative sensors.
    #[must_use]
    pub fn sensors(&self) -> Sensors {
        if self.records_processed == 0 {
            warn!(operator = %self.name, "processed 0 records");
        }
        Sensors {
            operator: self.name.clone(),
            version: self.fingerprint.clone(),
            records_processed: self.records_processed,
            error_count: self.errors,
            execution_sec: self.execution_time.as_secs_f64(),
            commencement_time: self.commencement_time.map(|t| t.to_rfc3339()),
        }
    }
}

impl std::fmt::Debug for Operator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Operator")
            .field("name", &self.name)
            .field("kind", &self.descriptor.kind)
            .field("step_version", &self.descriptor.version)
            .field("version", &self.fingerprint)
            .field("records_processed", &self.records_processed)
            .field("errors", &self.errors)
            .finish_non_exhaustive()
    }
}

/// Fixes a value within a range.
const fn clamp(value: i64, low: i64, high: i64) -> i64 {
    let value = if value > high { high } else { value };
    if value < low {
        low
    } else {
        value
    }
}

fn config_int(config: &serde_json::Map<String, Value>, key: &str, default: i64) -> i64 {
    config.get(key).and_then(Value::as_i64).unwrap_or(default)
}

/// Content hash of the transform logic: SHA-256 over the source text with
/// non-alphanumerics stripped, last 16 hex characters. Identifies changes,
/// does not protect information.
#[must_use]
pub fn fingerprint(source: &str) -> String {
    let normalized: String = source
        .chars()
        .filter(char::is_ascii_alphanumeric)
        .collect();
    let digest = hex::encode(Sha256::digest(normalized.as_bytes()));
    digest[digest.len() - 16..].to_string()
}
