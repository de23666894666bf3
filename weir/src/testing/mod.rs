//! Test fixtures: scripted transforms and helpers for exercising the
//! engine without touching real step implementations.

use crate::context::ExecutionContext;
use crate::engine::{Operator, Outcome, Payload, Transform};
use crate::errors::{TimeExceeded, WeirError};
use crate::registry::{StepDescriptor, StepKind, Version};
use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// A transform with a fixed, scripted behavior.
#[derive(Debug)]
pub struct StaticStep {
    fan_out: Option<usize>,
    stop: bool,
}

impl StaticStep {
    /// Passes data and context through unchanged.
    #[must_use]
    pub const fn passthrough() -> Self {
        Self {
            fan_out: None,
            stop: false,
        }
    }

    /// Terminates every path.
    #[must_use]
    pub const fn stop() -> Self {
        Self {
            fan_out: None,
            stop: true,
        }
    }

    /// Produces `count` copies of the input pair.
    #[must_use]
    pub const fn fan_out(count: usize) -> Self {
        Self {
            fan_out: Some(count),
            stop: false,
        }
    }
}

#[async_trait]
impl Transform for StaticStep {
    fn name(&self) -> &'static str {
        "StaticStep"
    }

    fn source_text(&self) -> String {
        format!("StaticStep fan_out={:?} stop={}", self.fan_out, self.stop)
    }

    async fn apply(
        &mut self,
        data: &Payload,
        context: &ExecutionContext,
    ) -> Result<Outcome, WeirError> {
        if self.stop {
            return Ok(Outcome::Stop);
        }
        match self.fan_out {
            Some(count) => Ok(Outcome::Many(
                (0..count)
                    .map(|_| (data.clone(), context.clone()))
                    .collect(),
            )),
            None => Ok(Outcome::One(data.clone(), context.clone())),
        }
    }
}

/// A transform that fails, counting its invocations.
#[derive(Debug)]
pub struct FailingStep {
    message: String,
    time_exceeded: bool,
    calls: Arc<AtomicUsize>,
}

impl FailingStep {
    /// Fails every invocation with a retryable step error.
    #[must_use]
    pub fn always(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            time_exceeded: false,
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Fails every invocation with the cancellation signal.
    #[must_use]
    pub fn time_exceeded(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            time_exceeded: true,
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Shared invocation counter.
    #[must_use]
    pub fn calls(&self) -> Arc<AtomicUsize> {
        self.calls.clone()
    }
}

#[async_trait]
impl Transform for FailingStep {
    fn name(&self) -> &'static str {
        "FailingStep"
    }

    fn source_text(&self) -> String {
        format!("FailingStep {}", self.message)
    }

    async fn apply(
        &mut self,
        _data: &Payload,
        _context: &ExecutionContext,
    ) -> Result<Outcome, WeirError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.time_exceeded {
            Err(TimeExceeded::new(self.message.clone()).into())
        } else {
            Err(WeirError::Step(self.message.clone()))
        }
    }
}

/// A transform that records everything it sees, then passes data through
/// after stamping its own name into the context.
#[derive(Debug, Default)]
pub struct RecordingStep {
    label: Option<String>,
    seen: Arc<Mutex<Vec<(Payload, ExecutionContext)>>>,
    shutdowns: Arc<AtomicUsize>,
}

impl RecordingStep {
    /// Creates a recording step.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a recording step that stamps `label` into each context it
    /// forwards, under the key `touched_by`.
    #[must_use]
    pub fn labelled(label: impl Into<String>) -> Self {
        Self {
            label: Some(label.into()),
            ..Self::default()
        }
    }

    /// Shared log of observed invocations.
    #[must_use]
    pub fn seen(&self) -> Arc<Mutex<Vec<(Payload, ExecutionContext)>>> {
        self.seen.clone()
    }

    /// Shared shutdown counter.
    #[must_use]
    pub fn shutdowns(&self) -> Arc<AtomicUsize> {
        self.shutdowns.clone()
    }
}

#[async_trait]
impl Transform for RecordingStep {
    fn name(&self) -> &'static str {
        "RecordingStep"
    }

    fn source_text(&self) -> String {
        "RecordingStep".to_string()
    }

    async fn apply(
        &mut self,
        data: &Payload,
        context: &ExecutionContext,
    ) -> Result<Outcome, WeirError> {
        self.seen.lock().push((data.clone(), context.clone()));
        let mut context = context.clone();
        if let Some(label) = &self.label {
            context.insert("touched_by", Value::String(label.clone()));
        }
        Ok(Outcome::One(data.clone(), context))
    }

    async fn shutdown(&mut self) {
        self.shutdowns.fetch_add(1, Ordering::SeqCst);
    }
}

/// Wraps a transform in an operator with the given step kind and default
/// policy.
#[must_use]
pub fn operator_for(kind: StepKind, transform: Box<dyn Transform>) -> Operator {
    Operator::new(
        StepDescriptor {
            kind,
            version: Version::new(1, 0, 0),
        },
        transform,
        &serde_json::Map::new(),
    )
}
