//! The flow engine.
//!
//! This module provides:
//! - The [`Flow`] DAG container and its validation and traversal queries
//! - The [`Operator`] execution wrapper (retries, circuit breaking,
//!   version fingerprinting, sensors)
//! - The [`FlowRunner`] depth-first executor

mod flow;
mod operator;
mod runner;


pub use flow::Flow;
pub use operator::{fingerprint, Operator, Outcome, Payload, RollingWindow, Sensors, Transform};
pub use runner::FlowRunner;
