//! # Weir
//!
//! A small engine for data-processing pipelines described as directed
//! acyclic graphs of named steps. Each step is resolved by name and
//! semantic version from a step registry, wrapped with retry and
//! circuit-breaking policy, and one step kind executes untrusted code in
//! an isolated child process reached over a line-oriented protocol.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use weir::prelude::*;
//!
//! let definition = FileDefinitionStore::new("definitions").get("example")?;
//! let mut flow = definition.build_flow()?;
//!
//! let result = {
//!     let mut runner = flow.begin()?;
//!     runner.run(Payload::Record(data), ExecutionContext::new(), 0.001).await
//! };
//! flow.finalize(result.as_ref().is_err_and(|e| e.is_fatal())).await;
//! result?;
//! ```

#![forbid(unsafe_code)]
#![warn(
    clippy::all,
    clippy::pedantic,
    missing_docs,
    rust_2018_idioms
)]
#![allow(
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc
)]

pub mod context;
pub mod engine;
pub mod errors;
pub mod model;
pub mod providers;
pub mod registry;
pub mod sandbox;
pub mod sink;
pub mod steps;
pub mod testing;
pub mod vars;

/// Arbitrary key-value configuration, as carried by pipeline definitions.
pub type Config = serde_json::Map<String, serde_json::Value>;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::context::ExecutionContext;
    pub use crate::engine::{Flow, FlowRunner, Operator, Outcome, Payload, Sensors, Transform};
    pub use crate::errors::{
        CircuitBreakerTrip, FlowError, SandboxCommError, TimeExceeded, UnsafeCodeError,
        VersionResolutionError, WeirError,
    };
    pub use crate::model::{PipelineDefinition, StepDefinition, TenantProfile, UsesRef};
    pub use crate::providers::{
        secret_store_from_env, DefinitionStore, EnvSecretStore, FileDefinitionStore,
        FileTenantStore, SecretStore, TenantStore,
    };
    pub use crate::registry::{StepDescriptor, StepKind, Version, VersionSpec};
    pub use crate::sandbox::{screen_code, SandboxOptions, SandboxSession};
    pub use crate::sink::{CollectingErrorSink, ErrorSink, FailureReport, LoggingErrorSink};
    pub use crate::Config;
}
