//! Error types for the weir engine.
//!
//! The taxonomy separates structural failures (`FlowError`), the
//! cancellation signal (`TimeExceeded`), screening rejections
//! (`UnsafeCodeError`), registry lookups (`VersionResolutionError`),
//! sandbox transport failures (`SandboxCommError`) and the distinguished
//! circuit-breaker signal (`CircuitBreakerTrip`).

use thiserror::Error;

/// The main error type for weir operations.
#[derive(Debug, Error)]
pub enum WeirError {
    /// A structural flow error: missing operator, invalid DAG, reused flow.
    #[error("{0}")]
    Flow(#[from] FlowError),

    /// The run exceeded its time budget. Never caught locally, always
    /// propagated unchanged so callers can distinguish it from a generic
    /// failure.
    #[error("{0}")]
    TimeExceeded(#[from] TimeExceeded),

    /// A script was rejected by security screening.
    #[error("{0}")]
    UnsafeCode(#[from] UnsafeCodeError),

    /// A step kind or version could not be resolved.
    #[error("{0}")]
    VersionResolution(#[from] VersionResolutionError),

    /// The sandbox child process produced no, or an invalid, response.
    #[error("{0}")]
    SandboxComm(#[from] SandboxCommError),

    /// The rolling failure window tripped. Fatal to the whole run; the
    /// driver converts this into a non-zero process exit.
    #[error("{0}")]
    CircuitBreaker(#[from] CircuitBreakerTrip),

    /// A pipeline definition could not be parsed.
    #[error("{0}")]
    Definition(#[from] DefinitionError),

    /// A template variable or secret could not be resolved.
    #[error("{0}")]
    Variable(#[from] VariableError),

    /// A step implementation failed.
    #[error("step error: {0}")]
    Step(String),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl WeirError {
    /// Returns true for the cancellation signal, which must unwind every
    /// stack frame unmodified.
    #[must_use]
    pub const fn is_time_exceeded(&self) -> bool {
        matches!(self, Self::TimeExceeded(_))
    }

    /// Returns true for failures that abort the whole run rather than a
    /// single branch.
    #[must_use]
    pub const fn is_fatal(&self) -> bool {
        matches!(self, Self::TimeExceeded(_) | Self::CircuitBreaker(_))
    }

    /// Short name of the error class, used in failure reports.
    #[must_use]
    pub const fn kind_name(&self) -> &'static str {
        match self {
            Self::Flow(_) => "FlowError",
            Self::TimeExceeded(_) => "TimeExceeded",
            Self::UnsafeCode(_) => "UnsafeCodeError",
            Self::VersionResolution(_) => "VersionResolutionError",
            Self::SandboxComm(_) => "SandboxCommError",
            Self::CircuitBreaker(_) => "CircuitBreakerTrip",
            Self::Definition(_) => "DefinitionError",
            Self::Variable(_) => "VariableError",
            Self::Step(_) => "StepError",
            Self::Io(_) => "IoError",
            Self::Serialization(_) => "SerializationError",
        }
    }
}

/// Error raised for structural flow problems.
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct FlowError {
    /// The error message.
    pub message: String,
}

impl FlowError {
    /// Creates a new flow error.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Cancellation signal raised when a run exceeds its time budget.
///
/// Conceptually a subtype of [`FlowError`], but kept as its own type so the
/// runner can re-raise it without inspection.
#[derive(Debug, Clone, Error)]
#[error("time budget exceeded: {message}")]
pub struct TimeExceeded {
    /// What ran out of time.
    pub message: String,
}

impl TimeExceeded {
    /// Creates a new cancellation signal.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Error raised when security screening rejects a script, before any child
/// process exists.
#[derive(Debug, Clone, Error)]
#[error("unsafe code: {reason}")]
pub struct UnsafeCodeError {
    /// Why the script was rejected.
    pub reason: String,
}

impl UnsafeCodeError {
    /// Creates a new screening rejection.
    #[must_use]
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

/// Errors raised while resolving a step kind and version in the registry.
#[derive(Debug, Clone, Error)]
pub enum VersionResolutionError {
    /// The step kind is not part of the registry.
    #[error("unknown step kind: {0}")]
    UnknownKind(String),

    /// The kind exists but carries no implementations.
    #[error("no implementations registered for step kind '{kind}'")]
    NoVersions {
        /// The step kind.
        kind: String,
    },

    /// An exact version was requested but is absent.
    #[error("unsupported internal/{kind} version: {version}")]
    ExactNotFound {
        /// The step kind.
        kind: String,
        /// The requested version.
        version: String,
    },

    /// No available version satisfies the wildcard.
    #[error("no internal/{kind} version matches wildcard '{pattern}'")]
    WildcardUnmatched {
        /// The step kind.
        kind: String,
        /// The wildcard pattern.
        pattern: String,
    },

    /// The version string is neither exact, wildcard nor `latest`.
    #[error("malformed version spec: {0}")]
    Malformed(String),
}

/// Errors raised by the sandbox wire protocol.
#[derive(Debug, Clone, Error)]
pub enum SandboxCommError {
    /// The child produced no response line.
    #[error("no response from sandbox")]
    NoResponse,

    /// The response line was not a valid protocol message.
    #[error("invalid response from sandbox: {0}")]
    MalformedResponse(String),

    /// The bounded read elapsed without a response.
    #[error("sandbox produced no response within {timeout_secs} seconds")]
    Timeout {
        /// The configured read timeout.
        timeout_secs: u64,
    },

    /// A read or write on the child's streams failed.
    #[error("sandbox stream failure: {0}")]
    Stream(String),

    /// The child process is not running.
    #[error("sandbox process is not running")]
    NotRunning,
}

/// Distinguished fatal signal raised when an operator's rolling failure
/// window drops below half successes.
///
/// The engine never terminates the process itself; the top-level driver
/// observes this signal and converts it into a non-zero exit.
#[derive(Debug, Clone, Error)]
#[error(
    "failure rate for {operator} over last {window} executions is over 50%, aborting \
     ({successes}/{window} succeeded)"
)]
pub struct CircuitBreakerTrip {
    /// The offending operator.
    pub operator: String,
    /// The rolling window length.
    pub window: usize,
    /// Successes currently in the window.
    pub successes: usize,
}

/// Errors raised while parsing a pipeline definition, before any registry
/// lookup happens.
#[derive(Debug, Clone, Error)]
pub enum DefinitionError {
    /// The `uses` reference named a module other than `internal`.
    #[error("invalid module name: {module}. Only 'internal' is allowed")]
    InvalidModule {
        /// The offending module name.
        module: String,
    },

    /// The `uses` reference had no `@version` suffix.
    #[error("step '{step}' must specify a version using '@'. Found: {uses}")]
    MissingVersion {
        /// The step name.
        step: String,
        /// The offending `uses` value.
        uses: String,
    },

    /// The `uses` reference was not of the form `module/kind@version`.
    #[error("step '{step}' has a malformed uses reference: {uses}")]
    MalformedUses {
        /// The step name.
        step: String,
        /// The offending `uses` value.
        uses: String,
    },

    /// The definition document could not be deserialized.
    #[error("invalid pipeline definition: {0}")]
    Parse(String),

    /// Flow and tenant names must be dot-free.
    #[error("{kind} name should not contain dots. Use underscores instead")]
    DottedName {
        /// Either "flow" or "tenant".
        kind: String,
    },
}

/// Errors raised during `{{namespace.key}}` substitution.
#[derive(Debug, Clone, Error)]
pub enum VariableError {
    /// The referenced namespace or key is absent.
    #[error("missing variable: {namespace}.{key}")]
    MissingVariable {
        /// The namespace part of the placeholder.
        namespace: String,
        /// The key part of the placeholder.
        key: String,
    },

    /// A secret name resolved through the `secrets` namespace was not found
    /// in the secret store.
    #[error("secret '{name}' not found")]
    MissingSecret {
        /// The secret name.
        name: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_time_exceeded_classification() {
        let err = WeirError::from(TimeExceeded::new("row budget"));
        assert!(err.is_time_exceeded());
        assert!(err.is_fatal());

        let err = WeirError::from(FlowError::new("nope"));
        assert!(!err.is_time_exceeded());
        assert!(!err.is_fatal());
    }

    #[test]
    fn test_circuit_breaker_is_fatal_but_not_cancellation() {
        let err = WeirError::from(CircuitBreakerTrip {
            operator: "ReadStep".to_string(),
            window: 10,
            successes: 3,
        });
        assert!(err.is_fatal());
        assert!(!err.is_time_exceeded());
        assert!(err.to_string().contains("ReadStep"));
        assert!(err.to_string().contains("over 50%"));
    }

    #[test]
    fn test_kind_names() {
        assert_eq!(
            WeirError::from(UnsafeCodeError::new("import os")).kind_name(),
            "UnsafeCodeError"
        );
        assert_eq!(
            WeirError::from(SandboxCommError::NoResponse).kind_name(),
            "SandboxCommError"
        );
    }

    #[test]
    fn test_version_resolution_messages() {
        let err = VersionResolutionError::ExactNotFound {
            kind: "read".to_string(),
            version: "999.999.999".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "unsupported internal/read version: 999.999.999"
        );
    }
}
