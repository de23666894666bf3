//! The step registry: resolves a step kind and requested version to one
//! concrete implementation.
//!
//! Step kinds form a closed set; each kind's implementations live in
//! version-named modules (`version_1_0_0`, …) under [`crate::steps`], one
//! implementation per version unit. Resolution is a pure function from
//! `(kind, version)` to a descriptor; instantiation turns a descriptor
//! into a boxed [`Transform`].

mod version;

pub use version::{select, Version, VersionSpec};

use crate::engine::Transform;
use crate::errors::{VersionResolutionError, WeirError};
use crate::steps;
use crate::Config;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// The closed set of step kinds the registry can resolve.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StepKind {
    /// Reads records from a source.
    Read,
    /// Filters records.
    Filter,
    /// Persists records.
    Save,
    /// Runs user-supplied code in a sandboxed child process.
    Python,
    /// The designated terminal marker; every flow path must end here.
    End,
}

impl StepKind {
    /// All registered kinds.
    pub const ALL: [Self; 5] = [
        Self::Read,
        Self::Filter,
        Self::Save,
        Self::Python,
        Self::End,
    ];

    /// The kind's name as used in `uses` references.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Read => "read",
            Self::Filter => "filter",
            Self::Save => "save",
            Self::Python => "python",
            Self::End => "end",
        }
    }
}

impl fmt::Display for StepKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StepKind {
    type Err = VersionResolutionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| VersionResolutionError::UnknownKind(s.to_string()))
    }
}

/// A resolved step implementation: kind plus concrete version.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StepDescriptor {
    /// The step kind.
    pub kind: StepKind,
    /// The resolved implementation version.
    pub version: Version,
}

/// Constructor for one step implementation: `(config, flow_config)` to a
/// boxed transform.
pub type StepFactory = fn(Config, Config) -> Result<Box<dyn Transform>, WeirError>;

fn catalog(kind: StepKind) -> BTreeMap<Version, StepFactory> {
    match kind {
        StepKind::Read => steps::read::versions(),
        StepKind::Filter => steps::filter::versions(),
        StepKind::Save => steps::save::versions(),
        StepKind::Python => steps::python::versions(),
        StepKind::End => steps::end::versions(),
    }
}

/// Resolves a step kind name and requested version to a descriptor.
///
/// # Errors
///
/// Returns a [`VersionResolutionError`] when the kind is unknown, no
/// implementations exist, an exact version is absent, or no version
/// satisfies a wildcard.
pub fn resolve(kind: &str, spec: &VersionSpec) -> Result<StepDescriptor, VersionResolutionError> {
    let kind: StepKind = kind.parse()?;
    let available = catalog(kind);
    let (version, _) = select(kind.as_str(), spec, &available)?;
    Ok(StepDescriptor { kind, version })
}

/// Lists the available versions of a step kind, ascending.
#[must_use]
pub fn available_versions(kind: StepKind) -> Vec<Version> {
    catalog(kind).into_keys().collect()
}

/// Instantiates the transform behind a descriptor.
///
/// # Errors
///
/// Returns a [`VersionResolutionError`] if the descriptor no longer maps
/// to a registered implementation, or the implementation's own
/// construction error (missing config, failed screening, spawn failure).
pub fn instantiate(
    descriptor: &StepDescriptor,
    config: Config,
    flow_config: Config,
) -> Result<Box<dyn Transform>, WeirError> {
    let available = catalog(descriptor.kind);
    let factory =
        available
            .get(&descriptor.version)
            .ok_or_else(|| VersionResolutionError::ExactNotFound {
                kind: descriptor.kind.to_string(),
                version: descriptor.version.to_string(),
            })?;
    factory(config, flow_config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_kind_round_trip() {
        for kind in StepKind::ALL {
            assert_eq!(kind.as_str().parse::<StepKind>().unwrap(), kind);
        }
    }

    #[test]
    fn test_unknown_kind_fails() {
        assert!(matches!(
            resolve("teleport", &VersionSpec::Latest),
            Err(VersionResolutionError::UnknownKind(_))
        ));
    }

    #[test]
    fn test_every_kind_resolves_latest() {
        for kind in StepKind::ALL {
            let descriptor = resolve(kind.as_str(), &VersionSpec::Latest).unwrap();
            assert_eq!(descriptor.kind, kind);
            assert_eq!(descriptor.version, Version::new(1, 0, 0));
        }
    }

    #[test]
    fn test_exact_and_wildcard_resolution() {
        let exact = resolve("filter", &"1.0.0".parse().unwrap()).unwrap();
        assert_eq!(exact.version, Version::new(1, 0, 0));

        let wildcard = resolve("filter", &"1.*".parse().unwrap()).unwrap();
        assert_eq!(wildcard.version, Version::new(1, 0, 0));

        assert!(matches!(
            resolve("filter", &"2.*".parse().unwrap()),
            Err(VersionResolutionError::WildcardUnmatched { .. })
        ));
        assert!(matches!(
            resolve("filter", &"999.999.999".parse().unwrap()),
            Err(VersionResolutionError::ExactNotFound { .. })
        ));
    }

    #[test]
    fn test_instantiate_builtin_steps() {
        for kind in [StepKind::Filter, StepKind::End] {
            let descriptor = resolve(kind.as_str(), &VersionSpec::Latest).unwrap();
            let transform = instantiate(&descriptor, Config::new(), Config::new()).unwrap();
            assert!(!transform.name().is_empty());
        }
    }

    #[test]
    fn test_available_versions_sorted() {
        let versions = available_versions(StepKind::Read);
        assert!(!versions.is_empty());
        let mut sorted = versions.clone();
        sorted.sort();
        assert_eq!(versions, sorted);
    }
}
