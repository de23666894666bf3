//! Step version parsing and selection.
//!
//! Versions are three-part numeric tuples. A requested version is either
//! `latest`, an exact `major.minor.patch`, or a wildcard such as `1.*` or
//! `1.2.*`. Wildcards are translated to a regex with each component either
//! required or `\d+`; the maximum matching version wins.

use crate::errors::VersionResolutionError;
use regex::Regex;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// A concrete three-part step version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Version {
    /// Major component.
    pub major: u32,
    /// Minor component.
    pub minor: u32,
    /// Patch component.
    pub patch: u32,
}

impl Version {
    /// Creates a version from its components.
    #[must_use]
    pub const fn new(major: u32, minor: u32, patch: u32) -> Self {
        Self {
            major,
            minor,
            patch,
        }
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

impl FromStr for Version {
    type Err = VersionResolutionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let malformed = || VersionResolutionError::Malformed(s.to_string());
        let mut parts = s.split('.');
        let major = parts
            .next()
            .and_then(|p| p.parse().ok())
            .ok_or_else(malformed)?;
        let minor = parts
            .next()
            .and_then(|p| p.parse().ok())
            .ok_or_else(malformed)?;
        let patch = parts
            .next()
            .and_then(|p| p.parse().ok())
            .ok_or_else(malformed)?;
        if parts.next().is_some() {
            return Err(malformed());
        }
        Ok(Self::new(major, minor, patch))
    }
}

/// A requested version: exact, wildcard, or `latest`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VersionSpec {
    /// The maximum available version.
    Latest,
    /// One precise version.
    Exact(Version),
    /// A wildcard pattern such as `1.*` or `1.2.*`.
    Wildcard(String),
}

impl fmt::Display for VersionSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Latest => write!(f, "latest"),
            Self::Exact(version) => write!(f, "{version}"),
            Self::Wildcard(pattern) => write!(f, "{pattern}"),
        }
    }
}

impl FromStr for VersionSpec {
    type Err = VersionResolutionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.is_empty() {
            return Err(VersionResolutionError::Malformed(s.to_string()));
        }
        if s == "latest" {
            return Ok(Self::Latest);
        }
        if s.contains('*') {
            // validated eagerly so malformed patterns fail at parse time
            wildcard_regex(s)?;
            return Ok(Self::Wildcard(s.to_string()));
        }
        Ok(Self::Exact(s.parse()?))
    }
}

/// Translates a wildcard pattern into an anchored regex over rendered
/// versions, with each numeric component either required or `\d+`.
fn wildcard_regex(pattern: &str) -> Result<Regex, VersionResolutionError> {
    let malformed = || VersionResolutionError::Malformed(pattern.to_string());
    let parts: Vec<&str> = pattern.split('.').collect();
    if parts.is_empty() || parts.len() > 3 {
        return Err(malformed());
    }

    let mut components = Vec::with_capacity(3);
    let mut saw_star = false;
    for slot in 0..3 {
        match parts.get(slot) {
            Some(&"*") => {
                saw_star = true;
                components.push(r"\d+".to_string());
            }
            Some(part) => {
                if saw_star || part.is_empty() || !part.chars().all(|c| c.is_ascii_digit()) {
                    return Err(malformed());
                }
                components.push((*part).to_string());
            }
            None => {
                if !saw_star {
                    return Err(malformed());
                }
                components.push(r"\d+".to_string());
            }
        }
    }

    Regex::new(&format!("^{}$", components.join(r"\."))).map_err(|_| malformed())
}

/// Selects one entry from the available versions of a step kind.
///
/// # Errors
///
/// Returns a [`VersionResolutionError`] when no implementations exist, an
/// exact version is absent, or no version satisfies the wildcard.
pub fn select<'a, T>(
    kind: &str,
    spec: &VersionSpec,
    available: &'a BTreeMap<Version, T>,
) -> Result<(Version, &'a T), VersionResolutionError> {
    let Some((latest, _)) = available.iter().next_back() else {
        return Err(VersionResolutionError::NoVersions {
            kind: kind.to_string(),
        });
    };

    match spec {
        VersionSpec::Latest => {
            let version = *latest;
            available
                .get(&version)
                .map(|value| (version, value))
                .ok_or(VersionResolutionError::NoVersions {
                    kind: kind.to_string(),
                })
        }
        VersionSpec::Exact(version) => available.get(version).map(|value| (*version, value)).ok_or(
            VersionResolutionError::ExactNotFound {
                kind: kind.to_string(),
                version: version.to_string(),
            },
        ),
        VersionSpec::Wildcard(pattern) => {
            let regex = wildcard_regex(pattern)?;
            available
                .iter()
                .filter(|(version, _)| regex.is_match(&version.to_string()))
                .next_back()
                .map(|(version, value)| (*version, value))
                .ok_or(VersionResolutionError::WildcardUnmatched {
                    kind: kind.to_string(),
                    pattern: pattern.clone(),
                })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn table() -> BTreeMap<Version, &'static str> {
        BTreeMap::from([
            (Version::new(0, 0, 1), "A"),
            (Version::new(0, 0, 2), "B"),
            (Version::new(0, 1, 0), "C"),
            (Version::new(1, 0, 0), "D"),
        ])
    }

    fn pick(spec: &str) -> Result<&'static str, VersionResolutionError> {
        let spec: VersionSpec = spec.parse()?;
        select("test", &spec, &table()).map(|(_, value)| *value)
    }

    #[test]
    fn test_version_ordering_is_componentwise() {
        assert!(Version::new(0, 9, 9) < Version::new(1, 0, 0));
        assert!(Version::new(0, 1, 0) < Version::new(0, 2, 0));
        assert!(Version::new(1, 0, 10) > Version::new(1, 0, 2));
    }

    #[test]
    fn test_version_matching() {
        assert_eq!(pick("0.0.1").unwrap(), "A");
        assert_eq!(pick("0.*").unwrap(), "C");
        assert_eq!(pick("0.0.*").unwrap(), "B");
        assert_eq!(pick("latest").unwrap(), "D");
        assert_eq!(pick("1.0.0").unwrap(), "D");
        assert_eq!(pick("0.1.*").unwrap(), "C");
        assert_eq!(pick("1.*").unwrap(), "D");
    }

    #[test]
    fn test_unmatched_wildcard_fails() {
        assert!(matches!(
            pick("2.*"),
            Err(VersionResolutionError::WildcardUnmatched { .. })
        ));
    }

    #[test]
    fn test_exact_absent_fails() {
        assert!(matches!(
            pick("9.9.9"),
            Err(VersionResolutionError::ExactNotFound { .. })
        ));
    }

    #[test]
    fn test_empty_table_fails() {
        let empty: BTreeMap<Version, ()> = BTreeMap::new();
        assert!(matches!(
            select("test", &VersionSpec::Latest, &empty),
            Err(VersionResolutionError::NoVersions { .. })
        ));
    }

    #[test]
    fn test_malformed_specs_rejected() {
        for bad in ["", "1.2", "1.2.3.4", "one.two.three", "*.1", "1.*.2", "1..3"] {
            assert!(
                matches!(
                    bad.parse::<VersionSpec>(),
                    Err(VersionResolutionError::Malformed(_))
                ),
                "expected {bad:?} to be rejected"
            );
        }
    }

    #[test]
    fn test_bare_star_selects_latest() {
        assert_eq!(pick("*").unwrap(), "D");
    }
}
