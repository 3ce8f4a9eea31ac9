//! API version parsing and distance.
//!
//! Versions follow the `v<major>[(alpha|beta)<minor>]` convention, ordered
//! by major first and stability second (alpha < beta < stable).

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Error parsing an API version string.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("invalid API version '{0}'")]
pub struct VersionError(pub String);

/// Maturity level of an API version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Stability {
    Alpha,
    Beta,
    Stable,
}

impl Stability {
    fn rank(self) -> u32 {
        match self {
            Stability::Alpha => 0,
            Stability::Beta => 1,
            Stability::Stable => 2,
        }
    }
}

impl fmt::Display for Stability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stability::Alpha => write!(f, "alpha"),
            Stability::Beta => write!(f, "beta"),
            Stability::Stable => write!(f, "stable"),
        }
    }
}

/// A parsed API version such as `v1`, `v2beta1` or `v1alpha3`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ApiVersion {
    pub major: u32,
    pub stability: Stability,
    /// Pre-release iteration; always 0 for stable versions.
    pub minor: u32,
}

impl ApiVersion {
    /// Number of major/stability steps between two versions.
    ///
    /// Pre-release iterations within the same major and stability do not
    /// count as a step.
    pub fn steps_to(&self, other: &ApiVersion) -> u32 {
        self.major.abs_diff(other.major) + self.stability.rank().abs_diff(other.stability.rank())
    }
}

impl Ord for ApiVersion {
    fn cmp(&self, other: &Self) -> Ordering {
        self.major
            .cmp(&other.major)
            .then(self.stability.cmp(&other.stability))
            .then(self.minor.cmp(&other.minor))
    }
}

impl PartialOrd for ApiVersion {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for ApiVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.stability {
            Stability::Stable => write!(f, "v{}", self.major),
            other => write!(f, "v{}{}{}", self.major, other, self.minor),
        }
    }
}

impl FromStr for ApiVersion {
    type Err = VersionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || VersionError(s.to_string());
        let rest = s.strip_prefix('v').ok_or_else(invalid)?;

        let digits_end = rest
            .find(|c: char| !c.is_ascii_digit())
            .unwrap_or(rest.len());
        let major: u32 = rest[..digits_end].parse().map_err(|_| invalid())?;
        let suffix = &rest[digits_end..];

        if suffix.is_empty() {
            return Ok(Self {
                major,
                stability: Stability::Stable,
                minor: 0,
            });
        }

        let (stability, minor) = if let Some(n) = suffix.strip_prefix("alpha") {
            (Stability::Alpha, n)
        } else if let Some(n) = suffix.strip_prefix("beta") {
            (Stability::Beta, n)
        } else {
            return Err(invalid());
        };

        let minor = if minor.is_empty() {
            0
        } else {
            minor.parse().map_err(|_| invalid())?
        };

        Ok(Self {
            major,
            stability,
            minor,
        })
    }
}

/// Steps between two version strings, or an error if either is malformed.
pub fn version_gap(from: &str, to: &str) -> Result<u32, VersionError> {
    let from: ApiVersion = from.parse()?;
    let to: ApiVersion = to.parse()?;
    Ok(from.steps_to(&to))
}
