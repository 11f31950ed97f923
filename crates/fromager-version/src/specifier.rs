//! PEP 440 version specifiers (`>=1.0`, `==1.19.*`, `~=2.2`, ...).

use std::fmt;
use std::str::FromStr;

use crate::version::Version;

/// A single comparison operator from PEP 440.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operator {
    Equal,
    EqualStar,
    NotEqual,
    NotEqualStar,
    LessThanEqual,
    GreaterThanEqual,
    LessThan,
    GreaterThan,
    TildeEqual,
    ArbitraryEqual,
}

impl Operator {
    fn as_str(self) -> &'static str {
        match self {
            Self::Equal | Self::EqualStar => "==",
            Self::NotEqual | Self::NotEqualStar => "!=",
            Self::LessThanEqual => "<=",
            Self::GreaterThanEqual => ">=",
            Self::LessThan => "<",
            Self::GreaterThan => ">",
            Self::TildeEqual => "~=",
            Self::ArbitraryEqual => "===",
        }
    }
}

/// The operator text did not match a known PEP 440 comparison operator.
#[derive(Debug, Clone, thiserror::Error)]
#[error("invalid version specifier: `{0}`")]
pub struct SpecifierParseError(pub String);

/// A single `<operator><version>` clause, e.g. `>=1.16`.
#[derive(Debug, Clone)]
pub struct VersionSpecifier {
    operator: Operator,
    version: Version,
    /// Raw version text, needed to detect a trailing `.*` wildcard and to
    /// preserve arbitrary-equal's unparsed comparand.
    raw_version: String,
}

impl VersionSpecifier {
    #[must_use]
    pub fn operator(&self) -> Operator {
        self.operator
    }

    #[must_use]
    pub fn version(&self) -> &Version {
        &self.version
    }

    /// Does `version` satisfy this single clause?
    ///
    /// Pre-release admission is the caller's responsibility (see
    /// [`crate::requirement::Requirement::is_prerelease_admitted`]); this
    /// method only evaluates the operator itself.
    #[must_use]
    pub fn contains(&self, version: &Version) -> bool {
        match self.operator {
            Operator::Equal => {
                if self.raw_version.ends_with(".*") {
                    version.base_version() == self.version.base_version()
                        && prefix_matches(version, &self.version)
                } else {
                    version == &self.version
                }
            }
            Operator::EqualStar => prefix_matches(version, &self.version),
            Operator::NotEqual => version != &self.version,
            Operator::NotEqualStar => !prefix_matches(version, &self.version),
            Operator::LessThanEqual => version <= &self.version,
            Operator::GreaterThanEqual => version >= &self.version,
            Operator::LessThan => {
                version < &self.version && !(version.base_version() == self.version.base_version())
            }
            Operator::GreaterThan => {
                version > &self.version
                    && !(version.base_version() == self.version.base_version())
                    && !version.is_local()
            }
            Operator::TildeEqual => {
                // ~=1.2.3 means >=1.2.3, ==1.2.* (compatible release).
                version >= &self.version && prefix_matches(version, &tilde_prefix(&self.version))
            }
            Operator::ArbitraryEqual => version.to_string() == self.raw_version,
        }
    }
}

fn prefix_matches(version: &Version, prefix: &Version) -> bool {
    let full = version.release();
    let pre = prefix.release();
    if full.len() < pre.len() {
        return false;
    }
    version.epoch() == prefix.epoch() && full[..pre.len()] == pre[..]
}

/// For `~=`, the prefix to match is the release with its final segment
/// dropped, e.g. `~=2.2.1` matches `2.2.*` (prefix `2.2`), and `~=2.2`
/// matches `2.*` (prefix `2`).
fn tilde_prefix(version: &Version) -> Version {
    let mut release = version.release().to_vec();
    release.pop();
    Version::new(release)
}

impl FromStr for VersionSpecifier {
    type Err = SpecifierParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let (op_str, rest) = [
            "===", "~=", "==", "!=", "<=", ">=", "<", ">",
        ]
        .iter()
        .find_map(|op| s.strip_prefix(op).map(|rest| (*op, rest)))
        .ok_or_else(|| SpecifierParseError(s.to_string()))?;

        let raw_version = rest.trim().to_string();

        let operator = match op_str {
            "==" if raw_version.ends_with(".*") => Operator::EqualStar,
            "==" => Operator::Equal,
            "!=" if raw_version.ends_with(".*") => Operator::NotEqualStar,
            "!=" => Operator::NotEqual,
            "<=" => Operator::LessThanEqual,
            ">=" => Operator::GreaterThanEqual,
            "<" => Operator::LessThan,
            ">" => Operator::GreaterThan,
            "~=" => Operator::TildeEqual,
            "===" => Operator::ArbitraryEqual,
            _ => unreachable!("matched by strip_prefix above"),
        };

        let version_text = raw_version.trim_end_matches(".*");
        let version = if operator == Operator::ArbitraryEqual {
            // Arbitrary equality compares raw strings; still need a Version
            // for API symmetry, fall back to release-only parse best-effort.
            Version::from_str(version_text).unwrap_or_else(|_| Version::new(vec![0]))
        } else {
            Version::from_str(version_text).map_err(|_| SpecifierParseError(s.to_string()))?
        };

        Ok(Self {
            operator,
            version,
            raw_version,
        })
    }
}

impl fmt::Display for VersionSpecifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.operator.as_str(), self.raw_version)
    }
}

/// A comma-separated, AND-combined set of [`VersionSpecifier`] clauses.
#[derive(Debug, Clone, Default)]
pub struct VersionSpecifiers(Vec<VersionSpecifier>);

impl VersionSpecifiers {
    #[must_use]
    pub fn empty() -> Self {
        Self(Vec::new())
    }

    #[must_use]
    pub fn iter(&self) -> impl Iterator<Item = &VersionSpecifier> {
        self.0.iter()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Does `version` satisfy every clause in this set?
    #[must_use]
    pub fn contains(&self, version: &Version) -> bool {
        self.0.iter().all(|spec| spec.contains(version))
    }

    /// `true` if any clause explicitly pins or admits a pre-release, e.g.
    /// `==1.0a1` or `>=1.0a1`. Used to decide whether an otherwise-excluded
    /// pre-release candidate should be considered.
    #[must_use]
    pub fn explicitly_admits_prerelease(&self) -> bool {
        self.0.iter().any(|spec| spec.version.is_prerelease())
    }

    /// Intersect two specifier sets by simple clause concatenation, used by
    /// `explain-duplicates` to test "does a single version satisfy all
    /// requirements" by checking the merged set against a candidate
    /// version, rather than attempting interval arithmetic.
    #[must_use]
    pub fn merged_with(&self, other: &Self) -> Self {
        let mut combined = self.0.clone();
        combined.extend(other.0.iter().cloned());
        Self(combined)
    }
}

impl FromStr for VersionSpecifiers {
    type Err = SpecifierParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() {
            return Ok(Self::empty());
        }
        let specs = s
            .split(',')
            .map(str::trim)
            .filter(|c| !c.is_empty())
            .map(VersionSpecifier::from_str)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self(specs))
    }
}

impl fmt::Display for VersionSpecifiers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts = self.0.iter().map(ToString::to_string).collect::<Vec<_>>();
        write!(f, "{}", parts.join(","))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exact_wildcard() {
        let spec: VersionSpecifiers = "==1.19.*".parse().unwrap();
        assert!(spec.contains(&"1.19.0".parse().unwrap()));
        assert!(spec.contains(&"1.19.5".parse().unwrap()));
        assert!(!spec.contains(&"1.20.0".parse().unwrap()));
    }

    #[test]
    fn test_tilde_equal() {
        let spec: VersionSpecifiers = "~=2.2".parse().unwrap();
        assert!(spec.contains(&"2.3.0".parse().unwrap()));
        assert!(!spec.contains(&"3.0.0".parse().unwrap()));

        let spec2: VersionSpecifiers = "~=2.2.1".parse().unwrap();
        assert!(spec2.contains(&"2.2.9".parse().unwrap()));
        assert!(!spec2.contains(&"2.3.0".parse().unwrap()));
    }

    #[test]
    fn test_and_combination() {
        let spec: VersionSpecifiers = ">=1.16, <2.0".parse().unwrap();
        assert!(spec.contains(&"1.19.0".parse().unwrap()));
        assert!(!spec.contains(&"2.0.0".parse().unwrap()));
        assert!(!spec.contains(&"1.0.0".parse().unwrap()));
    }

    #[test]
    fn test_exclusive_ordering_ignores_local() {
        let spec: VersionSpecifiers = ">1.0".parse().unwrap();
        assert!(!spec.contains(&"1.0+local".parse().unwrap()));
    }

    #[test]
    fn test_admits_prerelease() {
        let spec: VersionSpecifiers = "==2.0rc3".parse().unwrap();
        assert!(spec.explicitly_admits_prerelease());
        let spec2: VersionSpecifiers = "<2.0.1".parse().unwrap();
        assert!(!spec2.explicitly_admits_prerelease());
    }
}
