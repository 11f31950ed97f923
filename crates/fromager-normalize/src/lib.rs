//! Canonicalization of Python package names.
//!
//! <https://packaging.python.org/en/latest/specifications/name-normalization/>
//!
//! A canonical name is the form used everywhere a package is compared,
//! filed under a directory, or looked up in the dependency graph. An
//! override name is derived from it for use in environment variable names
//! and other contexts where `-` is not permitted.

use std::borrow::Cow;
use std::fmt;
use std::str::FromStr;

/// A package name normalized per the name-normalization specification:
/// lowercased, with runs of `-`, `_`, `.` collapsed to a single `-`.
///
/// Two requirements refer to the same package iff their `PackageName`s are
/// equal, so equality, hashing, and ordering are all defined on the
/// canonical string alone.
#[derive(Debug, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct PackageName(String);

/// An invalid (typically empty) package name was supplied.
#[derive(Debug, Clone, thiserror::Error)]
pub enum InvalidNameError {
    #[error("package name must not be empty")]
    Empty,
}

impl PackageName {
    /// Construct a `PackageName` from an arbitrary (non-normalized) input,
    /// canonicalizing it in the process.
    pub fn new(name: &str) -> Result<Self, InvalidNameError> {
        if name.trim().is_empty() {
            return Err(InvalidNameError::Empty);
        }
        Ok(Self(canonicalize(name)))
    }

    /// Wrap an already-canonical string without re-validating it.
    ///
    /// Only used internally by components that reconstruct a name from a
    /// value that was canonicalized earlier (e.g. deserializing a graph key).
    #[must_use]
    pub fn from_canonical_unchecked(canonical: String) -> Self {
        debug_assert_eq!(canonical, canonicalize(&canonical));
        Self(canonical)
    }

    /// The canonical string form, e.g. `"zope-interface"`.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The override form used for environment variables and Python import
    /// names, e.g. `"zope_interface"`.
    #[must_use]
    pub fn as_override(&self) -> String {
        overridify(&self.0)
    }

    /// The dist-info form used in wheel and `.dist-info` directory names.
    /// Identical to the canonical form as of PEP 503/427 alignment.
    #[must_use]
    pub fn as_dist_info_name(&self) -> &str {
        &self.0
    }
}

impl FromStr for PackageName {
    type Err = InvalidNameError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl fmt::Display for PackageName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Canonicalize a package name: lowercase, collapsing runs of `-`, `_`, `.`
/// into a single `-`.
///
/// Pure function with only one failure mode, rejection of the empty
/// string, surfaced via [`PackageName::new`] rather than here so that
/// callers who only need the string (e.g. for display) don't have to
/// handle a `Result`.
#[must_use]
pub fn canonicalize(name: &str) -> String {
    let lower = if name.bytes().all(|b| b.is_ascii()) {
        Cow::Owned(name.to_ascii_lowercase())
    } else {
        Cow::Owned(name.to_lowercase())
    };

    let mut out = String::with_capacity(lower.len());
    let mut last_was_separator = false;
    for ch in lower.chars() {
        if matches!(ch, '-' | '_' | '.') {
            if !last_was_separator && !out.is_empty() {
                out.push('-');
            }
            last_was_separator = true;
        } else {
            out.push(ch);
            last_was_separator = false;
        }
    }
    // Collapsing may leave a trailing separator if the input ended in one.
    while out.ends_with('-') {
        out.pop();
    }
    out
}

/// Derive the override name (valid as a Python identifier / env var
/// fragment) from an arbitrary name, canonicalizing first.
#[must_use]
pub fn overridify(name: &str) -> String {
    canonicalize(name).replace('-', "_")
}

#[cfg(feature = "serde")]
mod serde_impl {
    use super::PackageName;
    use serde::{de, Deserialize, Deserializer, Serialize, Serializer};

    impl Serialize for PackageName {
        fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
            serializer.serialize_str(&self.0)
        }
    }

    impl<'de> Deserialize<'de> for PackageName {
        fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
            let s = String::deserialize(deserializer)?;
            PackageName::new(&s).map_err(de::Error::custom)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case("friendly-bard", "friendly-bard")]
    #[test_case("Friendly-Bard", "friendly-bard")]
    #[test_case("FRIENDLY-BARD", "friendly-bard")]
    #[test_case("friendly.bard", "friendly-bard")]
    #[test_case("friendly_bard", "friendly-bard")]
    #[test_case("friendly--bard", "friendly-bard")]
    #[test_case("FrIeNdLy-._.-bArD", "friendly-bard")]
    fn test_canonicalize(input: &str, expected: &str) {
        assert_eq!(canonicalize(input), expected);
    }

    #[test]
    fn test_overridify() {
        assert_eq!(overridify("zope.interface"), "zope_interface");
        assert_eq!(overridify("Flit-Core"), "flit_core");
    }

    #[test]
    fn test_equality_is_on_canonical_form() {
        let a = PackageName::new("Stevedore").unwrap();
        let b = PackageName::new("stevedore").unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_empty_rejected() {
        assert!(PackageName::new("").is_err());
        assert!(PackageName::new("   ").is_err());
    }
}
