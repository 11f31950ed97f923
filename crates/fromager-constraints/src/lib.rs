//! The constraints store: a requirements-file-style document answering
//! "is version V of name N allowed?" (`spec.md` §4.4, §6).

use std::path::Path;

use fromager_normalize::PackageName;
use fromager_version::{Requirement, Version, VersionSpecifiers};
use rustc_hash::FxHashMap;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error("invalid constraint on line {line}: `{text}`")]
    InvalidConstraint { line: usize, text: String },
    #[error(
        "conflicting constraints for `{name}`: {first} and {second} cannot both be pinned exactly"
    )]
    ConstraintConflict {
        name: String,
        first: String,
        second: String,
    },
}

#[derive(Debug, Clone)]
struct Constraint {
    specifiers: VersionSpecifiers,
    /// `true` if this single clause is an exact `==` pin (not a wildcard),
    /// used for conflict detection and for "express a user pin".
    exact_pin: Option<Version>,
    admits_prerelease: bool,
    raw: String,
}

/// Parsed constraints, grouped by canonical name.
///
/// When `skip_constraints` mode is active (`spec.md` Non-goals / §4.4),
/// [`ConstraintsStore::allowed`] always returns `true` — the store is not
/// consulted to *reject* a candidate — but [`ConstraintsStore::pinned`] and
/// [`ConstraintsStore::admits_prerelease`] still answer from the loaded
/// constraints, because the spec is explicit that a skip-constraints run
/// may still *express* a user's version pin.
#[derive(Debug, Default)]
pub struct ConstraintsStore {
    by_name: FxHashMap<PackageName, Vec<Constraint>>,
    skip_constraints: bool,
}

impl ConstraintsStore {
    #[must_use]
    pub fn empty(skip_constraints: bool) -> Self {
        Self {
            by_name: FxHashMap::default(),
            skip_constraints,
        }
    }

    pub fn load(path: &Path, skip_constraints: bool) -> Result<Self, Error> {
        let text = fs_err::read_to_string(path)?;
        Self::parse(&text, skip_constraints)
    }

    pub fn parse(text: &str, skip_constraints: bool) -> Result<Self, Error> {
        let mut by_name: FxHashMap<PackageName, Vec<Constraint>> = FxHashMap::default();

        for (idx, raw_line) in text.lines().enumerate() {
            let line = raw_line.split('#').next().unwrap_or("").trim();
            if line.is_empty() {
                continue;
            }
            let req: Requirement = line
                .parse()
                .map_err(|_| Error::InvalidConstraint {
                    line: idx + 1,
                    text: raw_line.to_string(),
                })?;

            let exact_pin = single_exact_pin(&req.specifiers);
            let constraint = Constraint {
                admits_prerelease: req.admits_prerelease_explicitly(),
                specifiers: req.specifiers,
                exact_pin,
                raw: line.to_string(),
            };

            by_name.entry(req.name).or_default().push(constraint);
        }

        if !skip_constraints {
            for (name, constraints) in &by_name {
                let pins: Vec<&Version> = constraints.iter().filter_map(|c| c.exact_pin.as_ref()).collect();
                if let (Some(first), Some(second)) = (pins.first(), pins.get(1)) {
                    if first != second {
                        return Err(Error::ConstraintConflict {
                            name: name.to_string(),
                            first: first.to_string(),
                            second: second.to_string(),
                        });
                    }
                }
            }
        }

        Ok(Self {
            by_name,
            skip_constraints,
        })
    }

    /// Is `version` of `name` allowed?
    ///
    /// Always `true` in `skip-constraints` mode: the store is not consulted
    /// when choosing candidates in that mode.
    #[must_use]
    pub fn allowed(&self, name: &PackageName, version: &Version) -> bool {
        if self.skip_constraints {
            return true;
        }
        match self.by_name.get(name) {
            None => true,
            Some(constraints) => constraints.iter().all(|c| c.specifiers.contains(version)),
        }
    }

    /// The single exact-pin version for `name`, if the constraints file
    /// pins it with `==`. Used by the resolver to short-circuit candidate
    /// search and by the repeatable-build layer.
    #[must_use]
    pub fn pinned(&self, name: &PackageName) -> Option<&Version> {
        self.by_name
            .get(name)?
            .iter()
            .find_map(|c| c.exact_pin.as_ref())
    }

    /// `true` if any constraint clause for `name` explicitly admits a
    /// pre-release (`spec.md` §4.5 "Pre-release candidates are yielded
    /// only if ... a matching constraint does").
    #[must_use]
    pub fn admits_prerelease(&self, name: &PackageName) -> bool {
        self.by_name
            .get(name)
            .is_some_and(|cs| cs.iter().any(|c| c.admits_prerelease))
    }

    #[must_use]
    pub fn raw_for(&self, name: &PackageName) -> Option<String> {
        self.by_name
            .get(name)
            .map(|cs| cs.iter().map(|c| c.raw.clone()).collect::<Vec<_>>().join(","))
    }
}

fn single_exact_pin(specifiers: &VersionSpecifiers) -> Option<Version> {
    let mut iter = specifiers.iter();
    let first = iter.next()?;
    if iter.next().is_some() {
        return None;
    }
    if first.operator() == fromager_version::Operator::Equal {
        Some(first.version().clone())
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_comments_and_blank_lines_ignored() {
        let store = ConstraintsStore::parse(
            "# a comment\n\nrequests==2.28.0\n  # trailing\nflask>=2.0\n",
            false,
        )
        .unwrap();
        assert!(store.allowed(
            &PackageName::new("requests").unwrap(),
            &"2.28.0".parse().unwrap()
        ));
        assert!(!store.allowed(
            &PackageName::new("requests").unwrap(),
            &"2.29.0".parse().unwrap()
        ));
    }

    #[test]
    fn test_conflicting_exact_pins_rejected() {
        let err = ConstraintsStore::parse("foo==1.0\nfoo==2.0\n", false).unwrap_err();
        assert!(matches!(err, Error::ConstraintConflict { .. }));
    }

    #[test]
    fn test_conflicting_pins_allowed_with_skip_constraints() {
        let store = ConstraintsStore::parse("foo==1.0\nfoo==2.0\n", true).unwrap();
        assert!(store.allowed(&PackageName::new("foo").unwrap(), &"1.0".parse().unwrap()));
        assert!(store.allowed(&PackageName::new("foo").unwrap(), &"2.0".parse().unwrap()));
    }

    #[test]
    fn test_pinned_prerelease() {
        let store = ConstraintsStore::parse("flit_core==2.0rc3\n", false).unwrap();
        let name = PackageName::new("flit_core").unwrap();
        assert_eq!(store.pinned(&name).unwrap().to_string(), "2.0rc3");
        assert!(store.admits_prerelease(&name));
    }
}
