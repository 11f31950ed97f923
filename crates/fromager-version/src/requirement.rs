//! Requirement parsing: PEP 508 syntax plus the direct-URL extension forms
//! `name @ url` and `name[extras] @ url @ ref` used for git sources.

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use fromager_normalize::PackageName;

use crate::marker::MarkerTree;
use crate::specifier::VersionSpecifiers;

/// The transport scheme of a direct-URL requirement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DirectUrlScheme {
    Sdist,
    Archive,
    GitHttps,
    GitSsh,
}

impl DirectUrlScheme {
    fn from_url(url: &str) -> Self {
        if let Some(rest) = url.strip_prefix("git+") {
            if rest.starts_with("ssh://") || rest.contains('@') && !rest.starts_with("http") {
                return Self::GitSsh;
            }
            return Self::GitHttps;
        }
        if url.ends_with(".tar.gz") || url.ends_with(".zip") || url.ends_with(".tar.bz2") {
            Self::Sdist
        } else {
            Self::Archive
        }
    }
}

impl fmt::Display for DirectUrlScheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Sdist => "sdist",
            Self::Archive => "archive",
            Self::GitHttps => "git+https",
            Self::GitSsh => "git+ssh",
        })
    }
}

/// A `name @ url[ @ ref]` direct-URL requirement component.
///
/// Only top-level/CLI input or constraints may carry one of these; an
/// internal graph edge referencing a direct URL is a modeling error
/// (enforced by callers, not this type).
#[derive(Debug, Clone)]
pub struct DirectUrl {
    pub url: String,
    pub scheme: DirectUrlScheme,
    /// Tag, branch, or commit for `git+*` schemes.
    pub git_ref: Option<String>,
}

/// A fully parsed requirement: canonical name, extras, version
/// specifiers, optional marker, optional direct URL.
#[derive(Debug, Clone)]
pub struct Requirement {
    pub name: PackageName,
    pub extras: BTreeSet<String>,
    pub specifiers: VersionSpecifiers,
    pub marker: Option<MarkerTree>,
    pub direct_url: Option<DirectUrl>,
    raw: String,
}

/// The requirement text did not parse as PEP 508 (or the direct-URL
/// extension of it).
#[derive(Debug, Clone, thiserror::Error)]
#[error("invalid requirement: `{0}`")]
pub struct InvalidRequirement(pub String);

impl Requirement {
    #[must_use]
    pub fn raw(&self) -> &str {
        &self.raw
    }

    /// `true` if the requirement's specifier set explicitly admits
    /// pre-releases (e.g. `==1.0rc1`), independent of any constraint.
    #[must_use]
    pub fn admits_prerelease_explicitly(&self) -> bool {
        self.specifiers.explicitly_admits_prerelease()
    }

    /// Does `version` satisfy this requirement's specifier set?
    #[must_use]
    pub fn satisfies(&self, version: &crate::version::Version) -> bool {
        self.specifiers.contains(version)
    }
}

impl FromStr for Requirement {
    type Err = InvalidRequirement;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        let raw = input.trim().to_string();
        let err = || InvalidRequirement(raw.clone());

        // Split off the marker, which always follows a bare `;` outside of
        // any URL (URLs in this grammar never contain an unescaped `;`).
        let (head, marker_str) = match raw.split_once(';') {
            Some((h, m)) => (h.trim(), Some(m.trim())),
            None => (raw.as_str(), None),
        };

        // name[extras] (== spec | @ url [@ ref])
        let name_end = head
            .find(|c: char| c == '[' || c.is_whitespace() || c == '@' || c == '=' || c == '<' || c == '>' || c == '!' || c == '~')
            .unwrap_or(head.len());
        let name_part = head[..name_end].trim();
        if name_part.is_empty() {
            return Err(err());
        }
        let name = PackageName::new(name_part).map_err(|_| err())?;

        let mut rest = head[name_end..].trim_start();

        let mut extras = BTreeSet::new();
        if let Some(stripped) = rest.strip_prefix('[') {
            let close = stripped.find(']').ok_or_else(err)?;
            let extras_str = &stripped[..close];
            for e in extras_str.split(',') {
                let e = e.trim();
                if !e.is_empty() {
                    extras.insert(fromager_normalize::canonicalize(e));
                }
            }
            rest = stripped[close + 1..].trim_start();
        }

        let mut direct_url = None;
        let mut specifiers = VersionSpecifiers::empty();

        if let Some(at_rest) = rest.strip_prefix('@') {
            let at_rest = at_rest.trim_start();
            let mut parts = at_rest.splitn(2, '@');
            let url = parts.next().unwrap_or_default().trim().to_string();
            let git_ref = parts.next().map(|r| r.trim().to_string());
            if url.is_empty() {
                return Err(err());
            }
            let scheme = DirectUrlScheme::from_url(&url);
            direct_url = Some(DirectUrl {
                url,
                scheme,
                git_ref,
            });
        } else if !rest.is_empty() {
            specifiers = VersionSpecifiers::from_str(rest).map_err(|_| err())?;
        }

        let marker = marker_str
            .filter(|m| !m.is_empty())
            .map(MarkerTree::from_str)
            .transpose()
            .map_err(|_| err())?;

        Ok(Self {
            name,
            extras,
            specifiers,
            marker,
            direct_url,
            raw,
        })
    }
}

impl fmt::Display for Requirement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::marker::MarkerEnvironment;

    #[test]
    fn test_plain() {
        let r: Requirement = "requests>=2.0,<3.0".parse().unwrap();
        assert_eq!(r.name.as_str(), "requests");
        assert!(r.direct_url.is_none());
    }

    #[test]
    fn test_extras_and_marker() {
        let r: Requirement = "requests[socks]>=2.0; python_version >= \"3.8\""
            .parse()
            .unwrap();
        assert!(r.extras.contains("socks"));
        assert!(r.marker.unwrap().evaluate(&MarkerEnvironment::current_platform_default()));
    }

    #[test]
    fn test_direct_url() {
        let r: Requirement = "foo @ https://example.com/foo-1.0.tar.gz".parse().unwrap();
        let url = r.direct_url.unwrap();
        assert_eq!(url.scheme, DirectUrlScheme::Sdist);
        assert!(url.git_ref.is_none());
    }

    #[test]
    fn test_direct_url_with_extras_and_ref() {
        let r: Requirement = "foo[bar] @ git+https://example.com/foo.git @ v1.0"
            .parse()
            .unwrap();
        assert!(r.extras.contains("bar"));
        let url = r.direct_url.unwrap();
        assert_eq!(url.scheme, DirectUrlScheme::GitHttps);
        assert_eq!(url.git_ref.as_deref(), Some("v1.0"));
    }

    #[test]
    fn test_invalid_empty() {
        assert!(Requirement::from_str("").is_err());
    }
}
