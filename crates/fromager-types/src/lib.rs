//! Value types shared across component boundaries: the five requirement
//! edge types, resolved candidates, and build artifacts.
//!
//! Kept deliberately dependency-light (only `fromager-normalize` and
//! `fromager-version`) so that every other crate can depend on it without
//! risking a cycle, mirroring the role `uv-distribution-types`/
//! `uv-pypi-types` play in the teacher workspace.

use std::fmt;
use std::path::PathBuf;

use fromager_normalize::PackageName;
use fromager_version::Version;
use serde::{Deserialize, Serialize};
use url::Url;

pub mod severity;

/// The five requirement-edge kinds from `spec.md` §3. Build edges
/// (`BuildSystem`, `BuildBackend`, `BuildSdist`) must be satisfied before a
/// node's own build; `Install` edges need not.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RequirementType {
    Toplevel,
    BuildSystem,
    BuildBackend,
    BuildSdist,
    Install,
}

impl RequirementType {
    /// Build edges gate a node's own build; install edges do not.
    #[must_use]
    pub fn is_build_edge(self) -> bool {
        matches!(
            self,
            Self::BuildSystem | Self::BuildBackend | Self::BuildSdist
        )
    }
}

impl fmt::Display for RequirementType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Toplevel => "toplevel",
            Self::BuildSystem => "build-system",
            Self::BuildBackend => "build-backend",
            Self::BuildSdist => "build-sdist",
            Self::Install => "install",
        };
        f.write_str(s)
    }
}

/// How a [`Candidate`] is to be fetched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RetrieveMethod {
    Tarball,
    GitHttps,
    GitSsh,
    PrebuiltWheel,
}

impl fmt::Display for RetrieveMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Tarball => "tarball",
            Self::GitHttps => "git+https",
            Self::GitSsh => "git+ssh",
            Self::PrebuiltWheel => "prebuilt-wheel",
        };
        f.write_str(s)
    }
}

/// A resolved candidate: a specific version of a package, with a
/// retrieval URL and method. Produced by the Resolver Provider Registry or
/// derived directly from a direct-URL requirement.
#[derive(Debug, Clone)]
pub struct Candidate {
    pub name: PackageName,
    pub version: Version,
    pub retrieve_url: Url,
    pub retrieve_method: RetrieveMethod,
    pub git_ref: Option<String>,
}

/// Either an sdist path or a wheel path, with the metadata a wheel carries
/// in its filename.
#[derive(Debug, Clone)]
pub enum BuildArtifact {
    Sdist { path: PathBuf },
    Wheel {
        path: PathBuf,
        build_tag: Option<u32>,
        local_version: Option<String>,
    },
}

impl BuildArtifact {
    #[must_use]
    pub fn path(&self) -> &std::path::Path {
        match self {
            Self::Sdist { path } | Self::Wheel { path, .. } => path,
        }
    }
}

/// The `name==version` string key used throughout `graph.json` and the
/// in-memory graph store. Distinct from [`Candidate`] (what to fetch) and
/// from a graph node (what was fetched and its edges) — keeping "resolved
/// identity" as its own type makes a graph lookup a type error if you
/// accidentally pass a `Candidate` instead.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeKey(String);

impl NodeKey {
    /// The synthetic ROOT node anchoring the graph.
    #[must_use]
    pub fn root() -> Self {
        Self(String::new())
    }

    #[must_use]
    pub fn is_root(&self) -> bool {
        self.0.is_empty()
    }

    #[must_use]
    pub fn new(name: &PackageName, version: &Version) -> Self {
        Self(format!("{name}=={version}"))
    }

    /// A provisional key for a not-yet-resolved direct-URL dependency,
    /// `<name>@<ref-or-url>`. Replaced by [`NodeKey::new`] once the source
    /// tree's metadata has been read (see `spec.md` §9, "Direct-URL
    /// provisional keys").
    #[must_use]
    pub fn provisional(name: &PackageName, ref_or_url: &str) -> Self {
        Self(format!("{name}@{ref_or_url}"))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NodeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl Serialize for NodeKey {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for NodeKey {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Ok(Self(String::deserialize(deserializer)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_node_key_root() {
        assert!(NodeKey::root().is_root());
        assert_eq!(NodeKey::root().as_str(), "");
    }

    #[test]
    fn test_node_key_format() {
        let name = PackageName::new("Stevedore").unwrap();
        let version: Version = "5.2.0".parse().unwrap();
        assert_eq!(NodeKey::new(&name, &version).as_str(), "stevedore==5.2.0");
    }

    #[test]
    fn test_build_edge_classification() {
        assert!(RequirementType::BuildSystem.is_build_edge());
        assert!(RequirementType::BuildBackend.is_build_edge());
        assert!(RequirementType::BuildSdist.is_build_edge());
        assert!(!RequirementType::Install.is_build_edge());
        assert!(!RequirementType::Toplevel.is_build_edge());
    }
}
