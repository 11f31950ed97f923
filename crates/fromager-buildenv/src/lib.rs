//! Build environment manager (`spec.md` §4.9): constructs an isolated
//! environment for a set of requirements, installed from the local simple
//! index with only-binary semantics, and records what landed so downstream
//! pinning can consult it.

use std::path::{Path, PathBuf};

use fromager_normalize::PackageName;
use fromager_version::Version;
use rustc_hash::FxHashMap;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("missing dependency `{requirement}` needed by `{needed_by}`; index `{index_url}` was searched")]
    MissingDependency {
        requirement: String,
        needed_by: String,
        index_url: String,
    },
    #[error("failed to create isolated environment at `{0}`")]
    EnvCreationFailed(String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl fromager_types::severity::BootstrapError for Error {
    fn severity(&self) -> fromager_types::severity::Severity {
        fromager_types::severity::Severity::NodeFailed
    }
}

/// A requirement to install into a build environment, plus the package
/// that needed it (carried through so a `MissingDependency` error can
/// name both, per `spec.md` §7's user-visible-behavior contract).
#[derive(Debug, Clone)]
pub struct EnvRequirement {
    pub raw: String,
    pub needed_by: String,
}

/// What actually landed in a build environment after installation.
#[derive(Debug, Clone, Default)]
pub struct InstalledSet {
    pub packages: FxHashMap<PackageName, Version>,
}

impl InstalledSet {
    #[must_use]
    pub fn get(&self, name: &PackageName) -> Option<&Version> {
        self.packages.get(name)
    }
}

/// The black-box installer contract: given a requirement string and the
/// simple-index URL to search, install a wheel into `env_root` and report
/// the (name, version) that landed. Only-binary (wheel-only) semantics
/// are the installer's responsibility; this crate only orchestrates calls
/// to it and records the result.
#[async_trait::async_trait]
pub trait EnvInstaller: Send + Sync {
    async fn install(
        &self,
        env_root: &Path,
        requirement: &str,
        index_url: &str,
    ) -> Result<(PackageName, Version), Error>;
}

/// A single isolated build environment rooted at `root`.
pub struct BuildEnvironment {
    pub root: PathBuf,
    pub installed: InstalledSet,
}

impl BuildEnvironment {
    /// Creates the environment directory and installs every requirement in
    /// order, recording each (name, version) that lands.
    pub async fn create(
        root: PathBuf,
        requirements: &[EnvRequirement],
        index_url: &str,
        installer: &dyn EnvInstaller,
    ) -> Result<Self, Error> {
        fs_err::create_dir_all(&root)?;
        let mut installed = InstalledSet::default();
        for req in requirements {
            let (name, version) = installer
                .install(&root, &req.raw, index_url)
                .await
                .map_err(|_| Error::MissingDependency {
                    requirement: req.raw.clone(),
                    needed_by: req.needed_by.clone(),
                    index_url: index_url.to_string(),
                })?;
            installed.packages.insert(name, version);
        }
        Ok(Self { root, installed })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    struct FakeInstaller {
        versions: FxHashMap<String, String>,
    }

    #[async_trait::async_trait]
    impl EnvInstaller for FakeInstaller {
        async fn install(
            &self,
            _env_root: &Path,
            requirement: &str,
            index_url: &str,
        ) -> Result<(PackageName, Version), Error> {
            let name_part = requirement
                .split(|c: char| !c.is_alphanumeric() && c != '_' && c != '-')
                .next()
                .unwrap_or_default();
            let name = PackageName::new(name_part).unwrap();
            match self.versions.get(name_part) {
                Some(v) => Ok((name, v.parse().unwrap())),
                None => Err(Error::MissingDependency {
                    requirement: requirement.to_string(),
                    needed_by: "test".to_string(),
                    index_url: index_url.to_string(),
                }),
            }
        }
    }

    #[tokio::test]
    async fn test_create_installs_and_records() {
        let dir = tempdir().unwrap();
        let mut versions = FxHashMap::default();
        versions.insert("setuptools".to_string(), "69.0.0".to_string());
        let installer = FakeInstaller { versions };

        let reqs = vec![EnvRequirement {
            raw: "setuptools".to_string(),
            needed_by: "stevedore".to_string(),
        }];
        let env = BuildEnvironment::create(dir.path().join("env"), &reqs, "http://localhost/simple/", &installer)
            .await
            .unwrap();

        assert_eq!(
            env.installed.get(&PackageName::new("setuptools").unwrap()).unwrap().to_string(),
            "69.0.0"
        );
    }

    #[tokio::test]
    async fn test_missing_dependency_names_requirement_and_index() {
        let dir = tempdir().unwrap();
        let installer = FakeInstaller {
            versions: FxHashMap::default(),
        };
        let reqs = vec![EnvRequirement {
            raw: "nonexistent".to_string(),
            needed_by: "stevedore".to_string(),
        }];
        let err = BuildEnvironment::create(dir.path().join("env"), &reqs, "http://localhost/simple/", &installer)
            .await
            .unwrap_err();
        match err {
            Error::MissingDependency { requirement, needed_by, .. } => {
                assert_eq!(requirement, "nonexistent");
                assert_eq!(needed_by, "stevedore");
            }
            _ => panic!("wrong error"),
        }
    }
}
