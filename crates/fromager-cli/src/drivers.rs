//! Concrete subprocess-backed implementations of the three black-box
//! seams the core crates define (`spec.md` §1: "the actual PEP-517 hook
//! invocation inside a build subprocess" and environment installation are
//! explicitly out of scope for the orchestrator, treated only as an
//! interface). Grounded in `puffin-build-cli`'s subprocess-plus-venv shape
//! (`main.rs`: `Venv::from_env`, `BuildDispatch`), trimmed to plain
//! `python`/`pip` invocations since the real hook plumbing is this crate's
//! job, not the orchestrator's.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use fromager_normalize::PackageName;
use fromager_version::Version;
use tokio::process::Command;

/// Runs `python -c <hook-shim>` to ask a PEP-517 backend for its extra
/// build requirements, and `python -m build` to produce artifacts.
pub struct SubprocessBuildDriver {
    pub python: PathBuf,
}

impl SubprocessBuildDriver {
    #[must_use]
    pub fn new(python: PathBuf) -> Self {
        Self { python }
    }

    async fn run_hook(&self, source_root: &Path, hook: &str) -> Result<Vec<String>, String> {
        let shim = format!(
            "import json, sys, tomllib\n\
             with open('pyproject.toml', 'rb') as f:\n\
             \tdata = tomllib.load(f)\n\
             backend = data.get('build-system', {{}}).get('build-backend', 'setuptools.build_meta')\n\
             mod = __import__(backend.split(':')[0])\n\
             fn = getattr(mod, '{hook}', None)\n\
             print(json.dumps(fn(None) if fn else []))\n"
        );
        let output = Command::new(&self.python)
            .arg("-c")
            .arg(&shim)
            .current_dir(source_root)
            .output()
            .await
            .map_err(|e| e.to_string())?;
        if !output.status.success() {
            return Err(String::from_utf8_lossy(&output.stderr).into_owned());
        }
        let stdout = String::from_utf8_lossy(&output.stdout);
        serde_json::from_str(stdout.trim()).map_err(|e| e.to_string())
    }
}

#[async_trait::async_trait]
impl fromager_extract::Pep517Driver for SubprocessBuildDriver {
    async fn get_requires_for_build_wheel(
        &self,
        source_root: &Path,
        _config_settings: &HashMap<String, String>,
    ) -> Result<Vec<String>, fromager_extract::Error> {
        self.run_hook(source_root, "get_requires_for_build_wheel")
            .await
            .map_err(|detail| fromager_extract::Error::HookInvocationError {
                hook: "get_requires_for_build_wheel".to_string(),
                source_root: source_root.display().to_string(),
                detail,
            })
    }

    async fn get_requires_for_build_sdist(
        &self,
        source_root: &Path,
        _config_settings: &HashMap<String, String>,
    ) -> Result<Vec<String>, fromager_extract::Error> {
        self.run_hook(source_root, "get_requires_for_build_sdist")
            .await
            .map_err(|detail| fromager_extract::Error::HookInvocationError {
                hook: "get_requires_for_build_sdist".to_string(),
                source_root: source_root.display().to_string(),
                detail,
            })
    }
}

#[async_trait::async_trait]
impl fromager_build::BuildDriver for SubprocessBuildDriver {
    async fn build_sdist(&self, source_root: &Path, build_env_root: &Path) -> Result<PathBuf, fromager_build::Error> {
        self.build(source_root, build_env_root, "--sdist").await
    }

    async fn build_wheel(&self, source_root: &Path, build_env_root: &Path) -> Result<PathBuf, fromager_build::Error> {
        self.build(source_root, build_env_root, "--wheel").await
    }
}

impl SubprocessBuildDriver {
    async fn build(&self, source_root: &Path, build_env_root: &Path, flag: &str) -> Result<PathBuf, fromager_build::Error> {
        let outdir = build_env_root.join("dist");
        fs_err::create_dir_all(&outdir)?;
        let output = Command::new(&self.python)
            .args(["-m", "build", flag, "--outdir"])
            .arg(&outdir)
            .arg(source_root)
            .output()
            .await?;

        let dist = source_root.display().to_string();
        if !output.status.success() {
            let detail = String::from_utf8_lossy(&output.stderr).into_owned();
            return Err(if flag == "--sdist" {
                fromager_build::Error::SdistBuildFailed {
                    dist,
                    version: String::new(),
                    detail,
                }
            } else {
                fromager_build::Error::WheelBuildFailed {
                    dist,
                    version: String::new(),
                    detail,
                }
            });
        }

        let mut entries = fs_err::read_dir(&outdir)?;
        entries
            .find_map(|e| e.ok().map(|e| e.path()))
            .ok_or_else(|| fromager_build::Error::MissingDistInfo(outdir.display().to_string()))
    }
}

/// Installs a requirement via `pip install --target` against the local
/// simple index, then reads the landed `*.dist-info/METADATA` to report
/// what actually landed (pip may satisfy extras/markers differently than
/// the bare requirement string names).
pub struct PipEnvInstaller {
    pub python: PathBuf,
}

#[async_trait::async_trait]
impl fromager_buildenv::EnvInstaller for PipEnvInstaller {
    async fn install(&self, env_root: &Path, requirement: &str, index_url: &str) -> Result<(PackageName, Version), fromager_buildenv::Error> {
        fs_err::create_dir_all(env_root)?;
        let output = Command::new(&self.python)
            .args(["-m", "pip", "install", "--no-deps", "--only-binary=:all:", "--target"])
            .arg(env_root)
            .args(["--index-url", index_url])
            .arg(requirement)
            .output()
            .await?;

        if !output.status.success() {
            return Err(fromager_buildenv::Error::EnvCreationFailed(String::from_utf8_lossy(&output.stderr).into_owned()));
        }

        find_installed_dist(env_root, requirement)
    }
}

fn find_installed_dist(env_root: &Path, requirement: &str) -> Result<(PackageName, Version), fromager_buildenv::Error> {
    let prefix: String = requirement
        .chars()
        .take_while(|c| c.is_alphanumeric() || *c == '_' || *c == '-' || *c == '.')
        .collect();

    let entries = fs_err::read_dir(env_root)?;
    for entry in entries.flatten() {
        let name = entry.file_name();
        let name = name.to_string_lossy();
        let Some(stem) = name.strip_suffix(".dist-info") else { continue };
        let Some((dist_name, dist_version)) = stem.rsplit_once('-') else { continue };
        if dist_name.eq_ignore_ascii_case(&prefix) || dist_name.replace(['_', '.'], "-").eq_ignore_ascii_case(&prefix.replace(['_', '.'], "-")) {
            let name = PackageName::new(dist_name).map_err(|_| fromager_buildenv::Error::EnvCreationFailed(dist_name.to_string()))?;
            let version: Version = dist_version
                .parse()
                .map_err(|_| fromager_buildenv::Error::EnvCreationFailed(dist_version.to_string()))?;
            return Ok((name, version));
        }
    }

    Err(fromager_buildenv::Error::MissingDependency {
        requirement: requirement.to_string(),
        needed_by: "build environment".to_string(),
        index_url: env_root.display().to_string(),
    })
}
