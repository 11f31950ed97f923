//! The dependency extractor (`spec.md` §4.8): three PEP-517 phases plus a
//! metadata read. The actual hook invocation inside a build subprocess is
//! out of scope (`spec.md` §1: "treated as a black-box 'builder'"), so
//! this crate defines the [`Pep517Driver`] seam the bootstrap orchestrator
//! plugs a real subprocess driver into, grounded in `puffin-build`'s
//! PEP-517 driver shape.

use std::collections::HashMap;
use std::path::Path;

use fromager_types::RequirementType;
use fromager_version::{MarkerEnvironment, Requirement};

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("PEP-517 hook `{hook}` failed for `{source_root}`: {detail}")]
    HookInvocationError {
        hook: String,
        source_root: String,
        detail: String,
    },
    #[error("metadata at `{0}` could not be read")]
    MetadataUnreadable(String),
    #[error("requirement string `{0}` in extracted metadata did not parse")]
    InvalidRequirement(String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl fromager_types::severity::BootstrapError for Error {
    fn severity(&self) -> fromager_types::severity::Severity {
        fromager_types::severity::Severity::NodeFailed
    }
}

/// The black-box PEP-517 hook invocation contract. A real implementation
/// runs `get_requires_for_build_wheel`/`get_requires_for_build_sdist`
/// inside the package's build environment subprocess; this crate only
/// consumes the string list it returns.
#[async_trait::async_trait]
pub trait Pep517Driver: Send + Sync {
    async fn get_requires_for_build_wheel(
        &self,
        source_root: &Path,
        config_settings: &HashMap<String, String>,
    ) -> Result<Vec<String>, Error>;

    async fn get_requires_for_build_sdist(
        &self,
        source_root: &Path,
        config_settings: &HashMap<String, String>,
    ) -> Result<Vec<String>, Error>;
}

/// One requirement extracted at one of the four extraction points, with
/// its edge type already attached.
#[derive(Debug, Clone)]
pub struct ExtractedRequirement {
    pub requirement: Requirement,
    pub req_type: RequirementType,
}

/// Reads `[build-system].requires` from `pyproject.toml` (after
/// `project_override` has already been applied to the on-disk copy),
/// falling back to a bare `setuptools` requirement if the table or key is
/// absent.
pub fn build_system_requires(source_root: &Path) -> Result<Vec<String>, Error> {
    let path = source_root.join("pyproject.toml");
    if !path.exists() {
        return Ok(vec!["setuptools".to_string()]);
    }
    let text = fs_err::read_to_string(&path)?;
    let doc: toml_edit::DocumentMut = text
        .parse()
        .map_err(|_| Error::MetadataUnreadable(path.display().to_string()))?;

    let requires = doc
        .get("build-system")
        .and_then(|t| t.get("requires"))
        .and_then(|v| v.as_array());

    match requires {
        Some(array) => Ok(array
            .iter()
            .filter_map(|v| v.as_str().map(str::to_string))
            .collect()),
        None => Ok(vec!["setuptools".to_string()]),
    }
}

/// Parses `Requires-Dist` lines out of a wheel's or sdist's metadata text
/// (`METADATA` inside a wheel's dist-info, or `PKG-INFO`/`METADATA` for an
/// sdist).
#[must_use]
pub fn parse_requires_dist(metadata_text: &str) -> Vec<String> {
    metadata_text
        .lines()
        .filter_map(|line| line.strip_prefix("Requires-Dist:"))
        .map(|rest| rest.trim().to_string())
        .collect()
}

/// Parses each raw requirement string, evaluates its marker against
/// `env`, and returns only the satisfied ones tagged with `req_type`.
/// Requirements without a marker are always satisfied.
pub fn parse_and_filter(
    raw_requirements: &[String],
    req_type: RequirementType,
    env: &MarkerEnvironment,
) -> Result<Vec<ExtractedRequirement>, Error> {
    let mut out = Vec::new();
    for raw in raw_requirements {
        let requirement: Requirement = raw
            .parse()
            .map_err(|_| Error::InvalidRequirement(raw.clone()))?;
        let satisfied = requirement
            .marker
            .as_ref()
            .is_none_or(|m| m.evaluate(env));
        if satisfied {
            out.push(ExtractedRequirement {
                requirement,
                req_type,
            });
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn test_build_system_requires_falls_back_to_setuptools() {
        let dir = tempdir().unwrap();
        let requires = build_system_requires(dir.path()).unwrap();
        assert_eq!(requires, vec!["setuptools".to_string()]);
    }

    #[test]
    fn test_build_system_requires_reads_pyproject() {
        let dir = tempdir().unwrap();
        fs::write(
            dir.path().join("pyproject.toml"),
            "[build-system]\nrequires = [\"setuptools>=61\", \"wheel\"]\n",
        )
        .unwrap();
        let requires = build_system_requires(dir.path()).unwrap();
        assert_eq!(requires, vec!["setuptools>=61".to_string(), "wheel".to_string()]);
    }

    #[test]
    fn test_parse_requires_dist() {
        let metadata = "Metadata-Version: 2.1\nName: stevedore\nRequires-Dist: pbr (!=2.1.0,>=2.0.0)\nRequires-Dist: six (>=1.10.0)\n";
        let reqs = parse_requires_dist(metadata);
        assert_eq!(reqs.len(), 2);
    }

    #[test]
    fn test_parse_and_filter_evaluates_markers() {
        let env = MarkerEnvironment::current_platform_default();
        let raws = vec![
            "requests".to_string(),
            "colorama; sys_platform == \"win32\"".to_string(),
        ];
        let extracted = parse_and_filter(&raws, RequirementType::Install, &env).unwrap();
        // on a non-win32 test environment, only "requests" survives.
        assert!(extracted.iter().any(|r| r.requirement.name.as_str() == "requests"));
    }
}
