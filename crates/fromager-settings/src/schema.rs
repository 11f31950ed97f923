//! On-disk YAML schema. Every level rejects unknown keys (`spec.md` §6:
//! "Unknown keys are rejected"), which is what makes a typo in a
//! packager's settings file a load-time error rather than a silently
//! ignored no-op.

use indexmap::IndexMap;
use serde::Deserialize;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct DownloadSource {
    pub url: Option<String>,
    pub filename: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct ResolverDist {
    pub provider: Option<String>,
    pub flags: Vec<String>,
    pub alternate_index: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SubmodulePolicy {
    None,
    Recursive,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct GitOptions {
    pub submodules: Option<SubmodulePolicy>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct ProjectOverride {
    pub remove_build_requires: Vec<String>,
    pub update_build_requires: Vec<String>,
    pub remove_install_requires: Vec<String>,
    pub update_install_requires: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CreateFileEntry {
    pub path: String,
    pub content: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct ChangelogEntry {
    /// Only applies to this exact version, or every version if absent.
    pub version: Option<String>,
    /// Only applies to this variant, or every variant if absent.
    pub variant: Option<String>,
    pub message: String,
}

/// One parsed settings document. The same shape is used for the global
/// file, a per-package file, and (nested, within `variants.*.version.*`)
/// a version-specific overlay.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct RawSettings {
    pub download_source: Option<DownloadSource>,
    pub resolver_dist: Option<ResolverDist>,
    pub git_options: Option<GitOptions>,
    pub build_dir: Option<String>,
    pub env: IndexMap<String, String>,
    pub variants: IndexMap<String, VariantSettings>,
    pub project_override: Option<ProjectOverride>,
    pub patch: Vec<String>,
    pub create_files: Vec<CreateFileEntry>,
    pub vendor_rust_before_patch: Option<bool>,
    pub cpu_cores_per_job: Option<f64>,
    pub memory_per_job_gb: Option<f64>,
    pub changelog: Vec<ChangelogEntry>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct VariantSettings {
    pub pre_built: Option<bool>,
    pub env: IndexMap<String, String>,
    pub wheel_server_url: Option<String>,
    pub version: IndexMap<String, RawSettings>,
}
