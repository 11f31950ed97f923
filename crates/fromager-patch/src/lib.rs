//! Patcher & source tree preparer (`spec.md` §4.7): collects patches from
//! every applicable specificity level into one merged, deterministically
//! ordered list, applies them, runs the vendor-rust step before or after
//! per settings, emits `create_files`, synthesizes `PKG-INFO` when
//! missing, and applies `project_override` to a `pyproject.toml` copy.

use std::path::{Path, PathBuf};
use std::process::Command;

use fromager_fs::join_relative;
use fromager_normalize::{canonicalize, overridify};
use fromager_settings::{CreateFileEntry, ProjectOverride};
use fromager_version::Version;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("patch `{patch}` failed to apply to `{source_root}`: {detail}")]
    PatchApplyError {
        patch: String,
        source_root: String,
        detail: String,
    },
    #[error("unsafe path `{0}`")]
    UnsafePath(String),
    #[error("pyproject.toml at `{0}` is malformed")]
    PyProjectMalformed(String),
    #[error(transparent)]
    Fs(#[from] fromager_fs::Error),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl fromager_types::severity::BootstrapError for Error {
    fn severity(&self) -> fromager_types::severity::Severity {
        fromager_types::severity::Severity::NodeFailed
    }
}

/// The four specificity levels a patch directory can live at, in the
/// total order decided for the base-name-collision open question
/// (`SPEC_FULL.md` §9): unversioned < version-specific < unversioned
/// variant < version-specific variant. A later level's patch with the
/// same base name supersedes (is applied after, and — since `patch`
/// application is order-sensitive rather than replacing — simply comes
/// later in the merged, deduplicated-by-base-name list).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum Specificity {
    Unversioned,
    VersionSpecific,
    UnversionedVariant,
    VersionSpecificVariant,
}

#[derive(Debug, Clone)]
struct PatchFile {
    path: PathBuf,
    base_name: String,
    specificity: Specificity,
}

/// Collects every patch file applicable to `(override_name, version,
/// variant)` under `patches_root`, in final application order: sorted by
/// `Specificity` first, then lexicographically by base name within a
/// level. If two patches share a base name at different levels, the more
/// specific one is kept and the less specific one dropped — a version-
/// specific patch is understood to supersede an unversioned patch of the
/// same name, not merely reorder after it.
#[must_use]
pub fn collect_patches(patches_root: &Path, override_name: &str, version: &Version, variant: &str) -> Vec<PathBuf> {
    let version_no_local = version.without_local().to_string();

    let mut dirs: Vec<(PathBuf, Specificity)> = vec![
        (patches_root.join(override_name), Specificity::Unversioned),
        (
            patches_root.join(format!("{override_name}-{version_no_local}")),
            Specificity::VersionSpecific,
        ),
    ];
    dirs.push((
        patches_root.join(override_name).join(variant),
        Specificity::UnversionedVariant,
    ));
    dirs.push((
        patches_root
            .join(format!("{override_name}-{version_no_local}"))
            .join(variant),
        Specificity::VersionSpecificVariant,
    ));

    let mut found: Vec<PatchFile> = Vec::new();
    for (dir, specificity) in dirs {
        let Ok(entries) = fs_err::read_dir(&dir) else {
            continue;
        };
        for entry in entries.filter_map(Result::ok) {
            let path = entry.path();
            if !path.is_file() {
                continue;
            }
            let base_name = path
                .file_name()
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or_default();
            found.push(PatchFile {
                path,
                base_name,
                specificity,
            });
        }
    }

    // Keep only the most-specific patch per base name.
    let mut by_base: std::collections::BTreeMap<String, PatchFile> = std::collections::BTreeMap::new();
    for pf in found {
        by_base
            .entry(pf.base_name.clone())
            .and_modify(|existing| {
                if pf.specificity > existing.specificity {
                    *existing = pf.clone();
                }
            })
            .or_insert(pf);
    }

    let mut ordered: Vec<PatchFile> = by_base.into_values().collect();
    ordered.sort_by(|a, b| a.specificity.cmp(&b.specificity).then_with(|| a.base_name.cmp(&b.base_name)));
    ordered.into_iter().map(|pf| pf.path).collect()
}

/// Applies a single patch file to `source_root` at strip-level 1, using
/// the system `patch` binary (PEP-517 hook invocation is out of scope per
/// `spec.md` §1; patch application shells out the same way).
fn apply_patch_file(source_root: &Path, patch_path: &Path) -> Result<(), Error> {
    let output = Command::new("patch")
        .arg("-p1")
        .arg("-i")
        .arg(patch_path)
        .current_dir(source_root)
        .output()?;
    if !output.status.success() {
        return Err(Error::PatchApplyError {
            patch: patch_path.display().to_string(),
            source_root: source_root.display().to_string(),
            detail: String::from_utf8_lossy(&output.stderr).to_string(),
        });
    }
    Ok(())
}

/// A callable that performs the project's Rust-vendoring step (e.g.
/// `cargo vendor`), invoked before or after patch application depending
/// on `vendor_rust_before_patch`.
pub trait VendorRustStep {
    fn run(&self, source_root: &Path) -> Result<(), Error>;
}

/// Applies the merged patch list, running `vendor` before or after per
/// `vendor_rust_before_patch`.
pub fn apply_patches(
    source_root: &Path,
    patches: &[PathBuf],
    vendor: Option<&dyn VendorRustStep>,
    vendor_rust_before_patch: bool,
) -> Result<(), Error> {
    if vendor_rust_before_patch {
        if let Some(v) = vendor {
            v.run(source_root)?;
        }
    }
    for patch in patches {
        apply_patch_file(source_root, patch)?;
    }
    if !vendor_rust_before_patch {
        if let Some(v) = vendor {
            v.run(source_root)?;
        }
    }
    Ok(())
}

/// Writes every `create_files` entry relative to `source_root`, rejecting
/// any path that escapes it.
pub fn write_create_files(source_root: &Path, entries: &[CreateFileEntry]) -> Result<(), Error> {
    for entry in entries {
        let dest = join_relative(source_root, &entry.path)?;
        fromager_fs::atomic_write(&dest, entry.content.as_bytes())?;
    }
    Ok(())
}

/// Ensures a `PKG-INFO` exists at `source_root` (and, if `build_dir` is
/// set, there too), synthesizing a minimal one from `name`/`version` when
/// absent.
pub fn ensure_pkg_info(source_root: &Path, build_dir: Option<&Path>, name: &str, version: &Version) -> Result<(), Error> {
    for root in std::iter::once(source_root).chain(build_dir) {
        let pkg_info = root.join("PKG-INFO");
        if pkg_info.exists() {
            continue;
        }
        let contents = format!(
            "Metadata-Version: 2.1\nName: {name}\nVersion: {version}\n"
        );
        fromager_fs::atomic_write(&pkg_info, contents.as_bytes())?;
    }
    Ok(())
}

/// Applies `project_override` to `pyproject.toml` at `source_root`:
/// removes listed build-requires by canonical name, replace-or-inserts
/// updated build-requires, and does likewise for install-requires (under
/// `project.dependencies`), writing the file back in place.
pub fn apply_project_override(source_root: &Path, project_override: &ProjectOverride) -> Result<(), Error> {
    let path = source_root.join("pyproject.toml");
    let text = fs_err::read_to_string(&path)?;
    let mut doc: toml_edit::DocumentMut = text
        .parse()
        .map_err(|_| Error::PyProjectMalformed(path.display().to_string()))?;

    if let Some(requires) = doc
        .get_mut("build-system")
        .and_then(|t| t.get_mut("requires"))
        .and_then(|v| v.as_array_mut())
    {
        apply_requirement_list_override(
            requires,
            &project_override.remove_build_requires,
            &project_override.update_build_requires,
        );
    }

    if let Some(deps) = doc
        .get_mut("project")
        .and_then(|t| t.get_mut("dependencies"))
        .and_then(|v| v.as_array_mut())
    {
        apply_requirement_list_override(
            deps,
            &project_override.remove_install_requires,
            &project_override.update_install_requires,
        );
    }

    fs_err::write(&path, doc.to_string())?;
    Ok(())
}

fn requirement_name(raw: &str) -> String {
    let end = raw
        .find(|c: char| c.is_whitespace() || "[=<>!~;@".contains(c))
        .unwrap_or(raw.len());
    canonicalize(&raw[..end])
}

fn apply_requirement_list_override(array: &mut toml_edit::Array, remove: &[String], update: &[String]) {
    let remove_names: std::collections::BTreeSet<String> = remove.iter().map(|r| requirement_name(r)).collect();
    let update_by_name: std::collections::BTreeMap<String, &String> =
        update.iter().map(|u| (requirement_name(u), u)).collect();

    let mut kept: Vec<String> = Vec::new();
    let mut replaced: std::collections::BTreeSet<String> = std::collections::BTreeSet::new();

    for item in array.iter() {
        let Some(s) = item.as_str() else { continue };
        let name = requirement_name(s);
        if remove_names.contains(&name) {
            continue;
        }
        if let Some(replacement) = update_by_name.get(&name) {
            if replaced.insert(name.clone()) {
                kept.push((*replacement).clone());
            }
            continue;
        }
        kept.push(s.to_string());
    }
    for (name, replacement) in &update_by_name {
        if !replaced.contains(name) {
            kept.push((*replacement).clone());
        }
    }

    array.clear();
    for item in kept {
        array.push(item);
    }
}

/// The override name, used both for patch-directory lookup and for other
/// per-package keying; re-exported here so callers don't need a separate
/// `fromager-normalize` import solely for this.
#[must_use]
pub fn override_name(canonical_name: &str) -> String {
    overridify(canonical_name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn test_collect_patches_orders_by_specificity_then_name() {
        let root = tempdir().unwrap();
        let base = root.path().join("foo");
        let versioned = root.path().join("foo-1.0");
        fs::create_dir_all(&base).unwrap();
        fs::create_dir_all(&versioned).unwrap();
        fs::write(base.join("0001-a.patch"), "").unwrap();
        fs::write(base.join("0002-z.patch"), "").unwrap();
        fs::write(versioned.join("0001-a.patch"), "").unwrap();

        let version: Version = "1.0".parse().unwrap();
        let patches = collect_patches(root.path(), "foo", &version, "default");
        let names: Vec<String> = patches
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().to_string())
            .collect();

        // version-specific "0001-a.patch" supersedes the unversioned one of
        // the same base name, so only one copy survives, ordered after
        // whatever remains unversioned-only.
        assert_eq!(names, vec!["0002-z.patch", "0001-a.patch"]);
    }

    #[test]
    fn test_create_files_rejects_unsafe_path() {
        let root = tempdir().unwrap();
        let entries = vec![CreateFileEntry {
            path: "../evil".to_string(),
            content: "x".to_string(),
        }];
        let err = write_create_files(root.path(), &entries).unwrap_err();
        assert!(matches!(err, Error::Fs(fromager_fs::Error::UnsafePath(_))));
    }

    #[test]
    fn test_ensure_pkg_info_synthesizes_when_missing() {
        let root = tempdir().unwrap();
        let version: Version = "5.2.0".parse().unwrap();
        ensure_pkg_info(root.path(), None, "stevedore", &version).unwrap();
        let contents = fs::read_to_string(root.path().join("PKG-INFO")).unwrap();
        assert!(contents.contains("Name: stevedore"));
        assert!(contents.contains("Version: 5.2.0"));
    }

    #[test]
    fn test_apply_project_override_replaces_all_marker_variants() {
        let root = tempdir().unwrap();
        fs::write(
            root.path().join("pyproject.toml"),
            r#"
[project]
dependencies = [
  "numpy==1.24; python_version < '3.9'",
  "numpy==1.25; python_version == '3.9'",
  "numpy==1.26; python_version == '3.10'",
  "numpy==1.26; python_version >= '3.11'",
]
"#,
        )
        .unwrap();

        let project_override = ProjectOverride {
            remove_build_requires: vec![],
            update_build_requires: vec![],
            remove_install_requires: vec![],
            update_install_requires: vec!["numpy==2.0".to_string()],
        };
        apply_project_override(root.path(), &project_override).unwrap();

        let written = fs::read_to_string(root.path().join("pyproject.toml")).unwrap();
        assert_eq!(written.matches("numpy").count(), 1);
        assert!(written.contains("numpy==2.0"));
    }
}
