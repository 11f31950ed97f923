//! The builder (`spec.md` §4.10): drives sdist and wheel production via a
//! black-box [`BuildDriver`] (PEP-517 hook invocation is out of scope,
//! `spec.md` §1), then renames the wheel to carry its build tag and
//! populates the `fromager-*` dist-info extras files.

use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use fromager_normalize::PackageName;
use fromager_version::Version;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("sdist build failed for `{dist}=={version}`: {detail}")]
    SdistBuildFailed {
        dist: String,
        version: String,
        detail: String,
    },
    #[error("wheel build failed for `{dist}=={version}`: {detail}")]
    WheelBuildFailed {
        dist: String,
        version: String,
        detail: String,
    },
    #[error("wheel `{0}` has no `.dist-info/` directory")]
    MissingDistInfo(String),
    #[error(transparent)]
    Zip(#[from] zip::result::ZipError),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl fromager_types::severity::BootstrapError for Error {
    fn severity(&self) -> fromager_types::severity::Severity {
        fromager_types::severity::Severity::NodeFailed
    }
}

/// The black-box PEP-517 build contract: given a prepared source tree and
/// a build environment root, produce the sdist or wheel artifact path.
#[async_trait::async_trait]
pub trait BuildDriver: Send + Sync {
    async fn build_sdist(&self, source_root: &Path, build_env_root: &Path) -> Result<PathBuf, Error>;
    async fn build_wheel(&self, source_root: &Path, build_env_root: &Path) -> Result<PathBuf, Error>;
}

/// The extra metadata `fromager-build` writes into every built wheel's
/// dist-info (`spec.md` §6, "Wheel dist-info extras").
#[derive(Debug, Clone, Default)]
pub struct DistInfoExtras {
    pub build_settings_yaml: String,
    pub build_system_requirements: Vec<String>,
    pub build_backend_requirements: Vec<String>,
    pub build_sdist_requirements: Vec<String>,
    pub elf_requires: Option<Vec<String>>,
}

/// Renames a just-built wheel to carry `build_tag`, per the PEP-427
/// filename convention `{name}-{version}(-{buildtag})-{pytag}-{abitag}-{platformtag}.whl`.
/// A `build_tag` of `0` is still written explicitly, matching the
/// `stevedore-5.2.0-0-py3-none-any.whl` example in `spec.md` Scenario A.
pub fn rename_with_build_tag(wheel_path: &Path, name: &PackageName, version: &Version, build_tag: u32) -> Result<PathBuf, Error> {
    let original = wheel_path
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| Error::MissingDistInfo(wheel_path.display().to_string()))?;

    let prefix = format!("{name}-{version}-");
    let rest = original
        .strip_prefix(&prefix)
        .unwrap_or(original.trim_start_matches(&format!("{name}-{version}")).trim_start_matches('-'));

    let new_name = format!("{name}-{version}-{build_tag}-{rest}");
    let dest = wheel_path.with_file_name(new_name);
    fromager_fs::atomic_copy(wheel_path, &dest)?;
    if dest != wheel_path {
        fs_err::remove_file(wheel_path)?;
    }
    Ok(dest)
}

/// Finds the single top-level `<name>-<version>.dist-info/` directory
/// inside a wheel zip archive.
fn find_dist_info_prefix(archive: &zip::ZipArchive<std::fs::File>) -> Result<String, Error> {
    for i in 0..archive.len() {
        let name = archive.name_for_index(i).unwrap_or_default();
        if let Some(idx) = name.find(".dist-info/") {
            return Ok(name[..idx + ".dist-info/".len()].to_string());
        }
    }
    Err(Error::MissingDistInfo("no .dist-info/ directory found".to_string()))
}

/// Rewrites `wheel_path` in place, adding the `fromager-*` extras files
/// into its dist-info directory. Every other entry is copied through
/// unchanged.
pub fn populate_dist_info_extras(wheel_path: &Path, extras: &DistInfoExtras) -> Result<(), Error> {
    let file = std::fs::File::open(wheel_path)?;
    let mut archive = zip::ZipArchive::new(file)?;
    let dist_info_prefix = find_dist_info_prefix(&archive)?;

    let tmp_path = wheel_path.with_extension("whl.tmp");
    let out_file = std::fs::File::create(&tmp_path)?;
    let mut writer = zip::ZipWriter::new(out_file);
    let options: zip::write::FileOptions<()> = zip::write::FileOptions::default();

    for i in 0..archive.len() {
        let mut entry = archive.by_index(i)?;
        writer.start_file(entry.name().to_string(), options)?;
        let mut buf = Vec::with_capacity(entry.size() as usize);
        entry.read_to_end(&mut buf)?;
        writer.write_all(&buf)?;
    }

    let extra_files: Vec<(String, String)> = [
        ("fromager-build-settings".to_string(), extras.build_settings_yaml.clone()),
        (
            "fromager-build-system-requirements.txt".to_string(),
            extras.build_system_requirements.join("\n"),
        ),
        (
            "fromager-build-backend-requirements.txt".to_string(),
            extras.build_backend_requirements.join("\n"),
        ),
        (
            "fromager-build-sdist-requirements.txt".to_string(),
            extras.build_sdist_requirements.join("\n"),
        ),
    ]
    .into_iter()
    .chain(
        extras
            .elf_requires
            .as_ref()
            .map(|libs| ("fromager-elf-requires.txt".to_string(), libs.join("\n"))),
    )
    .collect();

    for (name, content) in extra_files {
        writer.start_file(format!("{dist_info_prefix}{name}"), options)?;
        writer.write_all(content.as_bytes())?;
    }

    writer.finish()?;
    drop(archive);
    fs_err::rename(&tmp_path, wheel_path)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write as _;
    use tempfile::tempdir;

    fn write_fake_wheel(path: &Path) {
        let file = std::fs::File::create(path).unwrap();
        let mut writer = zip::ZipWriter::new(file);
        let options: zip::write::FileOptions<()> = zip::write::FileOptions::default();
        writer.start_file("stevedore/__init__.py", options).unwrap();
        writer.write_all(b"# package").unwrap();
        writer
            .start_file("stevedore-5.2.0.dist-info/METADATA", options)
            .unwrap();
        writer.write_all(b"Metadata-Version: 2.1\n").unwrap();
        writer.finish().unwrap();
    }

    #[test]
    fn test_rename_with_build_tag() {
        let dir = tempdir().unwrap();
        let original = dir.path().join("stevedore-5.2.0-py3-none-any.whl");
        write_fake_wheel(&original);

        let name = PackageName::new("stevedore").unwrap();
        let version: Version = "5.2.0".parse().unwrap();
        let renamed = rename_with_build_tag(&original, &name, &version, 2).unwrap();
        assert_eq!(
            renamed.file_name().unwrap().to_str().unwrap(),
            "stevedore-5.2.0-2-py3-none-any.whl"
        );
        assert!(!original.exists());
    }

    #[test]
    fn test_populate_dist_info_extras_adds_files() {
        let dir = tempdir().unwrap();
        let wheel_path = dir.path().join("stevedore-5.2.0-py3-none-any.whl");
        write_fake_wheel(&wheel_path);

        let extras = DistInfoExtras {
            build_settings_yaml: "variant: default\n".to_string(),
            build_system_requirements: vec!["setuptools".to_string()],
            build_backend_requirements: vec![],
            build_sdist_requirements: vec![],
            elf_requires: None,
        };
        populate_dist_info_extras(&wheel_path, &extras).unwrap();

        let file = std::fs::File::open(&wheel_path).unwrap();
        let mut archive = zip::ZipArchive::new(file).unwrap();
        let mut found = archive
            .by_name("stevedore-5.2.0.dist-info/fromager-build-settings")
            .unwrap();
        let mut contents = String::new();
        found.read_to_string(&mut contents).unwrap();
        assert_eq!(contents, "variant: default\n");
    }
}
