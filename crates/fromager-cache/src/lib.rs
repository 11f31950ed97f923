//! Wheel cache and local PEP-503 simple index (`spec.md` §4.11): four
//! directory trees (`downloads/`, `prebuilt/`, `build/`, `simple/`), the
//! fingerprint used to detect a reusable wheel, and an `axum` HTTP server
//! exposing `simple/` to child build environments.

mod fingerprint;
mod server;

use std::path::{Path, PathBuf};

use fromager_normalize::PackageName;
use fromager_version::Version;

pub use fingerprint::{Fingerprint, FingerprintInputs};
pub use server::serve;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Fs(#[from] fromager_fs::Error),
}

/// The four directory trees the cache owns, rooted at one `wheels-repo/`
/// directory.
#[derive(Debug, Clone)]
pub struct WheelCache {
    root: PathBuf,
}

impl WheelCache {
    pub fn open(root: impl Into<PathBuf>) -> Result<Self, Error> {
        let root = root.into();
        for sub in ["downloads", "prebuilt", "build", "simple"] {
            fs_err::create_dir_all(root.join(sub))?;
        }
        Ok(Self { root })
    }

    #[must_use]
    pub fn downloads_dir(&self) -> PathBuf {
        self.root.join("downloads")
    }
    #[must_use]
    pub fn prebuilt_dir(&self) -> PathBuf {
        self.root.join("prebuilt")
    }
    #[must_use]
    pub fn build_dir(&self) -> PathBuf {
        self.root.join("build")
    }
    #[must_use]
    pub fn simple_dir(&self) -> PathBuf {
        self.root.join("simple")
    }

    /// Moves a just-built wheel into `downloads/` atomically and updates
    /// the simple-index listing for its project so subsequent build
    /// environments can resolve it immediately.
    pub fn record_wheel(&self, name: &PackageName, wheel_filename: &str, src_path: &Path) -> Result<PathBuf, Error> {
        let dest = self.downloads_dir().join(wheel_filename);
        fromager_fs::atomic_copy(src_path, &dest)?;
        self.update_simple_index(name)?;
        Ok(dest)
    }

    /// Records a fingerprint sidecar alongside a recorded wheel, so
    /// [`WheelCache::find_by_fingerprint`] can later detect reuse without
    /// re-downloading or re-parsing the wheel itself.
    pub fn record_fingerprint(&self, wheel_path: &Path, fingerprint: &Fingerprint) -> Result<(), Error> {
        let sidecar = fingerprint_sidecar_path(wheel_path);
        fromager_fs::atomic_write(&sidecar, fingerprint.as_str().as_bytes())?;
        Ok(())
    }

    /// Looks for an existing wheel for `name`/`version` whose recorded
    /// fingerprint sidecar matches `fingerprint`. Used to skip the
    /// builder entirely when a prior build is already reusable
    /// (`spec.md` §8 invariant 5).
    #[must_use]
    pub fn find_by_fingerprint(&self, name: &PackageName, version: &Version, fingerprint: &Fingerprint) -> Option<PathBuf> {
        let prefix = format!("{name}-{version}");
        let entries = fs_err::read_dir(self.downloads_dir()).ok()?;
        for entry in entries.filter_map(Result::ok) {
            let path = entry.path();
            let Some(file_name) = path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            if !file_name.starts_with(&prefix) || !file_name.ends_with(".whl") {
                continue;
            }
            let sidecar = fingerprint_sidecar_path(&path);
            if let Ok(recorded) = fs_err::read_to_string(&sidecar) {
                if recorded.trim() == fingerprint.as_str() {
                    return Some(path);
                }
            }
        }
        None
    }

    /// Regenerates `simple/<canonical-name>/index.html` from the wheels
    /// currently present in `downloads/` and `prebuilt/` for `name`, then
    /// regenerates the top-level `simple/index.html` project listing. Both
    /// writes are atomic, so the server always serves a complete snapshot.
    fn update_simple_index(&self, name: &PackageName) -> Result<(), Error> {
        let mut filenames: Vec<String> = Vec::new();
        for dir in [self.downloads_dir(), self.prebuilt_dir()] {
            let Ok(entries) = fs_err::read_dir(&dir) else {
                continue;
            };
            for entry in entries.filter_map(Result::ok) {
                let file_name = entry.file_name().to_string_lossy().to_string();
                if file_name.starts_with(&format!("{name}-")) {
                    filenames.push(file_name);
                }
            }
        }
        filenames.sort();

        let mut body = String::from("<!DOCTYPE html><html><body>\n");
        for filename in &filenames {
            body.push_str(&format!("<a href=\"../../downloads/{filename}\">{filename}</a><br/>\n"));
        }
        body.push_str("</body></html>\n");

        let project_dir = self.simple_dir().join(name.as_str());
        fromager_fs::atomic_write(&project_dir.join("index.html"), body.as_bytes())?;

        self.rewrite_root_index()
    }

    fn rewrite_root_index(&self) -> Result<(), Error> {
        let mut projects: Vec<String> = Vec::new();
        if let Ok(entries) = fs_err::read_dir(self.simple_dir()) {
            for entry in entries.filter_map(Result::ok) {
                if entry.path().is_dir() {
                    projects.push(entry.file_name().to_string_lossy().to_string());
                }
            }
        }
        projects.sort();

        let mut body = String::from("<!DOCTYPE html><html><body>\n");
        for project in &projects {
            body.push_str(&format!("<a href=\"{project}/\">{project}</a><br/>\n"));
        }
        body.push_str("</body></html>\n");
        fromager_fs::atomic_write(&self.simple_dir().join("index.html"), body.as_bytes())?;
        Ok(())
    }
}

fn fingerprint_sidecar_path(wheel_path: &Path) -> PathBuf {
    wheel_path.with_extension("whl.fingerprint")
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_record_and_find_by_fingerprint() {
        let dir = tempdir().unwrap();
        let cache = WheelCache::open(dir.path()).unwrap();

        let src = dir.path().join("source.whl");
        fs_err::write(&src, b"wheel bytes").unwrap();

        let name = PackageName::new("stevedore").unwrap();
        let version: Version = "5.2.0".parse().unwrap();
        let wheel_path = cache
            .record_wheel(&name, "stevedore-5.2.0-0-py3-none-any.whl", &src)
            .unwrap();

        let fp = Fingerprint::compute(&FingerprintInputs {
            settings_yaml_hashes: vec!["abc".to_string()],
            patch_contents_in_order: vec![],
            variant: "default".to_string(),
            env_vars: vec![],
            resolver_provider_identity: "pypi".to_string(),
            override_plugin_identity: None,
        });
        cache.record_fingerprint(&wheel_path, &fp).unwrap();

        let found = cache.find_by_fingerprint(&name, &version, &fp);
        assert_eq!(found, Some(wheel_path));
    }

    #[test]
    fn test_simple_index_lists_project() {
        let dir = tempdir().unwrap();
        let cache = WheelCache::open(dir.path()).unwrap();
        let src = dir.path().join("s.whl");
        fs_err::write(&src, b"x").unwrap();
        let name = PackageName::new("stevedore").unwrap();
        cache.record_wheel(&name, "stevedore-5.2.0-0-py3-none-any.whl", &src).unwrap();

        let index = fs_err::read_to_string(cache.simple_dir().join("stevedore").join("index.html")).unwrap();
        assert!(index.contains("stevedore-5.2.0-0-py3-none-any.whl"));

        let root_index = fs_err::read_to_string(cache.simple_dir().join("index.html")).unwrap();
        assert!(root_index.contains("stevedore"));
    }
}
