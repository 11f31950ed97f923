//! Small filesystem primitives used throughout the workspace: every
//! artifact that lands in a cache directory is written to a `.tmp` sibling
//! first and atomically renamed into place (`spec.md` §4.6, §5(d)).

use std::io::{self, Read, Write};
use std::path::{Component, Path, PathBuf};

use sha2::{Digest, Sha256};

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error("unsafe path `{0}`: must be relative and free of `..`")]
    UnsafePath(String),
}

/// Write `contents` to `dest` by first writing to `dest` with a `.tmp`
/// suffix in the same directory, then renaming into place. A rename within
/// one filesystem is atomic, so concurrent readers only ever see the
/// complete old file or the complete new one, never a partial write.
pub fn atomic_write(dest: &Path, contents: &[u8]) -> Result<(), Error> {
    if let Some(parent) = dest.parent() {
        fs_err::create_dir_all(parent)?;
    }
    let tmp_path = tmp_sibling(dest);
    {
        let mut tmp = fs_err::File::create(&tmp_path)?;
        tmp.write_all(contents)?;
        tmp.sync_all()?;
    }
    fs_err::rename(&tmp_path, dest)?;
    Ok(())
}

/// Copy `src` into `dest` the same atomic way, used when moving a freshly
/// built artifact into a cache directory.
pub fn atomic_copy(src: &Path, dest: &Path) -> Result<(), Error> {
    if let Some(parent) = dest.parent() {
        fs_err::create_dir_all(parent)?;
    }
    let tmp_path = tmp_sibling(dest);
    fs_err::copy(src, &tmp_path)?;
    fs_err::rename(&tmp_path, dest)?;
    Ok(())
}

fn tmp_sibling(dest: &Path) -> PathBuf {
    let file_name = dest
        .file_name()
        .map(|n| format!("{}.tmp", n.to_string_lossy()))
        .unwrap_or_else(|| "download.tmp".to_string());
    dest.with_file_name(file_name)
}

/// SHA-256 of a file's contents, used for content-addressing and for
/// checksum verification of downloaded archives.
pub fn sha256_file(path: &Path) -> Result<String, Error> {
    let mut file = fs_err::File::open(path)?;
    let mut hasher = Sha256::new();
    let mut buf = [0u8; 64 * 1024];
    loop {
        let n = file.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(hex::encode(hasher.finalize()))
}

/// SHA-256 of an in-memory buffer, used for the Wheel Build Settings
/// Fingerprint (`spec.md` §3) and other digest composition.
#[must_use]
pub fn sha256_bytes(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

/// Join `root` with a caller-supplied relative path, rejecting anything
/// that escapes `root` via `..` or an absolute component. Used by
/// `create_files` (`spec.md` §4.7, `UnsafePath`) and by archive extraction
/// to reject path-traversal entries.
pub fn join_relative(root: &Path, relative: &str) -> Result<PathBuf, Error> {
    let candidate = Path::new(relative);
    if candidate.is_absolute() {
        return Err(Error::UnsafePath(relative.to_string()));
    }
    let mut joined = root.to_path_buf();
    for component in candidate.components() {
        match component {
            Component::Normal(part) => joined.push(part),
            Component::CurDir => {}
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => {
                return Err(Error::UnsafePath(relative.to_string()))
            }
        }
    }
    Ok(joined)
}

mod hex {
    pub fn encode(bytes: impl AsRef<[u8]>) -> String {
        bytes.as_ref().iter().map(|b| format!("{b:02x}")).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_atomic_write_creates_file() {
        let dir = tempdir().unwrap();
        let dest = dir.path().join("out.txt");
        atomic_write(&dest, b"hello").unwrap();
        assert_eq!(fs_err::read_to_string(&dest).unwrap(), "hello");
        assert!(!dir.path().join("out.txt.tmp").exists());
    }

    #[test]
    fn test_join_relative_rejects_parent_dir() {
        let root = Path::new("/tmp/source");
        assert!(matches!(
            join_relative(root, "../evil"),
            Err(Error::UnsafePath(_))
        ));
        assert!(matches!(
            join_relative(root, "/etc/passwd"),
            Err(Error::UnsafePath(_))
        ));
    }

    #[test]
    fn test_join_relative_allows_nested() {
        let root = Path::new("/tmp/source");
        let joined = join_relative(root, "pkg/data/file.txt").unwrap();
        assert_eq!(joined, Path::new("/tmp/source/pkg/data/file.txt"));
    }

    #[test]
    fn test_sha256_bytes_deterministic() {
        assert_eq!(sha256_bytes(b"abc"), sha256_bytes(b"abc"));
        assert_ne!(sha256_bytes(b"abc"), sha256_bytes(b"abd"));
    }
}
