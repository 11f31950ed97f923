//! The source acquirer (`spec.md` §4.6): downloads an sdist/archive, clones
//! a git ref, or fetches a prebuilt wheel, landing the result in a
//! content-addressed cache directory via a streamed `.tmp`-then-rename
//! write (`fromager-fs::atomic_write`/`atomic_copy`).

use std::path::{Path, PathBuf};

use fromager_fs::sha256_file;
use fromager_settings::GitOptions;
use fromager_types::{Candidate, RetrieveMethod};
use futures::StreamExt;
use reqwest_middleware::ClientWithMiddleware;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("network error fetching `{url}`")]
    Network {
        url: String,
        #[source]
        source: reqwest_middleware::Error,
    },
    #[error("checksum mismatch for `{url}`: expected {expected}, got {actual}")]
    ChecksumMismatch {
        url: String,
        expected: String,
        actual: String,
    },
    #[error("archive at `{0}` is corrupt or not a recognized format")]
    ArchiveCorrupt(String),
    #[error("git clone of `{url}` at ref `{git_ref}` failed: {detail}")]
    GitCloneFailed {
        url: String,
        git_ref: String,
        detail: String,
    },
    #[error(transparent)]
    Fs(#[from] fromager_fs::Error),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl fromager_types::severity::BootstrapError for Error {
    fn severity(&self) -> fromager_types::severity::Severity {
        use fromager_types::severity::Severity;
        match self {
            Self::Network { .. } => Severity::Transient,
            Self::ChecksumMismatch { .. } | Self::ArchiveCorrupt(_) => Severity::NodeFailed,
            Self::GitCloneFailed { .. } | Self::Fs(_) | Self::Io(_) => Severity::NodeFailed,
        }
    }
}

/// Where an acquired artifact landed, and under which retrieval method it
/// was fetched (mirrors the Candidate's own `retrieve_method` but pinned
/// to the acquired path rather than the source URL).
#[derive(Debug, Clone)]
pub struct AcquiredSource {
    pub path: PathBuf,
    pub retrieve_method: RetrieveMethod,
}

/// Streams `candidate.retrieve_url` to `dest_dir` (content-addressed by
/// the candidate's canonical name and version), or clones+archives a git
/// source, or downloads a prebuilt wheel into `dest_dir/prebuilt/`.
pub async fn acquire(
    client: &ClientWithMiddleware,
    candidate: &Candidate,
    sdists_dir: &Path,
    wheels_dir: &Path,
    git_options: Option<&GitOptions>,
    expected_sha256: Option<&str>,
) -> Result<AcquiredSource, Error> {
    match candidate.retrieve_method {
        RetrieveMethod::Tarball => {
            let dest = sdists_dir.join(format!(
                "{}-{}.tar.gz",
                candidate.name, candidate.version
            ));
            download_streaming(client, candidate.retrieve_url.as_str(), &dest, expected_sha256)
                .await?;
            Ok(AcquiredSource {
                path: dest,
                retrieve_method: RetrieveMethod::Tarball,
            })
        }
        RetrieveMethod::PrebuiltWheel => {
            let prebuilt_dir = wheels_dir.join("prebuilt");
            let dest = prebuilt_dir.join(format!(
                "{}-{}-prebuilt.whl",
                candidate.name, candidate.version
            ));
            download_streaming(client, candidate.retrieve_url.as_str(), &dest, expected_sha256)
                .await?;
            Ok(AcquiredSource {
                path: dest,
                retrieve_method: RetrieveMethod::PrebuiltWheel,
            })
        }
        RetrieveMethod::GitHttps | RetrieveMethod::GitSsh => {
            let git_ref = candidate
                .git_ref
                .as_deref()
                .unwrap_or("HEAD")
                .to_string();
            let archive_path = clone_and_archive(
                candidate.retrieve_url.as_str(),
                &git_ref,
                sdists_dir,
                &format!("{}-{}", candidate.name, candidate.version),
                git_options,
            )
            .await?;
            Ok(AcquiredSource {
                path: archive_path,
                retrieve_method: candidate.retrieve_method,
            })
        }
    }
}

async fn download_streaming(
    client: &ClientWithMiddleware,
    url: &str,
    dest: &Path,
    expected_sha256: Option<&str>,
) -> Result<(), Error> {
    let response = client
        .get(url)
        .send()
        .await
        .map_err(|source| Error::Network {
            url: url.to_string(),
            source,
        })?;

    if let Some(parent) = dest.parent() {
        fs_err::create_dir_all(parent)?;
    }
    let tmp_path = dest.with_extension("tmp");
    {
        let mut file = fs_err::File::create(&tmp_path)?;
        let mut stream = response.bytes_stream();
        use std::io::Write;
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|source| Error::Network {
                url: url.to_string(),
                source: reqwest_middleware::Error::Reqwest(source),
            })?;
            file.write_all(&chunk)?;
        }
        file.sync_all()?;
    }

    if let Some(expected) = expected_sha256 {
        let actual = sha256_file(&tmp_path)?;
        if actual != expected {
            let _ = fs_err::remove_file(&tmp_path);
            return Err(Error::ChecksumMismatch {
                url: url.to_string(),
                expected: expected.to_string(),
                actual,
            });
        }
    }

    fs_err::rename(&tmp_path, dest)?;
    Ok(())
}

/// Clones `url` at `git_ref` into a temporary worktree, then archives the
/// worktree (minus `.git`) to a `.tar.gz` in `dest_dir`. The actual `git`
/// invocation is a command-wrapping contract per `spec.md` §1 ("network
/// isolation sandboxing... specified only as a command-wrapping
/// contract"); this function shells out to the system `git` binary.
async fn clone_and_archive(
    url: &str,
    git_ref: &str,
    dest_dir: &Path,
    archive_stem: &str,
    git_options: Option<&GitOptions>,
) -> Result<PathBuf, Error> {
    let worktree = tempfile::tempdir()?;
    let mut cmd = tokio::process::Command::new("git");
    cmd.arg("clone").arg("--depth=1").arg("--branch").arg(git_ref).arg(url).arg(worktree.path());
    let status = cmd.status().await?;
    if !status.success() {
        return Err(Error::GitCloneFailed {
            url: url.to_string(),
            git_ref: git_ref.to_string(),
            detail: format!("git clone exited with {status}"),
        });
    }

    if matches!(
        git_options.and_then(|o| o.submodules),
        Some(fromager_settings::SubmodulePolicy::Recursive)
    ) {
        let status = tokio::process::Command::new("git")
            .arg("submodule")
            .arg("update")
            .arg("--init")
            .arg("--recursive")
            .current_dir(worktree.path())
            .status()
            .await?;
        if !status.success() {
            return Err(Error::GitCloneFailed {
                url: url.to_string(),
                git_ref: git_ref.to_string(),
                detail: "submodule update failed".to_string(),
            });
        }
    }

    fs_err::create_dir_all(dest_dir)?;
    let dest = dest_dir.join(format!("{archive_stem}.tar.gz"));
    let tmp_path = dest.with_extension("tmp");
    {
        let file = std::fs::File::create(&tmp_path)?;
        let encoder = flate2::write::GzEncoder::new(file, flate2::Compression::default());
        let mut builder = tar::Builder::new(encoder);
        builder.append_dir_all(".", worktree.path())?;
        builder.into_inner()?.finish()?;
    }
    fs_err::rename(&tmp_path, &dest)?;
    Ok(dest)
}

#[cfg(test)]
mod tests {
    use super::*;
    use fromager_normalize::PackageName;
    use url::Url;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn test_acquire_tarball_downloads_and_verifies_checksum() {
        let server = MockServer::start().await;
        let body = b"fake sdist contents";
        Mock::given(method("GET"))
            .and(path("/stevedore-5.2.0.tar.gz"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(body.to_vec()))
            .mount(&server)
            .await;

        let client = reqwest_middleware::ClientBuilder::new(reqwest::Client::new()).build();
        let candidate = Candidate {
            name: PackageName::new("stevedore").unwrap(),
            version: "5.2.0".parse().unwrap(),
            retrieve_url: Url::parse(&format!("{}/stevedore-5.2.0.tar.gz", server.uri())).unwrap(),
            retrieve_method: RetrieveMethod::Tarball,
            git_ref: None,
        };

        let sdists = tempfile::tempdir().unwrap();
        let wheels = tempfile::tempdir().unwrap();
        let expected = fromager_fs::sha256_bytes(body);

        let acquired = acquire(
            &client,
            &candidate,
            sdists.path(),
            wheels.path(),
            None,
            Some(&expected),
        )
        .await
        .unwrap();

        assert!(acquired.path.exists());
        assert_eq!(fs_err::read(&acquired.path).unwrap(), body);
    }

    #[tokio::test]
    async fn test_acquire_tarball_rejects_checksum_mismatch() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/foo-1.0.tar.gz"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"contents".to_vec()))
            .mount(&server)
            .await;

        let client = reqwest_middleware::ClientBuilder::new(reqwest::Client::new()).build();
        let candidate = Candidate {
            name: PackageName::new("foo").unwrap(),
            version: "1.0".parse().unwrap(),
            retrieve_url: Url::parse(&format!("{}/foo-1.0.tar.gz", server.uri())).unwrap(),
            retrieve_method: RetrieveMethod::Tarball,
            git_ref: None,
        };
        let sdists = tempfile::tempdir().unwrap();
        let wheels = tempfile::tempdir().unwrap();

        let err = acquire(&client, &candidate, sdists.path(), wheels.path(), None, Some("deadbeef"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::ChecksumMismatch { .. }));
    }
}
