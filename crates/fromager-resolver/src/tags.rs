//! GitHub/GitLab tag providers and the caller-supplied Generic provider
//! (`spec.md` §4.5). The tag providers share a `tag_matcher` regex with a
//! single capture group used to extract the version portion of a tag.

use fromager_normalize::PackageName;
use fromager_types::{Candidate, RetrieveMethod};
use regex::Regex;
use reqwest_middleware::ClientWithMiddleware;
use serde::Deserialize;
use url::Url;

use crate::{Error, ProviderCandidate, ResolverProvider};

#[derive(Debug, Deserialize)]
struct GitHubTag {
    name: String,
}

#[derive(Debug, Deserialize)]
struct GitLabTag {
    name: String,
}

fn extract_version(tag: &str, tag_matcher: &Regex) -> Option<String> {
    tag_matcher
        .captures(tag)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string())
}

pub struct GitHubTagProvider {
    client: ClientWithMiddleware,
    owner: String,
    repo: String,
    tag_matcher: Regex,
    token: Option<String>,
}

impl GitHubTagProvider {
    #[must_use]
    pub fn new(
        client: ClientWithMiddleware,
        owner: impl Into<String>,
        repo: impl Into<String>,
        tag_matcher: Regex,
        token: Option<String>,
    ) -> Self {
        Self {
            client,
            owner: owner.into(),
            repo: repo.into(),
            tag_matcher,
            token,
        }
    }
}

#[async_trait::async_trait]
impl ResolverProvider for GitHubTagProvider {
    async fn candidates(
        &self,
        name: &PackageName,
        _include_sdists: bool,
        _include_wheels: bool,
    ) -> Result<Vec<ProviderCandidate>, Error> {
        let url = format!(
            "https://api.github.com/repos/{}/{}/tags",
            self.owner, self.repo
        );
        let mut req = self.client.get(&url).header("User-Agent", "fromager");
        if let Some(token) = &self.token {
            req = req.header("Authorization", format!("Bearer {token}"));
        }
        let response = req.send().await.map_err(|source| Error::Network {
            url: url.clone(),
            source,
        })?;
        let tags: Vec<GitHubTag> = response.json().await.map_err(|source| Error::Network {
            url: url.clone(),
            source: reqwest_middleware::Error::Reqwest(source),
        })?;

        let mut out = Vec::new();
        for tag in tags {
            let Some(version_str) = extract_version(&tag.name, &self.tag_matcher) else {
                continue;
            };
            let Ok(version) = version_str.parse() else {
                continue;
            };
            let retrieve_url = Url::parse(&format!(
                "https://github.com/{}/{}/archive/refs/tags/{}.tar.gz",
                self.owner, self.repo, tag.name
            ))
            .map_err(|_| Error::IndexParse { url: url.clone() })?;
            let version: fromager_version::Version = version;
            out.push(ProviderCandidate {
                is_prerelease: version.is_prerelease(),
                candidate: Candidate {
                    name: name.clone(),
                    version,
                    retrieve_url,
                    retrieve_method: RetrieveMethod::Tarball,
                    git_ref: Some(tag.name),
                },
            });
        }
        out.sort_by(|a, b| b.candidate.version.cmp(&a.candidate.version));
        Ok(out)
    }
}

pub struct GitLabTagProvider {
    client: ClientWithMiddleware,
    project_id: String,
    base_url: Url,
    tag_matcher: Regex,
    token: Option<String>,
}

impl GitLabTagProvider {
    #[must_use]
    pub fn new(
        client: ClientWithMiddleware,
        base_url: Url,
        project_id: impl Into<String>,
        tag_matcher: Regex,
        token: Option<String>,
    ) -> Self {
        Self {
            client,
            project_id: project_id.into(),
            base_url,
            tag_matcher,
            token,
        }
    }
}

#[async_trait::async_trait]
impl ResolverProvider for GitLabTagProvider {
    async fn candidates(
        &self,
        name: &PackageName,
        _include_sdists: bool,
        _include_wheels: bool,
    ) -> Result<Vec<ProviderCandidate>, Error> {
        let url = self
            .base_url
            .join(&format!("api/v4/projects/{}/repository/tags", self.project_id))
            .map_err(|_| Error::IndexParse {
                url: self.base_url.to_string(),
            })?;
        let mut req = self.client.get(url.clone());
        if let Some(token) = &self.token {
            req = req.header("PRIVATE-TOKEN", token);
        }
        let response = req.send().await.map_err(|source| Error::Network {
            url: url.to_string(),
            source,
        })?;
        let tags: Vec<GitLabTag> = response.json().await.map_err(|source| Error::Network {
            url: url.to_string(),
            source: reqwest_middleware::Error::Reqwest(source),
        })?;

        let mut out = Vec::new();
        for tag in tags {
            let Some(version_str) = extract_version(&tag.name, &self.tag_matcher) else {
                continue;
            };
            let Ok(version) = version_str.parse() else {
                continue;
            };
            let retrieve_url = self
                .base_url
                .join(&format!(
                    "api/v4/projects/{}/repository/archive.tar.gz?sha={}",
                    self.project_id, tag.name
                ))
                .map_err(|_| Error::IndexParse { url: url.to_string() })?;
            let version: fromager_version::Version = version;
            out.push(ProviderCandidate {
                is_prerelease: version.is_prerelease(),
                candidate: Candidate {
                    name: name.clone(),
                    version,
                    retrieve_url,
                    retrieve_method: RetrieveMethod::Tarball,
                    git_ref: Some(tag.name),
                },
            });
        }
        out.sort_by(|a, b| b.candidate.version.cmp(&a.candidate.version));
        Ok(out)
    }
}

/// Caller-supplied version iterator: wraps a plain `Vec` of (version,
/// retrieve-URL) pairs, for settings-driven `resolver_dist.provider:
/// generic` configurations that source versions from an arbitrary
/// callable at configuration time rather than over HTTP here.
pub struct GenericProvider {
    entries: Vec<(fromager_version::Version, Url)>,
}

impl GenericProvider {
    #[must_use]
    pub fn new(entries: Vec<(fromager_version::Version, Url)>) -> Self {
        Self { entries }
    }
}

#[async_trait::async_trait]
impl ResolverProvider for GenericProvider {
    async fn candidates(
        &self,
        name: &PackageName,
        _include_sdists: bool,
        _include_wheels: bool,
    ) -> Result<Vec<ProviderCandidate>, Error> {
        let mut out: Vec<ProviderCandidate> = self
            .entries
            .iter()
            .map(|(version, url)| ProviderCandidate {
                is_prerelease: version.is_prerelease(),
                candidate: Candidate {
                    name: name.clone(),
                    version: version.clone(),
                    retrieve_url: url.clone(),
                    retrieve_method: RetrieveMethod::Tarball,
                    git_ref: None,
                },
            })
            .collect();
        out.sort_by(|a, b| b.candidate.version.cmp(&a.candidate.version));
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_version_with_v_prefix() {
        let re = Regex::new(r"^v(\d+\.\d+\.\d+)$").unwrap();
        assert_eq!(extract_version("v1.2.3", &re).as_deref(), Some("1.2.3"));
        assert_eq!(extract_version("not-a-tag", &re), None);
    }
}
