//! PyPI provider: parses a PEP-503 simple index listing. Grounded in
//! `puffin-client`'s `registry_client.rs` HTML-scrape-of-simple-index
//! approach, trimmed to what the spec needs (filenames, not full metadata).

use fromager_normalize::PackageName;
use fromager_types::{Candidate, RetrieveMethod};
use regex::Regex;
use reqwest_middleware::ClientWithMiddleware;
use url::Url;

use crate::{Error, ProviderCandidate, ResolverProvider};

/// Matches `<a href="...">filename</a>` anchors in a PEP-503 index page.
fn anchor_regex() -> Regex {
    Regex::new(r#"(?is)<a[^>]*href="([^"]+)"[^>]*>([^<]+)</a>"#).unwrap()
}

/// Matches the `{name}-{version}` prefix of an sdist or wheel filename.
fn filename_regex() -> Regex {
    Regex::new(r"^(?P<name>[A-Za-z0-9_.\-]+?)-(?P<version>[A-Za-z0-9_.!+]+?)(-\d[^-]*)?(-[^-]+-[^-]+-[^-]+)?\.(tar\.gz|zip|whl)$").unwrap()
}

pub struct PyPiProvider {
    client: ClientWithMiddleware,
    index_url: Url,
}

impl PyPiProvider {
    #[must_use]
    pub fn new(client: ClientWithMiddleware, index_url: Url) -> Self {
        Self { client, index_url }
    }

    fn project_url(&self, name: &PackageName) -> Url {
        self.index_url
            .join(&format!("{name}/"))
            .expect("index_url is always a valid base")
    }
}

#[async_trait::async_trait]
impl ResolverProvider for PyPiProvider {
    async fn candidates(
        &self,
        name: &PackageName,
        include_sdists: bool,
        include_wheels: bool,
    ) -> Result<Vec<ProviderCandidate>, Error> {
        let url = self.project_url(name);
        let response = self
            .client
            .get(url.clone())
            .send()
            .await
            .map_err(|source| Error::Network {
                url: url.to_string(),
                source,
            })?;
        let body = response.text().await.map_err(|source| Error::Network {
            url: url.to_string(),
            source: reqwest_middleware::Error::Reqwest(source),
        })?;

        let anchors = anchor_regex();
        let filenames = filename_regex();
        let mut out = Vec::new();

        for cap in anchors.captures_iter(&body) {
            let href = cap.get(1).map(|m| m.as_str()).unwrap_or_default();
            let text = cap.get(2).map(|m| m.as_str()).unwrap_or_default().trim();

            let is_wheel = text.ends_with(".whl");
            let is_sdist = text.ends_with(".tar.gz") || text.ends_with(".zip");
            if is_wheel && !include_wheels {
                continue;
            }
            if is_sdist && !include_sdists {
                continue;
            }
            if !is_wheel && !is_sdist {
                continue;
            }

            let Some(caps) = filenames.captures(text) else {
                continue;
            };
            let version_str = caps.name("version").map(|m| m.as_str()).unwrap_or_default();
            let Ok(version) = version_str.parse() else {
                continue;
            };

            let retrieve_url = url.join(href).map_err(|_| Error::IndexParse {
                url: url.to_string(),
            })?;

            out.push(ProviderCandidate {
                is_prerelease: version.is_prerelease(),
                candidate: Candidate {
                    name: name.clone(),
                    version,
                    retrieve_url,
                    retrieve_method: if is_wheel {
                        RetrieveMethod::PrebuiltWheel
                    } else {
                        RetrieveMethod::Tarball
                    },
                    git_ref: None,
                },
            });
        }

        out.sort_by(|a, b| b.candidate.version.cmp(&a.candidate.version));
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_filename_regex_extracts_version() {
        let re = filename_regex();
        let caps = re.captures("stevedore-5.2.0.tar.gz").unwrap();
        assert_eq!(&caps["name"], "stevedore");
        assert_eq!(&caps["version"], "5.2.0");
    }

    #[test]
    fn test_filename_regex_wheel() {
        let re = filename_regex();
        let caps = re.captures("stevedore-5.2.0-py3-none-any.whl").unwrap();
        assert_eq!(&caps["version"], "5.2.0");
    }
}
